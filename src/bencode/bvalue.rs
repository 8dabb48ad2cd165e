use std::collections::BTreeMap;
use std::fmt::Display;

use crate::error::{BencodeError, Diagnostics};

/// Represents a Bencode value as defined in the BitTorrent specification.
///
/// Bencode (pronounced like B-encode) supports four different types of values:
/// - Byte strings (raw bytes, not necessarily valid UTF-8)
/// - Integers
/// - Lists
/// - Dictionaries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BValue {
    /// An integer value, can be positive or negative
    /// Example: `i42e` represents 42
    Integer(i64),

    /// A byte string, prefixed with its length
    /// Example: `4:spam` represents "spam"
    String(Vec<u8>),

    /// A list of BValue elements
    /// Example: `l4:spami42ee` represents ["spam", 42]
    List(Vec<BValue>),

    /// A dictionary mapping byte strings to BValues.
    ///
    /// Keys are ordered by raw byte value, which is the order the encoder
    /// emits them in.
    /// Example: `d3:bar4:spam3:fooi42ee` represents {"bar": "spam", "foo": 42}
    Dict(BTreeMap<Vec<u8>, BValue>),
}

pub type BDict = BTreeMap<Vec<u8>, BValue>;

impl From<serde_json::Value> for BValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Number(n) => BValue::Integer(
                n.as_i64()
                    .or_else(|| n.as_f64().map(|f| f as i64))
                    .unwrap_or_default(),
            ),
            serde_json::Value::String(s) => BValue::String(s.into_bytes()),
            serde_json::Value::Bool(b) => BValue::Integer(b as i64),
            serde_json::Value::Array(arr) => {
                BValue::List(arr.into_iter().map(BValue::from).collect())
            }
            serde_json::Value::Object(map) => {
                let btree = map
                    .into_iter()
                    .map(|(k, v)| (k.into_bytes(), BValue::from(v)))
                    .collect();
                BValue::Dict(btree)
            }
            serde_json::Value::Null => BValue::String(Vec::new()),
        }
    }
}

impl From<&BValue> for serde_json::Value {
    fn from(value: &BValue) -> Self {
        match value {
            BValue::Integer(n) => serde_json::Value::Number((*n).into()),
            BValue::String(s) => serde_json::Value::String(display_bytes(s)),
            BValue::List(arr) => serde_json::Value::Array(arr.iter().map(|v| v.into()).collect()),
            BValue::Dict(map) => {
                let obj = map
                    .iter()
                    .map(|(k, v)| (String::from_utf8_lossy(k).into_owned(), v.into()))
                    .collect();
                serde_json::Value::Object(obj)
            }
        }
    }
}

impl From<i64> for BValue {
    fn from(n: i64) -> Self {
        BValue::Integer(n)
    }
}

impl From<&str> for BValue {
    fn from(s: &str) -> Self {
        BValue::String(s.as_bytes().to_vec())
    }
}

impl From<String> for BValue {
    fn from(s: String) -> Self {
        BValue::String(s.into_bytes())
    }
}

impl From<Vec<u8>> for BValue {
    fn from(bytes: Vec<u8>) -> Self {
        BValue::String(bytes)
    }
}

/// Printable ASCII is shown as text, anything else as hex.
fn display_bytes(s: &[u8]) -> String {
    if s.iter().any(|&b| !(32..=126).contains(&b)) {
        hex::encode(s)
    } else {
        String::from_utf8_lossy(s).into_owned()
    }
}

impl Display for BValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BValue::Integer(n) => write!(f, "{}", n),
            BValue::String(s) => write!(f, "\"{}\"", display_bytes(s)),
            BValue::List(list) => {
                write!(f, "[")?;
                for (i, item) in list.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            BValue::Dict(dict) => {
                write!(f, "{{")?;
                for (i, (key, value)) in dict.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "\"{}\":{}", String::from_utf8_lossy(key), value)?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl BValue {
    pub fn to_bytes(&self) -> Vec<u8> {
        crate::bencode::encoder::Encoder::new().encode(self)
    }

    pub fn from_bytes(bytes: &[u8], diagnostics: &mut Diagnostics) -> Result<Self, BencodeError> {
        crate::bencode::decoder::Decoder::new(bytes, diagnostics).parse()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::from(self)
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            BValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            BValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// The byte string as UTF-8, `None` for other variants or invalid text.
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|s| std::str::from_utf8(s).ok())
    }

    pub fn as_list(&self) -> Option<&[BValue]> {
        match self {
            BValue::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&BDict> {
        match self {
            BValue::Dict(dict) => Some(dict),
            _ => None,
        }
    }

    /// Looks up `key` when this value is a dictionary.
    pub fn get(&self, key: &[u8]) -> Option<&BValue> {
        self.as_dict().and_then(|d| d.get(key))
    }
}
