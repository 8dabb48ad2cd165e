use tracing::{debug, error};

use super::bvalue::{BDict, BValue};
use crate::error::{BencodeError, Diagnostics};

const MAX_DEPTH: usize = 64;

/// Recursive-descent bencode decoder.
///
/// Structural problems abort with an `Err`. Canonical-form problems (leading
/// zeros, unsorted keys, trailing bytes) are recorded in the diagnostics and
/// the decoded value is still returned.
pub struct Decoder<'a, 'd> {
    input: &'a [u8],
    position: usize,
    depth: usize,
    diagnostics: &'d mut Diagnostics,
}

impl<'a, 'd> Decoder<'a, 'd> {
    pub fn new(input: &'a [u8], diagnostics: &'d mut Diagnostics) -> Self {
        Self {
            input,
            position: 0,
            depth: 0,
            diagnostics,
        }
    }

    /// Decodes a single value that should span the whole input.
    pub fn parse(&mut self) -> Result<BValue, BencodeError> {
        let value = self.parse_value()?;
        let trailing = self.input.len() - self.position;
        if trailing > 0 {
            self.advise(BencodeError::TrailingData(trailing));
        }
        Ok(value)
    }

    /// Decodes a single value and hands back the unconsumed input.
    pub fn parse_prefix(mut self) -> Result<(BValue, &'a [u8]), BencodeError> {
        let value = self.parse_value()?;
        Ok((value, &self.input[self.position..]))
    }

    fn advise(&mut self, advisory: BencodeError) {
        debug!("non-canonical bencode: {}", advisory);
        self.diagnostics.record(advisory);
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.position).copied()
    }

    fn consume_until(&mut self, delimiter: u8) -> Option<&'a [u8]> {
        let input = self.input;
        let start = self.position;
        let len = input[start..].iter().position(|&b| b == delimiter)?;
        self.position = start + len + 1; // consume the delimiter
        Some(&input[start..start + len])
    }

    fn parse_value(&mut self) -> Result<BValue, BencodeError> {
        match self.peek() {
            Some(b'i') => Ok(BValue::Integer(self.parse_integer()?)),
            Some(b'l') => {
                self.descend()?;
                let list = self.parse_list()?;
                self.depth -= 1;
                Ok(list)
            }
            Some(b'd') => {
                self.descend()?;
                let dict = self.parse_dict()?;
                self.depth -= 1;
                Ok(dict)
            }
            Some(c) if c.is_ascii_digit() => Ok(BValue::String(self.parse_string()?)),
            Some(c) => {
                error!(
                    "Unhandled encoded value at position {}: {:?}",
                    self.position, c as char
                );
                Err(BencodeError::InvalidToken {
                    token: c as char,
                    offset: self.position,
                })
            }
            None => Err(BencodeError::UnexpectedEof(self.position)),
        }
    }

    fn descend(&mut self) -> Result<(), BencodeError> {
        if self.depth >= MAX_DEPTH {
            return Err(BencodeError::NestingTooDeep(self.position));
        }
        self.depth += 1;
        Ok(())
    }

    fn parse_integer(&mut self) -> Result<i64, BencodeError> {
        let start = self.position;
        self.position += 1; // consume 'i'
        let digits = self
            .consume_until(b'e')
            .ok_or(BencodeError::UnterminatedInteger(start))?;
        if digits.is_empty() {
            return Err(BencodeError::EmptyInteger(start));
        }

        let magnitude = digits.strip_prefix(b"-").unwrap_or(digits);
        if magnitude.is_empty() || !magnitude.iter().all(u8::is_ascii_digit) {
            return Err(BencodeError::NonDigit(start));
        }
        // "-0" is as non-canonical as "03"
        let negative = magnitude.len() != digits.len();
        if magnitude[0] == b'0' && (magnitude.len() > 1 || negative) {
            self.advise(BencodeError::LeadingZero {
                what: "integer",
                offset: start,
            });
        }

        std::str::from_utf8(digits)
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or(BencodeError::IntegerOverflow(start))
    }

    fn parse_string(&mut self) -> Result<Vec<u8>, BencodeError> {
        let input = self.input;
        let start = self.position;
        let digits = input[start..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count();
        if input.get(start + digits) != Some(&b':') {
            return Err(BencodeError::ColonNotFound(start));
        }
        if digits > 1 && input[start] == b'0' {
            self.advise(BencodeError::LeadingZero {
                what: "string length",
                offset: start,
            });
        }

        // a prefix too large for usize can never fit in the input either
        let length = std::str::from_utf8(&input[start..start + digits])
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(usize::MAX);
        let body = start + digits + 1;
        if length > input.len() - body {
            return Err(BencodeError::TooShort {
                length,
                offset: start,
            });
        }

        self.position = body + length;
        Ok(input[body..body + length].to_vec())
    }

    fn parse_list(&mut self) -> Result<BValue, BencodeError> {
        self.position += 1; // consume 'l'
        let mut values = Vec::new();

        while let Some(c) = self.peek() {
            if c == b'e' {
                self.position += 1;
                return Ok(BValue::List(values));
            }
            values.push(self.parse_value()?);
        }
        Err(BencodeError::UnterminatedList)
    }

    fn parse_dict(&mut self) -> Result<BValue, BencodeError> {
        self.position += 1; // consume 'd'
        let mut map = BDict::new();
        let mut previous: Option<Vec<u8>> = None;

        while let Some(c) = self.peek() {
            if c == b'e' {
                self.position += 1;
                return Ok(BValue::Dict(map));
            }
            if !c.is_ascii_digit() {
                return Err(BencodeError::InvalidKey(self.position));
            }

            let key = self.parse_string()?;
            if map.contains_key(&key) {
                return Err(BencodeError::DuplicateKey(
                    String::from_utf8_lossy(&key).into_owned(),
                ));
            }
            if matches!(&previous, Some(p) if key < *p) {
                self.advise(BencodeError::MissortedKey(
                    String::from_utf8_lossy(&key).into_owned(),
                ));
            }
            if self.peek().is_none() {
                break;
            }

            let value = self.parse_value()?;
            previous = Some(key.clone());
            map.insert(key, value);
        }
        Err(BencodeError::UnterminatedDictionary)
    }
}
