use std::borrow::Cow;

use sha1::{Digest, Sha1};

use crate::bencode::{BDict, BValue, Bencode};
use crate::error::MetainfoError;

pub const PIECE_HASH_LEN: usize = 20;

/// One entry of a multi-file torrent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub length: u64,
    /// Raw path segments below the torrent root directory.
    pub path: Vec<Vec<u8>>,
    /// Keys other than `length` and `path`, kept for round-trip.
    pub extensions: BDict,
}

impl FileEntry {
    pub fn new<S: Into<Vec<u8>>>(length: u64, path: impl IntoIterator<Item = S>) -> Self {
        Self {
            length,
            path: path.into_iter().map(Into::into).collect(),
            extensions: BDict::new(),
        }
    }

    /// Path segments as text, invalid UTF-8 replaced.
    pub fn path_lossy(&self) -> Vec<Cow<'_, str>> {
        self.path.iter().map(|s| String::from_utf8_lossy(s)).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileLayout {
    Single { length: u64 },
    Multi { files: Vec<FileEntry> },
}

/// The `info` dictionary, whose canonical encoding identifies the torrent.
///
/// Text fields are kept as raw bytes: they need not be UTF-8, and rewriting
/// them would change the info hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Info {
    pub name: Vec<u8>,
    pub piece_length: u32,
    /// Concatenated 20-byte SHA-1 piece digests.
    pub pieces: Vec<u8>,
    /// Raw `private` value; `None` when the key is absent, which hashes
    /// differently from `i0e`.
    pub private: Option<i64>,
    pub source: Option<Vec<u8>>,
    pub layout: FileLayout,
    pub extensions: BDict,
}

impl Info {
    pub fn piece_hashes(&self) -> Vec<[u8; 20]> {
        self.pieces
            .chunks_exact(PIECE_HASH_LEN)
            .filter_map(|chunk| chunk.try_into().ok())
            .collect()
    }

    pub fn total_pieces(&self) -> usize {
        self.pieces.len() / PIECE_HASH_LEN
    }

    /// Sum of every file length.
    pub fn total_length(&self) -> u64 {
        match &self.layout {
            FileLayout::Single { length } => *length,
            FileLayout::Multi { files } => files.iter().map(|f| f.length).sum(),
        }
    }

    /// Size of piece `piece_index`; only the last piece may be short.
    pub fn piece_size(&self, piece_index: usize) -> u64 {
        let piece_length = u64::from(self.piece_length);
        if piece_index + 1 == self.total_pieces() {
            let remainder = self.total_length() % piece_length.max(1);
            if remainder == 0 {
                piece_length
            } else {
                remainder
            }
        } else {
            piece_length
        }
    }

    /// The name as text, invalid UTF-8 replaced.
    pub fn name_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.name)
    }

    /// Any non-zero `private` value counts.
    pub fn is_private(&self) -> bool {
        self.private.map_or(false, |n| n != 0)
    }

    /// SHA-1 over the canonical encoding of this dictionary.
    pub fn info_hash(&self) -> [u8; 20] {
        let mut hasher = Sha1::new();
        hasher.update(Bencode::encode(&self.to_bvalue()));
        hasher.finalize().into()
    }

    pub fn to_bvalue(&self) -> BValue {
        let mut dict = self.extensions.clone();
        dict.insert(b"name".to_vec(), BValue::String(self.name.clone()));
        dict.insert(
            b"piece length".to_vec(),
            BValue::Integer(i64::from(self.piece_length)),
        );
        dict.insert(b"pieces".to_vec(), BValue::String(self.pieces.clone()));
        if let Some(private) = self.private {
            dict.insert(b"private".to_vec(), BValue::Integer(private));
        }
        if let Some(source) = &self.source {
            dict.insert(b"source".to_vec(), BValue::String(source.clone()));
        }
        match &self.layout {
            FileLayout::Single { length } => {
                dict.insert(b"length".to_vec(), BValue::Integer(*length as i64));
            }
            FileLayout::Multi { files } => {
                let files = files.iter().map(file_to_bvalue).collect();
                dict.insert(b"files".to_vec(), BValue::List(files));
            }
        }
        BValue::Dict(dict)
    }

    pub fn from_bvalue(value: &BValue) -> Result<Self, MetainfoError> {
        let mut dict = value
            .as_dict()
            .ok_or(MetainfoError::InvalidField("info"))?
            .clone();

        let name = take_bytes(&mut dict, "name")?.ok_or(MetainfoError::MissingField("name"))?;
        let piece_length = take_integer(&mut dict, "piece length")?
            .ok_or(MetainfoError::MissingField("piece length"))?;
        let piece_length =
            u32::try_from(piece_length).map_err(|_| MetainfoError::InvalidField("piece length"))?;
        let pieces = match dict.remove(&b"pieces"[..]) {
            Some(BValue::String(s)) if s.len() % PIECE_HASH_LEN == 0 => s,
            Some(_) => return Err(MetainfoError::InvalidField("pieces")),
            None => return Err(MetainfoError::MissingField("pieces")),
        };
        let private = take_integer(&mut dict, "private")?;
        let source = take_bytes(&mut dict, "source")?;

        let length = take_integer(&mut dict, "length")?;
        let layout = match (length, dict.remove(&b"files"[..])) {
            (Some(_), Some(_)) => return Err(MetainfoError::InvalidField("files")),
            (Some(length), None) => FileLayout::Single {
                length: u64::try_from(length).map_err(|_| MetainfoError::InvalidField("length"))?,
            },
            (None, Some(BValue::List(files))) => FileLayout::Multi {
                files: files
                    .iter()
                    .map(file_from_bvalue)
                    .collect::<Result<_, _>>()?,
            },
            (None, Some(_)) => return Err(MetainfoError::InvalidField("files")),
            (None, None) => return Err(MetainfoError::MissingField("length")),
        };

        Ok(Self {
            name,
            piece_length,
            pieces,
            private,
            source,
            layout,
            extensions: dict,
        })
    }
}

fn file_to_bvalue(file: &FileEntry) -> BValue {
    let mut dict = file.extensions.clone();
    dict.insert(b"length".to_vec(), BValue::Integer(file.length as i64));
    dict.insert(
        b"path".to_vec(),
        BValue::List(file.path.iter().cloned().map(BValue::String).collect()),
    );
    BValue::Dict(dict)
}

fn file_from_bvalue(value: &BValue) -> Result<FileEntry, MetainfoError> {
    let mut dict = value
        .as_dict()
        .ok_or(MetainfoError::InvalidField("files"))?
        .clone();
    let length = take_integer(&mut dict, "length")?
        .and_then(|n| u64::try_from(n).ok())
        .ok_or(MetainfoError::InvalidField("files.length"))?;
    let path = match dict.remove(&b"path"[..]) {
        Some(BValue::List(segments)) => segments
            .iter()
            .map(|s| s.as_bytes().map(<[u8]>::to_vec))
            .collect::<Option<Vec<_>>>()
            .ok_or(MetainfoError::InvalidField("files.path"))?,
        _ => return Err(MetainfoError::InvalidField("files.path")),
    };
    Ok(FileEntry {
        length,
        path,
        extensions: dict,
    })
}

/// Removes a byte-string field as raw bytes.
pub(crate) fn take_bytes(
    dict: &mut BDict,
    key: &'static str,
) -> Result<Option<Vec<u8>>, MetainfoError> {
    match dict.remove(key.as_bytes()) {
        Some(BValue::String(s)) => Ok(Some(s)),
        Some(_) => Err(MetainfoError::InvalidField(key)),
        None => Ok(None),
    }
}

/// Removes a byte-string field, read as (lossy) UTF-8.
pub(crate) fn take_string(
    dict: &mut BDict,
    key: &'static str,
) -> Result<Option<String>, MetainfoError> {
    Ok(take_bytes(dict, key)?.map(|s| String::from_utf8_lossy(&s).into_owned()))
}

pub(crate) fn take_integer(
    dict: &mut BDict,
    key: &'static str,
) -> Result<Option<i64>, MetainfoError> {
    match dict.remove(key.as_bytes()) {
        Some(BValue::Integer(n)) => Ok(Some(n)),
        Some(_) => Err(MetainfoError::InvalidField(key)),
        None => Ok(None),
    }
}
