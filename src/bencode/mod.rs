//! Bencode encoding and decoding.
//!
//! The decoder is strict about structure and lenient about canonical form:
//! a missing terminator, a bad string length or a duplicate dictionary key
//! abort decoding, while non-minimal integers and unsorted dictionary keys are
//! recorded in [`Diagnostics`] and the value is kept.

use serde::Serialize;
use std::fs;
use std::path::Path;

pub mod bvalue;
pub mod decoder;
pub mod encoder;

pub use bvalue::{BDict, BValue};

use crate::error::{BencodeError, Diagnostics, Error};

/// Bencode encoder/decoder entry points
#[derive(Debug, Clone, Copy)]
pub struct Bencode;

impl Bencode {
    /// Encode a value to its canonical bytes
    pub fn encode(value: &BValue) -> Vec<u8> {
        encoder::Encoder::new().encode(value)
    }

    /// Encode any serializable record, objects becoming dictionaries over their field names
    pub fn encode_serialize<T: Serialize>(value: &T) -> serde_json::Result<Vec<u8>> {
        let value: BValue = serde_json::to_value(value)?.into();
        Ok(Self::encode(&value))
    }

    /// Decode a complete buffer, recording advisories in `diagnostics`
    pub fn decode_with(bytes: &[u8], diagnostics: &mut Diagnostics) -> Result<BValue, BencodeError> {
        decoder::Decoder::new(bytes, diagnostics).parse()
    }

    /// Decode a complete buffer, discarding advisories
    pub fn decode(bytes: &[u8]) -> Result<BValue, BencodeError> {
        Self::decode_with(bytes, &mut Diagnostics::new())
    }

    /// Decode one value from the front of `bytes` and return what remains
    pub fn decode_prefix<'a>(
        bytes: &'a [u8],
        diagnostics: &mut Diagnostics,
    ) -> Result<(BValue, &'a [u8]), BencodeError> {
        decoder::Decoder::new(bytes, diagnostics).parse_prefix()
    }

    /// Encode a value to a file
    pub fn encode_file(value: &BValue, path: impl AsRef<Path>) -> Result<(), Error> {
        let path = path.as_ref();
        fs::write(path, Self::encode(value)).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
