//! Error types and the caller-owned error accumulator.
//!
//! Operations in this crate never abort on the first problem they meet. Fatal
//! problems abort only the smallest enclosing structure (a string, a dictionary,
//! a file, a tracker) and advisory problems are recorded while work continues.
//! Both end up in a [`Diagnostics`] list that the caller passes in and can
//! inspect afterwards, most recent first.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

/// Problems found while decoding bencoded bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BencodeError {
    #[error("unexpected end of input at offset {0}")]
    UnexpectedEof(usize),

    #[error("invalid token {token:?} at offset {offset}")]
    InvalidToken { token: char, offset: usize },

    #[error("unterminated integer at offset {0}")]
    UnterminatedInteger(usize),

    #[error("empty integer at offset {0}")]
    EmptyInteger(usize),

    #[error("non-digit characters in integer at offset {0}")]
    NonDigit(usize),

    #[error("integer out of range at offset {0}")]
    IntegerOverflow(usize),

    #[error("leading zero in {what} at offset {offset}")]
    LeadingZero { what: &'static str, offset: usize },

    #[error("invalid string length, colon not found at offset {0}")]
    ColonNotFound(usize),

    #[error("input too short for string length {length} at offset {offset}")]
    TooShort { length: usize, offset: usize },

    #[error("unterminated list")]
    UnterminatedList,

    #[error("invalid dictionary key at offset {0}")]
    InvalidKey(usize),

    #[error("duplicate dictionary key {0:?}")]
    DuplicateKey(String),

    #[error("missorted dictionary key {0:?}")]
    MissortedKey(String),

    #[error("unterminated dictionary")]
    UnterminatedDictionary,

    #[error("nesting too deep at offset {0}")]
    NestingTooDeep(usize),

    #[error("{0} trailing bytes after value")]
    TrailingData(usize),
}

impl BencodeError {
    /// Canonical-form violations that still yield a usable value.
    pub fn is_advisory(&self) -> bool {
        matches!(
            self,
            BencodeError::LeadingZero { .. }
                | BencodeError::MissortedKey(_)
                | BencodeError::TrailingData(_)
        )
    }
}

/// Problems mapping a decoded tree onto the typed metainfo schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetainfoError {
    #[error("bencode error: {0}")]
    Bencode(#[from] BencodeError),

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("invalid field: {0}")]
    InvalidField(&'static str),

    #[error("torrent root is not a dictionary")]
    NotADictionary,
}

/// Problems while hashing source files into pieces.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("invalid piece length {0}, must be between 32 and 4096 KiB")]
    PieceLengthOutOfRange(u64),

    #[error("failed to open file {path:?}, discarded")]
    UnopenableFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read file {path:?}, discarded")]
    UnreadableFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid piece length: carry of {carry} bytes exceeds piece length {piece_length}")]
    InvalidPieceLength { carry: usize, piece_length: usize },

    #[error("no readable files to build from")]
    NoFiles,
}

/// Per-tracker scrape failures.
#[derive(Debug, Clone, Error)]
pub enum ScrapeError {
    #[error("tracker request timeout ({0:?})")]
    Timeout(Duration),

    #[error("tracker request failed ({0} code)")]
    HttpStatus(u16),

    #[error("empty scrape data")]
    EmptyResponse,

    #[error("malformed scrape data: {0}")]
    MalformedResponse(#[from] BencodeError),

    #[error("tracker refused scrape: {0}")]
    Rejected(String),

    #[error("tracker unreachable: {0}")]
    Transport(#[source] Arc<reqwest::Error>),

    #[error("http client unavailable: {0}")]
    Client(#[source] Arc<reqwest::Error>),
}

/// Any error this crate records.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Bencode(#[from] BencodeError),

    #[error(transparent)]
    Metainfo(#[from] MetainfoError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("{tracker}: {source}")]
    Scrape {
        tracker: String,
        #[source]
        source: ScrapeError,
    },

    #[error("io error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// True for problems that did not prevent a value from being produced.
    pub fn is_advisory(&self) -> bool {
        match self {
            Error::Bencode(e) => e.is_advisory(),
            Error::Metainfo(MetainfoError::Bencode(e)) => e.is_advisory(),
            _ => false,
        }
    }
}

/// Accumulates errors across operations, most recent first.
#[derive(Debug, Default)]
pub struct Diagnostics {
    errors: VecDeque<Error>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, error: impl Into<Error>) {
        let error = error.into();
        warn!("{}", error);
        self.errors.push_front(error);
    }

    /// Recorded errors, most recent first.
    pub fn errors(&self) -> impl Iterator<Item = &Error> {
        self.errors.iter()
    }

    /// The most recently recorded error.
    pub fn last(&self) -> Option<&Error> {
        self.errors.front()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_fatal(&self) -> bool {
        self.errors.iter().any(|e| !e.is_advisory())
    }

    /// Takes every recorded error, most recent first, leaving the list empty.
    pub fn drain(&mut self) -> Vec<Error> {
        self.errors.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_most_recent_first() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.record(BencodeError::MissortedKey("b".into()));
        diagnostics.record(BencodeError::UnterminatedList);

        assert_eq!(diagnostics.len(), 2);
        assert!(matches!(
            diagnostics.last(),
            Some(Error::Bencode(BencodeError::UnterminatedList))
        ));
        assert!(diagnostics.has_fatal());

        let drained = diagnostics.drain();
        assert!(matches!(
            drained[1],
            Error::Bencode(BencodeError::MissortedKey(_))
        ));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_advisory_only() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.record(BencodeError::LeadingZero {
            what: "integer",
            offset: 1,
        });
        assert!(!diagnostics.has_fatal());
    }
}
