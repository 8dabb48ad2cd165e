pub mod bencode;
pub mod error;
pub mod torrent;
pub mod utils;

pub use error::{BencodeError, BuildError, Diagnostics, Error, MetainfoError, ScrapeError};
