//! Torrent metadata: the typed model, the piece builder and tracker scraping.

pub mod announce;
pub mod builder;
pub mod info;
pub mod magnet_link;
pub mod metainfo;
pub mod scrape;

pub use announce::{Announce, AnnounceList, Tier, TierEntry};
pub use builder::{BuildOptions, InfoBuilder, PieceHasher};
pub use info::{FileEntry, FileLayout, Info};
pub use magnet_link::MagnetLink;
pub use metainfo::{FileOffset, Metainfo, UrlList};
pub use scrape::{scrape, scrape_url, ScrapeConfig, ScrapeReport, ScrapeStats};

#[cfg(test)]
mod tests;
