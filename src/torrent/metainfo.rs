//! BitTorrent metainfo file model.
//!
//! A torrent file (also known as a metainfo file) is a bencoded dictionary:
//!
//! - `announce`: URL of the primary tracker
//! - `announce-list`: tiers of tracker URLs
//! - `comment`, `created by`, `creation date`: free-form metadata
//! - `url-list` / `httpseeds`: web seed mirrors (two independent conventions)
//! - `info`: the dictionary whose hash identifies the torrent, see [`Info`]
//!
//! Keys this model does not know are kept aside and written back unchanged.
//! Every setter stamps `created by` and `creation date`, so the document is
//! always ready to be encoded.

use std::borrow::Cow;
use std::fmt;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::announce::{Announce, AnnounceList};
use super::builder::{self, BuildOptions};
use super::info::{take_integer, take_string, FileLayout, Info};
use super::magnet_link::MagnetLink;
use crate::bencode::{BDict, BValue, Bencode};
use crate::error::{Diagnostics, Error, MetainfoError};
use crate::utils::{format_size, unix_now};

/// Bytes read to tell a torrent file apart from content.
const SNIFF_LEN: u64 = 16;

/// Web seed list in the `url-list` convention, a single URL or several.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlList {
    Single(String),
    Many(Vec<String>),
}

impl UrlList {
    pub fn urls(&self) -> Vec<&str> {
        match self {
            UrlList::Single(url) => vec![url.as_str()],
            UrlList::Many(urls) => urls.iter().map(String::as_str).collect(),
        }
    }

    fn to_bvalue(&self) -> BValue {
        match self {
            UrlList::Single(url) => BValue::from(url.as_str()),
            UrlList::Many(urls) => string_list(urls),
        }
    }
}

impl From<&str> for UrlList {
    fn from(url: &str) -> Self {
        UrlList::Single(url.to_string())
    }
}

impl From<Vec<String>> for UrlList {
    fn from(urls: Vec<String>) -> Self {
        UrlList::Many(urls)
    }
}

/// Where a file sits in the piece sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOffset {
    pub path: PathBuf,
    /// Piece holding the first byte of the file.
    pub start_piece: u64,
    /// Offset of the first byte inside `start_piece`.
    pub piece_offset: u64,
    /// Offset just past the last byte, counted over the whole content.
    pub end_offset: u64,
    pub end_piece: u64,
}

/// Represents a parsed or freshly built BitTorrent metainfo file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metainfo {
    announce: Option<String>,
    announce_list: Option<AnnounceList>,
    comment: Option<String>,
    created_by: Option<String>,
    creation_date: Option<i64>,
    url_list: Option<UrlList>,
    httpseeds: Option<Vec<String>>,
    info: Info,
    extensions: BDict,
}

impl Metainfo {
    /// Wraps a freshly built info dictionary.
    pub fn from_info(info: Info) -> Self {
        let mut metainfo = Self {
            announce: None,
            announce_list: None,
            comment: None,
            created_by: None,
            creation_date: None,
            url_list: None,
            httpseeds: None,
            info,
            extensions: BDict::new(),
        };
        metainfo.touch();
        metainfo
    }

    /// Builds a torrent from a file or directory and assigns its trackers.
    ///
    /// Failures are recorded in `diagnostics`; `None` is returned when nothing
    /// could be built at all.
    pub fn create(
        source: &Path,
        announce: impl Into<Announce>,
        options: &BuildOptions,
        diagnostics: &mut Diagnostics,
    ) -> Option<Self> {
        match builder::build(source, options, diagnostics) {
            Ok(info) => {
                let mut metainfo = Self::from_info(info);
                metainfo.set_announce(announce);
                Some(metainfo)
            }
            Err(e) => {
                diagnostics.record(e);
                None
            }
        }
    }

    /// Parse a torrent file from its raw bytes, recording any problem.
    pub fn from_bytes(bytes: &[u8], diagnostics: &mut Diagnostics) -> Option<Self> {
        match Self::parse(bytes, diagnostics) {
            Ok(metainfo) => Some(metainfo),
            Err(e) => {
                diagnostics.record(e);
                None
            }
        }
    }

    /// Parse a torrent file from its raw bytes; advisories go to `diagnostics`.
    pub fn parse(bytes: &[u8], diagnostics: &mut Diagnostics) -> Result<Self, MetainfoError> {
        let value = Bencode::decode_with(bytes, diagnostics)?;
        Self::from_bvalue(&value)
    }

    /// Reads and parses a torrent file from disk.
    pub fn read(path: impl AsRef<Path>, diagnostics: &mut Diagnostics) -> Option<Self> {
        let path = path.as_ref();
        match fs::read(path) {
            Ok(bytes) => Self::from_bytes(&bytes, diagnostics),
            Err(source) => {
                diagnostics.record(Error::Io {
                    path: path.to_path_buf(),
                    source,
                });
                None
            }
        }
    }

    pub fn from_bvalue(value: &BValue) -> Result<Self, MetainfoError> {
        let mut dict = value.as_dict().ok_or(MetainfoError::NotADictionary)?.clone();

        let info = match dict.remove(&b"info"[..]) {
            Some(info) => Info::from_bvalue(&info)?,
            None => return Err(MetainfoError::MissingField("info")),
        };
        let announce = take_string(&mut dict, "announce")?;
        let announce_list = match dict.remove(&b"announce-list"[..]) {
            Some(value) => Some(
                AnnounceList::from_bvalue(&value)
                    .ok_or(MetainfoError::InvalidField("announce-list"))?,
            ),
            None => None,
        };
        let url_list = match dict.remove(&b"url-list"[..]) {
            Some(BValue::String(url)) => Some(UrlList::Single(lossy(&url))),
            Some(value @ BValue::List(_)) => Some(UrlList::Many(
                strings(&value).ok_or(MetainfoError::InvalidField("url-list"))?,
            )),
            Some(_) => return Err(MetainfoError::InvalidField("url-list")),
            None => None,
        };
        let httpseeds = match dict.remove(&b"httpseeds"[..]) {
            Some(value) => Some(strings(&value).ok_or(MetainfoError::InvalidField("httpseeds"))?),
            None => None,
        };

        let metainfo = Self {
            announce,
            announce_list,
            comment: take_string(&mut dict, "comment")?,
            created_by: take_string(&mut dict, "created by")?,
            creation_date: take_integer(&mut dict, "creation date")?,
            url_list,
            httpseeds,
            info,
            extensions: dict,
        };
        debug!(
            "parsed torrent {:?} with {} unknown keys",
            metainfo.info.name_lossy(),
            metainfo.extensions.len()
        );
        Ok(metainfo)
    }

    pub fn to_bvalue(&self) -> BValue {
        let mut dict = self.extensions.clone();
        dict.insert(b"info".to_vec(), self.info.to_bvalue());
        if let Some(announce) = &self.announce {
            dict.insert(b"announce".to_vec(), BValue::from(announce.as_str()));
        }
        if let Some(list) = &self.announce_list {
            dict.insert(b"announce-list".to_vec(), list.to_bvalue());
        }
        if let Some(comment) = &self.comment {
            dict.insert(b"comment".to_vec(), BValue::from(comment.as_str()));
        }
        if let Some(created_by) = &self.created_by {
            dict.insert(b"created by".to_vec(), BValue::from(created_by.as_str()));
        }
        if let Some(date) = self.creation_date {
            dict.insert(b"creation date".to_vec(), BValue::Integer(date));
        }
        if let Some(url_list) = &self.url_list {
            dict.insert(b"url-list".to_vec(), url_list.to_bvalue());
        }
        if let Some(seeds) = &self.httpseeds {
            dict.insert(b"httpseeds".to_vec(), string_list(seeds));
        }
        BValue::Dict(dict)
    }

    /// Canonical encoding of the whole document.
    pub fn to_bytes(&self) -> Vec<u8> {
        Bencode::encode(&self.to_bvalue())
    }

    /// Writes the encoded torrent, to `<name>.torrent` when no path is given.
    pub fn save(&self, path: Option<&Path>) -> Result<PathBuf, Error> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(format!("{}.torrent", self.info.name_lossy())));
        Bencode::encode_file(&self.to_bvalue(), &path)?;
        info!("saved {:?}", path);
        Ok(path)
    }

    /// Cheap sniff: a dictionary whose first key is a byte string.
    pub fn looks_like_torrent(bytes: &[u8]) -> bool {
        bytes.len() > 3
            && bytes[0] == b'd'
            && bytes[1].is_ascii_digit()
            && bytes[2..].iter().take(8).any(|&b| b == b':')
    }

    /// Sniffs the first bytes of a file; unreadable files do not look like one.
    pub fn looks_like_torrent_file(path: &Path) -> bool {
        let mut prefix = Vec::with_capacity(SNIFF_LEN as usize);
        match File::open(path).and_then(|f| f.take(SNIFF_LEN).read_to_end(&mut prefix)) {
            Ok(_) => Self::looks_like_torrent(&prefix),
            Err(_) => false,
        }
    }

    fn touch(&mut self) {
        self.created_by = Some(format!(
            "{}/{}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        ));
        self.creation_date = Some(unix_now());
    }

    // Trackers

    pub fn announce(&self) -> Option<&str> {
        self.announce.as_deref()
    }

    pub fn announce_list(&self) -> Option<&AnnounceList> {
        self.announce_list.as_ref()
    }

    /// The tier list, or the lone `announce` as a one-tier list.
    pub fn trackers(&self) -> AnnounceList {
        match (&self.announce_list, &self.announce) {
            (Some(list), _) if !list.is_empty() => list.clone(),
            (_, Some(announce)) => AnnounceList::from(announce.as_str()),
            _ => AnnounceList::default(),
        }
    }

    /// Adds, replaces or clears trackers, see [`Announce`].
    pub fn set_announce(&mut self, announce: impl Into<Announce>) {
        self.touch();
        match announce.into() {
            Announce::Clear => {
                self.announce = None;
                self.announce_list = None;
            }
            Announce::Url(url) => match &self.announce {
                Some(current) => {
                    let mut list = self
                        .announce_list
                        .take()
                        .unwrap_or_else(|| AnnounceList::from(current.as_str()));
                    list.push_tier(vec![url]);
                    self.announce_list = Some(list);
                }
                None => {
                    self.announce_list = None;
                    self.announce = (!url.is_empty()).then_some(url);
                }
            },
            Announce::Tiers(entries) => {
                let (announce, list) = Announce::resolve(entries);
                self.announce = announce;
                self.announce_list = list;
            }
        }
    }

    // Plain fields

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn set_comment(&mut self, comment: impl Into<String>) {
        self.touch();
        self.comment = Some(comment.into());
    }

    pub fn created_by(&self) -> Option<&str> {
        self.created_by.as_deref()
    }

    pub fn creation_date(&self) -> Option<i64> {
        self.creation_date
    }

    pub fn set_creation_date(&mut self, timestamp: i64) {
        self.touch();
        self.creation_date = Some(timestamp);
    }

    /// The torrent name as text, invalid UTF-8 replaced.
    pub fn name(&self) -> Cow<'_, str> {
        self.info.name_lossy()
    }

    pub fn set_name(&mut self, name: impl Into<Vec<u8>>) {
        self.touch();
        self.info.name = name.into();
    }

    pub fn is_private(&self) -> bool {
        self.info.is_private()
    }

    pub fn set_private(&mut self, private: bool) {
        self.touch();
        self.info.private = Some(i64::from(private));
    }

    pub fn source(&self) -> Option<Cow<'_, str>> {
        self.info.source.as_deref().map(String::from_utf8_lossy)
    }

    pub fn set_source(&mut self, source: impl Into<Vec<u8>>) {
        self.touch();
        self.info.source = Some(source.into());
    }

    pub fn url_list(&self) -> Option<&UrlList> {
        self.url_list.as_ref()
    }

    pub fn set_url_list(&mut self, urls: impl Into<UrlList>) {
        self.touch();
        self.url_list = Some(urls.into());
    }

    pub fn httpseeds(&self) -> Option<&[String]> {
        self.httpseeds.as_deref()
    }

    pub fn set_httpseeds<S: Into<String>>(&mut self, urls: impl IntoIterator<Item = S>) {
        self.touch();
        self.httpseeds = Some(urls.into_iter().map(Into::into).collect());
    }

    pub fn piece_length(&self) -> u32 {
        self.info.piece_length
    }

    pub fn info(&self) -> &Info {
        &self.info
    }

    /// Unknown top-level keys.
    pub fn extensions(&self) -> &BDict {
        &self.extensions
    }

    // Derived views

    /// SHA-1 of the canonical `info` encoding, computed on every call.
    pub fn info_hash(&self) -> [u8; 20] {
        self.info.info_hash()
    }

    pub fn info_hash_hex(&self) -> String {
        hex::encode(self.info_hash())
    }

    /// Every file with its size, paths prefixed with the torrent name.
    pub fn content(&self) -> Vec<(PathBuf, u64)> {
        match &self.info.layout {
            FileLayout::Single { length } => {
                vec![(PathBuf::from(self.info.name_lossy().into_owned()), *length)]
            }
            FileLayout::Multi { files } => files
                .iter()
                .map(|f| (self.file_path(&f.path_lossy()), f.length))
                .collect(),
        }
    }

    pub fn content_formatted(&self, precision: usize) -> Vec<(PathBuf, String)> {
        self.content()
            .into_iter()
            .map(|(path, size)| (path, format_size(size, precision)))
            .collect()
    }

    /// Total size of the content in bytes.
    pub fn size(&self) -> u64 {
        self.info.total_length()
    }

    pub fn size_formatted(&self, precision: usize) -> String {
        format_size(self.size(), precision)
    }

    /// Maps every file onto the pieces that cover it.
    pub fn offset(&self) -> Vec<FileOffset> {
        let piece_length = u64::from(self.info.piece_length.max(1));
        let mut cumulative = 0u64;
        self.content()
            .into_iter()
            .map(|(path, length)| {
                let start = cumulative;
                cumulative += length;
                FileOffset {
                    path,
                    start_piece: start / piece_length,
                    piece_offset: start % piece_length,
                    end_offset: cumulative,
                    end_piece: cumulative / piece_length,
                }
            })
            .collect()
    }

    pub fn magnet(&self) -> MagnetLink {
        MagnetLink::from_metainfo(self)
    }

    fn file_path(&self, segments: &[Cow<'_, str>]) -> PathBuf {
        let mut path = PathBuf::from(self.info.name_lossy().into_owned());
        path.extend(segments.iter().map(AsRef::<str>::as_ref));
        path
    }
}

impl fmt::Display for Metainfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Name: {}", self.info.name_lossy())?;
        match &self.announce_list {
            Some(list) => {
                writeln!(f, "Trackers:")?;
                for (i, tier) in list.tiers().iter().enumerate() {
                    writeln!(f, "  tier {}: {}", i, tier.join(", "))?;
                }
            }
            None => writeln!(f, "Tracker URL: {}", self.announce.as_deref().unwrap_or("-"))?,
        }
        if let Some(comment) = &self.comment {
            writeln!(f, "Comment: {}", comment)?;
        }
        if let Some(created_by) = &self.created_by {
            writeln!(f, "Created By: {}", created_by)?;
        }
        writeln!(f, "Private: {}", if self.is_private() { "yes" } else { "no" })?;
        writeln!(f, "Length: {} ({})", self.size(), self.size_formatted(2))?;
        writeln!(f, "Info Hash: {}", self.info_hash_hex())?;
        writeln!(f, "Piece Length: {}", self.info.piece_length)?;
        writeln!(f, "Pieces: {}", self.info.total_pieces())?;
        writeln!(f, "Files:")?;
        for (path, size) in self.content() {
            writeln!(f, "  {} ({})", path.display(), size)?;
        }
        Ok(())
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn strings(value: &BValue) -> Option<Vec<String>> {
    value
        .as_list()?
        .iter()
        .map(|v| v.as_bytes().map(lossy))
        .collect()
}

fn string_list(urls: &[String]) -> BValue {
    BValue::List(urls.iter().map(|u| BValue::from(u.as_str())).collect())
}
