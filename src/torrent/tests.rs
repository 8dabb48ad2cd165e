//! Integration tests for building, reading and scraping torrents.
//!
//! # Test Coverage
//!
//! ## Building
//! - Pieces spanning file boundaries
//! - Piece length validation before any file is touched
//! - Hidden entry filtering
//!
//! ## Metadata
//! - Encode/decode round trip, unknown keys included
//! - Tracker assignment shapes
//! - File offsets and magnet links
//!
//! ## Scraping
//! - One hanging, one failing and one answering tracker in the same batch
//!
//! # Test Structure
//!
//! Tests use a `MockTracker` to simulate an HTTP tracker, which:
//! - Accepts a single connection
//! - Reads the request head
//! - Answers with a canned response, or never answers at all

use super::*;
use crate::bencode::{BValue, Bencode};
use crate::error::{BuildError, Diagnostics, Error, ScrapeError};
use sha1::{Digest, Sha1};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Mock implementation of an HTTP tracker for testing purposes.
struct MockTracker {
    listener: TcpListener,
}

impl MockTracker {
    /// Creates a new MockTracker listening on a random local port.
    async fn new() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        Self { listener }
    }

    /// Returns the announce URL pointing at this tracker.
    fn announce_url(&self) -> String {
        format!("http://{}/announce", self.listener.local_addr().unwrap())
    }

    /// Serves one request with `status` and `body`, or hangs when `status` is `None`.
    fn serve(self, status: Option<u16>, body: Vec<u8>) {
        tokio::spawn(async move {
            let (mut stream, _) = self.listener.accept().await.unwrap();
            let mut head = Vec::new();
            let mut buf = [0u8; 1024];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).await.unwrap();
                if n == 0 {
                    return;
                }
                head.extend_from_slice(&buf[..n]);
            }
            assert!(String::from_utf8_lossy(&head).starts_with("GET /scrape?info_hash="));

            let Some(status) = status else {
                tokio::time::sleep(Duration::from_secs(60)).await;
                return;
            };
            let mut response = format!(
                "HTTP/1.1 {} X\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status,
                body.len()
            )
            .into_bytes();
            response.extend_from_slice(&body);
            stream.write_all(&response).await.unwrap();
        });
    }
}

fn write_file(path: &Path, data: &[u8]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, data).unwrap();
}

fn sample_info() -> Info {
    Info {
        name: "album".into(),
        piece_length: 32768,
        pieces: vec![3; 60],
        private: None,
        source: None,
        layout: FileLayout::Multi {
            files: vec![
                FileEntry::new(40000, ["cd1", "01.flac"]),
                FileEntry::new(30000, ["cover.jpg"]),
            ],
        },
        extensions: Default::default(),
    }
}

/// A 10 byte file followed by a 300000 byte file gives two 256 KiB pieces,
/// the first one straddling the file boundary.
#[test]
fn test_build_dir_spans_files() {
    let dir = tempfile::tempdir().unwrap();
    let first = vec![1u8; 10];
    let second: Vec<u8> = (0..300000u32).map(|i| (i % 251) as u8).collect();
    write_file(&dir.path().join("b").join("2.bin"), &second);
    write_file(&dir.path().join("a").join("1.bin"), &first);

    let mut diagnostics = Diagnostics::new();
    let metainfo = Metainfo::create(
        dir.path(),
        "http://tracker.example/announce",
        &BuildOptions::default(),
        &mut diagnostics,
    )
    .unwrap();
    assert!(diagnostics.is_empty());

    let info = metainfo.info();
    assert_eq!(info.total_pieces(), 2);
    assert_eq!(metainfo.size(), 300010);
    match &info.layout {
        FileLayout::Multi { files } => {
            assert_eq!(files[0].path_lossy(), ["a", "1.bin"]);
            assert_eq!(files[1].path_lossy(), ["b", "2.bin"]);
        }
        FileLayout::Single { .. } => panic!("expected a multi-file layout"),
    }

    let mut content = first;
    content.extend_from_slice(&second);
    assert_eq!(
        info.piece_hashes()[0].to_vec(),
        Sha1::digest(&content[..262144]).to_vec()
    );
    assert_eq!(
        info.piece_hashes()[1].to_vec(),
        Sha1::digest(&content[262144..]).to_vec()
    );
    assert_eq!(metainfo.announce(), Some("http://tracker.example/announce"));
}

/// An out-of-range piece length is refused before the source is even opened.
#[test]
fn test_piece_length_checked_before_io() {
    let mut diagnostics = Diagnostics::new();
    let options = BuildOptions {
        piece_length: 16 * 1024,
        ..Default::default()
    };
    let metainfo = Metainfo::create(
        Path::new("/definitely/not/here"),
        Announce::Clear,
        &options,
        &mut diagnostics,
    );
    assert!(metainfo.is_none());
    assert_eq!(diagnostics.len(), 1);
    assert!(matches!(
        diagnostics.last(),
        Some(Error::Build(BuildError::PieceLengthOutOfRange(16384)))
    ));
}

/// Hidden files and directories are skipped when asked to.
#[test]
fn test_build_dir_excludes_hidden() {
    let dir = tempfile::tempdir().unwrap();
    write_file(&dir.path().join("visible.txt"), b"hello");
    write_file(&dir.path().join(".hidden"), b"secret");
    write_file(&dir.path().join(".git").join("config"), b"[core]");

    let mut diagnostics = Diagnostics::new();
    let options = BuildOptions {
        include_hidden: false,
        ..Default::default()
    };
    let info = builder::build_dir(dir.path(), &options, &mut diagnostics).unwrap();
    assert_eq!(info.total_length(), 5);

    let info = builder::build_dir(dir.path(), &BuildOptions::default(), &mut diagnostics).unwrap();
    assert_eq!(info.total_length(), 5 + 6 + 6);
}

/// A single source file produces the single-file layout named after it.
#[test]
fn test_build_single_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("song.flac");
    write_file(&path, &[9; 40000]);

    let info = builder::build_file(&path, 32768).unwrap();
    assert_eq!(info.name, b"song.flac");
    assert_eq!(info.layout, FileLayout::Single { length: 40000 });
    assert_eq!(info.total_pieces(), 2);
}

/// Explicit file lists are sorted and rooted at their deepest common directory.
#[test]
fn test_build_files_common_root() {
    let dir = tempfile::tempdir().unwrap();
    let album = dir.path().join("album");
    write_file(&album.join("b.txt"), b"bb");
    write_file(&album.join("sub").join("a.txt"), b"a");

    let mut diagnostics = Diagnostics::new();
    let info = builder::build_files(
        &[
            album.join("sub").join("a.txt"),
            album.join("b.txt"),
            album.join("missing.txt"),
        ],
        32768,
        &mut diagnostics,
    )
    .unwrap();

    assert_eq!(info.name, b"album");
    assert_eq!(diagnostics.len(), 1);
    match info.layout {
        FileLayout::Multi { files } => {
            assert_eq!(files[0].path_lossy(), ["b.txt"]);
            assert_eq!(files[1].path_lossy(), ["sub", "a.txt"]);
        }
        FileLayout::Single { .. } => panic!("expected a multi-file layout"),
    }
}

/// Saving then reading back gives the same document and info hash.
#[test]
fn test_save_and_read() {
    let dir = tempfile::tempdir().unwrap();
    let mut metainfo = Metainfo::from_info(sample_info());
    metainfo.set_announce(vec!["http://a/announce", "udp://b:80/announce"]);
    metainfo.set_comment("test");
    metainfo.set_private(true);
    metainfo.set_url_list("http://mirror/");

    let path = metainfo.save(Some(&dir.path().join("out.torrent"))).unwrap();
    let mut diagnostics = Diagnostics::new();
    let read = Metainfo::read(&path, &mut diagnostics).unwrap();
    assert!(diagnostics.is_empty());
    assert_eq!(read, metainfo);
    assert_eq!(read.info_hash(), metainfo.info_hash());
    assert!(read.is_private());

    assert!(Metainfo::read(dir.path().join("nope.torrent"), &mut diagnostics).is_none());
    assert!(matches!(diagnostics.last(), Some(Error::Io { .. })));
}

/// Keys the model does not know survive a decode/encode cycle byte for byte.
#[test]
fn test_unknown_keys_survive() {
    let mut info = sample_info().to_bvalue();
    if let BValue::Dict(dict) = &mut info {
        dict.insert(b"meta version".to_vec(), BValue::Integer(2));
    }
    let mut root = crate::bencode::BDict::new();
    root.insert(b"info".to_vec(), info);
    root.insert(b"announce".to_vec(), BValue::from("http://a/announce"));
    root.insert(b"x-custom".to_vec(), BValue::List(vec![BValue::Integer(1)]));
    let bytes = Bencode::encode(&BValue::Dict(root));

    let mut diagnostics = Diagnostics::new();
    let metainfo = Metainfo::from_bytes(&bytes, &mut diagnostics).unwrap();
    assert!(diagnostics.is_empty());
    assert_eq!(metainfo.to_bytes(), bytes);
    assert!(metainfo.extensions().contains_key(&b"x-custom"[..]));
    assert!(Metainfo::looks_like_torrent(&bytes));
}

/// A torrent whose name is not UTF-8 and whose `private` flag is `i2e` keeps
/// the hash of the bytes it was read from.
#[test]
fn test_info_hash_survives_read() {
    let mut info = b"d6:lengthi5e4:name2:\xff\xfe12:piece lengthi32768e6:pieces20:".to_vec();
    info.extend_from_slice(&[7; 20]);
    info.extend_from_slice(b"7:privatei2ee");
    let bytes = [&b"d4:info"[..], &info[..], &b"e"[..]].concat();

    let mut diagnostics = Diagnostics::new();
    let metainfo = Metainfo::from_bytes(&bytes, &mut diagnostics).unwrap();
    assert!(diagnostics.is_empty());
    assert_eq!(metainfo.info_hash().to_vec(), Sha1::digest(&info).to_vec());
    assert_eq!(metainfo.to_bytes(), bytes);
    assert!(metainfo.is_private());
    assert!(metainfo
        .magnet()
        .to_string()
        .contains(&hex::encode(Sha1::digest(&info))));
}

/// Only a short prefix decides whether a file already is a torrent.
#[test]
fn test_looks_like_torrent_file() {
    let dir = tempfile::tempdir().unwrap();
    let torrent = Metainfo::from_info(sample_info())
        .save(Some(&dir.path().join("a.torrent")))
        .unwrap();
    assert!(Metainfo::looks_like_torrent_file(&torrent));

    let content = dir.path().join("data.bin");
    write_file(&content, &vec![0u8; 1 << 20]);
    assert!(!Metainfo::looks_like_torrent_file(&content));
    assert!(!Metainfo::looks_like_torrent_file(&dir.path().join("missing")));
}

/// Schema problems are recorded and nothing is returned.
#[test]
fn test_from_bytes_schema_errors() {
    let mut diagnostics = Diagnostics::new();
    assert!(Metainfo::from_bytes(b"d8:announce1:ae", &mut diagnostics).is_none());
    assert!(Metainfo::from_bytes(b"li1ee", &mut diagnostics).is_none());
    assert!(Metainfo::from_bytes(b"d4:info", &mut diagnostics).is_none());
    assert_eq!(diagnostics.len(), 3);
    assert!(diagnostics.has_fatal());
    assert!(!Metainfo::looks_like_torrent(b"li1ee"));
}

/// Every accepted shape of tracker assignment.
#[test]
fn test_set_announce_shapes() {
    let mut metainfo = Metainfo::from_info(sample_info());

    metainfo.set_announce("http://a");
    assert_eq!(metainfo.announce(), Some("http://a"));
    assert_eq!(metainfo.announce_list(), None);

    metainfo.set_announce("http://b");
    assert_eq!(metainfo.announce(), Some("http://a"));
    assert_eq!(
        metainfo.announce_list().unwrap().tiers(),
        &[vec!["http://a".to_string()], vec!["http://b".to_string()]]
    );

    metainfo.set_announce(vec!["http://x", "http://y"]);
    assert_eq!(metainfo.announce(), Some("http://x"));
    assert_eq!(metainfo.announce_list().unwrap().tiers().len(), 2);

    metainfo.set_announce(vec![TierEntry::from(vec!["http://p", "http://q"])]);
    assert_eq!(metainfo.announce(), Some("http://p"));
    assert_eq!(metainfo.announce_list(), None);

    metainfo.set_announce(Announce::Clear);
    assert_eq!(metainfo.announce(), None);
    assert!(metainfo.trackers().is_empty());
}

/// An empty URL appends a tier next to a primary tracker and clears
/// everything without one.
#[test]
fn test_set_announce_empty_url() {
    let mut metainfo = Metainfo::from_info(sample_info());
    metainfo.set_announce("http://a");
    metainfo.set_announce("");
    assert_eq!(metainfo.announce(), Some("http://a"));
    assert_eq!(metainfo.announce_list().unwrap().tiers().len(), 2);

    // a tier list without a primary tracker, as some torrents in the wild
    let mut root = metainfo.to_bvalue();
    if let BValue::Dict(dict) = &mut root {
        dict.remove(&b"announce"[..]);
    }
    let mut listed_only = Metainfo::from_bvalue(&root).unwrap();
    assert_eq!(listed_only.announce(), None);
    assert!(listed_only.announce_list().is_some());

    listed_only.set_announce("");
    assert_eq!(listed_only.announce(), None);
    assert_eq!(listed_only.announce_list(), None);
}

/// Every setter stamps the creator; an explicit creation date is kept.
#[test]
fn test_setters_stamp_creator() {
    let mut metainfo = Metainfo::from_info(sample_info());
    assert!(metainfo.created_by().unwrap().starts_with("metatorrent/"));
    metainfo.set_creation_date(1234);
    assert_eq!(metainfo.creation_date(), Some(1234));
    metainfo.set_source("TRK");
    assert_eq!(metainfo.source().as_deref(), Some("TRK"));
    assert_ne!(metainfo.creation_date(), Some(1234));
}

#[test]
fn test_content_and_offsets() {
    let metainfo = Metainfo::from_info(sample_info());
    let content = metainfo.content();
    assert_eq!(content[0].0, Path::new("album").join("cd1").join("01.flac"));
    assert_eq!(content[1], (Path::new("album").join("cover.jpg"), 30000));
    assert_eq!(metainfo.size_formatted(2), "68.36 KiB");

    let offsets = metainfo.offset();
    assert_eq!(offsets[0].start_piece, 0);
    assert_eq!(offsets[0].piece_offset, 0);
    assert_eq!(offsets[0].end_offset, 40000);
    assert_eq!(offsets[0].end_piece, 1);
    assert_eq!(offsets[1].start_piece, 1);
    assert_eq!(offsets[1].piece_offset, 40000 - 32768);
    assert_eq!(offsets[1].end_offset, 70000);
    assert_eq!(offsets[1].end_piece, 2);
}

#[test]
fn test_magnet_from_metainfo() {
    let mut metainfo = Metainfo::from_info(sample_info());
    metainfo.set_announce("http://a/announce");
    let magnet = metainfo.magnet();
    assert_eq!(
        magnet.to_string(),
        format!(
            "magnet:?xt=urn:btih:{}&dn=album&xl=70000&tr=http%3A%2F%2Fa%2Fannounce",
            metainfo.info_hash_hex()
        )
    );
}

/// A hanging tracker, a failing one and an answering one: the report has one
/// entry each and the call returns once the shared deadline passes.
#[tokio::test]
async fn test_scrape_mixed_trackers() {
    let info_hash = [0x42u8; 20];

    let hanging = MockTracker::new().await;
    let not_found = MockTracker::new().await;
    let answering = MockTracker::new().await;
    let urls = vec![
        hanging.announce_url(),
        not_found.announce_url(),
        answering.announce_url(),
        // normalizes to the answering tracker and is queried once
        answering.announce_url().replace("http://", "UDP://"),
    ];

    let mut body = b"d5:filesd20:".to_vec();
    body.extend_from_slice(&info_hash);
    body.extend_from_slice(b"d8:completei5e10:downloadedi10e10:incompletei3eeee");

    hanging.serve(None, Vec::new());
    not_found.serve(Some(404), Vec::new());
    answering.serve(Some(200), body);

    let config = ScrapeConfig {
        timeout: Duration::from_secs(1),
    };
    let mut diagnostics = Diagnostics::new();
    let started = std::time::Instant::now();
    let report = scrape(info_hash, &AnnounceList::from(urls.clone()), &config, &mut diagnostics)
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(10));

    assert_eq!(report.len(), 3);
    assert!(matches!(
        report[&scrape_url(&urls[0])],
        Err(ScrapeError::Timeout(_))
    ));
    assert!(matches!(
        report[&scrape_url(&urls[1])],
        Err(ScrapeError::HttpStatus(404))
    ));
    let stats = report[&scrape_url(&urls[2])].as_ref().unwrap();
    assert_eq!(stats.complete(), Some(5));
    assert_eq!(stats.incomplete(), Some(3));
    assert_eq!(stats.downloaded(), Some(10));

    assert_eq!(diagnostics.len(), 2);
    assert!(diagnostics
        .errors()
        .all(|e| matches!(e, Error::Scrape { .. })));
}

#[tokio::test]
async fn test_scrape_without_trackers() {
    let mut diagnostics = Diagnostics::new();
    let report = scrape(
        [0; 20],
        &AnnounceList::default(),
        &ScrapeConfig::default(),
        &mut diagnostics,
    )
    .await
    .unwrap();
    assert!(report.is_empty());
    assert!(diagnostics.is_empty());
}
