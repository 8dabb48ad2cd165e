//! Tracker scrape client.
//!
//! Every tracker of a torrent is asked for its swarm statistics at the same
//! time. All requests share a single deadline, and each tracker gets its own
//! outcome in the report: one unreachable tracker never hides the answers of
//! the others.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use bytes::Bytes;
use regex::Regex;
use reqwest::Client;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info};
use url::form_urlencoded::byte_serialize;

use super::announce::AnnounceList;
use crate::bencode::{BDict, BValue, Bencode};
use crate::error::{Diagnostics, Error, ScrapeError};

#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    /// Shared by every tracker of one scrape call.
    pub timeout: Duration,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
        }
    }
}

/// Swarm statistics a tracker reported for one torrent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapeStats {
    fields: BDict,
}

impl ScrapeStats {
    /// Number of seeders.
    pub fn complete(&self) -> Option<i64> {
        self.integer("complete")
    }

    /// Number of leechers.
    pub fn incomplete(&self) -> Option<i64> {
        self.integer("incomplete")
    }

    /// Number of completed downloads.
    pub fn downloaded(&self) -> Option<i64> {
        self.integer("downloaded")
    }

    pub fn get(&self, key: &str) -> Option<&BValue> {
        self.fields.get(key.as_bytes())
    }

    pub fn fields(&self) -> &BDict {
        &self.fields
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::from(&BValue::Dict(self.fields.clone()))
    }

    fn integer(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(BValue::as_integer)
    }
}

/// Outcome per normalized scrape URL.
pub type ScrapeReport = BTreeMap<String, Result<ScrapeStats, ScrapeError>>;

fn rewrites() -> &'static [(Regex, &'static str)] {
    static REWRITES: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    REWRITES.get_or_init(|| {
        [
            (r"(?i)^udp://", "http://"),
            (r":80/", "/"),
            (r"(?i)/announce([^/]*)$", "/scrape${1}"),
        ]
        .into_iter()
        .filter_map(|(pattern, replacement)| Some((Regex::new(pattern).ok()?, replacement)))
        .collect()
    })
}

/// Turns an announce URL into the matching scrape URL.
pub fn scrape_url(announce: &str) -> String {
    rewrites()
        .iter()
        .fold(announce.to_string(), |url, (pattern, replacement)| {
            pattern.replace(&url, *replacement).into_owned()
        })
}

/// Scrapes every tracker of `trackers` for `info_hash`.
///
/// Per-tracker failures end up both in the report and in `diagnostics`; only
/// a failure to set up the HTTP client is returned as an error.
pub async fn scrape(
    info_hash: [u8; 20],
    trackers: &AnnounceList,
    config: &ScrapeConfig,
    diagnostics: &mut Diagnostics,
) -> Result<ScrapeReport, ScrapeError> {
    let client = Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ScrapeError::Client(Arc::new(e)))?;

    let urls: BTreeSet<String> = trackers.urls().map(scrape_url).collect();
    info!("scraping {} trackers for {}", urls.len(), hex::encode(info_hash));

    let deadline = Instant::now() + config.timeout;
    let (tx, mut rx) = mpsc::channel(urls.len().max(1));

    for url in urls {
        let client = client.clone();
        let tx = tx.clone();
        let timeout = config.timeout;
        tokio::spawn(async move {
            let outcome = match timeout_at(deadline, fetch(&client, &url, &info_hash)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(ScrapeError::Timeout(timeout)),
            };
            // the collector only goes away once every sender is gone
            let _ = tx.send((url, outcome)).await;
        });
    }
    drop(tx);

    let mut report = ScrapeReport::new();
    while let Some((url, outcome)) = rx.recv().await {
        match &outcome {
            Ok(stats) => debug!("{}: {:?}", url, stats.fields()),
            Err(e) => diagnostics.record(Error::Scrape {
                tracker: url.clone(),
                source: e.clone(),
            }),
        }
        report.insert(url, outcome);
    }
    Ok(report)
}

async fn fetch(client: &Client, url: &str, info_hash: &[u8; 20]) -> Result<ScrapeStats, ScrapeError> {
    let separator = if url.contains('?') { '&' } else { '?' };
    let request = format!(
        "{}{}info_hash={}",
        url,
        separator,
        byte_serialize(info_hash).collect::<String>()
    );
    debug!("GET {}", request);

    let transport = |e: reqwest::Error| ScrapeError::Transport(Arc::new(e));
    let response = client.get(&request).send().await.map_err(transport)?;
    let status = response.status();
    if !status.is_success() {
        return Err(ScrapeError::HttpStatus(status.as_u16()));
    }
    let body: Bytes = response.bytes().await.map_err(transport)?;
    parse_response(&body, info_hash)
}

/// Extracts the statistics for `info_hash` from a scrape response body.
///
/// Trackers that key the entry differently are accepted when they return a
/// single entry. Top-level `flags` are merged into the result.
pub fn parse_response(body: &[u8], info_hash: &[u8; 20]) -> Result<ScrapeStats, ScrapeError> {
    if body.is_empty() {
        return Err(ScrapeError::EmptyResponse);
    }
    let value = Bencode::decode(body)?;
    if let Some(reason) = value.get(b"failure reason").and_then(BValue::as_bytes) {
        return Err(ScrapeError::Rejected(
            String::from_utf8_lossy(reason).into_owned(),
        ));
    }

    let files = value
        .get(b"files")
        .and_then(BValue::as_dict)
        .ok_or(ScrapeError::EmptyResponse)?;
    let entry = match files.get(&info_hash[..]) {
        Some(entry) => entry,
        None if files.len() == 1 => files.values().next().ok_or(ScrapeError::EmptyResponse)?,
        None => return Err(ScrapeError::EmptyResponse),
    };

    let mut fields = entry.as_dict().cloned().ok_or(ScrapeError::EmptyResponse)?;
    if let Some(flags) = value.get(b"flags").and_then(BValue::as_dict) {
        fields.extend(flags.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    Ok(ScrapeStats { fields })
}

/// JSON view of a report: statistics, or `{"error": ...}` per tracker.
pub fn report_to_json(report: &ScrapeReport) -> serde_json::Value {
    let entries = report
        .iter()
        .map(|(url, outcome)| {
            let value = match outcome {
                Ok(stats) => stats.to_json(),
                Err(e) => json!({ "error": e.to_string() }),
            };
            (url.clone(), value)
        })
        .collect::<serde_json::Map<_, _>>();
    serde_json::Value::Object(entries)
}
