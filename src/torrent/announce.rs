//! Tracker tiers.
//!
//! An announce list is a sequence of tiers; every tier is a group of tracker
//! URLs that are equally preferred, tried before falling back to the next tier.

use crate::bencode::BValue;

pub type Tier = Vec<String>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnounceList(Vec<Tier>);

impl AnnounceList {
    /// Builds a list, dropping empty tiers.
    pub fn new(tiers: Vec<Tier>) -> Self {
        Self(tiers.into_iter().filter(|t| !t.is_empty()).collect())
    }

    pub fn tiers(&self) -> &[Tier] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push_tier(&mut self, tier: Tier) {
        if !tier.is_empty() {
            self.0.push(tier);
        }
    }

    /// Every URL, tier by tier, in order.
    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.0.iter().flatten().map(String::as_str)
    }

    pub fn first(&self) -> Option<&str> {
        self.urls().next()
    }

    /// Reads `announce-list`, accepting lone strings where tiers are expected.
    pub fn from_bvalue(value: &BValue) -> Option<Self> {
        let tiers = value
            .as_list()?
            .iter()
            .map(|tier| match tier {
                BValue::List(urls) => urls
                    .iter()
                    .filter_map(|u| u.as_bytes())
                    .map(|u| String::from_utf8_lossy(u).into_owned())
                    .collect(),
                BValue::String(url) => vec![String::from_utf8_lossy(url).into_owned()],
                _ => Vec::new(),
            })
            .collect();
        Some(Self::new(tiers))
    }

    pub fn to_bvalue(&self) -> BValue {
        BValue::List(
            self.0
                .iter()
                .map(|tier| BValue::List(tier.iter().map(|u| BValue::from(u.as_str())).collect()))
                .collect(),
        )
    }
}

impl From<&str> for AnnounceList {
    fn from(url: &str) -> Self {
        Self::new(vec![vec![url.to_string()]])
    }
}

/// Every URL becomes its own tier.
impl From<Vec<String>> for AnnounceList {
    fn from(urls: Vec<String>) -> Self {
        Self::new(urls.into_iter().map(|u| vec![u]).collect())
    }
}

impl From<Vec<Tier>> for AnnounceList {
    fn from(tiers: Vec<Tier>) -> Self {
        Self::new(tiers)
    }
}

/// One top-level entry of a tracker assignment: a lone URL or a whole tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TierEntry {
    Url(String),
    Tier(Tier),
}

impl TierEntry {
    fn first(&self) -> Option<&str> {
        match self {
            TierEntry::Url(url) => Some(url),
            TierEntry::Tier(tier) => tier.first().map(String::as_str),
        }
    }

    fn into_tier(self) -> Tier {
        match self {
            TierEntry::Url(url) => vec![url],
            TierEntry::Tier(tier) => tier,
        }
    }
}

impl From<&str> for TierEntry {
    fn from(url: &str) -> Self {
        TierEntry::Url(url.to_string())
    }
}

impl From<Vec<&str>> for TierEntry {
    fn from(tier: Vec<&str>) -> Self {
        TierEntry::Tier(tier.into_iter().map(String::from).collect())
    }
}

/// Argument of [`Metainfo::set_announce`](super::Metainfo::set_announce).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Announce {
    /// Remove `announce` and `announce-list`.
    Clear,
    /// Add one tracker: the primary one if none is set, otherwise a new tier.
    /// An empty URL clears every tracker when none is set yet.
    Url(String),
    /// Replace every tracker.
    Tiers(Vec<TierEntry>),
}

impl Announce {
    /// Resolves a replacement into the primary URL and, when there is more
    /// than one entry, the tier list.
    pub(crate) fn resolve(entries: Vec<TierEntry>) -> (Option<String>, Option<AnnounceList>) {
        let announce = entries.first().and_then(TierEntry::first).map(String::from);
        let list = if entries.len() > 1 {
            Some(AnnounceList::new(
                entries.into_iter().map(TierEntry::into_tier).collect(),
            ))
        } else {
            None
        };
        (announce, list)
    }
}

impl From<&str> for Announce {
    fn from(url: &str) -> Self {
        Announce::Url(url.to_string())
    }
}

impl From<String> for Announce {
    fn from(url: String) -> Self {
        Announce::Url(url)
    }
}

impl From<Vec<TierEntry>> for Announce {
    fn from(entries: Vec<TierEntry>) -> Self {
        Announce::Tiers(entries)
    }
}

impl From<Vec<&str>> for Announce {
    fn from(urls: Vec<&str>) -> Self {
        Announce::Tiers(urls.into_iter().map(TierEntry::from).collect())
    }
}

impl From<Option<&str>> for Announce {
    fn from(url: Option<&str>) -> Self {
        url.map_or(Announce::Clear, Announce::from)
    }
}
