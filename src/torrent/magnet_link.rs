use std::fmt;

use url::form_urlencoded::byte_serialize;

use super::metainfo::Metainfo;
use crate::error::MetainfoError;

/// The fields of a `magnet:` URI that point at a torrent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagnetLink {
    pub info_hash: [u8; 20],
    pub name: Option<String>,
    pub size: Option<u64>,
    pub trackers: Vec<String>,
}

impl MagnetLink {
    pub fn from_metainfo(metainfo: &Metainfo) -> Self {
        Self {
            info_hash: metainfo.info_hash(),
            name: Some(metainfo.name().into_owned()),
            size: Some(metainfo.size()),
            trackers: metainfo.trackers().urls().map(String::from).collect(),
        }
    }

    pub fn parse(magnet_link: &str) -> Result<Self, MetainfoError> {
        let url = url::Url::parse(magnet_link).map_err(|_| MetainfoError::InvalidField("magnet"))?;
        if url.scheme() != "magnet" {
            return Err(MetainfoError::InvalidField("magnet"));
        }

        let mut info_hash = None;
        let mut name = None;
        let mut size = None;
        let mut trackers = Vec::new();

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "xt" => {
                    if let Some(hash) = value.strip_prefix("urn:btih:") {
                        let hash_bytes =
                            hex::decode(hash).map_err(|_| MetainfoError::InvalidField("xt"))?;
                        let arr: [u8; 20] = hash_bytes
                            .try_into()
                            .map_err(|_| MetainfoError::InvalidField("xt"))?;
                        info_hash = Some(arr);
                    }
                }
                "dn" => name = Some(value.into_owned()),
                "xl" => size = value.parse().ok(),
                "tr" => trackers.push(value.into_owned()),
                _ => {}
            }
        }

        Ok(Self {
            info_hash: info_hash.ok_or(MetainfoError::MissingField("xt"))?,
            name,
            size,
            trackers,
        })
    }

    /// Renders the URI; `html` escapes the separators as `&amp;`.
    pub fn render(&self, html: bool) -> String {
        let separator = if html { "&amp;" } else { "&" };
        let mut link = format!("magnet:?xt=urn:btih:{}", hex::encode(self.info_hash));
        if let Some(name) = &self.name {
            link.push_str(separator);
            link.push_str("dn=");
            link.extend(byte_serialize(name.as_bytes()));
        }
        if let Some(size) = self.size {
            link.push_str(&format!("{}xl={}", separator, size));
        }
        for tracker in &self.trackers {
            link.push_str(separator);
            link.push_str("tr=");
            link.extend(byte_serialize(tracker.as_bytes()));
        }
        link
    }
}

impl fmt::Display for MagnetLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link() -> MagnetLink {
        MagnetLink {
            info_hash: [0xab; 20],
            name: Some("My Album".into()),
            size: Some(1234),
            trackers: vec!["http://t.example/announce?k=1".into(), "udp://u:80".into()],
        }
    }

    #[test]
    fn test_render() {
        let hash = "ab".repeat(20);
        assert_eq!(
            link().to_string(),
            format!(
                "magnet:?xt=urn:btih:{}&dn=My+Album&xl=1234\
                 &tr=http%3A%2F%2Ft.example%2Fannounce%3Fk%3D1&tr=udp%3A%2F%2Fu%3A80",
                hash
            )
        );
        assert!(link().render(true).contains("&amp;xl=1234&amp;tr="));
    }

    #[test]
    fn test_parse_rendered() {
        assert_eq!(MagnetLink::parse(&link().to_string()).unwrap(), link());
    }

    #[test]
    fn test_parse_requires_info_hash() {
        assert_eq!(
            MagnetLink::parse("magnet:?dn=x"),
            Err(MetainfoError::MissingField("xt"))
        );
        assert_eq!(
            MagnetLink::parse("http://example.com/?xt=urn:btih:00"),
            Err(MetainfoError::InvalidField("magnet"))
        );
    }
}
