//! Segment path grammar: `<title>/<bitrate>/<title>_seg_<index>.m4s`.

use regex::Regex;
use std::sync::OnceLock;

/// Reason tag on a cache access, controlling an entry's eviction rank (§3).
/// `Fetch` (client-driven) always outranks `Prefetch` (speculative).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchReason {
    Fetch,
    Prefetch,
}

/// A parsed segment identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentPath {
    pub title: String,
    pub bitrate: u64,
    pub index: u64,
}

fn segment_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([^/]+)/(\d+)/\1_seg_(\d+)\.m4s$").expect("segment regex is valid")
    })
}

impl SegmentPath {
    /// Parses a cache key of the form `<title>/<bitrate>/<title>_seg_<index>.m4s`.
    /// Returns `None` for paths that don't match the grammar (the dispatcher
    /// treats those as unknown/404, never as a malformed segment).
    pub fn parse(path: &str) -> Option<Self> {
        let caps = segment_regex().captures(path)?;
        let title = caps.get(1)?.as_str().to_string();
        let bitrate: u64 = caps.get(2)?.as_str().parse().ok()?;
        let index: u64 = caps.get(3)?.as_str().parse().ok()?;
        Some(Self {
            title,
            bitrate,
            index,
        })
    }

    /// Reconstructs the cache-key string for this segment.
    pub fn to_path(&self) -> String {
        format!(
            "{title}/{bitrate}/{title}_seg_{index}.m4s",
            title = self.title,
            bitrate = self.bitrate,
            index = self.index
        )
    }

    /// Returns a copy of this segment at `bitrate` and `index`.
    pub fn with(&self, bitrate: u64, index: u64) -> Self {
        Self {
            title: self.title.clone(),
            bitrate,
            index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_segment() {
        let parsed = SegmentPath::parse("bbb/800000/bbb_seg_5.m4s").unwrap();
        assert_eq!(parsed.title, "bbb");
        assert_eq!(parsed.bitrate, 800_000);
        assert_eq!(parsed.index, 5);
    }

    #[test]
    fn round_trips_to_path() {
        let parsed = SegmentPath::parse("bbb/800000/bbb_seg_5.m4s").unwrap();
        assert_eq!(parsed.to_path(), "bbb/800000/bbb_seg_5.m4s");
    }

    #[test]
    fn rejects_mismatched_title_prefix() {
        assert!(SegmentPath::parse("bbb/800000/other_seg_5.m4s").is_none());
    }

    #[test]
    fn rejects_non_segment_paths() {
        assert!(SegmentPath::parse("bbb.mpd").is_none());
        assert!(SegmentPath::parse("bbb/800000/bbb_init.m4s").is_none());
    }

    #[test]
    fn with_produces_next_index() {
        let parsed = SegmentPath::parse("bbb/800000/bbb_seg_5.m4s").unwrap();
        let next = parsed.with(parsed.bitrate, parsed.index + 1);
        assert_eq!(next.to_path(), "bbb/800000/bbb_seg_6.m4s");
    }
}
