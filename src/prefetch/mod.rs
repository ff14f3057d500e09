//! Prefetch planner (C3): decides which segment to speculatively fetch
//! next after a client is served a segment (§4).

pub mod forecast;

use crate::configs::PrefetchScheme;
use crate::mpd::MpdDescriptor;
use crate::segment::SegmentPath;

/// Plans the next segment to prefetch after `served` was handed to a
/// client, given the active scheme and (for SMART) a throughput forecast.
///
/// SIMPLE always continues at the same bitrate, next index (§4.2).
/// SMART picks the highest ladder rung not exceeding the forecast,
/// falling back to the lowest rung if no forecast is available yet or
/// the ladder is unknown (§4.3).
pub fn plan_next(
    served: &SegmentPath,
    scheme: PrefetchScheme,
    forecast: Option<f64>,
    ladder: Option<&MpdDescriptor>,
) -> SegmentPath {
    let next_index = served.index + 1;
    match scheme {
        PrefetchScheme::Simple => served.with(served.bitrate, next_index),
        PrefetchScheme::Smart => {
            let bitrate = ladder
                .and_then(|d| d.rung_for_forecast(forecast))
                .unwrap_or(served.bitrate);
            served.with(bitrate, next_index)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn ladder() -> MpdDescriptor {
        MpdDescriptor {
            bandwidth_list: vec![400_000, 800_000, 1_500_000],
            http_headers: HashMap::new(),
        }
    }

    #[test]
    fn simple_scheme_keeps_bitrate_and_advances_index() {
        let served = SegmentPath {
            title: "bbb".to_string(),
            bitrate: 800_000,
            index: 5,
        };
        let next = plan_next(&served, PrefetchScheme::Simple, None, Some(&ladder()));
        assert_eq!(next.bitrate, 800_000);
        assert_eq!(next.index, 6);
    }

    #[test]
    fn smart_scheme_selects_rung_from_forecast() {
        let served = SegmentPath {
            title: "bbb".to_string(),
            bitrate: 400_000,
            index: 2,
        };
        let next = plan_next(&served, PrefetchScheme::Smart, Some(1_000_000.0), Some(&ladder()));
        assert_eq!(next.bitrate, 800_000);
        assert_eq!(next.index, 3);
    }

    #[test]
    fn smart_scheme_without_ladder_falls_back_to_served_bitrate() {
        let served = SegmentPath {
            title: "bbb".to_string(),
            bitrate: 400_000,
            index: 2,
        };
        let next = plan_next(&served, PrefetchScheme::Smart, Some(1_000_000.0), None);
        assert_eq!(next.bitrate, 400_000);
        assert_eq!(next.index, 3);
    }
}
