//! Minimal MPD parsing limited to the fields the cache needs: the ordered
//! video bitrate ladder (§3). Everything else in the manifest (segment
//! templates, audio adaptation sets, timing) is out of scope (§1) and left
//! to the DASH client.

use quick_xml::events::Event;
use quick_xml::Reader;

/// Parses the video `Representation` bandwidths out of an MPD document,
/// in document order, matching the original parser's walk over
/// `Period > AdaptationSet > Representation` (see
/// `examples/original_source/dist/client/read_mpd.py`).
pub fn parse_bandwidth_list(mpd_bytes: &[u8]) -> Vec<u64> {
    let mut reader = Reader::from_reader(mpd_bytes);
    reader.config_mut().trim_text(true);

    let mut bandwidths = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                if local_name(e.name().as_ref()) != "Representation" {
                    continue;
                }
                let mut is_video = false;
                let mut bandwidth = None;
                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"mimeType" => {
                            if let Ok(v) = attr.unescape_value() {
                                is_video = v.contains("video");
                            }
                        }
                        b"bandwidth" => {
                            if let Ok(v) = attr.unescape_value() {
                                bandwidth = v.parse::<u64>().ok();
                            }
                        }
                        _ => {}
                    }
                }
                // A Representation without an explicit mimeType inherits the
                // AdaptationSet's; the cache only needs the bandwidth, so
                // treat any Representation carrying one as a candidate
                // unless it is explicitly marked non-video.
                if let Some(bandwidth) = bandwidth {
                    if is_video || !explicitly_non_video(e) {
                        bandwidths.push(bandwidth);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    bandwidths
}

fn explicitly_non_video(e: &quick_xml::events::BytesStart) -> bool {
    e.attributes().flatten().any(|attr| {
        attr.key.as_ref() == b"mimeType"
            && attr
                .unescape_value()
                .map(|v| v.contains("audio") || v.contains("text"))
                .unwrap_or(false)
    })
}

fn local_name(qname: &[u8]) -> &str {
    let s = std::str::from_utf8(qname).unwrap_or("");
    s.rsplit(':').next().unwrap_or(s)
}

/// Narrows a full header set down to the ones worth persisting alongside
/// an MPD descriptor. Kept intentionally small: Content-Type and
/// Content-Length are the two headers DASH clients actually key off of
/// when validating a manifest.
pub fn relevant_headers(
    headers: &std::collections::HashMap<String, String>,
) -> std::collections::HashMap<String, String> {
    const KEEP: &[&str] = &["content-type", "content-length", "last-modified", "etag"];
    headers
        .iter()
        .filter(|(name, _)| KEEP.contains(&name.to_lowercase().as_str()))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_MPD: &str = r#"
        <MPD xmlns="urn:mpeg:dash:schema:mpd:2011" mediaPresentationDuration="PT0H1M59.89S">
          <Period>
            <AdaptationSet mimeType="video/mp4">
              <Representation id="0" bandwidth="400000" mimeType="video/mp4">
                <SegmentTemplate media="$RepresentationID$/$RepresentationID$_seg_$Number$.m4s" startNumber="1" timescale="12288" duration="24576" initialization="init.mp4"/>
              </Representation>
              <Representation id="1" bandwidth="800000" mimeType="video/mp4"/>
              <Representation id="2" bandwidth="1500000" mimeType="video/mp4"/>
            </AdaptationSet>
            <AdaptationSet mimeType="audio/mp4">
              <Representation id="a0" bandwidth="128000" mimeType="audio/mp4"/>
            </AdaptationSet>
          </Period>
        </MPD>
    "#;

    #[test]
    fn parses_video_bandwidth_ladder_in_order() {
        let bandwidths = parse_bandwidth_list(SAMPLE_MPD.as_bytes());
        assert_eq!(bandwidths, vec![400_000, 800_000, 1_500_000]);
    }

    #[test]
    fn empty_document_yields_empty_ladder() {
        assert!(parse_bandwidth_list(b"<MPD></MPD>").is_empty());
    }
}
