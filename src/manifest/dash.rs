//! DASH MPD parsing.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use super::ManifestError;

/// Returns the `media` attribute of every `SegmentTemplate` and `SegmentURL`
/// element, in document order.
pub(crate) fn segment_references(url: &str, xml: &str) -> Result<Vec<String>, ManifestError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut references = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e) | Event::Empty(e)) => {
                if let Some(media) = media_attribute(&e) {
                    references.push(media);
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(ManifestError::parse(
                    url,
                    format!("at byte {}: {e}", reader.buffer_position()),
                ));
            }
        }
        buf.clear();
    }

    Ok(references)
}

fn media_attribute(element: &BytesStart<'_>) -> Option<String> {
    let name = element.local_name();
    if !matches!(name.as_ref(), b"SegmentTemplate" | b"SegmentURL") {
        return None;
    }
    element
        .attributes()
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == b"media")
        .and_then(|attr| attr.unescape_value().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
