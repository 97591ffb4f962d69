//! Opaque text frames relayed between room members.

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;

/// One serialized text message.
///
/// Cloning is cheap: every recipient queue shares the same allocation.
/// The relay never rewrites the payload; [`Frame::event_name`] only peeks
/// at it for logging.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Frame(Arc<str>);

#[derive(Deserialize)]
struct EventProbe {
    event: String,
}

impl Frame {
    /// Wrap already-serialized text.
    pub fn new(text: impl Into<Arc<str>>) -> Self {
        Self(text.into())
    }

    /// Build a frame from raw client input.
    ///
    /// Embedded newlines become spaces and surrounding whitespace is
    /// trimmed; nothing else is touched.
    pub fn from_client_text(raw: &str) -> Self {
        Self::new(normalize_whitespace(raw))
    }

    /// The payload text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Peek at the envelope's `event` field.
    pub fn event_name(&self) -> Result<String, serde_json::Error> {
        serde_json::from_str::<EventProbe>(&self.0).map(|probe| probe.event)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Frame {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

impl From<&str> for Frame {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

/// Collapse embedded newlines into spaces and trim the ends.
pub fn normalize_whitespace(raw: &str) -> String {
    raw.replace('\n', " ").trim().to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newlines_collapse_to_spaces() {
        let frame = Frame::from_client_text("{\"event\":\n\"chat\"}\n");
        assert_eq!(frame.as_str(), "{\"event\": \"chat\"}");
    }

    #[test]
    fn surrounding_whitespace_trimmed() {
        assert_eq!(normalize_whitespace("  \t{}\r\n "), "{}");
    }

    #[test]
    fn interior_spacing_untouched() {
        assert_eq!(normalize_whitespace("{\"a\":  1}"), "{\"a\":  1}");
    }

    #[test]
    fn event_name_extracted() {
        let frame = Frame::from(r#"{"event":"chat","text":"hi"}"#);
        assert_eq!(frame.event_name().unwrap(), "chat");
    }

    #[test]
    fn event_name_missing_is_error() {
        let frame = Frame::from(r#"{"text":"hi"}"#);
        assert!(frame.event_name().is_err());
    }

    #[test]
    fn event_name_on_garbage_is_error() {
        let frame = Frame::from("not json");
        assert!(frame.event_name().is_err());
        // Payload is still intact.
        assert_eq!(frame.as_str(), "not json");
    }

    #[test]
    fn clones_share_allocation() {
        let a = Frame::from("payload".to_string());
        let b = a.clone();
        assert!(std::ptr::eq(a.as_str(), b.as_str()));
    }

    #[test]
    fn len_and_empty() {
        assert!(Frame::from("").is_empty());
        assert_eq!(Frame::from("abc").len(), 3);
    }
}
