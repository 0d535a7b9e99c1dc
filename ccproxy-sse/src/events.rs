//! Anthropic SSE event grammar primitives (§4.8): wire framing and the
//! fixed-size chunking helpers shared by the non-streaming emitter and the
//! streaming wire-format transformers in `ccproxy-transformers`.

/// Delta chunk size for text and thinking blocks (§4.8, §9 Open Question:
/// "behaviourally observable but not semantically required").
pub const TEXT_CHUNK_CHARS: usize = 50;
/// Delta chunk size for tool-input JSON deltas.
pub const TOOL_INPUT_CHUNK_CHARS: usize = 100;

/// Frame one Anthropic SSE event as `event: <name>\ndata: <json>\n\n`.
pub fn frame_event(event: &str, data: &serde_json::Value) -> String {
    format!("event: {event}\ndata: {data}\n\n")
}

/// Split `s` into chunks of at most `chars` Unicode scalar values each.
/// Splitting on `char_indices` keeps multi-byte UTF-8 sequences intact.
pub fn chunk_chars(s: &str, chars: usize) -> Vec<&str> {
    if s.is_empty() {
        return vec![];
    }
    let chars = chars.max(1);
    let mut out = Vec::new();
    let mut start = 0;
    let mut count = 0;
    let mut last_idx = 0;
    for (idx, _) in s.char_indices() {
        if count == chars {
            out.push(&s[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
        last_idx = idx;
    }
    let _ = last_idx;
    out.push(&s[start..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_event_matches_grammar() {
        let framed = frame_event("message_stop", &serde_json::json!({"type": "message_stop"}));
        assert_eq!(framed, "event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n");
    }

    #[test]
    fn chunk_chars_splits_evenly() {
        let chunks = chunk_chars("abcdefgh", 3);
        assert_eq!(chunks, vec!["abc", "def", "gh"]);
    }

    #[test]
    fn chunk_chars_handles_multibyte() {
        let s = "a\u{1F600}bcd";
        let chunks = chunk_chars(s, 2);
        assert_eq!(chunks.concat(), s);
    }

    #[test]
    fn chunk_chars_empty_is_empty() {
        assert!(chunk_chars("", 10).is_empty());
    }
}
