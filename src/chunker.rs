// ABOUTME: Splits long outbound messages to fit the transport's length limit.
// ABOUTME: Prefers paragraph breaks, then line breaks, then a hard cut.

/// Hard per-message length limit of the transport, in characters
pub const MAX_MESSAGE_LEN: usize = 2000;

/// Split `text` into chunks of at most `max_len` characters.
///
/// Break preference within each window: the last blank line, then the
/// last newline, then a hard cut at the limit. Break points at the very
/// start of a window are ignored, so a chunk is never empty and the
/// split always makes progress. Leading newlines left behind by a break
/// are stripped from the remainder; the text is otherwise unmodified, so
/// concatenating the chunks reconstructs it.
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    assert!(max_len > 0, "max_len must be positive");
    if text.chars().count() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut rest = text;
    loop {
        if rest.chars().count() <= max_len {
            chunks.push(rest.to_string());
            return chunks;
        }

        let window_end = floor_char_boundary(rest, max_len);
        let window = &rest[..window_end];
        let cut = match window.rfind("\n\n") {
            Some(i) if i > 0 => i,
            _ => match window.rfind('\n') {
                Some(i) if i > 0 => i,
                _ => window_end,
            },
        };

        chunks.push(rest[..cut].to_string());
        rest = rest[cut..].trim_start_matches('\n');
    }
}

/// Byte index of the boundary after at most `max_chars` characters
fn floor_char_boundary(s: &str, max_chars: usize) -> usize {
    s.char_indices()
        .nth(max_chars)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}
