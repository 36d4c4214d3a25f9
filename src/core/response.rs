//! Reply splitting for transports with a per-message size cap
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0

/// Discord message content limit
pub const MESSAGE_LIMIT: usize = 2000;

/// Split a reply into pieces no longer than `limit` bytes.
///
/// Whole lines are kept together where possible, so a reminder list never
/// breaks an entry across two messages unless the entry alone exceeds the cap.
pub fn split_reply(reply: &str, limit: usize) -> Vec<String> {
    if reply.len() <= limit {
        return vec![reply.to_string()];
    }

    let mut parts = Vec::new();
    let mut buf = String::new();

    for line in reply.lines() {
        let needed = if buf.is_empty() { line.len() } else { line.len() + 1 };
        if buf.len() + needed > limit && !buf.is_empty() {
            parts.push(std::mem::take(&mut buf));
        }

        if line.len() > limit {
            let mut pieces = split_on_char_boundary(line, limit);
            // Keep the tail open so following short lines can join it
            if let Some(tail) = pieces.pop() {
                parts.extend(pieces);
                buf = tail;
            }
            continue;
        }

        if !buf.is_empty() {
            buf.push('\n');
        }
        buf.push_str(line);
    }

    if !buf.is_empty() {
        parts.push(buf);
    }
    parts
}

fn split_on_char_boundary(line: &str, limit: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut piece = String::new();
    for ch in line.chars() {
        if piece.len() + ch.len_utf8() > limit && !piece.is_empty() {
            pieces.push(std::mem::take(&mut piece));
        }
        piece.push(ch);
    }
    if !piece.is_empty() {
        pieces.push(piece);
    }
    pieces
}
