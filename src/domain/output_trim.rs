//! Tail-biased display trimming for captured output.
//!
//! When no marker matched anything, callers keep only the last N lines
//! of the capture, additionally bounded by a byte cap, instead of the
//! full log.

/// Returns the trailing slice of `lines` limited to `max_lines` entries
/// and at most `max_bytes` of total content. The newest lines win: when
/// the byte cap bites, lines are dropped from the front of the kept
/// window.
#[must_use]
pub fn trim_tail<S: AsRef<str>>(lines: &[S], max_lines: usize, max_bytes: usize) -> Vec<String> {
    if max_lines == 0 || max_bytes == 0 {
        return Vec::new();
    }

    let start = lines.len().saturating_sub(max_lines);
    let window = &lines[start..];

    let mut kept: Vec<&str> = Vec::with_capacity(window.len());
    let mut budget = max_bytes;
    for line in window.iter().rev() {
        let line = line.as_ref();
        // +1 for the newline the caller will re-insert on display
        let cost = line.len() + 1;
        if cost > budget {
            break;
        }
        budget -= cost;
        kept.push(line);
    }
    kept.reverse();
    kept.into_iter().map(ToString::to_string).collect()
}
