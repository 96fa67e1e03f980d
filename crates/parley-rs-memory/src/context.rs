//! Formatting retrieved matches into a prompt context block.

use parley_rs_protocol::MemoryMatch;

const CONTEXT_HEADER: &str = "Use the following context to answer:";

/// Render matches as a context block, best score first.
///
/// Matches are added whole until the next one would push the block past
/// `max_chars`; an empty input yields an empty string.
pub fn fill_context(matches: &[MemoryMatch], max_chars: usize) -> String {
    let mut ranked: Vec<&MemoryMatch> = matches.iter().collect();
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut block = String::from(CONTEXT_HEADER);
    let mut added = 0usize;
    for item in ranked {
        let content = item.content.trim();
        if content.is_empty() {
            continue;
        }
        let line = format!("\n- {content}");
        if block.chars().count() + line.chars().count() > max_chars {
            break;
        }
        block.push_str(&line);
        added += 1;
    }

    if added == 0 { String::new() } else { block }
}
