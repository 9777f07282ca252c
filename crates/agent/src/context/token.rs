//! Content-cost estimation.
//!
//! Uses a character-based heuristic: ~4 characters per unit, plus one.
//! Budget filtering depends on this exact formula, so it must not be
//! swapped for a real tokenizer without revisiting every budget.

/// Estimate the cost of a text: `floor(chars / 4) + 1`.
///
/// Counts Unicode scalar values, not bytes, so accented text costs the
/// same as its unaccented spelling.
pub fn estimate_tokens(text: &str) -> u32 {
    (text.chars().count() / 4) as u32 + 1
}
