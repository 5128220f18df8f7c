//! Splitting long text into chunks an external API will accept.
//!
//! Lengths are counted in characters, never bytes, so multi-byte text
//! splits cleanly. Chunks concatenate back to the original text with
//! nothing added or dropped.

use std::future::Future;

/// Splits `text` into chunks of at most `max_chars` characters. Cut points
/// prefer a sentence end (`.`, `!` or `?` followed by whitespace) inside
/// the window, then the last whitespace, then a hard cut at the limit.
/// A zero limit is treated as one.
pub fn split_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_chars {
        return vec![text.to_string()];
    }
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        if chars.len() - start <= max_chars {
            chunks.push(chars[start..].iter().collect());
            break;
        }
        let cut = find_cut(&chars, start, start + max_chars);
        chunks.push(chars[start..cut].iter().collect());
        start = cut;
    }
    chunks
}

/// Best cut position in the window `[start, window_end)`. The returned
/// index is exclusive and always in `(start, window_end]`.
fn find_cut(chars: &[char], start: usize, window_end: usize) -> usize {
    // Sentence end: terminator plus the whitespace after it stay in this
    // chunk.
    for index in (start + 1..window_end).rev() {
        if matches!(chars[index - 1], '.' | '!' | '?') && chars[index].is_whitespace() {
            return index + 1;
        }
    }
    for index in (start..window_end).rev() {
        if chars[index].is_whitespace() {
            return index + 1;
        }
    }
    window_end
}

/// Runs `processor` over `text` in chunks and combines the outputs. Text
/// within the limit is processed in one call and the combiner is skipped;
/// the first processor error aborts the run.
pub async fn process_in_batches<T, E, P, Fut, C>(
    text: &str,
    max_chars: usize,
    mut processor: P,
    combiner: C,
) -> Result<T, E>
where
    P: FnMut(String) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: FnOnce(Vec<T>) -> T,
{
    let max_chars = max_chars.max(1);
    if text.chars().count() <= max_chars {
        return processor(text.to_string()).await;
    }
    let chunks = split_text(text, max_chars);
    let mut outputs = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        outputs.push(processor(chunk).await?);
    }
    Ok(combiner(outputs))
}

/// Default combiner: concatenation, the inverse of [`split_text`].
pub fn concat_combiner(parts: Vec<String>) -> String {
    parts.concat()
}
