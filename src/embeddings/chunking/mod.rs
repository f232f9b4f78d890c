#[cfg(test)]
mod tests;

use tracing::debug;

/// Configuration for text chunking
#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    /// Maximum chunk size in characters
    pub chunk_size: usize,
    /// Overlap in characters between adjacent chunks
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 1500,
            overlap: 200,
        }
    }
}

/// Split text into chunks of at most `chunk_size` characters with `overlap`
/// characters carried over from the end of each chunk into the next, so facts
/// near a boundary are retrievable from either side.
///
/// Each cut lands on the best natural boundary inside the window: paragraph
/// break first, then line break, then sentence end, then word boundary, with
/// a hard character cut only when the window contains none of these.
/// Character-indexed, so a cut never lands inside a UTF-8 character.
/// Whitespace-only chunks are dropped; empty input yields no chunks.
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = trimmed.chars().collect();
    let overlap = config.overlap.min(config.chunk_size.saturating_sub(1));
    let mut chunks = Vec::new();

    let mut start = 0;
    while start < chars.len() {
        let window_end = (start + config.chunk_size).min(chars.len());
        let end = if window_end == chars.len() {
            window_end
        } else {
            split_point(&chars[start..window_end], overlap)
                .map_or(window_end, |offset| start + offset)
        };

        let chunk: String = chars[start..end].iter().collect();
        let chunk = chunk.trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }

        if end == chars.len() {
            break;
        }
        // Guaranteed forward progress: every cut leaves end - start > overlap.
        start = end - overlap;
    }

    debug!(
        "Chunked {} chars into {} chunks (size {}, overlap {})",
        chars.len(),
        chunks.len(),
        config.chunk_size,
        config.overlap
    );

    chunks
}

/// Best cut offset inside a full window, by boundary class: paragraph break,
/// line break, sentence end, word boundary. Offsets at or below `min_offset`
/// are skipped so the chunk always outruns the overlap carried into the next
/// window. `None` means the window has no usable boundary and the caller
/// falls back to a hard cut at the window edge.
fn split_point(window: &[char], min_offset: usize) -> Option<usize> {
    let paragraph = window
        .windows(2)
        .rposition(|pair| pair[0] == '\n' && pair[1] == '\n')
        .map(|i| i + 2);
    let line = window.iter().rposition(|&c| c == '\n').map(|i| i + 1);
    let sentence = window
        .windows(2)
        .rposition(|pair| matches!(pair[0], '.' | '!' | '?') && pair[1].is_whitespace())
        .map(|i| i + 2);
    let word = window
        .iter()
        .rposition(|c| c.is_whitespace())
        .map(|i| i + 1);

    [paragraph, line, sentence, word]
        .into_iter()
        .flatten()
        .find(|&offset| offset > min_offset)
}
