//! Line-packing chunker.

use std::iter::{Enumerate, Peekable};
use std::str::Lines;

use ragloop_core::{Chunk, ChunkError, Chunker};
use tracing::debug;

/// Approximate chars per token.
const CHARS_PER_TOKEN: usize = 4;

/// How a line is measured against the chunk limit.
///
/// A chunk measures the sum of its lines, and every non-blank line counts
/// for at least one unit, so a chunk never holds more lines than the limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TokenEstimate {
    /// Characters divided by four, rounded down
    #[default]
    CharsPerToken,
    /// Whitespace-delimited words
    Words,
}

impl TokenEstimate {
    /// Units `line` counts for; zero only for a blank line.
    #[must_use]
    pub fn units(self, line: &str) -> usize {
        let units = match self {
            Self::CharsPerToken => line.chars().count() / CHARS_PER_TOKEN,
            Self::Words => line.split_whitespace().count(),
        };
        if line.trim().is_empty() {
            0
        } else {
            units.max(1)
        }
    }
}

/// Packs consecutive non-blank lines into chunks.
///
/// Lines are trimmed and joined with a single space. A line that alone
/// exceeds the limit forms its own chunk. Each chunk records the source
/// line range it covers, so the original lines can always be recovered.
#[derive(Debug, Clone, Default)]
pub struct LineChunker {
    estimate: TokenEstimate,
}

impl LineChunker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_estimate(estimate: TokenEstimate) -> Self {
        Self { estimate }
    }

    /// Lazily chunk `text`. The returned iterator can be cloned to restart.
    pub fn chunks<'a>(
        &self,
        text: &'a str,
        max_units: usize,
    ) -> Result<LineChunks<'a>, ChunkError> {
        if max_units == 0 {
            return Err(ChunkError::InvalidConfig(
                "max units per chunk must be at least 1".to_string(),
            ));
        }
        Ok(LineChunks {
            lines: text.lines().enumerate().peekable(),
            max_units,
            estimate: self.estimate,
            next_index: 0,
        })
    }
}

impl Chunker for LineChunker {
    fn name(&self) -> &str {
        match self.estimate {
            TokenEstimate::CharsPerToken => "lines",
            TokenEstimate::Words => "lines_words",
        }
    }

    fn split(&self, text: &str, max_units: usize) -> Result<Vec<Chunk>, ChunkError> {
        let chunks: Vec<Chunk> = self.chunks(text, max_units)?.collect();
        debug!(
            "Split {} lines into {} chunks (max {} units)",
            text.lines().count(),
            chunks.len(),
            max_units
        );
        Ok(chunks)
    }
}

/// Iterator over the chunks of one document.
#[derive(Debug, Clone)]
pub struct LineChunks<'a> {
    lines: Peekable<Enumerate<Lines<'a>>>,
    max_units: usize,
    estimate: TokenEstimate,
    next_index: usize,
}

impl LineChunks<'_> {
    fn skip_blank(&mut self) {
        while self
            .lines
            .next_if(|(_, line)| line.trim().is_empty())
            .is_some()
        {}
    }
}

impl Iterator for LineChunks<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        self.skip_blank();
        let (start, first) = self.lines.next()?;

        let first = first.trim();
        let mut units = self.estimate.units(first);
        let mut text = first.to_string();
        let mut end = start + 1;

        loop {
            self.skip_blank();
            let Some((line_no, line)) = self.lines.peek().copied() else {
                break;
            };
            let line = line.trim();
            let line_units = self.estimate.units(line);
            if units + line_units > self.max_units {
                break;
            }
            self.lines.next();
            units += line_units;
            text.push(' ');
            text.push_str(line);
            end = line_no + 1;
        }

        let index = self.next_index;
        self.next_index += 1;
        Some(Chunk {
            index,
            text,
            line_range: start..end,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(chunks: &[Chunk]) -> Vec<&str> {
        chunks.iter().map(|c| c.text.as_str()).collect()
    }

    #[test]
    fn test_packs_lines_up_to_limit() {
        let chunker = LineChunker::new();
        let chunks = chunker.split("Line A.\nLine B.\nLine C.", 2).unwrap();

        assert_eq!(texts(&chunks), vec!["Line A. Line B.", "Line C."]);
        assert_eq!(chunks[0].line_range, 0..2);
        assert_eq!(chunks[1].line_range, 2..3);
        assert_eq!(chunks[1].record_id(), "1");
    }

    #[test]
    fn test_overlong_line_is_its_own_chunk() {
        let chunker = LineChunker::new();
        let text = "short.\na very long line that goes past the limit\ntail.";
        let chunks = chunker.split(text, 2).unwrap();

        assert_eq!(
            texts(&chunks),
            vec!["short.", "a very long line that goes past the limit", "tail."]
        );
    }

    #[test]
    fn test_no_chunk_exceeds_limit_unless_single_line() {
        let chunker = LineChunker::new();
        let text = "alpha beta gamma\ndelta\nepsilon zeta eta theta iota kappa\nlambda mu\nnu";
        for max in 1..8 {
            for chunk in chunker.split(text, max).unwrap() {
                assert!(!chunk.text.is_empty());
                let lines = chunk.line_range.len();
                if lines > 1 {
                    let units: usize = text
                        .lines()
                        .skip(chunk.line_range.start)
                        .take(lines)
                        .map(|l| TokenEstimate::CharsPerToken.units(l.trim()))
                        .sum();
                    assert!(units <= max);
                }
            }
        }
    }

    #[test]
    fn test_short_lines_do_not_pile_up() {
        let chunker = LineChunker::new();
        let text = "abc\n".repeat(8);

        let chunks = chunker.split(&text, 1).unwrap();
        assert_eq!(chunks.len(), 8);
        assert!(chunks.iter().all(|c| c.text == "abc" && c.line_range.len() == 1));

        for max in 2..6 {
            for chunk in chunker.split(&text, max).unwrap() {
                assert!(chunk.line_range.len() <= max);
            }
        }
    }

    #[test]
    fn test_units_of_short_and_blank_lines() {
        assert_eq!(TokenEstimate::CharsPerToken.units("abc"), 1);
        assert_eq!(TokenEstimate::CharsPerToken.units("Line A."), 1);
        assert_eq!(TokenEstimate::CharsPerToken.units("   "), 0);
        assert_eq!(TokenEstimate::Words.units(""), 0);
    }

    #[test]
    fn test_line_ranges_reconstruct_source() {
        let chunker = LineChunker::new();
        let text =
            "The Tale of Don Ni.\nDon Ni lived on a station.\nNatali visited often.\nThe end.";
        let source: Vec<&str> = text.lines().collect();

        let chunks = chunker.split(text, 6).unwrap();
        assert!(chunks.len() > 1);

        let rebuilt: Vec<String> = chunks
            .iter()
            .map(|c| source[c.line_range.clone()].join("\n"))
            .collect();
        assert_eq!(rebuilt.join("\n"), text);

        let words: Vec<&str> = chunks.iter().flat_map(|c| c.text.split_whitespace()).collect();
        assert_eq!(words, text.split_whitespace().collect::<Vec<_>>());
    }

    #[test]
    fn test_blank_lines_never_produce_chunks() {
        let chunker = LineChunker::new();
        assert!(chunker.split("", 4).unwrap().is_empty());
        assert!(chunker.split("\n  \n\t\n", 4).unwrap().is_empty());

        let chunks = chunker.split("\n\nLine A.\n\n\nLine B.\n", 2).unwrap();
        assert_eq!(texts(&chunks), vec!["Line A. Line B."]);
        assert_eq!(chunks[0].line_range, 2..6);
    }

    #[test]
    fn test_crlf_lines() {
        let chunker = LineChunker::new();
        let chunks = chunker.split("Line A.\r\nLine B.\r\nLine C.\r\n", 2).unwrap();
        assert_eq!(texts(&chunks), vec!["Line A. Line B.", "Line C."]);
    }

    #[test]
    fn test_zero_limit_is_rejected() {
        let chunker = LineChunker::new();
        let err = chunker.split("Line A.", 0).unwrap_err();
        assert!(matches!(err, ChunkError::InvalidConfig(_)));
    }

    #[test]
    fn test_chunks_iterator_is_restartable() {
        let chunker = LineChunker::new();
        let chunks = chunker.chunks("one two\nthree four\nfive", 1).unwrap();
        let replay = chunks.clone();

        let first: Vec<Chunk> = chunks.collect();
        let second: Vec<Chunk> = replay.collect();
        assert_eq!(first, second);
        assert_eq!(
            first.iter().map(|c| c.index).collect::<Vec<_>>(),
            (0..first.len()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_word_estimate() {
        let chunker = LineChunker::with_estimate(TokenEstimate::Words);
        let chunks = chunker.split("Line A.\nLine B.\nLine C.", 4).unwrap();
        assert_eq!(texts(&chunks), vec!["Line A. Line B.", "Line C."]);
        assert_eq!(chunker.name(), "lines_words");
    }
}
