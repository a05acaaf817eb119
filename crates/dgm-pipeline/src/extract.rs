//! Fenced diagram block extraction.
//!
//! [`UnitExtractor`] owns the only block-scanning routine in the crate. The
//! rewriter reuses it through [`UnitExtractor::scan_blocks`], so both always
//! agree on block boundaries and order.

use std::ops::Range;

use regex::Regex;

use crate::consts::DEFAULT_LANGUAGE;
use crate::unit::{ExtractionUnit, IdStrategy};

/// A fenced block located in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BlockSpan<'a> {
    /// Byte range of the whole block, markers included.
    pub range: Range<usize>,
    /// Text strictly between the opening and closing markers.
    pub source: &'a str,
}

/// Scans documents for fenced diagram blocks.
///
/// A block opens with three backticks and the language tag, optionally
/// followed by whitespace and attributes up to the line break, and ends at the
/// first following three backticks. Blocks do not nest.
///
/// # Example
///
/// ```
/// use dgm_pipeline::UnitExtractor;
///
/// let doc = "Intro\n```mermaid\ngraph A-->B\n```\nOutro\n";
/// let units = UnitExtractor::new("mermaid").extract(doc);
///
/// assert_eq!(units.len(), 1);
/// assert_eq!(units[0].id(), "diagram_1");
/// assert_eq!(units[0].source(), "graph A-->B\n");
/// ```
#[derive(Debug, Clone)]
pub struct UnitExtractor {
    pattern: Regex,
    ids: IdStrategy,
}

impl Default for UnitExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_LANGUAGE)
    }
}

impl UnitExtractor {
    /// Create an extractor for blocks tagged with `language`.
    #[must_use]
    pub fn new(language: &str) -> Self {
        let pattern = format!(
            r"(?s)```{}(?:[ \t][^\r\n]*)?\r?\n(.*?)```",
            regex::escape(language)
        );
        Self {
            pattern: Regex::new(&pattern).expect("escaped fence pattern is valid"),
            ids: IdStrategy::default(),
        }
    }

    /// Set how unit ids are derived.
    #[must_use]
    pub fn id_strategy(mut self, ids: IdStrategy) -> Self {
        self.ids = ids;
        self
    }

    /// Extract all diagram blocks in document order.
    ///
    /// Ordinals start at 1 and are contiguous. A document without blocks
    /// yields an empty vector.
    #[must_use]
    pub fn extract(&self, document: &str) -> Vec<ExtractionUnit> {
        self.units_from(&self.scan_blocks(document))
    }

    /// Units for already located blocks, numbered in the given order.
    pub(crate) fn units_from(&self, blocks: &[BlockSpan<'_>]) -> Vec<ExtractionUnit> {
        blocks
            .iter()
            .enumerate()
            .map(|(i, block)| ExtractionUnit::derived(i + 1, block.source.to_owned(), self.ids))
            .collect()
    }

    /// Locate all blocks with their byte ranges.
    pub(crate) fn scan_blocks<'a>(&self, document: &'a str) -> Vec<BlockSpan<'a>> {
        self.pattern
            .captures_iter(document)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let source = caps.get(1)?;
                Some(BlockSpan {
                    range: whole.range(),
                    source: source.as_str(),
                })
            })
            .collect()
    }
}
