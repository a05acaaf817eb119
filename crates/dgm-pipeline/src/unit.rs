//! Extraction units and their identity.
//!
//! Provides [`ExtractionUnit`] and the content hash used for content-addressed ids.

use sha2::{Digest, Sha256};

/// Number of hex characters of the content hash kept in content-addressed ids.
const HASH_PREFIX_LEN: usize = 12;

/// How unit identifiers are derived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IdStrategy {
    /// `diagram_<ordinal>`.
    #[default]
    Ordinal,
    /// `diagram_<ordinal>_<hash>`, where the hash prefix is taken from the source.
    ///
    /// Lets downstream caches notice edited diagrams that kept their position.
    Content,
}

/// One diagram block extracted from a document.
///
/// Units are created only by the extractor (or the source directory loader)
/// and are read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionUnit {
    id: String,
    ordinal: usize,
    source: String,
}

impl ExtractionUnit {
    /// Create a unit whose id is derived from its ordinal (and optionally its source).
    pub(crate) fn derived(ordinal: usize, source: String, strategy: IdStrategy) -> Self {
        let id = match strategy {
            IdStrategy::Ordinal => format!("diagram_{ordinal}"),
            IdStrategy::Content => {
                let hash = content_hash(&source);
                format!("diagram_{ordinal}_{}", &hash[..HASH_PREFIX_LEN])
            }
        };
        Self {
            id,
            ordinal,
            source,
        }
    }

    /// Create a unit with an explicit id (used for standalone source files).
    pub(crate) fn named(id: String, ordinal: usize, source: String) -> Self {
        Self {
            id,
            ordinal,
            source,
        }
    }

    /// Stable identifier, also used to name the source and image files.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// 1-based position in document order.
    #[must_use]
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// Diagram source exactly as it appeared between the fence markers.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Hex-encoded SHA-256 of a diagram source.
#[must_use]
pub fn content_hash(source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hex::encode(hasher.finalize())
}
