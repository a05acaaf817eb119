//! Host document rewriting.
//!
//! [`ReferenceRewriter`] replaces each diagram block with an image reference to
//! its rendered artifact. It scans blocks with the same [`UnitExtractor`] that
//! produced the units, so block count and order cannot diverge from extraction.

use std::path::Path;

use crate::extract::{BlockSpan, UnitExtractor};
use crate::renderer::RenderArtifact;

/// What to emit in place of a block whose render failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Emit the image reference anyway; the missing file shows as a broken link.
    #[default]
    Link,
    /// Leave the original block untouched.
    KeepSource,
    /// Emit an HTML comment naming the failure (seen in the source, hidden when rendered).
    Placeholder,
}

impl FailurePolicy {
    /// Parse a policy name (`link`, `keep-source`, `placeholder`).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "link" => Some(Self::Link),
            "keep-source" => Some(Self::KeepSource),
            "placeholder" => Some(Self::Placeholder),
            _ => None,
        }
    }

    /// Policy name as accepted by [`parse`](Self::parse).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Link => "link",
            Self::KeepSource => "keep-source",
            Self::Placeholder => "placeholder",
        }
    }
}

/// Rewritten document text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewrittenDocument {
    pub text: String,
    /// Number of blocks replaced (blocks kept as source are not counted).
    pub replacements: usize,
}

/// Blocks and artifacts disagree. This is a defect, not a runtime condition.
#[derive(Debug, thiserror::Error)]
pub enum RewriteError {
    #[error("document has {blocks} diagram block(s) but {artifacts} artifact(s) were supplied")]
    CountMismatch { blocks: usize, artifacts: usize },
    #[error("block {position} was paired with the artifact of diagram {ordinal}")]
    OrderMismatch { position: usize, ordinal: usize },
}

/// Replaces diagram blocks with image references.
#[derive(Debug, Clone)]
pub struct ReferenceRewriter {
    extractor: UnitExtractor,
    link_base: String,
    on_failure: FailurePolicy,
}

impl ReferenceRewriter {
    /// Create a rewriter scanning blocks with `extractor`.
    ///
    /// Pass the extractor that produced the units being rendered.
    #[must_use]
    pub fn new(extractor: UnitExtractor) -> Self {
        Self {
            extractor,
            link_base: "images".to_owned(),
            on_failure: FailurePolicy::default(),
        }
    }

    /// Set the prefix for image links (e.g. `./images`).
    #[must_use]
    pub fn link_base(mut self, base: impl Into<String>) -> Self {
        self.link_base = base.into();
        self
    }

    /// Set the policy for failed renders.
    #[must_use]
    pub fn on_failure(mut self, policy: FailurePolicy) -> Self {
        self.on_failure = policy;
        self
    }

    /// Replace the Nth block with a reference to the Nth artifact.
    ///
    /// Artifacts must be in ordinal order, one per block. All text outside the
    /// blocks is preserved byte-for-byte.
    pub fn rewrite(
        &self,
        document: &str,
        artifacts: &[RenderArtifact],
    ) -> Result<RewrittenDocument, RewriteError> {
        let blocks = self.extractor.scan_blocks(document);
        self.rewrite_blocks(document, &blocks, artifacts)
    }

    /// [`rewrite`](Self::rewrite) over blocks already located in `document`.
    pub(crate) fn rewrite_blocks(
        &self,
        document: &str,
        blocks: &[BlockSpan<'_>],
        artifacts: &[RenderArtifact],
    ) -> Result<RewrittenDocument, RewriteError> {
        if blocks.len() != artifacts.len() {
            return Err(RewriteError::CountMismatch {
                blocks: blocks.len(),
                artifacts: artifacts.len(),
            });
        }

        let mut text = String::with_capacity(document.len());
        let mut cursor = 0;
        let mut replacements = 0;

        for (i, (block, artifact)) in blocks.iter().zip(artifacts).enumerate() {
            let position = i + 1;
            if artifact.ordinal != position {
                return Err(RewriteError::OrderMismatch {
                    position,
                    ordinal: artifact.ordinal,
                });
            }

            text.push_str(&document[cursor..block.range.start]);
            match (artifact.is_success(), self.on_failure) {
                (true, _) | (false, FailurePolicy::Link) => {
                    text.push_str(&self.reference(position, artifact));
                    replacements += 1;
                }
                (false, FailurePolicy::KeepSource) => {
                    text.push_str(&document[block.range.clone()]);
                }
                (false, FailurePolicy::Placeholder) => {
                    let error = artifact.error.as_deref().unwrap_or("unknown error");
                    text.push_str(&format!(
                        "<!-- Diagram {position} failed to render: {} -->",
                        comment_safe(error)
                    ));
                    replacements += 1;
                }
            }
            cursor = block.range.end;
        }
        text.push_str(&document[cursor..]);

        Ok(RewrittenDocument { text, replacements })
    }

    fn reference(&self, position: usize, artifact: &RenderArtifact) -> String {
        let file = artifact
            .output_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{}.png", artifact.unit_id));
        let base = self.link_base.trim_end_matches('/');
        if base.is_empty() {
            format!("![Diagram {position}]({file})")
        } else {
            format!("![Diagram {position}]({base}/{file})")
        }
    }
}

/// `text` with every run of hyphens collapsed to one, so it cannot close an
/// HTML comment.
fn comment_safe(text: &str) -> String {
    let mut safe = String::with_capacity(text.len());
    for c in text.chars() {
        if c != '-' || !safe.ends_with('-') {
            safe.push(c);
        }
    }
    safe
}

/// Link prefix for images in `image_dir`, as seen from a document in `document_dir`.
///
/// Relative (`./images`) when the image directory is inside the document's
/// directory, otherwise the image directory as given.
#[must_use]
pub fn link_base_for(document_dir: &Path, image_dir: &Path) -> String {
    match image_dir.strip_prefix(document_dir) {
        Ok(relative) if relative.as_os_str().is_empty() => ".".to_owned(),
        Ok(relative) => {
            let parts: Vec<_> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            format!("./{}", parts.join("/"))
        }
        Err(_) => image_dir.display().to_string(),
    }
}
