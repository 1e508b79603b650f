//! Prompt types: the ordered segments sent to the chat backend.

use serde::{Deserialize, Serialize};

/// What a prompt segment carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentKind {
    /// Task instructions and the change title.
    Instructions,
    /// Human-authored description of the change.
    Description,
    /// One file's reconstructed diff block.
    Diff,
    /// Final instruction that triggers the review.
    Closing,
}

/// One unit of conversation input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptSegment {
    pub kind: SegmentKind,
    pub text: String,
    /// `true` when this segment continues the conversation started by an
    /// earlier segment (all but the first).
    pub continues_previous: bool,
}

/// A composed prompt ready to send.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Prompt {
    pub segments: Vec<PromptSegment>,
    /// Set when any segment was cut down to the character ceiling.
    pub truncated: bool,
}

impl Prompt {
    /// Number of diff segments in the prompt.
    pub fn diff_segments(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| s.kind == SegmentKind::Diff)
            .count()
    }
}
