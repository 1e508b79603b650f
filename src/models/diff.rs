//! Diff-related types: file diffs, hunks, and diff lines.

use serde::{Deserialize, Serialize};

/// The type of a line in a diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiffLineType {
    /// Line exists only in the new version (added).
    Added,
    /// Line exists only in the old version (removed).
    Removed,
    /// Line is unchanged (context).
    Context,
}

impl DiffLineType {
    /// The unified-diff prefix character for this line type.
    pub fn prefix(self) -> char {
        match self {
            DiffLineType::Added => '+',
            DiffLineType::Removed => '-',
            DiffLineType::Context => ' ',
        }
    }
}

/// A single line in a diff hunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffLine {
    /// The type of change.
    pub line_type: DiffLineType,
    /// The content of the line (without the leading +/-/space).
    pub content: String,
}

impl DiffLine {
    /// Render the line back into unified-diff form.
    pub fn to_unified(&self) -> String {
        format!("{}{}", self.line_type.prefix(), self.content)
    }
}

/// A contiguous hunk within a file diff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hunk {
    /// Starting line in the old file.
    pub old_start: u32,
    /// Number of lines in the old file.
    pub old_count: u32,
    /// Starting line in the new file.
    pub new_start: u32,
    /// Number of lines in the new file.
    pub new_count: u32,
    /// Optional hunk header text (e.g., function name).
    pub header: Option<String>,
    /// The lines in this hunk.
    pub lines: Vec<DiffLine>,
}

impl Hunk {
    /// Render the `@@ -a,b +c,d @@ header` line.
    pub fn header_line(&self) -> String {
        let mut line = format!(
            "@@ -{},{} +{},{} @@",
            self.old_start, self.old_count, self.new_start, self.new_count
        );
        if let Some(ref header) = self.header {
            line.push(' ');
            line.push_str(header);
        }
        line
    }
}

/// A diff for a single file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileDiff {
    /// Path from the `a/` side of the `diff --git` header.
    pub old_path: String,
    /// Path from the `b/` side of the `diff --git` header.
    pub new_path: String,
    /// Whether this is a new file.
    pub is_new: bool,
    /// Whether this file was deleted.
    pub is_deleted: bool,
    /// Whether this is a rename.
    pub is_rename: bool,
    /// Whether this is a binary file.
    pub is_binary: bool,
    /// Mode from `new file mode` / `new mode`.
    pub new_mode: Option<String>,
    /// Mode from `deleted file mode` / `old mode`.
    pub old_mode: Option<String>,
    /// Everything after `index ` (e.g. `abc123..def456 100644`).
    pub index: Option<String>,
    /// The hunks in this diff.
    pub hunks: Vec<Hunk>,
}

impl FileDiff {
    /// Returns the most relevant file path (new_path for non-deletes, old_path for deletes).
    pub fn path(&self) -> &str {
        if self.is_deleted {
            &self.old_path
        } else {
            &self.new_path
        }
    }

    /// Total number of lines across all hunks.
    pub fn line_count(&self) -> usize {
        self.hunks.iter().map(|h| h.lines.len()).sum()
    }
}
