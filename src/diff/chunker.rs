//! Per-file chunk construction for the prompt.
//!
//! Each reviewable file becomes one self-contained fenced diff block that
//! fits under the provider-safe character ceiling. Lockfiles and binary
//! files are dropped before any text is built.

use regex::Regex;

use crate::constants::DEFAULT_CHUNK_CEILING;
use crate::models::diff::FileDiff;

use super::{parser, strip_binary_patches};

/// Instruction appended to every diff chunk.
pub const HOLD_INSTRUCTION: &str =
    "Do not provide feedback yet. I will confirm once all code changes were submitted.";

/// Marker written where a block was cut short.
pub const TRUNCATION_MARKER: &str = "[... truncated]";

/// Default lockfile pattern, matched against a file's from-path.
pub const DEFAULT_LOCKFILE_PATTERN: &str =
    r"(^|/)([^/]*lock\.json|Cargo\.lock|yarn\.lock|pnpm-lock\.yaml|Gemfile\.lock|composer\.lock|poetry\.lock)$";

const FENCE_OPEN: &str = "```diff\n";
const FENCE_CLOSE: &str = "\n```";

/// Knobs for chunk construction.
#[derive(Debug, Clone)]
pub struct ChunkOptions {
    /// Maximum characters per chunk, including fence and instruction.
    pub ceiling: usize,
    /// Files whose from-path matches are skipped.
    pub lockfile: Regex,
}

impl ChunkOptions {
    /// Build options from a ceiling and a lockfile pattern.
    pub fn new(ceiling: usize, lockfile_pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            ceiling,
            lockfile: Regex::new(lockfile_pattern)?,
        })
    }
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            ceiling: DEFAULT_CHUNK_CEILING,
            lockfile: Regex::new(DEFAULT_LOCKFILE_PATTERN).expect("default lockfile pattern is valid"),
        }
    }
}

/// The chunked form of one patch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Chunks {
    /// One text per reviewable file, in patch order.
    pub texts: Vec<String>,
    /// Set once if any chunk had to be cut to the ceiling.
    pub truncated: bool,
    /// Number of files dropped as lockfiles or binaries.
    pub skipped: usize,
}

/// Split a raw patch into per-file prompt chunks.
pub fn chunk_patch(patch: &str, options: &ChunkOptions) -> Chunks {
    let stripped = strip_binary_patches(patch);
    let files = parser::parse_unified_diff(&stripped);

    let mut chunks = Chunks::default();
    for file in &files {
        if !is_reviewable(file, &options.lockfile) {
            tracing::debug!(path = %file.old_path, "skipping file");
            chunks.skipped += 1;
            continue;
        }
        let (text, truncated) = fit_to_ceiling(&render_block(file), options.ceiling);
        if truncated {
            tracing::debug!(path = %file.path(), ceiling = options.ceiling, "chunk truncated");
        }
        chunks.truncated |= truncated;
        chunks.texts.push(text);
    }
    chunks
}

/// Lockfiles, binaries, and files with nothing left to show are not reviewed.
fn is_reviewable(file: &FileDiff, lockfile: &Regex) -> bool {
    if lockfile.is_match(&file.old_path) || file.is_binary {
        return false;
    }
    let mode_change = file.old_mode.is_some() && file.new_mode.is_some();
    !file.hunks.is_empty() || file.is_rename || file.is_deleted || mode_change
}

/// Rebuild a git-style diff for one file, without the fence.
fn render_block(file: &FileDiff) -> Vec<String> {
    let mut lines = vec![format!("diff --git a/{} b/{}", file.old_path, file.new_path)];
    if file.is_new {
        if let Some(ref mode) = file.new_mode {
            lines.push(format!("new file mode {mode}"));
        }
    } else if file.is_deleted {
        if let Some(ref mode) = file.old_mode {
            lines.push(format!("deleted file mode {mode}"));
        }
    } else if let (Some(old), Some(new)) = (&file.old_mode, &file.new_mode) {
        lines.push(format!("old mode {old}"));
        lines.push(format!("new mode {new}"));
    }
    if file.is_rename {
        lines.push(format!("rename from {}", file.old_path));
        lines.push(format!("rename to {}", file.new_path));
    }
    if let Some(ref index) = file.index {
        lines.push(format!("index {index}"));
    }
    lines.push(if file.is_new {
        "--- /dev/null".to_string()
    } else {
        format!("--- a/{}", file.old_path)
    });
    lines.push(if file.is_deleted {
        "+++ /dev/null".to_string()
    } else {
        format!("+++ b/{}", file.new_path)
    });
    for hunk in &file.hunks {
        lines.push(hunk.header_line());
        lines.extend(hunk.lines.iter().map(|l| l.to_unified()));
    }
    lines
}

/// Wrap diff lines in a fence plus the hold instruction, cutting whole
/// lines until the result fits `ceiling` characters.
///
/// Returns the text and whether anything was cut.
pub fn fit_to_ceiling(lines: &[String], ceiling: usize) -> (String, bool) {
    let suffix = format!("{FENCE_CLOSE}\n\n{HOLD_INSTRUCTION}");
    let full = format!("{FENCE_OPEN}{}{suffix}", lines.join("\n"));
    if full.chars().count() <= ceiling {
        return (full, false);
    }

    let marker = format!("\n{TRUNCATION_MARKER}");
    let overhead = FENCE_OPEN.chars().count() + marker.chars().count() + suffix.chars().count();
    let mut budget = ceiling.saturating_sub(overhead);

    let mut body = String::new();
    for (i, line) in lines.iter().enumerate() {
        let cost = line.chars().count() + usize::from(i > 0);
        if cost <= budget {
            if i > 0 {
                body.push('\n');
            }
            body.push_str(line);
            budget -= cost;
        } else {
            // A single oversized line is cut at a character boundary so
            // the block is never empty when the first line is huge.
            if body.is_empty() {
                body.extend(line.chars().take(budget));
            }
            break;
        }
    }

    let text = format!("{FENCE_OPEN}{body}{marker}{suffix}");
    if text.chars().count() <= ceiling {
        (text, true)
    } else {
        // Ceiling smaller than the fence itself: fall back to a plain cut.
        (full.chars().take(ceiling).collect(), true)
    }
}
