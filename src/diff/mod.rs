//! Diff engine: unified diff parsing, binary-patch stripping, and
//! per-file chunk construction.

pub mod chunker;
pub mod parser;

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

pub use chunker::{ChunkOptions, Chunks, chunk_patch};

/// Base85 payload of a `GIT binary patch` up to its first `literal 0`.
///
/// Lazy so one binary block cannot swallow the text diffs after it.
static BINARY_PATCH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mis)GIT\sbinary\spatch(.*?)literal\s0").expect("binary patch regex is valid")
});

/// Remove `GIT binary patch … literal 0` blocks from a patch.
///
/// Binary payloads add no review value and can exhaust the token budget
/// on their own.
pub fn strip_binary_patches(patch: &str) -> Cow<'_, str> {
    BINARY_PATCH.replace_all(patch, "")
}
