//! Unified diff format parser.
//!
//! Parses `.patch` / `git diff` output into `Vec<FileDiff>`, keeping the
//! file modes, `index` line, and hunk headers needed to rebuild a
//! per-file diff block.

use std::iter::Peekable;
use std::str::Lines;

use crate::models::diff::{DiffLine, DiffLineType, FileDiff, Hunk};

/// Parse a unified diff string into a list of file diffs.
///
/// Mail-formatted patches (`git format-patch`, the `.patch` endpoints of
/// GitHub and GitLab) carry commit headers before the first `diff --git`
/// line; those are skipped.
pub fn parse_unified_diff(input: &str) -> Vec<FileDiff> {
    let mut files: Vec<FileDiff> = Vec::new();
    let mut lines = input.lines().peekable();

    while let Some(line) = lines.next() {
        let Some(rest) = line.strip_prefix("diff --git ") else {
            continue;
        };

        let (old_path, new_path) = split_header_paths(rest);
        let mut file = FileDiff {
            old_path,
            new_path,
            ..FileDiff::default()
        };
        parse_file_body(&mut lines, &mut file);
        files.push(file);
    }

    files
}

/// Consume extended headers and hunks until the next file starts.
fn parse_file_body(lines: &mut Peekable<Lines<'_>>, file: &mut FileDiff) {
    while let Some(&next) = lines.peek() {
        if next.starts_with("diff --git ") {
            break;
        }
        if next.starts_with("@@") {
            if let Some(hunk) = parse_hunk(lines) {
                file.hunks.push(hunk);
            } else {
                lines.next();
            }
            continue;
        }

        lines.next();
        if let Some(mode) = next.strip_prefix("new file mode ") {
            file.is_new = true;
            file.new_mode = Some(mode.trim().to_string());
        } else if let Some(mode) = next.strip_prefix("deleted file mode ") {
            file.is_deleted = true;
            file.old_mode = Some(mode.trim().to_string());
        } else if let Some(mode) = next.strip_prefix("old mode ") {
            file.old_mode = Some(mode.trim().to_string());
        } else if let Some(mode) = next.strip_prefix("new mode ") {
            file.new_mode = Some(mode.trim().to_string());
        } else if next.starts_with("rename from") || next.starts_with("rename to") {
            file.is_rename = true;
        } else if let Some(index) = next.strip_prefix("index ") {
            file.index = Some(index.trim().to_string());
        } else if next.starts_with("Binary files") || next.starts_with("GIT binary patch") {
            file.is_binary = true;
        }
        // similarity index, ---/+++ lines, base85 payloads, and trailing
        // mail signatures carry nothing we rebuild.
    }
}

/// Split the `a/path b/path` remainder of a `diff --git` header.
fn split_header_paths(rest: &str) -> (String, String) {
    match find_second_prefix(rest) {
        Some(b_idx) => (
            strip_diff_prefix(&rest[..b_idx]).to_string(),
            strip_diff_prefix(&rest[b_idx + 1..]).to_string(),
        ),
        None => {
            let (a, b) = rest.split_once(' ').unwrap_or((rest, rest));
            (strip_diff_prefix(a).to_string(), strip_diff_prefix(b).to_string())
        }
    }
}

/// Strip a single-character git diff prefix (`a/`, `b/`, `c/`, `w/`, `i/`, `o/`).
///
/// `c/`, `w/`, `i/` and `o/` appear when `diff.mnemonicPrefix` is enabled.
fn strip_diff_prefix(path: &str) -> &str {
    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[1] == b'/' && is_prefix_letter(bytes[0]) {
        return &path[2..];
    }
    path
}

fn is_prefix_letter(b: u8) -> bool {
    matches!(b, b'a' | b'b' | b'c' | b'w' | b'i' | b'o')
}

/// Position of the space that separates the two prefixed paths.
fn find_second_prefix(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    (1..bytes.len().saturating_sub(2)).find(|&i| {
        bytes[i] == b' ' && is_prefix_letter(bytes[i + 1]) && bytes[i + 2] == b'/'
    })
}

/// Parse a single hunk starting with an `@@` line.
fn parse_hunk(lines: &mut Peekable<Lines<'_>>) -> Option<Hunk> {
    let (old_start, old_count, new_start, new_count, header) =
        parse_hunk_header(lines.peek()?)?;
    lines.next();

    // The range counts bound the hunk, so trailing blank lines and the
    // mail signature of a format-patch file are never taken as content.
    let mut old_left = old_count;
    let mut new_left = new_count;
    let mut hunk_lines: Vec<DiffLine> = Vec::new();
    while old_left > 0 || new_left > 0 {
        let Some(&next) = lines.peek() else {
            break;
        };
        if next.starts_with("diff --git ") || next.starts_with("@@") {
            break;
        }

        let (line_type, content) = if let Some(content) = next.strip_prefix('+') {
            new_left = new_left.saturating_sub(1);
            (DiffLineType::Added, content)
        } else if let Some(content) = next.strip_prefix('-') {
            old_left = old_left.saturating_sub(1);
            (DiffLineType::Removed, content)
        } else if next.starts_with(' ') || next.is_empty() {
            old_left = old_left.saturating_sub(1);
            new_left = new_left.saturating_sub(1);
            (DiffLineType::Context, next.get(1..).unwrap_or(""))
        } else if next.starts_with('\\') {
            // "\ No newline at end of file"
            lines.next();
            continue;
        } else {
            break;
        };

        hunk_lines.push(DiffLine {
            line_type,
            content: content.to_string(),
        });
        lines.next();
    }

    // "\ No newline at end of file" may follow the last counted line.
    while lines.peek().is_some_and(|l| l.starts_with('\\')) {
        lines.next();
    }

    Some(Hunk {
        old_start,
        old_count,
        new_start,
        new_count,
        header,
        lines: hunk_lines,
    })
}

/// Parse a `@@ -old_start,old_count +new_start,new_count @@ header` line.
fn parse_hunk_header(line: &str) -> Option<(u32, u32, u32, u32, Option<String>)> {
    let line = line.strip_prefix("@@ ")?;
    let end = line.find(" @@")?;
    let header = Some(line[end + 3..].trim())
        .filter(|h| !h.is_empty())
        .map(str::to_string);

    let (old, new) = line[..end].split_once(' ')?;
    let (old_start, old_count) = parse_range(old.strip_prefix('-')?)?;
    let (new_start, new_count) = parse_range(new.strip_prefix('+')?)?;

    Some((old_start, old_count, new_start, new_count, header))
}

/// Parse "start,count" or "start" (count defaults to 1).
fn parse_range(s: &str) -> Option<(u32, u32)> {
    match s.split_once(',') {
        Some((start, count)) => Some((start.parse().ok()?, count.parse().ok()?)),
        None => Some((s.parse().ok()?, 1)),
    }
}
