use super::pending::{ChangeKind, PendingChange};
use similar::TextDiff;
use std::borrow::Cow;

const CONTEXT_LINES: usize = 3;

/// Give non-empty text a terminating newline so a missing final newline
/// does not show up as a one-line hunk.
fn normalize_trailing_newline(text: &str) -> Cow<'_, str> {
    if text.is_empty() || text.ends_with('\n') {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(format!("{text}\n"))
    }
}

/// Line-oriented unified diff with `a/<label>` / `b/<label>` headers.
///
/// Identical inputs (after newline normalization) produce an empty string:
/// no headers, no hunks. Output is deterministic.
pub fn build_diff(original: &str, modified: &str, label: &str) -> String {
    let original = normalize_trailing_newline(original);
    let modified = normalize_trailing_newline(modified);
    TextDiff::from_lines(original.as_ref(), modified.as_ref())
        .unified_diff()
        .context_radius(CONTEXT_LINES)
        .header(&format!("a/{label}"), &format!("b/{label}"))
        .to_string()
}

/// Package a proposed edit. Pure: never touches the file system.
pub fn make_pending_change(
    path: impl Into<String>,
    original: impl Into<String>,
    modified: impl Into<String>,
    description: impl Into<String>,
    kind: ChangeKind,
) -> PendingChange {
    let target_path = path.into();
    let original_content = original.into();
    let new_content = modified.into();
    let diff = build_diff(&original_content, &new_content, &target_path);
    PendingChange {
        target_path,
        original_content,
        new_content,
        diff,
        description: description.into(),
        change_kind: kind,
    }
}

/// Number of `@@` hunks in a unified diff.
pub fn hunk_count(diff: &str) -> usize {
    diff.lines().filter(|line| line.starts_with("@@")).count()
}

/// Apply a unified diff produced by [`build_diff`] to `original`.
///
/// Context and removed lines are verified against the source; any mismatch
/// yields `None`. The source is newline-normalized the same way the diff was.
pub fn apply_unified_diff(original: &str, diff: &str) -> Option<String> {
    let original = normalize_trailing_newline(original);
    let source: Vec<&str> = original.split_inclusive('\n').collect();
    let mut output = String::with_capacity(original.len());
    let mut cursor = 0usize;
    let mut in_hunk = false;

    for line in diff.split_inclusive('\n') {
        if !in_hunk && (line.starts_with("--- ") || line.starts_with("+++ ")) {
            continue;
        }
        if line.starts_with('\\') {
            continue;
        }
        if let Some(header) = line.strip_prefix("@@ ") {
            in_hunk = true;
            let old_range = header.split_whitespace().next()?.strip_prefix('-')?;
            let (start, len) = match old_range.split_once(',') {
                Some((start, len)) => (start.parse::<usize>().ok()?, len.parse::<usize>().ok()?),
                None => (old_range.parse::<usize>().ok()?, 1),
            };
            let hunk_start = if len == 0 { start } else { start.checked_sub(1)? };
            if hunk_start < cursor || hunk_start > source.len() {
                return None;
            }
            for kept in &source[cursor..hunk_start] {
                output.push_str(kept);
            }
            cursor = hunk_start;
            continue;
        }

        let (tag, body) = line.split_at(line.chars().next()?.len_utf8());
        match tag {
            " " => {
                if source.get(cursor) != Some(&body) {
                    return None;
                }
                output.push_str(body);
                cursor += 1;
            }
            "-" => {
                if source.get(cursor) != Some(&body) {
                    return None;
                }
                cursor += 1;
            }
            "+" => output.push_str(body),
            _ => return None,
        }
    }

    for kept in source.get(cursor..)? {
        output.push_str(kept);
    }
    Some(output)
}
