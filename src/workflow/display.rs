use super::pending::PendingChange;
use super::push::PushRequest;

const RULE_WIDTH: usize = 60;

fn rule(c: char) -> String {
    c.to_string().repeat(RULE_WIDTH)
}

/// The numbered plan with a diff preview per change. Diffs longer than
/// `preview_lines` are cut with an explicit marker and the omitted count.
pub fn render_plan(changes: &[PendingChange], preview_lines: usize) -> String {
    if changes.is_empty() {
        return "No changes pending.".to_string();
    }
    let mut lines = vec![rule('='), "PROPOSED MODIFICATIONS".to_string(), rule('=')];
    for (i, change) in changes.iter().enumerate() {
        lines.push(String::new());
        lines.push(format!(
            "{}. [{}] {}",
            i + 1,
            change.change_kind.to_string().to_uppercase(),
            change.target_path
        ));
        lines.push(format!("   {}", change.description));
        lines.push(rule('-'));

        let diff: Vec<&str> = change.diff.lines().collect();
        if diff.is_empty() {
            lines.push("  (no textual difference)".to_string());
        }
        lines.extend(diff.iter().take(preview_lines).map(|l| format!("  {l}")));
        if diff.len() > preview_lines {
            lines.push(format!(
                "  ... (diff truncated, {} more lines)",
                diff.len() - preview_lines
            ));
        }
        lines.push(rule('-'));
    }
    lines.extend([
        String::new(),
        "Type 'approve' to apply these changes".to_string(),
        "Type 'reject' to cancel".to_string(),
        "Or describe requested changes (refer to entries by number)".to_string(),
        rule('='),
    ]);
    lines.join("\n")
}

/// Branch, commit count and changed files, capped at `file_cap` entries.
pub fn render_push_request(request: &PushRequest, file_cap: usize) -> String {
    let mut lines = vec![
        rule('='),
        "PUSH APPROVAL REQUEST".to_string(),
        rule('='),
        format!("Branch: {}", request.branch),
        format!("Commits to push: {}", request.commit_count),
        rule('-'),
        "Files Changed:".to_string(),
    ];
    lines.extend(
        request
            .files_changed
            .iter()
            .take(file_cap)
            .map(|f| format!("  {f}")),
    );
    if request.files_changed.len() > file_cap {
        lines.push(format!(
            "  ... and {} more files",
            request.files_changed.len() - file_cap
        ));
    }
    lines.extend([
        rule('-'),
        "Type 'push' to push to remote".to_string(),
        "Type 'cancel' to skip pushing".to_string(),
        rule('='),
    ]);
    lines.join("\n")
}
