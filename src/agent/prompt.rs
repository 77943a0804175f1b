use crate::tools::ReferenceDocument;
use std::fmt::Write as _;

const BASE_PROMPT: &str = "\
You are a careful coding agent for Python and Ansible repositories.

## Capabilities
1. File operations: read, list and check files; propose writes and deletions
2. Git: fetch, create branches (auto-prefixed), checkout, add, commit, diff, status
3. Python analysis and editing: structure, patterns, imports, functions
4. Ansible analysis and editing: projects, playbooks, roles, tasks, variables, YAML
5. Reference documents: procedures loaded at startup or read on demand
6. Shell: run a command when no dedicated tool fits

## Workflow rules
### Before modifying code
1. Run `git_fetch_all` to work on the latest code
2. Create a branch with `git_create_branch`, named after the change you are making

### Modification approval
1. Editing tools (write_file, delete_file, modify_python_code, add_function, modify_task, ...) \
only PROPOSE changes. Nothing is written until the user approves.
2. Proposals accumulate into one numbered plan that the user reviews as a whole.
3. Proposing the same file again replaces its planned content; later tools read the planned content.
4. If the user asks for revisions, propose the corrected changes and present the updated plan.
5. Once approved, the files are written for you. Stage and commit them with `git_add` and `git_commit`.

### Push approval
1. Committing asks the user for push approval; you cannot push yourself.
2. The push runs only after the user approves.

## Response format
- Be clear and concise
- Explain what each proposed change does, grouped and numbered
- Large results: focus on the most relevant items and say what was skipped
- Large codebases: analyze structure first, then dive into specifics
";

/// Project instructions are cut at this many characters.
pub const PROJECT_INSTRUCTIONS_CHAR_LIMIT: usize = 30_000;

const TRUNCATION_MARKER: &str = "\n... (content truncated)";

/// The system message: base instructions, then the repository's project
/// instructions, then the reference documents, whose combined text is capped
/// at `char_limit` characters.
pub fn build_system_prompt(
    project_instructions: Option<&str>,
    references: &[ReferenceDocument],
    char_limit: usize,
) -> String {
    let mut prompt = BASE_PROMPT.to_string();
    if let Some(instructions) = project_instructions.filter(|text| !text.trim().is_empty()) {
        prompt.push_str(&instructions_context(instructions));
    }
    let context = reference_context(references, char_limit);
    if !context.is_empty() {
        prompt.push('\n');
        prompt.push_str(&context);
    }
    prompt
}

fn instructions_context(instructions: &str) -> String {
    let heavy = "=".repeat(60);
    let light = "-".repeat(40);
    let mut out = format!(
        "\n{heavy}\nCRITICAL: PROJECT-SPECIFIC INSTRUCTIONS (AGENT.md)\n{heavy}\n\n\
         These instructions from AGENT.md have the HIGHEST PRIORITY.\n\
         You MUST follow these rules for ALL operations in this repository.\n\
         If they conflict with your general behavior, AGENT.md takes precedence.\n\n{light}\n"
    );
    out.extend(instructions.chars().take(PROJECT_INSTRUCTIONS_CHAR_LIMIT));
    if instructions.chars().count() > PROJECT_INSTRUCTIONS_CHAR_LIMIT {
        out.push_str(TRUNCATION_MARKER);
    }
    let _ = write!(out, "\n{light}\nEND OF AGENT.MD INSTRUCTIONS\n{heavy}\n");
    out
}

fn reference_context(references: &[ReferenceDocument], char_limit: usize) -> String {
    let mut out = String::new();
    let mut budget = char_limit;
    for doc in references {
        let title = doc.title.as_deref().unwrap_or("Untitled");
        let _ = write!(
            out,
            "\n[REFERENCE DOCUMENT LOADED]\nTitle: {title}\nSource: {}\nSections: {}\nTables: {}\n\
             --- REFERENCE CONTENT ---\n",
            doc.path,
            doc.sections.len(),
            doc.tables.len()
        );
        let total = doc.full_text.chars().count();
        let shown: String = doc.full_text.chars().take(budget).collect();
        budget -= shown.chars().count();
        out.push_str(&shown);
        if total > shown.chars().count() {
            out.push_str(TRUNCATION_MARKER);
        }
        out.push_str("\n--- END REFERENCE CONTENT ---\n");
    }
    if !out.is_empty() {
        out.push_str("\nPrioritize responses based on these reference documents when applicable.\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::reference_doc::parse;

    #[test]
    fn prompt_without_references_is_the_base() {
        let prompt = build_system_prompt(None, &[], 100);
        assert_eq!(prompt, BASE_PROMPT);
        assert!(prompt.contains("only PROPOSE changes"));
    }

    #[test]
    fn references_are_embedded_with_title() {
        let doc = parse("mop.md", "# Upgrade NTP\n\nRestart chrony on every host.\n");
        let prompt = build_system_prompt(None, &[doc], 1000);
        assert!(prompt.contains("Title: Upgrade NTP"));
        assert!(prompt.contains("Restart chrony on every host."));
        assert!(!prompt.contains("content truncated"));
    }

    #[test]
    fn reference_text_is_capped_across_documents() {
        let first = parse("a.md", &"a".repeat(80));
        let second = parse("b.md", &"b".repeat(80));
        let prompt = build_system_prompt(None, &[first, second], 100);
        assert_eq!(prompt.matches("content truncated").count(), 1);
        assert!(prompt.contains(&"b".repeat(20)));
        assert!(!prompt.contains(&"b".repeat(21)));
    }

    #[test]
    fn project_instructions_precede_references() {
        let doc = parse("mop.md", "# Upgrade NTP\n\nRestart chrony.\n");
        let prompt = build_system_prompt(Some("Use 4-space YAML indents."), &[doc], 1000);
        let rules = prompt.find("Use 4-space YAML indents.").unwrap();
        let reference = prompt.find("[REFERENCE DOCUMENT LOADED]").unwrap();
        assert!(rules < reference);
        assert!(prompt.contains("CRITICAL: PROJECT-SPECIFIC INSTRUCTIONS (AGENT.md)"));
        assert!(prompt.contains("END OF AGENT.MD INSTRUCTIONS"));
    }

    #[test]
    fn project_instructions_are_capped() {
        let long = "r".repeat(PROJECT_INSTRUCTIONS_CHAR_LIMIT + 5);
        let prompt = build_system_prompt(Some(&long), &[], 100);
        assert!(prompt.contains(&"r".repeat(PROJECT_INSTRUCTIONS_CHAR_LIMIT)));
        assert!(!prompt.contains(&"r".repeat(PROJECT_INSTRUCTIONS_CHAR_LIMIT + 1)));
        assert_eq!(prompt.matches("content truncated").count(), 1);

        assert_eq!(build_system_prompt(Some("  \n"), &[], 100), BASE_PROMPT);
    }
}
