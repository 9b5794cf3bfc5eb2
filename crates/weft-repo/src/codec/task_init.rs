//! Encode/decode for a task branch's first ("initialize") commit.

use super::model::{ParseWarning, TaskInit};
use super::{
    extract_field, extract_list, parse_commit_doc, parse_id_csv, render_bracket_csv,
    render_commit_doc, section_lines, CommitDoc, Section,
};

/// Deterministic branch slug derived from a task's description: lowercased,
/// non-alphanumerics collapsed to single hyphens, capped at 40 chars so
/// branch names stay readable.
pub fn slugify(description: &str) -> String {
    let mut slug = String::new();
    let mut last_was_hyphen = true; // suppress a leading hyphen
    for ch in description.to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
            last_was_hyphen = false;
        } else if !last_was_hyphen {
            slug.push('-');
            last_was_hyphen = true;
        }
    }
    let slug = slug.trim_end_matches('-');
    slug.chars().take(40).collect::<String>()
}

pub fn task_branch_name(id: u64, description: &str) -> String {
    format!("task/{id}-{}", slugify(description))
}

pub fn encode_task_init(init: &TaskInit) -> String {
    let title = format!(
        "Initialize {}",
        task_branch_name(init.id, &init.description)
    );

    let mut deps_lines = vec!["Preconditions:".to_string()];
    for p in &init.preconditions {
        deps_lines.push(format!("  - {p}"));
    }
    deps_lines.push("Provides:".to_string());
    for p in &init.provides {
        deps_lines.push(format!("  - {p}"));
    }

    let mut files_lines = vec!["Files to modify:".to_string()];
    for f in &init.files {
        files_lines.push(format!("  - {f}"));
    }

    let context_lines = vec![
        format!("Session Goal: {}", init.session_name),
        format!("Session name: {}", init.session_name),
        format!("Plan Branch: {}", init.plan_branch),
        format!("Plan Version: v{}", init.plan_version),
        format!("Depends on: {}", render_bracket_csv(&init.depends_on)),
        format!("Enables: {}", render_bracket_csv(&init.enables)),
    ];

    let doc = CommitDoc {
        title,
        sections: vec![
            Section {
                header: "Task Metadata".to_string(),
                lines: vec![
                    format!("ID: {}", init.id),
                    format!("Description: {}", init.description),
                    "Status: pending".to_string(),
                ],
            },
            Section {
                header: "Dependencies".to_string(),
                lines: deps_lines,
            },
            Section {
                header: "Files".to_string(),
                lines: files_lines,
            },
            Section {
                header: "Context".to_string(),
                lines: context_lines,
            },
        ],
    };

    render_commit_doc(&doc)
}

/// Decodes a task-init commit. Missing optional fields default to empty
/// list/string, never to a hard failure, per the codec's contract.
pub fn decode_task_init(message: &str) -> (TaskInit, Vec<ParseWarning>) {
    let doc = parse_commit_doc(message);
    let mut warnings = Vec::new();

    let meta = section_lines(&doc, "Task Metadata").unwrap_or(&[]);
    let deps = section_lines(&doc, "Dependencies").unwrap_or(&[]);
    let files = section_lines(&doc, "Files").unwrap_or(&[]);
    let context = section_lines(&doc, "Context").unwrap_or(&[]);

    let id = extract_field(meta, "ID").and_then(|s| s.parse::<u64>().ok()).unwrap_or_else(|| {
        warnings.push(ParseWarning {
            context: "task_init".to_string(),
            message: "missing or non-numeric ID in Task Metadata, defaulting to 0".to_string(),
        });
        0
    });
    let description = extract_field(meta, "Description").unwrap_or_default();

    let preconditions = extract_list(deps, "Preconditions");
    let provides = extract_list(deps, "Provides");
    let task_files = extract_list(files, "Files to modify");

    let session_name = extract_field(context, "Session name").unwrap_or_default();
    let plan_branch = extract_field(context, "Plan Branch").unwrap_or_default();
    let plan_version = extract_field(context, "Plan Version")
        .and_then(|v| v.trim().strip_prefix('v').and_then(|n| n.parse().ok()))
        .unwrap_or(0);
    let depends_on = extract_field(context, "Depends on")
        .map(|raw| parse_id_csv(&raw, "task_init.depends_on", &mut warnings))
        .unwrap_or_default();
    let enables = extract_field(context, "Enables")
        .map(|raw| parse_id_csv(&raw, "task_init.enables", &mut warnings))
        .unwrap_or_default();

    let init = TaskInit {
        id,
        description,
        preconditions,
        provides,
        files: task_files,
        session_name,
        plan_branch,
        plan_version,
        depends_on,
        enables,
    };
    (init, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TaskInit {
        TaskInit {
            id: 3,
            description: "Add styles.css".to_string(),
            preconditions: vec!["index.html exists".to_string()],
            provides: vec!["styles applied".to_string()],
            files: vec!["styles.css".to_string()],
            session_name: "build-site".to_string(),
            plan_branch: "plan/build-site".to_string(),
            plan_version: 1,
            depends_on: vec![1],
            enables: vec![],
        }
    }

    #[test]
    fn roundtrips() {
        let init = sample();
        let encoded = encode_task_init(&init);
        let (decoded, warnings) = decode_task_init(&encoded);
        assert!(warnings.is_empty(), "unexpected warnings: {warnings:?}");
        assert_eq!(decoded, init);
    }

    #[test]
    fn branch_name_is_slug_of_description() {
        assert_eq!(task_branch_name(3, "Add styles.css!"), "task/3-add-styles-css");
    }

    #[test]
    fn missing_optional_fields_default_empty_not_error() {
        let msg = "Initialize task/9-x\n\n## Task Metadata\nID: 9\nDescription: x\nStatus: pending\n";
        let (init, _) = decode_task_init(msg);
        assert_eq!(init.id, 9);
        assert!(init.preconditions.is_empty());
        assert!(init.provides.is_empty());
        assert!(init.files.is_empty());
        assert_eq!(init.session_name, "");
    }

    #[test]
    fn missing_id_defaults_with_warning() {
        let msg = "Initialize task/x\n\n## Task Metadata\nDescription: x\n";
        let (init, warnings) = decode_task_init(msg);
        assert_eq!(init.id, 0);
        assert_eq!(warnings.len(), 1);
    }
}
