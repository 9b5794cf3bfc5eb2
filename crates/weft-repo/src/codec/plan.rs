//! Encode/decode for plan commits (`## Session Information`, `## Design
//! Doc`, `## Technology Stack`, `## Tasks` with `### Task <id>` blocks).

use super::model::{Plan, ParseWarning, Priority, Task, TaskStatus};
use super::{extract_field, parse_commit_doc, render_commit_doc, render_id_csv, section_lines,
    CommitDoc, Section};

pub fn encode_plan(plan: &Plan) -> String {
    let title = if plan.version <= 1 {
        format!("Initialize execution plan v{}", plan.version.max(1))
    } else {
        format!("Update execution plan v{}", plan.version)
    };

    let mut session_lines = vec![
        format!("Session name: {}", plan.session_name),
        format!("User Request: {}", plan.user_request),
        format!("Plan Version: v{}", plan.version),
    ];
    // Kept as a single-line field even when the request spans multiple
    // lines in memory; commit titles/fields are one line by convention.
    session_lines[1] = format!("User Request: {}", plan.user_request.replace('\n', " "));

    let mut tasks_lines = Vec::new();
    for task in &plan.tasks {
        tasks_lines.push(format!("### Task {}", task.id));
        tasks_lines.push(format!("ID: {}", task.id));
        tasks_lines.push(format!("Description: {}", task.description));
        tasks_lines.push(format!("Status: {}", task.status));
        tasks_lines.push(format!("Depends on: {}", render_id_csv(&task.depends_on)));
        let key_files = if task.key_files.is_empty() {
            "None".to_string()
        } else {
            task.key_files.join(", ")
        };
        tasks_lines.push(format!("Key files: {key_files}"));
        tasks_lines.push(format!("Priority: {}", task.priority));
        tasks_lines.push(format!(
            "Gate command: {}",
            task.gate_command.clone().unwrap_or_else(|| "None".to_string())
        ));
        tasks_lines.push(String::new());
    }

    let doc = CommitDoc {
        title,
        sections: vec![
            Section {
                header: "Session Information".to_string(),
                lines: session_lines,
            },
            Section {
                header: "Design Doc".to_string(),
                lines: plan.design_doc.lines().map(str::to_string).collect(),
            },
            Section {
                header: "Technology Stack".to_string(),
                lines: plan.tech_stack.lines().map(str::to_string).collect(),
            },
            Section {
                header: "Tasks".to_string(),
                lines: tasks_lines,
            },
        ],
    };

    render_commit_doc(&doc)
}

/// Decodes a plan commit message. Never fails on a non-empty message: a
/// malformed `### Task` header (no numeric id) causes that task to be
/// dropped, with a `ParseWarning` pushed rather than the whole decode
/// aborting (Scenario F).
pub fn decode_plan(message: &str) -> (Plan, Vec<ParseWarning>) {
    let doc = parse_commit_doc(message);
    let mut warnings = Vec::new();

    let session = section_lines(&doc, "Session Information").unwrap_or(&[]);
    let session_name = extract_field(session, "Session name").unwrap_or_default();
    let user_request = extract_field(session, "User Request").unwrap_or_default();
    let version = version_from_title_or_field(&doc.title, session, &mut warnings);

    let design_doc = section_lines(&doc, "Design Doc")
        .map(|l| l.join("\n").trim().to_string())
        .unwrap_or_default();
    let tech_stack = section_lines(&doc, "Technology Stack")
        .map(|l| l.join("\n").trim().to_string())
        .unwrap_or_default();

    let tasks = decode_tasks(section_lines(&doc, "Tasks").unwrap_or(&[]), &mut warnings);

    let plan = Plan {
        session_name,
        user_request,
        version,
        design_doc,
        tech_stack,
        tasks,
    };
    (plan, warnings)
}

/// `Plan Version: v<N>` is the primary source; if absent, fall back to
/// parsing `v<N>` out of the title; if that too fails, default to 1 with a
/// warning. Mirrors the three-tier fallback in the reference parser this
/// codec is modeled on.
fn version_from_title_or_field(
    title: &str,
    session_lines: &[String],
    warnings: &mut Vec<ParseWarning>,
) -> u32 {
    if let Some(v) = extract_field(session_lines, "Plan Version") {
        if let Some(n) = v.trim().strip_prefix('v').and_then(|n| n.parse().ok()) {
            return n;
        }
    }
    if let Some(n) = title
        .rsplit('v')
        .next()
        .and_then(|tail| tail.trim().parse::<u32>().ok())
    {
        return n;
    }
    warnings.push(ParseWarning {
        context: "plan".to_string(),
        message: "could not determine plan version from field or title, defaulting to 1"
            .to_string(),
    });
    1
}

fn decode_tasks(lines: &[String], warnings: &mut Vec<ParseWarning>) -> Vec<Task> {
    let mut tasks = Vec::new();
    let mut current: Option<Vec<String>> = None;

    let mut blocks: Vec<Vec<String>> = Vec::new();
    for line in lines {
        if line.trim_start().starts_with("### Task") {
            if let Some(block) = current.take() {
                blocks.push(block);
            }
            current = Some(vec![line.clone()]);
        } else if let Some(block) = current.as_mut() {
            block.push(line.clone());
        }
    }
    if let Some(block) = current.take() {
        blocks.push(block);
    }

    for block in blocks {
        match decode_one_task(&block) {
            Some(task) => tasks.push(task),
            None => warnings.push(ParseWarning {
                context: "plan.tasks".to_string(),
                message: format!(
                    "dropping malformed task header {:?}",
                    block.first().cloned().unwrap_or_default()
                ),
            }),
        }
    }
    tasks
}

fn decode_one_task(block: &[String]) -> Option<Task> {
    let header = block.first()?;
    // A well-formed header is "### Task <id>"; anything else (missing id,
    // non-numeric id) is treated as malformed and the task is dropped.
    let header_id = header
        .trim_start()
        .strip_prefix("### Task")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<u64>().ok());
    header_id?;

    let body = &block[1..];
    let id = extract_field(body, "ID")?.parse::<u64>().ok()?;
    let description = extract_field(body, "Description").unwrap_or_default();
    let status = extract_field(body, "Status")
        .and_then(|s| s.parse::<TaskStatus>().ok())
        .unwrap_or(TaskStatus::Pending);
    let mut dep_warnings = Vec::new();
    let depends_on = extract_field(body, "Depends on")
        .map(|raw| super::parse_id_csv(&raw, "plan.task.depends_on", &mut dep_warnings))
        .unwrap_or_default();
    let key_files = extract_field(body, "Key files")
        .map(|raw| {
            if raw.trim().eq_ignore_ascii_case("none") || raw.trim().is_empty() {
                Vec::new()
            } else {
                raw.split(',').map(|s| s.trim().to_string()).collect()
            }
        })
        .unwrap_or_default();
    let priority = extract_field(body, "Priority")
        .and_then(|s| s.parse::<Priority>().ok())
        .unwrap_or_default();
    let gate_command = extract_field(body, "Gate command")
        .filter(|s| !s.trim().is_empty() && !s.trim().eq_ignore_ascii_case("none"));

    Some(Task {
        id,
        description,
        status,
        depends_on,
        key_files,
        priority,
        estimated_time: None,
        gate_command,
    })
}
