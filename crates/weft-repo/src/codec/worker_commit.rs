//! Decode (and, for tests and the subprocess harness fixture, encode) of
//! worker progress commits: title `[task-<id>] <Initialize|Implement>:
//! <step-description> (<k>/<total>)` plus the `## Implementation`, `##
//! Design`, `## TODO List`, `## Progress` sections.

use super::model::{CommitKind, DesignSection, ParseWarning, Progress, TaskStatus, TodoItem, WorkerCommit};
use super::{extract_field, parse_commit_doc, render_commit_doc, section_lines, CommitDoc, Section};

pub fn encode_worker_commit(step_desc: &str, commit: &WorkerCommit) -> String {
    let verb = match commit.commit_kind {
        CommitKind::InitialDesign => "Initialize",
        CommitKind::Implementation | CommitKind::Unknown => "Implement",
    };
    let (k, total) = commit.step.unwrap_or((commit.progress.done, commit.progress.total));
    let title = format!("[task-{}] {verb}: {step_desc} ({k}/{total})", commit.task_id);

    let mut todo_lines = Vec::new();
    for item in &commit.todos {
        let mark = if item.done { "x" } else { " " };
        todo_lines.push(format!("{}. [{mark}] {}", item.n, item.description));
    }

    let progress_lines = vec![
        format!("Status: {}", commit.progress.status),
        format!("Completed: {}/{} tasks", commit.progress.done, commit.progress.total),
    ];

    let mut design_lines = vec!["### Overview".to_string()];
    design_lines.extend(commit.design.overview.lines().map(str::to_string));
    design_lines.push(String::new());
    design_lines.push("### Architecture Decisions".to_string());
    for d in &commit.design.decisions {
        design_lines.push(format!("- {d}"));
    }
    design_lines.push(String::new());
    design_lines.push("### Interfaces Provided".to_string());
    for i in &commit.design.interfaces {
        design_lines.push(format!("- {i}"));
    }

    let doc = CommitDoc {
        title,
        sections: vec![
            Section {
                header: "Implementation".to_string(),
                lines: commit.implementation_text.lines().map(str::to_string).collect(),
            },
            Section {
                header: "Design".to_string(),
                lines: design_lines,
            },
            Section {
                header: "TODO List".to_string(),
                lines: todo_lines,
            },
            Section {
                header: "Progress".to_string(),
                lines: progress_lines,
            },
        ],
    };

    render_commit_doc(&doc)
}

pub fn decode_worker_commit(message: &str) -> (WorkerCommit, Vec<ParseWarning>) {
    let doc = parse_commit_doc(message);
    let mut warnings = Vec::new();

    let (task_id, commit_kind, step) = decode_title(&doc.title, &mut warnings);

    let implementation_text = section_lines(&doc, "Implementation")
        .map(|l| l.join("\n").trim().to_string())
        .unwrap_or_default();

    let design = decode_design(&doc);
    let todos = decode_todos(section_lines(&doc, "TODO List").unwrap_or(&[]), &mut warnings);
    let progress = decode_progress(
        section_lines(&doc, "Progress").unwrap_or(&[]),
        &todos,
        &mut warnings,
    );

    let commit = WorkerCommit {
        task_id,
        commit_kind,
        step,
        implementation_text,
        design,
        todos,
        progress,
    };
    (commit, warnings)
}

fn decode_title(title: &str, warnings: &mut Vec<ParseWarning>) -> (u64, CommitKind, Option<(u32, u32)>) {
    let task_id = title
        .split_once("[task-")
        .and_then(|(_, rest)| rest.split_once(']'))
        .and_then(|(id, _)| id.trim().parse::<u64>().ok())
        .unwrap_or_else(|| {
            warnings.push(ParseWarning {
                context: "worker_commit.title".to_string(),
                message: format!("could not find [task-<id>] in title {title:?}, defaulting to 0"),
            });
            0
        });

    let commit_kind = if title.contains("] Initialize:") {
        CommitKind::InitialDesign
    } else if title.contains("] Implement:") {
        CommitKind::Implementation
    } else {
        warnings.push(ParseWarning {
            context: "worker_commit.title".to_string(),
            message: format!("unrecognized commit verb in title {title:?}"),
        });
        CommitKind::Unknown
    };

    let step = title
        .rsplit_once('(')
        .and_then(|(_, rest)| rest.strip_suffix(')'))
        .and_then(|inner| inner.split_once('/'))
        .and_then(|(k, total)| Some((k.trim().parse::<u32>().ok()?, total.trim().parse::<u32>().ok()?)));

    (task_id, commit_kind, step)
}

fn decode_design(doc: &CommitDoc) -> DesignSection {
    let lines = section_lines(doc, "Design").unwrap_or(&[]);
    let mut overview = Vec::new();
    let mut decisions = Vec::new();
    let mut interfaces = Vec::new();

    #[derive(Clone, Copy, PartialEq)]
    enum Sub {
        None,
        Overview,
        Decisions,
        Interfaces,
    }
    let mut sub = Sub::None;

    for line in lines {
        let trimmed = line.trim();
        if trimmed.eq_ignore_ascii_case("### Overview") {
            sub = Sub::Overview;
            continue;
        } else if trimmed.eq_ignore_ascii_case("### Architecture Decisions") {
            sub = Sub::Decisions;
            continue;
        } else if trimmed.eq_ignore_ascii_case("### Interfaces Provided") {
            sub = Sub::Interfaces;
            continue;
        }
        match sub {
            Sub::Overview => {
                if !trimmed.is_empty() {
                    overview.push(line.clone());
                }
            }
            Sub::Decisions => {
                if let Some(item) = trimmed.strip_prefix("- ").or_else(|| trimmed.strip_prefix("* ")) {
                    decisions.push(item.trim().to_string());
                }
            }
            Sub::Interfaces => {
                if let Some(item) = trimmed.strip_prefix("- ").or_else(|| trimmed.strip_prefix("* ")) {
                    interfaces.push(item.trim().to_string());
                }
            }
            Sub::None => {}
        }
    }

    DesignSection {
        overview: overview.join("\n").trim().to_string(),
        decisions,
        interfaces,
    }
}

/// Numbering is by the explicit `N.` prefix, never by list position: a
/// renumbered or gapped TODO list still decodes each item under its stated
/// number.
fn decode_todos(lines: &[String], warnings: &mut Vec<ParseWarning>) -> Vec<TodoItem> {
    let mut todos = Vec::new();
    for line in lines {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let Some((n_str, rest)) = trimmed.split_once('.') else {
            warnings.push(ParseWarning {
                context: "worker_commit.todos".to_string(),
                message: format!("ignoring unnumbered TODO line {trimmed:?}"),
            });
            continue;
        };
        let Ok(n) = n_str.trim().parse::<u32>() else {
            warnings.push(ParseWarning {
                context: "worker_commit.todos".to_string(),
                message: format!("ignoring TODO line with non-numeric prefix {trimmed:?}"),
            });
            continue;
        };
        let rest = rest.trim();
        let (done, description) = if let Some(d) = rest.strip_prefix("[x]") {
            (true, d.trim().to_string())
        } else if let Some(d) = rest.strip_prefix("[ ]") {
            (false, d.trim().to_string())
        } else {
            (false, rest.to_string())
        };
        todos.push(TodoItem { n, description, done });
    }
    todos
}

/// `Completed: N/M` is authoritative; if it disagrees with counting `[x]`
/// items, `Completed:` wins and the discrepancy is surfaced as a warning.
fn decode_progress(
    lines: &[String],
    todos: &[TodoItem],
    warnings: &mut Vec<ParseWarning>,
) -> Progress {
    let status = extract_field(lines, "Status")
        .and_then(|s| s.parse::<TaskStatus>().ok())
        .unwrap_or(TaskStatus::InProgress);

    let (done, total) = extract_field(lines, "Completed")
        .and_then(|raw| {
            let raw = raw.trim().trim_end_matches("tasks").trim();
            raw.split_once('/')
        })
        .and_then(|(d, t)| Some((d.trim().parse::<u32>().ok()?, t.trim().parse::<u32>().ok()?)))
        .unwrap_or_else(|| {
            let total = todos.len() as u32;
            let done = todos.iter().filter(|t| t.done).count() as u32;
            warnings.push(ParseWarning {
                context: "worker_commit.progress".to_string(),
                message: "missing/unparseable Completed: line, falling back to counting [x] items"
                    .to_string(),
            });
            (done, total)
        });

    let counted_done = todos.iter().filter(|t| t.done).count() as u32;
    if counted_done != done && !todos.is_empty() {
        warnings.push(ParseWarning {
            context: "worker_commit.progress".to_string(),
            message: format!(
                "Completed: line says {done} done but counting [x] items gives {counted_done}; using Completed: line"
            ),
        });
    }

    Progress { status, done, total }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> WorkerCommit {
        WorkerCommit {
            task_id: 4,
            commit_kind: CommitKind::Implementation,
            step: Some((2, 3)),
            implementation_text: "Wired the router.".to_string(),
            design: DesignSection {
                overview: "Thin adapter over the existing handler.".to_string(),
                decisions: vec!["Use trait objects for dispatch".to_string()],
                interfaces: vec!["pub fn route(req) -> Response".to_string()],
            },
            todos: vec![
                TodoItem { n: 1, description: "Add router".to_string(), done: true },
                TodoItem { n: 2, description: "Add tests".to_string(), done: false },
            ],
            progress: Progress { status: TaskStatus::InProgress, done: 1, total: 2 },
        }
    }

    #[test]
    fn roundtrips() {
        let commit = sample();
        let encoded = encode_worker_commit("wire the router", &commit);
        let (decoded, warnings) = decode_worker_commit(&encoded);
        assert!(warnings.is_empty(), "unexpected warnings: {warnings:?}");
        assert_eq!(decoded, commit);
    }

    #[test]
    fn title_format_matches_grammar() {
        let commit = sample();
        let encoded = encode_worker_commit("wire the router", &commit);
        let title = encoded.lines().next().unwrap();
        assert_eq!(title, "[task-4] Implement: wire the router (2/3)");
    }

    #[test]
    fn completed_line_wins_over_counting_checkboxes() {
        let msg = "[task-1] Implement: step (1/1)\n\n\
            ## Implementation\ndid stuff\n\n\
            ## Design\n### Overview\n\n### Architecture Decisions\n\n### Interfaces Provided\n\n\
            ## TODO List\n1. [x] a\n2. [x] b\n\n\
            ## Progress\nStatus: in_progress\nCompleted: 1/2 tasks\n";
        let (commit, warnings) = decode_worker_commit(msg);
        assert_eq!(commit.progress.done, 1);
        assert_eq!(commit.progress.total, 2);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn numbering_is_by_explicit_prefix_not_position() {
        let msg = "[task-1] Implement: step (0/2)\n\n\
            ## Implementation\n\n\
            ## Design\n### Overview\n\n### Architecture Decisions\n\n### Interfaces Provided\n\n\
            ## TODO List\n5. [ ] fifth item kept as 5\n1. [ ] first item kept as 1\n\n\
            ## Progress\nStatus: pending\nCompleted: 0/2 tasks\n";
        let (commit, _) = decode_worker_commit(msg);
        assert_eq!(commit.todos[0].n, 5);
        assert_eq!(commit.todos[1].n, 1);
    }

    #[test]
    fn unrecognized_verb_yields_unknown_kind_and_warning() {
        let msg = "[task-1] Finish: step (1/1)\n\n## Progress\nStatus: completed\nCompleted: 1/1 tasks\n";
        let (commit, warnings) = decode_worker_commit(msg);
        assert_eq!(commit.commit_kind, CommitKind::Unknown);
        assert!(warnings.iter().any(|w| w.message.contains("unrecognized commit verb")));
    }
}
