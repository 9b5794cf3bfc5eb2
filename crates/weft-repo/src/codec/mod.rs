//! Commit Codec (C1): pure encode/decode between domain types and the
//! headed-section commit message grammar used on `plan/*` and `task/*`
//! branches.
//!
//! Nothing in this module touches git or the filesystem; `RepositoryGateway`
//! is the only caller that reads/writes actual commits.

pub mod merge;
pub mod model;
pub mod plan;
pub mod task_init;
pub mod worker_commit;

pub use model::*;

/// A commit message split into its title and an ordered list of `## `
/// sections. Sections whose header this codec does not recognize are kept
/// verbatim (as `raw`) so a re-encode of the same logical entity reproduces
/// them — the codec's forward-compatibility contract.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub header: String,
    pub lines: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommitDoc {
    pub title: String,
    pub sections: Vec<Section>,
}

/// Splits a commit message into title + `## `-headed sections. Blank line(s)
/// after the title are not significant; everything up to the first `## `
/// header is the title (joined with spaces if it spans lines, though in
/// practice titles are single-line).
pub fn parse_commit_doc(message: &str) -> CommitDoc {
    let mut lines = message.lines();
    let title = lines.next().unwrap_or("").trim().to_string();

    let mut sections: Vec<Section> = Vec::new();
    let mut current: Option<Section> = None;

    for line in lines {
        if let Some(header) = line.strip_prefix("## ") {
            if let Some(sec) = current.take() {
                sections.push(sec);
            }
            current = Some(Section {
                header: header.trim().to_string(),
                lines: Vec::new(),
            });
        } else if let Some(sec) = current.as_mut() {
            sec.lines.push(line.to_string());
        }
        // Lines before the first "## " header (besides the title) are
        // intentionally dropped: the grammar has no free-text preamble.
    }
    if let Some(sec) = current.take() {
        sections.push(sec);
    }

    CommitDoc { title, sections }
}

/// Renders a `CommitDoc` back to commit message text.
pub fn render_commit_doc(doc: &CommitDoc) -> String {
    let mut out = String::new();
    out.push_str(doc.title.trim_end());
    out.push('\n');
    for section in &doc.sections {
        out.push('\n');
        out.push_str("## ");
        out.push_str(&section.header);
        out.push('\n');
        for line in &section.lines {
            out.push_str(line);
            out.push('\n');
        }
    }
    // Trim the final trailing blank line introduced by the loop above; git
    // strips trailing whitespace from commit messages anyway, but keeping
    // the in-memory representation tidy makes round-trip tests exact.
    while out.ends_with("\n\n") {
        out.pop();
    }
    out
}

fn section_lines<'a>(doc: &'a CommitDoc, header: &str) -> Option<&'a [String]> {
    doc.sections
        .iter()
        .find(|s| s.header.eq_ignore_ascii_case(header))
        .map(|s| s.lines.as_slice())
}

/// `Key: Value` extraction within a section's lines. Returns the trimmed
/// value of the first matching line, or `None` if absent.
fn extract_field(lines: &[String], key: &str) -> Option<String> {
    let prefix = format!("{key}:");
    lines.iter().find_map(|l| {
        let trimmed = l.trim_start();
        trimmed
            .strip_prefix(&prefix)
            .map(|rest| rest.trim().to_string())
    })
}

/// Collects `- `/`* ` bullet items following a `{label}:` marker line, up to
/// the next non-bullet, non-blank line (or end of section). If `label` is
/// empty, scans the whole section for bullets instead of anchoring on a
/// marker line (used for sections that are bullets-only, like `## Provides`).
fn extract_list(lines: &[String], label: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut in_list = label.is_empty();
    let marker = format!("{label}:");

    for line in lines {
        let trimmed = line.trim();
        if !in_list {
            if trimmed == marker.as_str() || trimmed.starts_with(&marker) {
                in_list = true;
            }
            continue;
        }
        if let Some(item) = bullet_item(trimmed) {
            items.push(item.to_string());
        } else if trimmed.is_empty() {
            continue;
        } else if !label.is_empty() {
            // Anchored list ends at the first non-bullet line.
            break;
        }
    }
    items
}

fn bullet_item(trimmed: &str) -> Option<&str> {
    trimmed
        .strip_prefix("- ")
        .or_else(|| trimmed.strip_prefix("* "))
        .map(str::trim)
}

/// Parses a `[a, b, c]` or comma-separated id list, tolerating `None`/empty.
/// Non-numeric entries are dropped with a warning pushed to `warnings`.
fn parse_id_csv(raw: &str, context: &str, warnings: &mut Vec<ParseWarning>) -> Vec<TaskId> {
    let inner = raw.trim().trim_start_matches('[').trim_end_matches(']');
    if inner.trim().is_empty() || inner.trim().eq_ignore_ascii_case("none") {
        return Vec::new();
    }
    inner
        .split(',')
        .filter_map(|piece| {
            let piece = piece.trim();
            if piece.is_empty() {
                return None;
            }
            match piece.parse::<TaskId>() {
                Ok(id) => Some(id),
                Err(_) => {
                    warnings.push(ParseWarning {
                        context: context.to_string(),
                        message: format!("ignoring non-numeric id {piece:?}"),
                    });
                    None
                }
            }
        })
        .collect()
}

fn render_id_csv(ids: &[TaskId]) -> String {
    if ids.is_empty() {
        return "None".to_string();
    }
    ids.iter()
        .map(TaskId::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn render_bracket_csv(ids: &[TaskId]) -> String {
    format!(
        "[{}]",
        ids.iter().map(TaskId::to_string).collect::<Vec<_>>().join(", ")
    )
}
