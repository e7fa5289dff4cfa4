//! Line oriented front end: stdin commands in, plain text out.

use crate::registry::TabRegistry;
use crate::view::{DiffView, RenderedTab};
use agentview_core::diff::{DiffLine, DiffLineKind, VisibleRow};

pub const DEFAULT_WIDTH: usize = 160;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    List,
    Show,
    Activate(String),
    Close(Option<String>),
    Reopen,
    NextHunk,
    PrevHunk,
    NextTab,
    PrevTab,
    Expand(usize),
    Collapse(usize),
    Help,
    Quit,
}

pub const HELP: &str = "commands: list | show | activate <id|#> | close [id] | reopen | next | prev | nexttab | prevtab | expand <n> | collapse <n> | help | quit";

pub fn parse_command(line: &str) -> Result<UserCommand, String> {
    let mut parts = line.split_whitespace();
    let Some(verb) = parts.next() else {
        return Ok(UserCommand::Show);
    };
    let arg = parts.next();
    let fold_index = |arg: Option<&str>| -> Result<usize, String> {
        arg.ok_or_else(|| format!("{verb} needs a fold number"))?
            .parse::<usize>()
            .map_err(|_| format!("{verb} needs a fold number"))
    };
    match verb.to_lowercase().as_str() {
        "list" | "ls" => Ok(UserCommand::List),
        "show" => Ok(UserCommand::Show),
        "activate" | "a" => arg
            .map(|id| UserCommand::Activate(id.to_string()))
            .ok_or_else(|| "activate needs a tab id".to_string()),
        "close" | "c" => Ok(UserCommand::Close(arg.map(str::to_string))),
        "reopen" | "r" => Ok(UserCommand::Reopen),
        "next" | "n" => Ok(UserCommand::NextHunk),
        "prev" | "p" => Ok(UserCommand::PrevHunk),
        "nexttab" => Ok(UserCommand::NextTab),
        "prevtab" => Ok(UserCommand::PrevTab),
        "expand" | "e" => fold_index(arg).map(UserCommand::Expand),
        "collapse" => fold_index(arg).map(UserCommand::Collapse),
        "help" | "?" => Ok(UserCommand::Help),
        "quit" | "q" | "exit" => Ok(UserCommand::Quit),
        other => Err(format!("unknown command: {other}")),
    }
}

/// Resolves `#n` (1-based position) or a literal id against the registry.
pub fn resolve_tab_ref(registry: &TabRegistry, reference: &str) -> Option<String> {
    if let Some(position) = reference.strip_prefix('#') {
        let idx = position.parse::<usize>().ok()?.checked_sub(1)?;
        return registry.tabs().get(idx).map(|tab| tab.id.clone());
    }
    registry.get(reference).map(|tab| tab.id.clone())
}

pub fn list_lines(registry: &TabRegistry) -> Vec<String> {
    if registry.is_empty() {
        return vec!["(no tabs)".to_string()];
    }
    registry
        .tabs()
        .iter()
        .enumerate()
        .map(|(idx, tab)| {
            let marker = if registry.active_id() == Some(tab.id.as_str()) {
                '*'
            } else {
                ' '
            };
            format!(
                "{marker} #{:<3} {:<18} {:<9} {}",
                idx + 1,
                tab.id,
                tab.tab_type,
                tab.title
            )
        })
        .collect()
}

pub fn render_lines(view: &RenderedTab, width: usize) -> Vec<String> {
    match view {
        RenderedTab::Empty => vec!["(no active tab)".to_string()],
        RenderedTab::Text {
            title,
            tab_type,
            language,
            body,
            ..
        } => {
            let mut lines = vec![match language {
                Some(language) => format!("== {title} [{tab_type}, {language}] =="),
                None => format!("== {title} [{tab_type}] =="),
            }];
            lines.extend(body.lines().map(str::to_string));
            lines
        }
        RenderedTab::Diff(diff) => diff_lines(diff, width),
    }
}

fn diff_lines(diff: &DiffView, width: usize) -> Vec<String> {
    let column = width.saturating_sub(3) / 2;
    let mut lines = Vec::with_capacity(diff.rows.len() + 2);
    lines.push(format!(
        "== {} [diff{}] hunk {} ==",
        diff.title,
        diff.rows
            .language
            .as_deref()
            .map(|lang| format!(", {lang}"))
            .unwrap_or_default(),
        diff.nav.position_label()
    ));
    if diff.left_label.is_some() || diff.right_label.is_some() {
        lines.push(format!(
            "  {:<column$} | {}",
            diff.left_label.as_deref().unwrap_or(""),
            diff.right_label.as_deref().unwrap_or("")
        ));
    }
    let current = diff.nav.current();
    for row in diff.folds.visible_rows() {
        match row {
            VisibleRow::Marker(idx) => {
                let Some(fold) = diff.folds.fold(idx) else {
                    continue;
                };
                let action = if fold.expanded { "collapse" } else { "expand" };
                lines.push(format!("  ~~ {} ({action} {idx}) ~~", fold.label()));
            }
            VisibleRow::Row(idx) => {
                let left = &diff.rows.left[idx];
                let right = &diff.rows.right[idx];
                if left.kind == DiffLineKind::Hunk {
                    lines.push(format!("  {}", left.content));
                    continue;
                }
                let focus = current.is_some_and(|group| (group.start..group.end).contains(&idx));
                let gutter = if focus { '>' } else { ' ' };
                lines.push(format!(
                    "{gutter} {} | {}",
                    cell(left, column),
                    cell(right, column)
                ));
            }
        }
    }
    lines
}

fn cell(line: &DiffLine, width: usize) -> String {
    let sign = match line.kind {
        DiffLineKind::Add => '+',
        DiffLineKind::Delete => '-',
        _ => ' ',
    };
    let number = line
        .line_number
        .map(|n| n.to_string())
        .unwrap_or_default();
    let text = format!("{number:>5} {sign} {}", line.content);
    let mut text: String = text.chars().take(width).collect();
    let pad = width.saturating_sub(text.chars().count());
    text.extend(std::iter::repeat(' ').take(pad));
    text
}
