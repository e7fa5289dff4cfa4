//! Per render pass view of the active tab. Everything here is derived from a
//! `Tab` and can be thrown away and rebuilt at any time.

use agentview_core::diff::{
    build_side_by_side, classify, normalize, FoldConfig, FoldState, HunkNavigator, SideBySide,
};
use agentview_core::{Tab, TabType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffView {
    pub tab_id: String,
    pub title: String,
    pub left_label: Option<String>,
    pub right_label: Option<String>,
    pub rows: SideBySide,
    pub folds: FoldState,
    pub nav: HunkNavigator,
}

impl DiffView {
    pub fn build(tab: &Tab, config: FoldConfig) -> Option<Self> {
        if !classify(&tab.content).is_diff() {
            return None;
        }
        let normalized = normalize(&tab.content);
        let rows = build_side_by_side(&normalized, tab.language_hint());
        if rows.hunk_count() == 0 {
            return None;
        }
        let classes = rows.row_classes();
        let meta = tab.diff.as_ref();
        Some(Self {
            tab_id: tab.id.clone(),
            title: tab.title.clone(),
            left_label: meta.and_then(|meta| meta.left_label.clone()),
            right_label: meta.and_then(|meta| meta.right_label.clone()),
            folds: FoldState::new(&classes, config),
            nav: HunkNavigator::from_classes(&classes),
            rows,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderedTab {
    Empty,
    Text {
        tab_id: String,
        title: String,
        tab_type: TabType,
        language: Option<String>,
        body: String,
    },
    Diff(DiffView),
}

impl RenderedTab {
    pub fn tab_id(&self) -> Option<&str> {
        match self {
            RenderedTab::Empty => None,
            RenderedTab::Text { tab_id, .. } => Some(tab_id),
            RenderedTab::Diff(view) => Some(&view.tab_id),
        }
    }

    pub fn diff(&self) -> Option<&DiffView> {
        match self {
            RenderedTab::Diff(view) => Some(view),
            _ => None,
        }
    }

    pub fn diff_mut(&mut self) -> Option<&mut DiffView> {
        match self {
            RenderedTab::Diff(view) => Some(view),
            _ => None,
        }
    }
}

/// Diff tabs whose text has no usable hunks fall back to literal text.
pub fn render_tab(tab: Option<&Tab>, config: FoldConfig) -> RenderedTab {
    let Some(tab) = tab else {
        return RenderedTab::Empty;
    };
    if tab.tab_type.is_diff() {
        if let Some(view) = DiffView::build(tab, config) {
            return RenderedTab::Diff(view);
        }
    }
    RenderedTab::Text {
        tab_id: tab.id.clone(),
        title: tab.title.clone(),
        tab_type: tab.tab_type,
        language: tab.language_hint().map(str::to_string),
        body: tab.content.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentview_core::diff::VisibleRow;

    fn diff_tab(content: &str) -> Tab {
        Tab::new("d", "change.rs", TabType::Diff, content)
    }

    #[test]
    fn empty_when_nothing_is_active() {
        assert_eq!(render_tab(None, FoldConfig::default()), RenderedTab::Empty);
    }

    #[test]
    fn non_diff_text_in_diff_tab_degrades_to_text() {
        let rendered = render_tab(Some(&diff_tab("just words")), FoldConfig::default());
        match rendered {
            RenderedTab::Text { body, tab_type, .. } => {
                assert_eq!(body, "just words");
                assert_eq!(tab_type, TabType::Diff);
            }
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[test]
    fn bare_diff_body_renders_side_by_side() {
        let rendered = render_tab(Some(&diff_tab("-a\n+b\n c")), FoldConfig::default());
        let view = rendered.diff().expect("diff view");
        assert_eq!(view.rows.len(), 3);
        assert_eq!(view.nav.total(), 1);
    }

    #[test]
    fn long_context_is_folded_between_change_groups() {
        let mut body = String::from("@@ -1,30 +1,30 @@\n-x\n+y\n");
        for idx in 0..20 {
            body.push_str(&format!(" line {idx}\n"));
        }
        body.push_str("-p\n+q\n");
        let rendered = render_tab(Some(&diff_tab(&body)), FoldConfig::default());
        let mut view = rendered.diff().cloned().expect("diff view");
        assert_eq!(view.folds.folds().len(), 1);
        assert_eq!(view.nav.total(), 2);
        assert!(view
            .folds
            .visible_rows()
            .contains(&VisibleRow::Marker(0)));

        view.nav.next();
        assert!(!view.folds.folds()[0].expanded);
        let last = view.nav.next().expect("second group");
        assert_eq!(last.start, view.rows.len() - 1);
        assert_eq!(view.nav.position_label(), "2/2");
    }

    #[test]
    fn text_tabs_keep_language_hint() {
        let tab = Tab::new("c", "main.go", TabType::Code, "package main").with_language("go");
        match render_tab(Some(&tab), FoldConfig::default()) {
            RenderedTab::Text { language, .. } => assert_eq!(language.as_deref(), Some("go")),
            other => panic!("expected text, got {other:?}"),
        }
    }
}
