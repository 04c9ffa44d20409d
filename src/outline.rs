//! Flattened, indented view of the task tree.
//!
//! The tree snapshot is never mutated; what the user toggles (collapsed
//! nodes, open detail panels) lives in a [`ViewState`] keyed by task id.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::error::{Error, Result};
use crate::model::TaskNode;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeUiState {
    pub collapsed: bool,
    pub panel_open: bool,
}

/// Per-node interaction state. Nodes without an entry are expanded with
/// their panel closed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewState {
    nodes: HashMap<i64, NodeUiState>,
}

impl ViewState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_ids(
        collapsed: impl IntoIterator<Item = i64>,
        open: impl IntoIterator<Item = i64>,
    ) -> Self {
        let mut state = Self::new();
        for id in collapsed {
            state.set_expanded(id, false);
        }
        for id in open {
            state.entry(id).panel_open = true;
        }
        state
    }

    fn entry(&mut self, id: i64) -> &mut NodeUiState {
        self.nodes.entry(id).or_default()
    }

    fn get(&self, id: i64) -> NodeUiState {
        self.nodes.get(&id).copied().unwrap_or_default()
    }

    pub fn is_expanded(&self, id: i64) -> bool {
        !self.get(id).collapsed
    }

    pub fn is_panel_open(&self, id: i64) -> bool {
        self.get(id).panel_open
    }

    pub fn set_expanded(&mut self, id: i64, expanded: bool) {
        self.entry(id).collapsed = !expanded;
    }

    /// Forget state for nodes that are no longer in `tree`.
    pub fn retain_present(&mut self, tree: &[TaskNode]) {
        let mut present = HashSet::new();
        for root in tree {
            root.walk(&mut |node, _| {
                present.insert(node.task.id);
            });
        }
        self.nodes.retain(|id, _| present.contains(id));
    }
}

/// One visible line of the outline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutlineRow {
    pub id: i64,
    pub title: String,
    pub done: bool,
    pub assignee: Option<String>,
    pub deadline: Option<String>,
    pub depth: usize,
    pub has_children: bool,
    pub expanded: bool,
    pub panel_open: bool,
    /// Box-drawing connector drawn before the title.
    pub prefix: String,
}

/// Flatten `tree` into visible rows. Children of collapsed nodes are
/// skipped.
pub fn outline(tree: &[TaskNode], state: &ViewState) -> Vec<OutlineRow> {
    let mut rows = Vec::new();
    for (i, root) in tree.iter().enumerate() {
        let is_last = i == tree.len() - 1;
        outline_node(&mut rows, root, state, 0, &mut vec![is_last]);
    }
    rows
}

fn outline_node(
    rows: &mut Vec<OutlineRow>,
    node: &TaskNode,
    state: &ViewState,
    depth: usize,
    is_last_at_depth: &mut Vec<bool>,
) {
    let id = node.task.id;
    let has_children = !node.children.is_empty();
    let expanded = state.is_expanded(id);

    rows.push(OutlineRow {
        id,
        title: node.task.title.clone(),
        done: node.task.done,
        assignee: node.task.assignee.clone(),
        deadline: node.task.deadline.clone(),
        depth,
        has_children,
        expanded,
        panel_open: state.is_panel_open(id),
        prefix: tree_prefix(is_last_at_depth),
    });

    if has_children && expanded {
        for (i, child) in node.children.iter().enumerate() {
            is_last_at_depth.push(i == node.children.len() - 1);
            outline_node(rows, child, state, depth + 1, is_last_at_depth);
            is_last_at_depth.pop();
        }
    }
}

/// Connector prefix for a row whose ancestry (root first) ends in
/// `is_last_at_depth`.
fn tree_prefix(is_last_at_depth: &[bool]) -> String {
    let depth = is_last_at_depth.len() - 1;
    let mut prefix = String::new();
    for d in 1..depth + 1 {
        if d == depth {
            if is_last_at_depth[d] {
                prefix.push_str("└── ");
            } else {
                prefix.push_str("├── ");
            }
        } else if is_last_at_depth[d] {
            prefix.push_str("    ");
        } else {
            prefix.push_str("│   ");
        }
    }
    prefix
}

/// Plain-text rendering, one row per line.
pub fn render_text(rows: &[OutlineRow]) -> String {
    let mut out = String::new();
    for row in rows {
        let marker = match (row.has_children, row.expanded) {
            (true, false) => "+ ",
            _ => "",
        };
        let icon = if row.done { "x" } else { "." };
        out.push_str(&format!("{}{}{} {}\n", row.prefix, marker, icon, row.title));
    }
    out
}

/// Parse a comma-separated id list such as `3,14,15`. Empty input is an
/// empty list.
pub fn parse_id_list(raw: &str) -> Result<Vec<i64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().map_err(|_| Error::Invalid("invalid_id_list")))
        .collect()
}
