//! Tree assembly over the flat parent-pointer rows of the `tasks` table.
//!
//! Everything here is pure: the store hands over every row and nothing in
//! this module touches the database.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::error::{Error, Result};
use crate::model::{Task, TaskNode};

type ChildrenMap = HashMap<Option<i64>, Vec<Task>>;

/// Sibling order: open tasks first, then oldest first. `id` breaks ties so
/// the order is total.
fn sibling_order(a: &Task, b: &Task) -> Ordering {
    a.done
        .cmp(&b.done)
        .then(a.created_at.cmp(&b.created_at))
        .then(a.id.cmp(&b.id))
}

/// Build an ordered forest from unordered task rows.
///
/// Tasks whose parent is not among `tasks` are promoted to roots. Rows that
/// are only reachable through a parent cycle are promoted as well, so every
/// input row appears in the output exactly once.
pub fn build_tree(tasks: Vec<Task>) -> Vec<TaskNode> {
    let ids: HashSet<i64> = tasks.iter().map(|t| t.id).collect();

    let mut children_map: ChildrenMap = HashMap::new();
    for task in tasks {
        let parent_key = match task.parent_id {
            Some(p) if p != task.id && ids.contains(&p) => Some(p),
            _ => None,
        };
        children_map.entry(parent_key).or_default().push(task);
    }

    let mut roots: Vec<TaskNode> = children_map
        .remove(&None)
        .unwrap_or_default()
        .into_iter()
        .map(|task| attach(task, &mut children_map))
        .collect();

    while let Some(task) = take_cycle_member(&mut children_map) {
        roots.push(attach(task, &mut children_map));
    }

    sort_level(&mut roots);
    roots
}

fn attach(task: Task, children_map: &mut ChildrenMap) -> TaskNode {
    let mut children: Vec<TaskNode> = children_map
        .remove(&Some(task.id))
        .unwrap_or_default()
        .into_iter()
        .map(|child| attach(child, children_map))
        .collect();
    sort_level(&mut children);
    TaskNode { task, children }
}

fn sort_level(nodes: &mut [TaskNode]) {
    nodes.sort_by(|a, b| sibling_order(&a.task, &b.task));
}

/// Pull the first (by sibling order) row still left after attaching every
/// root. Such rows hang off each other in a cycle.
fn take_cycle_member(children_map: &mut ChildrenMap) -> Option<Task> {
    children_map.retain(|_, list| !list.is_empty());
    let (key, index) = children_map
        .iter()
        .flat_map(|(key, list)| list.iter().enumerate().map(move |(i, t)| (*key, i, t)))
        .min_by(|a, b| sibling_order(a.2, b.2))
        .map(|(key, i, _)| (key, i))?;
    let list = children_map.get_mut(&key)?;
    Some(list.remove(index))
}

/// Collect `root` and all of its transitive descendants.
///
/// `links` holds `(id, parent_id)` for every row. `root` is always the first
/// element, even when no row carries that id.
pub fn collect_subtree(links: &[(i64, Option<i64>)], root: i64) -> Vec<i64> {
    let mut children: HashMap<i64, Vec<i64>> = HashMap::new();
    for &(id, parent) in links {
        if let Some(p) = parent {
            children.entry(p).or_default().push(id);
        }
    }

    let mut seen = HashSet::new();
    let mut result = Vec::new();
    let mut stack = vec![root];
    while let Some(current) = stack.pop() {
        if !seen.insert(current) {
            continue;
        }
        result.push(current);
        if let Some(kids) = children.get(&current) {
            stack.extend(kids.iter().rev().copied());
        }
    }
    result
}

/// Pre-order flattening of a forest.
pub fn flatten(tree: &[TaskNode]) -> Vec<&Task> {
    let mut out = Vec::new();
    for root in tree {
        root.walk(&mut |node, _| out.push(&node.task));
    }
    out
}

/// First title word that files a root tree under the operational section.
pub const OPERATIONAL_MARKER: &str = "ОПЕРАТИВНЫЕ";

/// Which tab a root tree belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    Tasks,
    Operational,
}

impl Section {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "tasks" => Ok(Self::Tasks),
            "operational" => Ok(Self::Operational),
            _ => Err(Error::Invalid("invalid_section")),
        }
    }

    /// Section of the tree whose root is `root`.
    pub fn of(root: &Task) -> Self {
        if root.title.split_whitespace().next() == Some(OPERATIONAL_MARKER) {
            Self::Operational
        } else {
            Self::Tasks
        }
    }
}

/// Keep only the root trees filed under `section`, preserving order.
pub fn filter_section(tree: Vec<TaskNode>, section: Section) -> Vec<TaskNode> {
    tree.into_iter()
        .filter(|root| Section::of(&root.task) == section)
        .collect()
}

/// The root tree that contains `id`.
pub fn root_of(tree: &[TaskNode], id: i64) -> Option<&TaskNode> {
    tree.iter().find(|root| root.find(id).is_some())
}
