use serde::Serialize;

/// A row of the `tasks` table. Timestamps are Unix milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Task {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub title: String,
    pub assignee: Option<String>,
    pub deadline: Option<String>,
    pub description: Option<String>,
    pub done: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A task together with its ordered children.
#[derive(Debug, Clone, Serialize)]
pub struct TaskNode {
    #[serde(flatten)]
    pub task: Task,
    pub children: Vec<TaskNode>,
}

impl TaskNode {
    /// Number of nodes in this subtree, including `self`.
    pub fn subtree_len(&self) -> usize {
        1 + self.children.iter().map(TaskNode::subtree_len).sum::<usize>()
    }

    /// Pre-order walk over this subtree.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a TaskNode, usize)) {
        self.walk_at(0, visit);
    }

    fn walk_at<'a>(&'a self, depth: usize, visit: &mut impl FnMut(&'a TaskNode, usize)) {
        visit(self, depth);
        for child in &self.children {
            child.walk_at(depth + 1, visit);
        }
    }

    pub fn find(&self, id: i64) -> Option<&TaskNode> {
        if self.task.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WikiPage {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Wiki listing entry; content is fetched per page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WikiSummary {
    pub id: i64,
    pub title: String,
    pub created_at: i64,
    pub updated_at: i64,
}
