use serde::Serialize;

use crate::calendar::parse_deadline;
use crate::model::{Task, TaskNode};

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GanttRow {
    pub id: i64,
    pub title: String,
    pub assignee: Option<String>,
    pub depth: usize,
    /// Unix milliseconds.
    pub start: i64,
    pub end: i64,
    pub offset_days: i64,
    pub duration_days: i64,
    /// Bar position and size as percentages of the chart range.
    pub left: f64,
    pub width: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GanttChart {
    pub root_id: i64,
    pub title: String,
    pub start: i64,
    pub end: i64,
    pub range_days: i64,
    pub rows: Vec<GanttRow>,
}

/// Deadline as midnight UTC in Unix milliseconds.
fn deadline_ms(task: &Task) -> Option<i64> {
    let date = parse_deadline(task.deadline.as_deref()?)?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc().timestamp_millis())
}

/// Ceiling division for a positive divisor.
fn div_ceil(n: i64, d: i64) -> i64 {
    n.div_euclid(d) + i64::from(n.rem_euclid(d) != 0)
}

/// Chart the subtree under `root`, one row per task in pre-order.
///
/// A bar runs from creation to deadline. Tasks without a deadline, or
/// whose deadline precedes creation, get a one-day bar.
pub fn gantt(root: &TaskNode) -> GanttChart {
    let mut spans: Vec<(&Task, usize, i64, i64)> = Vec::new();
    root.walk(&mut |node, depth| {
        let start = node.task.created_at;
        let end = deadline_ms(&node.task).unwrap_or(start).max(start);
        spans.push((&node.task, depth, start, end));
    });

    let min_start = spans.iter().map(|s| s.2).min().unwrap_or(root.task.created_at);
    let mut max_end = spans.iter().map(|s| s.3).max().unwrap_or(min_start);
    if max_end == min_start {
        max_end = min_start + DAY_MS;
    }
    let range_days = div_ceil(max_end - min_start, DAY_MS).max(1);

    let rows = spans
        .into_iter()
        .map(|(task, depth, start, end)| {
            let offset_days = (start - min_start).div_euclid(DAY_MS);
            let duration_days = div_ceil(end - start, DAY_MS).max(1);
            GanttRow {
                id: task.id,
                title: task.title.clone(),
                assignee: task.assignee.clone(),
                depth,
                start,
                end,
                offset_days,
                duration_days,
                left: offset_days as f64 / range_days as f64 * 100.0,
                width: duration_days as f64 / range_days as f64 * 100.0,
            }
        })
        .collect();

    GanttChart {
        root_id: root.task.id,
        title: root.task.title.clone(),
        start: min_start,
        end: max_end,
        range_days,
        rows,
    }
}
