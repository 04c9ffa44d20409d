//! Deadline calendar derived from the task tree.
//!
//! Nothing here is persisted: every view is recomputed from a tree snapshot
//! and an anchor date. Weeks start on Monday.

use std::collections::BTreeMap;

use chrono::{Datelike, Days, Months, NaiveDate};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::model::{Task, TaskNode};
use crate::tree::flatten;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CalendarView {
    Month,
    Week,
    Day,
}

impl CalendarView {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "month" => Ok(Self::Month),
            "week" => Ok(Self::Week),
            "day" => Ok(Self::Day),
            _ => Err(Error::Invalid("invalid_view")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalendarEvent {
    pub id: i64,
    pub title: String,
    pub done: bool,
    pub assignee: Option<String>,
}

impl From<&Task> for CalendarEvent {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id,
            title: task.title.clone(),
            done: task.done,
            assignee: task.assignee.clone(),
        }
    }
}

pub type EventsByDate = BTreeMap<NaiveDate, Vec<CalendarEvent>>;

/// Parse a stored deadline. Only plain `YYYY-MM-DD` dates count.
pub fn parse_deadline(deadline: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(deadline.trim(), "%Y-%m-%d").ok()
}

/// Group every task with a parseable deadline by that date. Each day is
/// ordered by title, case-insensitively.
pub fn events_by_date(tree: &[TaskNode]) -> EventsByDate {
    let mut map = EventsByDate::new();
    for task in flatten(tree) {
        let Some(date) = task.deadline.as_deref().and_then(parse_deadline) else {
            continue;
        };
        map.entry(date).or_default().push(CalendarEvent::from(task));
    }
    for events in map.values_mut() {
        events.sort_by(|a, b| {
            a.title
                .to_lowercase()
                .cmp(&b.title.to_lowercase())
                .then(a.id.cmp(&b.id))
        });
    }
    map
}

pub fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

fn out_of_range() -> Error {
    Error::Invalid("invalid_date")
}

pub fn start_of_week(date: NaiveDate) -> Result<NaiveDate> {
    let offset = u64::from(date.weekday().num_days_from_monday());
    date.checked_sub_days(Days::new(offset))
        .ok_or_else(out_of_range)
}

/// Monday-first month grid. `None` pads the cells before day 1 and after
/// the last day up to a whole number of weeks.
pub fn month_grid(anchor: NaiveDate) -> Vec<Option<NaiveDate>> {
    let first = first_of_month(anchor);
    let lead = first.weekday().num_days_from_monday() as usize;
    let mut cells: Vec<Option<NaiveDate>> = vec![None; lead];
    cells.extend(
        first
            .iter_days()
            .take_while(|d| d.month() == first.month())
            .map(Some),
    );
    while cells.len() % 7 != 0 {
        cells.push(None);
    }
    cells
}

/// Monday through Sunday of the week containing `anchor`.
pub fn week_dates(anchor: NaiveDate) -> Result<Vec<NaiveDate>> {
    let start = start_of_week(anchor)?;
    (0..7)
        .map(|d| start.checked_add_days(Days::new(d)).ok_or_else(out_of_range))
        .collect()
}

/// Move `offset` steps of `view` away from `anchor`. Month steps land on
/// the first day of the target month. Steps past the representable range
/// fail with `invalid_date`.
pub fn navigate(view: CalendarView, anchor: NaiveDate, offset: i32) -> Result<NaiveDate> {
    let steps = offset.unsigned_abs();
    let moved = match view {
        CalendarView::Month => {
            let first = first_of_month(anchor);
            if offset >= 0 {
                first.checked_add_months(Months::new(steps))
            } else {
                first.checked_sub_months(Months::new(steps))
            }
        }
        CalendarView::Week | CalendarView::Day => {
            let days = u64::from(steps) * if view == CalendarView::Week { 7 } else { 1 };
            if offset >= 0 {
                anchor.checked_add_days(Days::new(days))
            } else {
                anchor.checked_sub_days(Days::new(days))
            }
        }
    };
    moved.ok_or_else(out_of_range)
}

#[derive(Debug, Clone, Serialize)]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub events: Vec<CalendarEvent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CalendarPage {
    pub view: CalendarView,
    pub anchor: NaiveDate,
    pub prev: NaiveDate,
    pub next: NaiveDate,
    /// Grid cells in display order; `None` only pads month views.
    pub cells: Vec<Option<CalendarDay>>,
}

/// Build the `view` page around `anchor`.
pub fn build_page(
    tree: &[TaskNode],
    view: CalendarView,
    anchor: NaiveDate,
) -> Result<CalendarPage> {
    let prev = navigate(view, anchor, -1)?;
    let next = navigate(view, anchor, 1)?;
    let mut events = events_by_date(tree);
    let mut day = |date: NaiveDate| CalendarDay {
        date,
        events: events.remove(&date).unwrap_or_default(),
    };

    let cells = match view {
        CalendarView::Month => month_grid(anchor)
            .into_iter()
            .map(|cell| cell.map(&mut day))
            .collect(),
        CalendarView::Week => week_dates(anchor)?
            .into_iter()
            .map(|date| Some(day(date)))
            .collect(),
        CalendarView::Day => vec![Some(day(anchor))],
    };

    Ok(CalendarPage {
        view,
        anchor,
        prev,
        next,
        cells,
    })
}
