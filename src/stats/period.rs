//! Weekly and monthly class reports.

use super::behavior::{aggregate_behavior, BehaviorTotals};
use super::completion::{is_assigned, TaskScope};
use super::ranking::top_n;
use super::{record_date, round_percent};
use crate::model::{AttendanceStatus, Student};
use crate::snapshot::Snapshot;
use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;
use std::collections::HashSet;

pub const REPORT_TOP_STUDENTS: usize = 3;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PeriodError {
    #[error("date must be YYYY-MM-DD, got {0:?}")]
    BadDate(String),
    #[error("month must be YYYY-MM, got {0:?}")]
    BadMonth(String),
}

/// Inclusive calendar range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }

    /// Whether an ISO date field falls in range. Unparsable fields never do.
    pub fn contains_field(&self, raw: &str) -> bool {
        match record_date(raw) {
            Some(day) => self.contains(day),
            None => {
                tracing::debug!(value = raw, "excluding record with malformed date");
                false
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    /// The Monday–Sunday week containing `anchor`.
    Weekly { anchor: NaiveDate },
    Monthly { year: i32, month: u32 },
}

impl Period {
    pub fn weekly(date: &str) -> Result<Self, PeriodError> {
        let anchor = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
            .map_err(|_| PeriodError::BadDate(date.to_string()))?;
        Ok(Period::Weekly { anchor })
    }

    pub fn monthly(key: &str) -> Result<Self, PeriodError> {
        let bad = || PeriodError::BadMonth(key.to_string());
        let (y, m) = key.trim().split_once('-').ok_or_else(bad)?;
        if y.len() != 4 || m.len() != 2 {
            return Err(bad());
        }
        let year = y.parse::<i32>().map_err(|_| bad())?;
        let month = m.parse::<u32>().map_err(|_| bad())?;
        if !(1..=12).contains(&month) {
            return Err(bad());
        }
        Ok(Period::Monthly { year, month })
    }

    pub fn range(&self) -> DateRange {
        match *self {
            Period::Weekly { anchor } => {
                let offset = anchor.weekday().num_days_from_monday() as i64;
                let start = anchor - Duration::days(offset);
                DateRange {
                    start,
                    end: start + Duration::days(6),
                }
            }
            Period::Monthly { year, month } => {
                let start = first_of_month(year, month);
                let next = if month == 12 {
                    first_of_month(year + 1, 1)
                } else {
                    first_of_month(year, month + 1)
                };
                DateRange {
                    start,
                    end: next - Duration::days(1),
                }
            }
        }
    }

    pub fn label(&self) -> String {
        match *self {
            Period::Weekly { .. } => {
                let r = self.range();
                format!("{} to {}", r.start.format("%Y-%m-%d"), r.end.format("%Y-%m-%d"))
            }
            Period::Monthly { year, month } => format!("{year:04}-{month:02}"),
        }
    }
}

fn first_of_month(year: i32, month: u32) -> NaiveDate {
    // month is validated to 1..=12 by `Period::monthly`.
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(NaiveDate::MIN)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSummary {
    pub rate: u32,
    pub present_count: usize,
    pub absent_count: usize,
    pub late_count: usize,
    pub total_records: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopStudent {
    pub student_id: String,
    pub name: String,
    pub points: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorSummary {
    pub total_points: i64,
    pub praise_count: usize,
    pub warn_count: usize,
    pub top_students: Vec<TopStudent>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSummary {
    pub completion_rate: u32,
    pub parent_replies: usize,
    pub assigned_tasks: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodReport {
    pub class_id: String,
    pub period: String,
    pub start_date: String,
    pub end_date: String,
    pub attendance: AttendanceSummary,
    pub behavior: BehaviorSummary,
    pub tasks: TaskSummary,
}

pub fn build_period_report(snapshot: &Snapshot, class_id: &str, period: &Period) -> PeriodReport {
    let range = period.range();
    let roster: Vec<&Student> = snapshot
        .students
        .iter()
        .filter(|s| s.class_id == class_id)
        .collect();
    let roster_ids: HashSet<&str> = roster.iter().map(|s| s.id.as_str()).collect();

    PeriodReport {
        class_id: class_id.to_string(),
        period: period.label(),
        start_date: range.start.format("%Y-%m-%d").to_string(),
        end_date: range.end.format("%Y-%m-%d").to_string(),
        attendance: attendance_summary(snapshot, class_id, &range),
        behavior: behavior_summary(snapshot, &roster, &range),
        tasks: task_summary(snapshot, class_id, &roster, &roster_ids, &range),
    }
}

fn attendance_summary(snapshot: &Snapshot, class_id: &str, range: &DateRange) -> AttendanceSummary {
    let (mut present, mut absent, mut late) = (0usize, 0usize, 0usize);
    for a in snapshot
        .attendance
        .iter()
        .filter(|a| a.class_id == class_id && range.contains_field(&a.date))
    {
        match a.status {
            AttendanceStatus::Present => present += 1,
            AttendanceStatus::Absent => absent += 1,
            AttendanceStatus::Late => late += 1,
        }
    }
    let total = present + absent + late;
    AttendanceSummary {
        rate: round_percent(present as f64 + 0.5 * late as f64, total as f64),
        present_count: present,
        absent_count: absent,
        late_count: late,
        total_records: total,
    }
}

fn behavior_summary(snapshot: &Snapshot, roster: &[&Student], range: &DateRange) -> BehaviorSummary {
    let in_period: Vec<_> = snapshot
        .behaviors
        .iter()
        .filter(|b| range.contains_field(&b.date))
        .collect();

    let mut class_totals = BehaviorTotals::default();
    // Only students with at least one record in the period are ranked.
    let mut ranked: Vec<(&Student, i64)> = Vec::new();
    for s in roster {
        let totals = aggregate_behavior(in_period.iter().copied(), &s.id);
        if totals.praise_count + totals.warn_count == 0 {
            continue;
        }
        class_totals.merge(totals);
        ranked.push((*s, totals.total_points));
    }

    let top_students = top_n(&ranked, REPORT_TOP_STUDENTS, |(_, points)| *points)
        .into_iter()
        .map(|(s, points)| TopStudent {
            student_id: s.id.clone(),
            name: s.full_name.clone(),
            points: *points,
        })
        .collect();

    BehaviorSummary {
        total_points: class_totals.total_points,
        praise_count: class_totals.praise_count,
        warn_count: class_totals.warn_count,
        top_students,
    }
}

fn task_summary(
    snapshot: &Snapshot,
    class_id: &str,
    roster: &[&Student],
    roster_ids: &HashSet<&str>,
    range: &DateRange,
) -> TaskSummary {
    let due_in_period: HashSet<&str> = snapshot
        .tasks
        .iter()
        .filter(|t| t.class_id == class_id || t.is_global())
        .filter(|t| range.contains_field(&t.due_date))
        .map(|t| t.id.as_str())
        .collect();

    // Expected submissions: every roster student for every task assigned to them.
    let expected: usize = roster
        .iter()
        .map(|s| {
            snapshot
                .tasks
                .iter()
                .filter(|t| due_in_period.contains(t.id.as_str()))
                .filter(|t| is_assigned(t, s, TaskScope::ClassOnly))
                .count()
        })
        .sum();

    let submitted: HashSet<(&str, &str)> = snapshot
        .replies
        .iter()
        .filter(|r| roster_ids.contains(r.student_id.as_str()))
        .filter(|r| due_in_period.contains(r.task_id.as_str()))
        .map(|r| (r.task_id.as_str(), r.student_id.as_str()))
        .collect();

    let parent_replies = snapshot
        .replies
        .iter()
        .filter(|r| roster_ids.contains(r.student_id.as_str()))
        .filter(|r| range.contains_field(&r.submitted_at))
        .count();

    TaskSummary {
        completion_rate: round_percent(submitted.len() as f64, expected as f64),
        parent_replies,
        assigned_tasks: due_in_period.len(),
    }
}
