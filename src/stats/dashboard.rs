use super::ranking::top_students;
use super::{record_date, round_percent};
use crate::model::{AttendanceStatus, BehaviorKind, Task};
use crate::snapshot::Snapshot;
use chrono::NaiveDate;
use serde::Serialize;

pub const UPCOMING_TASKS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TodayAttendance {
    /// Late arrivals count as half.
    pub present: f64,
    pub total: usize,
    pub rate: u32,
    pub has_data: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedStudent {
    pub student_id: String,
    pub full_name: String,
    pub class_id: String,
    pub points: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardOverview {
    pub today: String,
    pub classes_count: usize,
    pub students_count: usize,
    pub attendance_today: TodayAttendance,
    pub total_praise_points: i64,
    pub top_students: Vec<RankedStudent>,
    pub upcoming_tasks: Vec<Task>,
}

pub fn build_overview(snapshot: &Snapshot, today: NaiveDate, top_n: usize) -> DashboardOverview {
    let total_praise_points: i64 = snapshot
        .behaviors
        .iter()
        .filter(|b| b.kind == BehaviorKind::Praise)
        .map(|b| b.points)
        .sum();

    let top_students = top_students(&snapshot.students, top_n)
        .into_iter()
        .map(|s| RankedStudent {
            student_id: s.id.clone(),
            full_name: s.full_name.clone(),
            class_id: s.class_id.clone(),
            points: s.points,
        })
        .collect();

    DashboardOverview {
        today: today.format("%Y-%m-%d").to_string(),
        classes_count: snapshot.classes.len(),
        students_count: snapshot.students.len(),
        attendance_today: attendance_on(snapshot, today),
        total_praise_points,
        top_students,
        upcoming_tasks: upcoming_tasks(snapshot, today),
    }
}

fn attendance_on(snapshot: &Snapshot, today: NaiveDate) -> TodayAttendance {
    let mut present = 0.0;
    let mut total = 0usize;
    for a in snapshot
        .attendance
        .iter()
        .filter(|a| record_date(&a.date) == Some(today))
    {
        total += 1;
        match a.status {
            AttendanceStatus::Present => present += 1.0,
            AttendanceStatus::Late => present += 0.5,
            AttendanceStatus::Absent => {}
        }
    }
    TodayAttendance {
        present,
        total,
        rate: round_percent(present, total as f64),
        has_data: total > 0,
    }
}

/// Tasks due today or later, soonest first.
fn upcoming_tasks(snapshot: &Snapshot, today: NaiveDate) -> Vec<Task> {
    let mut due: Vec<(NaiveDate, &Task)> = snapshot
        .tasks
        .iter()
        .filter_map(|t| record_date(&t.due_date).map(|d| (d, t)))
        .filter(|(d, _)| *d >= today)
        .collect();
    due.sort_by_key(|(d, _)| *d);
    due.into_iter()
        .take(UPCOMING_TASKS)
        .map(|(_, t)| t.clone())
        .collect()
}
