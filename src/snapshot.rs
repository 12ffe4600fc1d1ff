//! Read-only collection snapshots for the aggregation layer.
//!
//! Every stats or report request loads a fresh [`Snapshot`]; nothing derived
//! from it is cached. A failing query aborts the whole load, while a single
//! row holding an unknown enum value or a mistyped column is skipped and
//! logged.

use crate::model::{
    Attendance, AttendanceStatus, Behavior, BehaviorKind, ClassInfo, Student, StudentStatus, Task,
    TaskReply,
};
use rusqlite::{Connection, OptionalExtension, Row};
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("failed to load {collection}: {source}")]
    Collection {
        collection: &'static str,
        #[source]
        source: rusqlite::Error,
    },
}

impl FetchError {
    pub fn collection(&self) -> &'static str {
        match self {
            FetchError::Collection { collection, .. } => collection,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub classes: Vec<ClassInfo>,
    pub students: Vec<Student>,
    pub tasks: Vec<Task>,
    pub replies: Vec<TaskReply>,
    pub behaviors: Vec<Behavior>,
    pub attendance: Vec<Attendance>,
}

impl Snapshot {
    pub fn class(&self, class_id: &str) -> Option<&ClassInfo> {
        self.classes.iter().find(|c| c.id == class_id)
    }

    pub fn student(&self, student_id: &str) -> Option<&Student> {
        self.students.iter().find(|s| s.id == student_id)
    }
}

pub fn load_snapshot(conn: &Connection) -> Result<Snapshot, FetchError> {
    let snapshot = Snapshot {
        classes: wrap("classes", list_classes(conn))?,
        students: wrap("students", list_students(conn, None))?,
        tasks: wrap("tasks", list_tasks(conn, None))?,
        replies: wrap("task_replies", list_replies(conn, None))?,
        behaviors: wrap("behaviors", list_behaviors(conn, None))?,
        attendance: wrap("attendance", list_attendance(conn))?,
    };
    tracing::debug!(
        classes = snapshot.classes.len(),
        students = snapshot.students.len(),
        tasks = snapshot.tasks.len(),
        replies = snapshot.replies.len(),
        behaviors = snapshot.behaviors.len(),
        attendance = snapshot.attendance.len(),
        "snapshot loaded"
    );
    Ok(snapshot)
}

fn wrap<T>(collection: &'static str, r: rusqlite::Result<T>) -> Result<T, FetchError> {
    r.map_err(|source| FetchError::Collection { collection, source })
}

/// Parses an enum column; `None` means the row should be skipped.
fn parse_column<T: FromStr<Err = String>>(table: &str, id: &str, raw: &str) -> Option<T> {
    match raw.parse::<T>() {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!(table, id, "skipping malformed record: {e}");
            None
        }
    }
}

/// Column conversion failures drop the row; any other error is passed on.
fn skip_malformed<T>(
    table: &str,
    r: &Row<'_>,
    built: rusqlite::Result<Option<T>>,
) -> rusqlite::Result<Option<T>> {
    match built {
        Err(
            e @ (rusqlite::Error::InvalidColumnType(..)
            | rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::IntegralValueOutOfRange(..)),
        ) => {
            let id = r.get::<_, String>(0).unwrap_or_default();
            tracing::warn!(table, id = %id, "skipping malformed record: {e}");
            Ok(None)
        }
        other => other,
    }
}

fn collect_rows<T, F>(
    conn: &Connection,
    table: &str,
    sql: &str,
    params: impl rusqlite::Params,
    mut map: F,
) -> rusqlite::Result<Vec<T>>
where
    F: FnMut(&Row<'_>) -> rusqlite::Result<Option<T>>,
{
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, |r| skip_malformed(table, r, map(r)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows.into_iter().flatten().collect())
}

fn fetch_one<T, F>(
    conn: &Connection,
    table: &str,
    sql: &str,
    id: &str,
    map: F,
) -> rusqlite::Result<Option<T>>
where
    F: Fn(&Row<'_>) -> rusqlite::Result<Option<T>>,
{
    Ok(conn
        .query_row(sql, [id], |r| skip_malformed(table, r, map(r)))
        .optional()?
        .flatten())
}

const CLASS_COLUMNS: &str = "id, class_name, school_year, homeroom_teacher, level, note";

fn class_from_row(r: &Row<'_>) -> rusqlite::Result<ClassInfo> {
    Ok(ClassInfo {
        id: r.get(0)?,
        class_name: r.get(1)?,
        school_year: r.get(2)?,
        homeroom_teacher: r.get(3)?,
        level: r.get(4)?,
        note: r.get(5)?,
    })
}

pub fn list_classes(conn: &Connection) -> rusqlite::Result<Vec<ClassInfo>> {
    let sql = format!("SELECT {CLASS_COLUMNS} FROM classes ORDER BY rowid");
    collect_rows(conn, "classes", &sql, [], |r| class_from_row(r).map(Some))
}

pub fn get_class(conn: &Connection, class_id: &str) -> rusqlite::Result<Option<ClassInfo>> {
    let sql = format!("SELECT {CLASS_COLUMNS} FROM classes WHERE id = ?");
    fetch_one(conn, "classes", &sql, class_id, |r| class_from_row(r).map(Some))
}

const STUDENT_COLUMNS: &str = "id, class_id, full_name, dob, gender, status, points";

fn student_from_row(r: &Row<'_>) -> rusqlite::Result<Option<Student>> {
    let id: String = r.get(0)?;
    let status_raw: String = r.get(5)?;
    let Some(status) = parse_column::<StudentStatus>("students", &id, &status_raw) else {
        return Ok(None);
    };
    Ok(Some(Student {
        id,
        class_id: r.get(1)?,
        full_name: r.get(2)?,
        dob: r.get(3)?,
        gender: r.get(4)?,
        status,
        points: r.get(6)?,
    }))
}

/// Students in roster order, optionally restricted to one class.
pub fn list_students(conn: &Connection, class_id: Option<&str>) -> rusqlite::Result<Vec<Student>> {
    match class_id {
        Some(cid) => {
            let sql = format!(
                "SELECT {STUDENT_COLUMNS} FROM students WHERE class_id = ? ORDER BY sort_order"
            );
            collect_rows(conn, "students", &sql, [cid], student_from_row)
        }
        None => {
            let sql = format!("SELECT {STUDENT_COLUMNS} FROM students ORDER BY sort_order");
            collect_rows(conn, "students", &sql, [], student_from_row)
        }
    }
}

pub fn get_student(conn: &Connection, student_id: &str) -> rusqlite::Result<Option<Student>> {
    let sql = format!("SELECT {STUDENT_COLUMNS} FROM students WHERE id = ?");
    fetch_one(conn, "students", &sql, student_id, student_from_row)
}

const TASK_COLUMNS: &str =
    "id, class_id, title, description, due_date, require_reply, created_at, grade, unit, points";

fn task_from_row(r: &Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: r.get(0)?,
        class_id: r.get(1)?,
        title: r.get(2)?,
        description: r.get(3)?,
        due_date: r.get(4)?,
        require_reply: r.get::<_, i64>(5)? != 0,
        created_at: r.get(6)?,
        grade: r.get(7)?,
        unit: r.get(8)?,
        points: r.get(9)?,
    })
}

/// Tasks in creation order; with `class_id`, only tasks stored under exactly that id.
pub fn list_tasks(conn: &Connection, class_id: Option<&str>) -> rusqlite::Result<Vec<Task>> {
    match class_id {
        Some(cid) => {
            let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE class_id = ? ORDER BY rowid");
            collect_rows(conn, "tasks", &sql, [cid], |r| task_from_row(r).map(Some))
        }
        None => {
            let sql = format!("SELECT {TASK_COLUMNS} FROM tasks ORDER BY rowid");
            collect_rows(conn, "tasks", &sql, [], |r| task_from_row(r).map(Some))
        }
    }
}

pub fn get_task(conn: &Connection, task_id: &str) -> rusqlite::Result<Option<Task>> {
    let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?");
    fetch_one(conn, "tasks", &sql, task_id, |r| task_from_row(r).map(Some))
}

const REPLY_COLUMNS: &str = "id, task_id, student_id, reply_text, submitted_at, grade, feedback";

fn reply_from_row(r: &Row<'_>) -> rusqlite::Result<TaskReply> {
    Ok(TaskReply {
        id: r.get(0)?,
        task_id: r.get(1)?,
        student_id: r.get(2)?,
        reply_text: r.get(3)?,
        submitted_at: r.get(4)?,
        grade: r.get(5)?,
        feedback: r.get(6)?,
    })
}

pub fn list_replies(conn: &Connection, task_id: Option<&str>) -> rusqlite::Result<Vec<TaskReply>> {
    match task_id {
        Some(tid) => {
            let sql =
                format!("SELECT {REPLY_COLUMNS} FROM task_replies WHERE task_id = ? ORDER BY rowid");
            collect_rows(conn, "task_replies", &sql, [tid], |r| reply_from_row(r).map(Some))
        }
        None => {
            let sql = format!("SELECT {REPLY_COLUMNS} FROM task_replies ORDER BY rowid");
            collect_rows(conn, "task_replies", &sql, [], |r| reply_from_row(r).map(Some))
        }
    }
}

const BEHAVIOR_COLUMNS: &str = "id, student_id, date, kind, points, content";

fn behavior_from_row(r: &Row<'_>) -> rusqlite::Result<Option<Behavior>> {
    let id: String = r.get(0)?;
    let kind_raw: String = r.get(3)?;
    let Some(kind) = parse_column::<BehaviorKind>("behaviors", &id, &kind_raw) else {
        return Ok(None);
    };
    Ok(Some(Behavior {
        id,
        student_id: r.get(1)?,
        date: r.get(2)?,
        kind,
        points: r.get(4)?,
        content: r.get(5)?,
    }))
}

pub fn list_behaviors(
    conn: &Connection,
    student_id: Option<&str>,
) -> rusqlite::Result<Vec<Behavior>> {
    match student_id {
        Some(sid) => {
            let sql = format!(
                "SELECT {BEHAVIOR_COLUMNS} FROM behaviors WHERE student_id = ? ORDER BY rowid"
            );
            collect_rows(conn, "behaviors", &sql, [sid], behavior_from_row)
        }
        None => {
            let sql = format!("SELECT {BEHAVIOR_COLUMNS} FROM behaviors ORDER BY rowid");
            collect_rows(conn, "behaviors", &sql, [], behavior_from_row)
        }
    }
}

pub fn get_behavior(conn: &Connection, behavior_id: &str) -> rusqlite::Result<Option<Behavior>> {
    let sql = format!("SELECT {BEHAVIOR_COLUMNS} FROM behaviors WHERE id = ?");
    fetch_one(conn, "behaviors", &sql, behavior_id, behavior_from_row)
}

const ATTENDANCE_COLUMNS: &str = "id, class_id, student_id, date, status, note";

fn attendance_from_row(r: &Row<'_>) -> rusqlite::Result<Option<Attendance>> {
    let id: String = r.get(0)?;
    let status_raw: String = r.get(4)?;
    let Some(status) = parse_column::<AttendanceStatus>("attendance", &id, &status_raw) else {
        return Ok(None);
    };
    Ok(Some(Attendance {
        id,
        class_id: r.get(1)?,
        student_id: r.get(2)?,
        date: r.get(3)?,
        status,
        note: r.get(5)?,
    }))
}

pub fn list_attendance(conn: &Connection) -> rusqlite::Result<Vec<Attendance>> {
    let sql = format!("SELECT {ATTENDANCE_COLUMNS} FROM attendance ORDER BY rowid");
    collect_rows(conn, "attendance", &sql, [], attendance_from_row)
}

pub fn list_attendance_for_day(
    conn: &Connection,
    class_id: &str,
    date: &str,
) -> rusqlite::Result<Vec<Attendance>> {
    let sql = format!(
        "SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE class_id = ? AND date = ? ORDER BY rowid"
    );
    collect_rows(conn, "attendance", &sql, (class_id, date), attendance_from_row)
}

pub fn list_attendance_for_student(
    conn: &Connection,
    student_id: &str,
) -> rusqlite::Result<Vec<Attendance>> {
    let sql = format!(
        "SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE student_id = ? ORDER BY rowid"
    );
    collect_rows(conn, "attendance", &sql, [student_id], attendance_from_row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn seeded() -> Connection {
        let dir =
            std::env::temp_dir().join(format!("classroomd-snapshot-{}", uuid::Uuid::new_v4()));
        let conn = db::open_db(&dir).expect("open db");
        conn.execute_batch(
            "INSERT INTO classes(id, class_name) VALUES('c1', '6A');
             INSERT INTO students(id, class_id, full_name, status, points, sort_order)
                 VALUES('s1', 'c1', 'An', 'Active', 5, 0),
                       ('s2', 'c1', 'Binh', 'Active', 3, 1),
                       ('s3', 'c1', 'Chi', 'Active', 1, 2);
             INSERT INTO behaviors(id, student_id, date, kind, points)
                 VALUES('b1', 's1', '2024-09-10', 'PRAISE', 5),
                       ('b2', 's2', '2024-09-10', 'WARN', -1);
             INSERT INTO attendance(id, class_id, student_id, date, status)
                 VALUES('a1', 'c1', 's1', '2024-09-10', 'PRESENT');",
        )
        .expect("seed");
        conn
    }

    #[test]
    fn loads_every_collection() {
        let snap = load_snapshot(&seeded()).expect("snapshot");
        assert_eq!(snap.classes.len(), 1);
        assert_eq!(
            snap.students.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(),
            vec!["s1", "s2", "s3"]
        );
        assert_eq!(snap.behaviors.len(), 2);
        assert_eq!(snap.attendance.len(), 1);
        assert!(snap.tasks.is_empty());
        assert!(snap.replies.is_empty());
    }

    #[test]
    fn unknown_enum_values_skip_only_their_row() {
        let conn = seeded();
        conn.execute_batch(
            "INSERT INTO students(id, class_id, full_name, status, points, sort_order)
                 VALUES('s4', 'c1', 'Dung', 'Graduated', 0, 3);
             INSERT INTO behaviors(id, student_id, date, kind, points)
                 VALUES('b3', 's1', '2024-09-11', 'NEUTRAL', 0);
             INSERT INTO attendance(id, class_id, student_id, date, status)
                 VALUES('a2', 'c1', 's2', '2024-09-10', 'EXCUSED');",
        )
        .expect("insert malformed rows");

        let snap = load_snapshot(&conn).expect("snapshot");
        assert_eq!(
            snap.students.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(),
            vec!["s1", "s2", "s3"]
        );
        assert_eq!(
            snap.behaviors.iter().map(|b| b.id.as_str()).collect::<Vec<_>>(),
            vec!["b1", "b2"]
        );
        assert_eq!(
            snap.attendance.iter().map(|a| a.id.as_str()).collect::<Vec<_>>(),
            vec!["a1"]
        );
        assert_eq!(get_behavior(&conn, "b3").expect("query"), None);
    }

    #[test]
    fn mistyped_numeric_columns_skip_only_their_row() {
        let conn = seeded();
        // An overflowing `points + delta` is stored by SQLite as REAL.
        conn.execute_batch(
            "UPDATE students SET points = 9223372036854775807 WHERE id = 's2';
             UPDATE students SET points = points + 1 WHERE id = 's2';
             UPDATE behaviors SET points = 'lots' WHERE id = 'b1';",
        )
        .expect("corrupt rows");

        let snap = load_snapshot(&conn).expect("snapshot");
        assert_eq!(
            snap.students.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(),
            vec!["s1", "s3"]
        );
        assert_eq!(
            snap.behaviors.iter().map(|b| b.id.as_str()).collect::<Vec<_>>(),
            vec!["b2"]
        );
        assert_eq!(get_student(&conn, "s2").expect("query"), None);
        assert_eq!(list_students(&conn, Some("c1")).expect("list").len(), 2);
    }

    #[test]
    fn failing_query_names_its_collection() {
        let conn = seeded();
        conn.execute_batch("DROP TABLE attendance").expect("drop");

        let err = load_snapshot(&conn).unwrap_err();
        assert_eq!(err.collection(), "attendance");
        assert!(err.to_string().starts_with("failed to load attendance"));
    }
}
