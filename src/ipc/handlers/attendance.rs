use crate::ipc::helpers::{
    db_conn, optional_str, required_date, required_str, respond, to_json, HandlerErr,
    HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{Attendance, AttendanceStatus};
use crate::snapshot;
use rusqlite::Connection;
use serde_json::json;
use std::collections::HashSet;
use uuid::Uuid;

struct MarkItem {
    student_id: String,
    status: AttendanceStatus,
    note: Option<String>,
}

fn parse_items(params: &serde_json::Value) -> Result<Vec<MarkItem>, HandlerErr> {
    let Some(raw) = params.get("items").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("missing items"));
    };
    let mut out = Vec::with_capacity(raw.len());
    let mut seen = HashSet::new();
    for (idx, item) in raw.iter().enumerate() {
        let student_id = required_str(item, "studentId")
            .map_err(|e| e.with_details(json!({ "index": idx })))?;
        let status_raw = required_str(item, "status")
            .map_err(|e| e.with_details(json!({ "index": idx })))?;
        let status = status_raw.parse::<AttendanceStatus>().map_err(|e| {
            HandlerErr::bad_params(e).with_details(json!({ "index": idx, "status": status_raw }))
        })?;
        if !seen.insert(student_id.clone()) {
            return Err(HandlerErr::bad_params("duplicate studentId in items")
                .with_details(json!({ "index": idx, "studentId": student_id })));
        }
        out.push(MarkItem {
            student_id,
            status,
            note: optional_str(item, "note")?,
        });
    }
    Ok(out)
}

fn attendance_get(conn: &Connection, params: &serde_json::Value) -> HandlerResult {
    let class_id = required_str(params, "classId")?;
    let date = required_date(params, "date")?;
    let records =
        snapshot::list_attendance_for_day(conn, &class_id, &date).map_err(HandlerErr::query)?;
    Ok(json!({ "classId": class_id, "date": date, "records": to_json(&records)? }))
}

/// Replaces the whole roll for one class and day.
fn attendance_mark(conn: &Connection, params: &serde_json::Value) -> HandlerResult {
    let class_id = required_str(params, "classId")?;
    let date = required_date(params, "date")?;
    let items = parse_items(params)?;

    if snapshot::get_class(conn, &class_id)
        .map_err(HandlerErr::query)?
        .is_none()
    {
        return Err(HandlerErr::not_found("class"));
    }
    let roster: HashSet<String> = snapshot::list_students(conn, Some(&class_id))
        .map_err(HandlerErr::query)?
        .into_iter()
        .map(|s| s.id)
        .collect();
    if let Some(stray) = items.iter().find(|i| !roster.contains(&i.student_id)) {
        return Err(HandlerErr::bad_params("student is not in this class")
            .with_details(json!({ "studentId": stray.student_id })));
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    tx.execute(
        "DELETE FROM attendance WHERE class_id = ? AND date = ?",
        (&class_id, &date),
    )
    .map_err(|e| HandlerErr::new("db_delete_failed", e.to_string()))?;

    let mut records = Vec::with_capacity(items.len());
    for item in items {
        let record = Attendance {
            id: Uuid::new_v4().to_string(),
            class_id: class_id.clone(),
            student_id: item.student_id,
            date: date.clone(),
            status: item.status,
            note: item.note,
        };
        tx.execute(
            "INSERT INTO attendance(id, class_id, student_id, date, status, note)
             VALUES(?, ?, ?, ?, ?, ?)",
            (
                &record.id,
                &record.class_id,
                &record.student_id,
                &record.date,
                record.status.as_str(),
                &record.note,
            ),
        )
        .map_err(|e| {
            HandlerErr::new("db_insert_failed", e.to_string())
                .with_details(json!({ "table": "attendance" }))
        })?;
        records.push(record);
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;

    tracing::debug!(class_id = %class_id, date = %date, count = records.len(), "attendance marked");
    Ok(json!({ "count": records.len(), "records": to_json(&records)? }))
}

fn attendance_list_by_student(conn: &Connection, params: &serde_json::Value) -> HandlerResult {
    let student_id = required_str(params, "studentId")?;
    let start = match optional_str(params, "startDate")? {
        Some(_) => Some(required_date(params, "startDate")?),
        None => None,
    };
    let end = match optional_str(params, "endDate")? {
        Some(_) => Some(required_date(params, "endDate")?),
        None => None,
    };

    let mut records =
        snapshot::list_attendance_for_student(conn, &student_id).map_err(HandlerErr::query)?;
    records.retain(|r| {
        start.as_deref().map_or(true, |s| r.date.as_str() >= s)
            && end.as_deref().map_or(true, |e| r.date.as_str() <= e)
    });
    records.sort_by(|a, b| b.date.cmp(&a.date));
    Ok(json!({ "records": to_json(&records)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let handler: fn(&Connection, &serde_json::Value) -> HandlerResult = match req.method.as_str()
    {
        "attendance.get" => attendance_get,
        "attendance.mark" => attendance_mark,
        "attendance.listByStudent" => attendance_list_by_student,
        _ => return None,
    };
    Some(respond(
        &req.id,
        db_conn(state).and_then(|conn| handler(conn, &req.params)),
    ))
}
