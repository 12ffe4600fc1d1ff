//! Behavior records. Every write keeps `students.points` in step with the
//! record's signed points, inside the same transaction.

use crate::ipc::helpers::{
    db_conn, optional_i64, optional_str, required_date, required_str, respond, to_json,
    HandlerErr, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{Behavior, BehaviorKind};
use crate::snapshot;
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

fn parse_kind(params: &serde_json::Value) -> Result<Option<BehaviorKind>, HandlerErr> {
    match optional_str(params, "type")? {
        None => Ok(None),
        Some(raw) => raw
            .parse::<BehaviorKind>()
            .map(Some)
            .map_err(|e| HandlerErr::bad_params(e).with_details(json!({ "type": raw }))),
    }
}

fn points_out_of_range(student_id: &str, points: i64, delta: i64) -> HandlerErr {
    HandlerErr::bad_params("points total out of range")
        .with_details(json!({ "studentId": student_id, "points": points, "delta": delta }))
}

/// Moves a student's running total by `delta`. Overflow is refused rather
/// than letting SQLite widen the column to REAL.
fn adjust_points(conn: &Connection, student_id: &str, delta: i64) -> Result<(), HandlerErr> {
    if delta == 0 {
        return Ok(());
    }
    let current: i64 = conn
        .query_row(
            "SELECT points FROM students WHERE id = ?",
            [student_id],
            |r| r.get(0),
        )
        .map_err(HandlerErr::query)?;
    let total = current
        .checked_add(delta)
        .ok_or_else(|| points_out_of_range(student_id, current, delta))?;
    conn.execute(
        "UPDATE students SET points = ? WHERE id = ?",
        (total, student_id),
    )
    .map_err(|e| {
        HandlerErr::new("db_update_failed", e.to_string())
            .with_details(json!({ "table": "students" }))
    })?;
    Ok(())
}

fn behaviors_list(conn: &Connection, params: &serde_json::Value) -> HandlerResult {
    let student_id = optional_str(params, "studentId")?;
    let mut records =
        snapshot::list_behaviors(conn, student_id.as_deref()).map_err(HandlerErr::query)?;
    // Newest first; same-day records keep insertion order.
    records.sort_by(|a, b| b.date.cmp(&a.date));
    Ok(json!({ "behaviors": to_json(&records)? }))
}

fn behaviors_add(conn: &Connection, params: &serde_json::Value) -> HandlerResult {
    let student_id = required_str(params, "studentId")?;
    let kind = parse_kind(params)?.ok_or_else(|| HandlerErr::bad_params("missing type"))?;
    let points = optional_i64(params, "points")?.unwrap_or(0);
    let date = match params.get("date") {
        Some(v) if !v.is_null() => required_date(params, "date")?,
        _ => chrono::Local::now().date_naive().format("%Y-%m-%d").to_string(),
    };
    let content = optional_str(params, "content")?.unwrap_or_default();

    if snapshot::get_student(conn, &student_id)
        .map_err(HandlerErr::query)?
        .is_none()
    {
        return Err(HandlerErr::not_found("student"));
    }

    let record = Behavior {
        id: Uuid::new_v4().to_string(),
        student_id,
        date,
        kind,
        points,
        content,
    };

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    tx.execute(
        "INSERT INTO behaviors(id, student_id, date, kind, points, content)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &record.id,
            &record.student_id,
            &record.date,
            record.kind.as_str(),
            record.points,
            &record.content,
        ),
    )
    .map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string())
            .with_details(json!({ "table": "behaviors" }))
    })?;
    adjust_points(&tx, &record.student_id, record.points)?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;

    Ok(json!({ "behavior": to_json(&record)? }))
}

fn behaviors_update(conn: &Connection, params: &serde_json::Value) -> HandlerResult {
    let behavior_id = required_str(params, "behaviorId")?;
    let Some(old) = snapshot::get_behavior(conn, &behavior_id).map_err(HandlerErr::query)? else {
        return Err(HandlerErr::not_found("behavior"));
    };

    let patch = params.get("patch").unwrap_or(params);
    let mut updated = old.clone();
    if let Some(kind) = parse_kind(patch)? {
        updated.kind = kind;
    }
    if let Some(points) = optional_i64(patch, "points")? {
        updated.points = points;
    }
    if patch.get("date").is_some() {
        updated.date = required_date(patch, "date")?;
    }
    if let Some(content) = optional_str(patch, "content")? {
        updated.content = content;
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    tx.execute(
        "UPDATE behaviors SET date = ?, kind = ?, points = ?, content = ? WHERE id = ?",
        (
            &updated.date,
            updated.kind.as_str(),
            updated.points,
            &updated.content,
            &behavior_id,
        ),
    )
    .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    let delta = updated
        .points
        .checked_sub(old.points)
        .ok_or_else(|| points_out_of_range(&updated.student_id, old.points, updated.points))?;
    adjust_points(&tx, &updated.student_id, delta)?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;

    Ok(json!({ "behavior": to_json(&updated)? }))
}

fn behaviors_delete(conn: &Connection, params: &serde_json::Value) -> HandlerResult {
    let behavior_id = required_str(params, "behaviorId")?;
    let Some(old) = snapshot::get_behavior(conn, &behavior_id).map_err(HandlerErr::query)? else {
        return Err(HandlerErr::not_found("behavior"));
    };

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    tx.execute("DELETE FROM behaviors WHERE id = ?", [&behavior_id])
        .map_err(|e| HandlerErr::new("db_delete_failed", e.to_string()))?;
    let delta = old
        .points
        .checked_neg()
        .ok_or_else(|| points_out_of_range(&old.student_id, old.points, old.points))?;
    adjust_points(&tx, &old.student_id, delta)?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;

    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let handler: fn(&Connection, &serde_json::Value) -> HandlerResult = match req.method.as_str()
    {
        "behaviors.list" => behaviors_list,
        "behaviors.add" => behaviors_add,
        "behaviors.update" => behaviors_update,
        "behaviors.delete" => behaviors_delete,
        _ => return None,
    };
    Some(respond(
        &req.id,
        db_conn(state).and_then(|conn| handler(conn, &req.params)),
    ))
}
