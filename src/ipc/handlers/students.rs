use crate::db;
use crate::ipc::helpers::{
    db_conn, optional_i64, optional_str, required_str, respond, to_json, HandlerErr, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::model::StudentStatus;
use crate::snapshot;
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

fn parse_status(params: &serde_json::Value) -> Result<Option<StudentStatus>, HandlerErr> {
    match optional_str(params, "status")? {
        None => Ok(None),
        Some(raw) => raw
            .parse::<StudentStatus>()
            .map(Some)
            .map_err(|e| HandlerErr::bad_params(e).with_details(json!({ "status": raw }))),
    }
}

fn ensure_class(conn: &Connection, class_id: &str) -> Result<(), HandlerErr> {
    match snapshot::get_class(conn, class_id).map_err(HandlerErr::query)? {
        Some(_) => Ok(()),
        None => Err(HandlerErr::not_found("class")),
    }
}

fn students_list(conn: &Connection, params: &serde_json::Value) -> HandlerResult {
    let class_id = optional_str(params, "classId")?;
    let students =
        snapshot::list_students(conn, class_id.as_deref()).map_err(HandlerErr::query)?;
    Ok(json!({ "students": to_json(&students)? }))
}

fn students_get(conn: &Connection, params: &serde_json::Value) -> HandlerResult {
    let student_id = required_str(params, "studentId")?;
    let student = snapshot::get_student(conn, &student_id)
        .map_err(HandlerErr::query)?
        .ok_or_else(|| HandlerErr::not_found("student"))?;
    Ok(json!({ "student": to_json(&student)? }))
}

fn students_create(conn: &Connection, params: &serde_json::Value) -> HandlerResult {
    let class_id = required_str(params, "classId")?;
    let full_name = required_str(params, "fullName")?;
    let dob = optional_str(params, "dob")?;
    let gender = optional_str(params, "gender")?;
    let status = parse_status(params)?.unwrap_or(StudentStatus::Active);
    let points = optional_i64(params, "points")?.unwrap_or(0);
    ensure_class(conn, &class_id)?;

    let student_id = Uuid::new_v4().to_string();
    let sort_order = db::next_student_sort_order(conn).map_err(HandlerErr::query)?;
    conn.execute(
        "INSERT INTO students(id, class_id, full_name, dob, gender, status, points, sort_order)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &student_id,
            &class_id,
            &full_name,
            &dob,
            &gender,
            status.as_str(),
            points,
            sort_order,
        ),
    )
    .map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string())
            .with_details(json!({ "table": "students" }))
    })?;

    students_get(conn, &json!({ "studentId": student_id }))
}

fn students_update(conn: &Connection, params: &serde_json::Value) -> HandlerResult {
    let student_id = required_str(params, "studentId")?;
    let Some(mut student) = snapshot::get_student(conn, &student_id).map_err(HandlerErr::query)?
    else {
        return Err(HandlerErr::not_found("student"));
    };

    let patch = params.get("patch").unwrap_or(params);
    if let Some(class_id) = optional_str(patch, "classId")? {
        ensure_class(conn, &class_id)?;
        student.class_id = class_id;
    }
    if patch.get("fullName").is_some() {
        student.full_name = required_str(patch, "fullName")?;
    }
    if patch.get("dob").is_some() {
        student.dob = optional_str(patch, "dob")?;
    }
    if patch.get("gender").is_some() {
        student.gender = optional_str(patch, "gender")?;
    }
    if let Some(status) = parse_status(patch)? {
        student.status = status;
    }
    if let Some(points) = optional_i64(patch, "points")? {
        student.points = points;
    }

    conn.execute(
        "UPDATE students
         SET class_id = ?, full_name = ?, dob = ?, gender = ?, status = ?, points = ?
         WHERE id = ?",
        (
            &student.class_id,
            &student.full_name,
            &student.dob,
            &student.gender,
            student.status.as_str(),
            student.points,
            &student_id,
        ),
    )
    .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    Ok(json!({ "student": to_json(&student)? }))
}

fn students_delete(conn: &Connection, params: &serde_json::Value) -> HandlerResult {
    let student_id = required_str(params, "studentId")?;
    if snapshot::get_student(conn, &student_id)
        .map_err(HandlerErr::query)?
        .is_none()
    {
        return Err(HandlerErr::not_found("student"));
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    // Explicitly delete in dependency order (no ON DELETE CASCADE).
    for sql in [
        "DELETE FROM behaviors WHERE student_id = ?",
        "DELETE FROM task_replies WHERE student_id = ?",
        "DELETE FROM attendance WHERE student_id = ?",
        "DELETE FROM students WHERE id = ?",
    ] {
        tx.execute(sql, [&student_id]).map_err(|e| {
            HandlerErr::new("db_delete_failed", e.to_string()).with_details(json!({ "sql": sql }))
        })?;
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let handler: fn(&Connection, &serde_json::Value) -> HandlerResult = match req.method.as_str()
    {
        "students.list" => students_list,
        "students.get" => students_get,
        "students.create" => students_create,
        "students.update" => students_update,
        "students.delete" => students_delete,
        _ => return None,
    };
    Some(respond(
        &req.id,
        db_conn(state).and_then(|conn| handler(conn, &req.params)),
    ))
}
