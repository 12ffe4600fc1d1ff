use crate::ipc::helpers::{
    db_conn, optional_str, required_str, respond, to_json, HandlerErr, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::snapshot;
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

fn classes_list(conn: &Connection, _params: &serde_json::Value) -> HandlerResult {
    let classes = snapshot::list_classes(conn).map_err(HandlerErr::query)?;

    // Include roster sizes so the UI can show a useful overview.
    let mut stmt = conn
        .prepare("SELECT class_id, COUNT(*) FROM students GROUP BY class_id")
        .map_err(HandlerErr::query)?;
    let counts = stmt
        .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))
        .and_then(|it| it.collect::<Result<std::collections::HashMap<_, _>, _>>())
        .map_err(HandlerErr::query)?;

    let rows: Vec<serde_json::Value> = classes
        .iter()
        .map(|c| -> Result<serde_json::Value, HandlerErr> {
            let mut v = to_json(c)?;
            v["studentCount"] = json!(counts.get(&c.id).copied().unwrap_or(0));
            Ok(v)
        })
        .collect::<Result<_, _>>()?;
    Ok(json!({ "classes": rows }))
}

fn classes_create(conn: &Connection, params: &serde_json::Value) -> HandlerResult {
    let class_name = required_str(params, "className")?;
    let school_year = optional_str(params, "schoolYear")?.unwrap_or_default();
    let homeroom_teacher = optional_str(params, "homeroomTeacher")?.unwrap_or_default();
    let level = optional_str(params, "level")?;
    let note = optional_str(params, "note")?;

    let class_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO classes(id, class_name, school_year, homeroom_teacher, level, note)
         VALUES(?, ?, ?, ?, ?, ?)",
        (&class_id, &class_name, &school_year, &homeroom_teacher, &level, &note),
    )
    .map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string()).with_details(json!({ "table": "classes" }))
    })?;

    let class = snapshot::get_class(conn, &class_id)
        .map_err(HandlerErr::query)?
        .ok_or_else(|| HandlerErr::not_found("class"))?;
    Ok(json!({ "class": to_json(&class)? }))
}

fn classes_update(conn: &Connection, params: &serde_json::Value) -> HandlerResult {
    let class_id = required_str(params, "classId")?;
    let Some(mut class) = snapshot::get_class(conn, &class_id).map_err(HandlerErr::query)? else {
        return Err(HandlerErr::not_found("class"));
    };

    let patch = params.get("patch").unwrap_or(params);
    if patch.get("className").is_some() {
        class.class_name = required_str(patch, "className")?;
    }
    if let Some(v) = optional_str(patch, "schoolYear")? {
        class.school_year = v;
    }
    if let Some(v) = optional_str(patch, "homeroomTeacher")? {
        class.homeroom_teacher = v;
    }
    if patch.get("level").is_some() {
        class.level = optional_str(patch, "level")?;
    }
    if patch.get("note").is_some() {
        class.note = optional_str(patch, "note")?;
    }

    conn.execute(
        "UPDATE classes
         SET class_name = ?, school_year = ?, homeroom_teacher = ?, level = ?, note = ?
         WHERE id = ?",
        (
            &class.class_name,
            &class.school_year,
            &class.homeroom_teacher,
            &class.level,
            &class.note,
            &class_id,
        ),
    )
    .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    Ok(json!({ "class": to_json(&class)? }))
}

fn classes_delete(conn: &Connection, params: &serde_json::Value) -> HandlerResult {
    let class_id = required_str(params, "classId")?;
    if snapshot::get_class(conn, &class_id)
        .map_err(HandlerErr::query)?
        .is_none()
    {
        return Err(HandlerErr::not_found("class"));
    }

    let students: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM students WHERE class_id = ?",
            [&class_id],
            |r| r.get(0),
        )
        .map_err(HandlerErr::query)?;
    if students > 0 {
        return Err(HandlerErr::bad_params("class still has students")
            .with_details(json!({ "studentCount": students })));
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    // Class-scoped tasks take their replies with them.
    tx.execute(
        "DELETE FROM task_replies WHERE task_id IN (SELECT id FROM tasks WHERE class_id = ?)",
        [&class_id],
    )
    .and_then(|_| tx.execute("DELETE FROM tasks WHERE class_id = ?", [&class_id]))
    .and_then(|_| tx.execute("DELETE FROM attendance WHERE class_id = ?", [&class_id]))
    .and_then(|_| tx.execute("DELETE FROM classes WHERE id = ?", [&class_id]))
    .map_err(|e| HandlerErr::new("db_delete_failed", e.to_string()))?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;

    tracing::info!(class_id = %class_id, "class deleted");
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let handler: fn(&Connection, &serde_json::Value) -> HandlerResult = match req.method.as_str()
    {
        "classes.list" => classes_list,
        "classes.create" => classes_create,
        "classes.update" => classes_update,
        "classes.delete" => classes_delete,
        _ => return None,
    };
    Some(respond(
        &req.id,
        db_conn(state).and_then(|conn| handler(conn, &req.params)),
    ))
}
