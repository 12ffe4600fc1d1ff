use crate::ipc::helpers::{
    db_conn, load_snapshot, now_timestamp, optional_bool, optional_f64, optional_str,
    required_date, required_str, respond, to_json, HandlerErr, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{Task, TaskReply, ALL_CLASSES};
use crate::snapshot;
use crate::stats::completion::{class_grade, resolve_completion, TaskScope};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use std::collections::HashSet;
use uuid::Uuid;

fn ensure_task_class(conn: &Connection, class_id: &str) -> Result<(), HandlerErr> {
    if class_id == ALL_CLASSES {
        return Ok(());
    }
    match snapshot::get_class(conn, class_id).map_err(HandlerErr::query)? {
        Some(_) => Ok(()),
        None => Err(HandlerErr::not_found("class")),
    }
}

fn newest_first(tasks: &mut [Task]) {
    tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

fn tasks_list(conn: &Connection, params: &serde_json::Value) -> HandlerResult {
    let class_id = required_str(params, "classId")?;
    let mut tasks = snapshot::list_tasks(conn, Some(&class_id)).map_err(HandlerErr::query)?;
    newest_first(&mut tasks);
    Ok(json!({ "tasks": to_json(&tasks)? }))
}

fn tasks_create(conn: &Connection, params: &serde_json::Value) -> HandlerResult {
    let class_id = required_str(params, "classId")?;
    ensure_task_class(conn, &class_id)?;

    let task = Task {
        id: Uuid::new_v4().to_string(),
        class_id,
        title: required_str(params, "title")?,
        description: optional_str(params, "description")?.unwrap_or_default(),
        due_date: required_date(params, "dueDate")?,
        require_reply: optional_bool(params, "requireReply")?.unwrap_or(true),
        created_at: now_timestamp(),
        grade: optional_str(params, "grade")?,
        unit: optional_str(params, "unit")?,
        points: optional_f64(params, "points")?,
    };

    conn.execute(
        "INSERT INTO tasks(id, class_id, title, description, due_date, require_reply, created_at, grade, unit, points)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &task.id,
            &task.class_id,
            &task.title,
            &task.description,
            &task.due_date,
            task.require_reply as i64,
            &task.created_at,
            &task.grade,
            &task.unit,
            task.points,
        ),
    )
    .map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string()).with_details(json!({ "table": "tasks" }))
    })?;
    Ok(json!({ "task": to_json(&task)? }))
}

fn tasks_update(conn: &Connection, params: &serde_json::Value) -> HandlerResult {
    let task_id = required_str(params, "taskId")?;
    let Some(mut task) = snapshot::get_task(conn, &task_id).map_err(HandlerErr::query)? else {
        return Err(HandlerErr::not_found("task"));
    };

    let patch = params.get("patch").unwrap_or(params);
    if let Some(class_id) = optional_str(patch, "classId")? {
        ensure_task_class(conn, &class_id)?;
        task.class_id = class_id;
    }
    if patch.get("title").is_some() {
        task.title = required_str(patch, "title")?;
    }
    if let Some(v) = optional_str(patch, "description")? {
        task.description = v;
    }
    if patch.get("dueDate").is_some() {
        task.due_date = required_date(patch, "dueDate")?;
    }
    if let Some(v) = optional_bool(patch, "requireReply")? {
        task.require_reply = v;
    }
    if patch.get("grade").is_some() {
        task.grade = optional_str(patch, "grade")?;
    }
    if patch.get("unit").is_some() {
        task.unit = optional_str(patch, "unit")?;
    }
    if patch.get("points").is_some() {
        task.points = optional_f64(patch, "points")?;
    }

    conn.execute(
        "UPDATE tasks
         SET class_id = ?, title = ?, description = ?, due_date = ?, require_reply = ?,
             grade = ?, unit = ?, points = ?
         WHERE id = ?",
        (
            &task.class_id,
            &task.title,
            &task.description,
            &task.due_date,
            task.require_reply as i64,
            &task.grade,
            &task.unit,
            task.points,
            &task_id,
        ),
    )
    .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    Ok(json!({ "task": to_json(&task)? }))
}

fn tasks_delete(conn: &Connection, params: &serde_json::Value) -> HandlerResult {
    let task_id = required_str(params, "taskId")?;
    if snapshot::get_task(conn, &task_id)
        .map_err(HandlerErr::query)?
        .is_none()
    {
        return Err(HandlerErr::not_found("task"));
    }
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    tx.execute("DELETE FROM task_replies WHERE task_id = ?", [&task_id])
        .and_then(|_| tx.execute("DELETE FROM tasks WHERE id = ?", [&task_id]))
        .map_err(|e| HandlerErr::new("db_delete_failed", e.to_string()))?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    Ok(json!({ "ok": true }))
}

fn tasks_reply(conn: &Connection, params: &serde_json::Value) -> HandlerResult {
    let task_id = required_str(params, "taskId")?;
    let student_id = required_str(params, "studentId")?;
    if snapshot::get_task(conn, &task_id)
        .map_err(HandlerErr::query)?
        .is_none()
    {
        return Err(HandlerErr::not_found("task"));
    }
    if snapshot::get_student(conn, &student_id)
        .map_err(HandlerErr::query)?
        .is_none()
    {
        return Err(HandlerErr::not_found("student"));
    }

    // Resubmissions are appended; completion counts a task once regardless.
    let reply = TaskReply {
        id: Uuid::new_v4().to_string(),
        task_id,
        student_id,
        reply_text: optional_str(params, "replyText")?.unwrap_or_default(),
        submitted_at: optional_str(params, "submittedAt")?.unwrap_or_else(now_timestamp),
        grade: None,
        feedback: None,
    };
    conn.execute(
        "INSERT INTO task_replies(id, task_id, student_id, reply_text, submitted_at)
         VALUES(?, ?, ?, ?, ?)",
        (
            &reply.id,
            &reply.task_id,
            &reply.student_id,
            &reply.reply_text,
            &reply.submitted_at,
        ),
    )
    .map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string())
            .with_details(json!({ "table": "task_replies" }))
    })?;
    Ok(json!({ "reply": to_json(&reply)? }))
}

fn tasks_replies(conn: &Connection, params: &serde_json::Value) -> HandlerResult {
    let task_id = required_str(params, "taskId")?;
    let replies = snapshot::list_replies(conn, Some(&task_id)).map_err(HandlerErr::query)?;
    Ok(json!({ "replies": to_json(&replies)? }))
}

fn tasks_grade_reply(conn: &Connection, params: &serde_json::Value) -> HandlerResult {
    let reply_id = required_str(params, "replyId")?;
    let grade = optional_f64(params, "grade")?.ok_or_else(|| HandlerErr::bad_params("missing grade"))?;
    let feedback = optional_str(params, "feedback")?;

    let max_points: Option<Option<f64>> = conn
        .query_row(
            "SELECT t.points FROM task_replies r JOIN tasks t ON t.id = r.task_id WHERE r.id = ?",
            [&reply_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(HandlerErr::query)?;
    let Some(max_points) = max_points else {
        return Err(HandlerErr::not_found("reply"));
    };
    let out_of = max_points.unwrap_or(10.0);
    if grade < 0.0 || grade > out_of {
        return Err(HandlerErr::bad_params(format!("grade must be between 0 and {out_of}"))
            .with_details(json!({ "grade": grade })));
    }

    conn.execute(
        "UPDATE task_replies SET grade = ?, feedback = ? WHERE id = ?",
        (grade, &feedback, &reply_id),
    )
    .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    Ok(json!({ "replyId": reply_id, "grade": grade, "feedback": feedback }))
}

/// Tasks a student sees: own class plus global tasks for their grade.
fn tasks_for_student(conn: &Connection, params: &serde_json::Value) -> HandlerResult {
    let student_id = required_str(params, "studentId")?;
    let snap = load_snapshot(conn)?;
    let student = snap
        .student(&student_id)
        .ok_or_else(|| HandlerErr::not_found("student"))?;
    let grade = snap.class(&student.class_id).and_then(class_grade);

    let completion = resolve_completion(
        &snap.tasks,
        &snap.replies,
        student,
        TaskScope::Graded(grade.as_deref()),
    );
    let replied: HashSet<&str> = snap
        .replies
        .iter()
        .filter(|r| r.student_id == student.id)
        .map(|r| r.task_id.as_str())
        .collect();

    let mut tasks: Vec<Task> = completion.assigned.iter().map(|t| (*t).clone()).collect();
    newest_first(&mut tasks);
    let rows: Vec<serde_json::Value> = tasks
        .iter()
        .map(|t| -> Result<serde_json::Value, HandlerErr> {
            let mut v = to_json(t)?;
            v["completed"] = json!(replied.contains(t.id.as_str()));
            Ok(v)
        })
        .collect::<Result<_, _>>()?;

    Ok(json!({
        "studentId": student.id,
        "grade": grade,
        "totalTasks": completion.total(),
        "completedTasks": completion.completed,
        "progressPercent": completion.progress_percent(),
        "tasks": rows,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let handler: fn(&Connection, &serde_json::Value) -> HandlerResult = match req.method.as_str()
    {
        "tasks.list" => tasks_list,
        "tasks.create" => tasks_create,
        "tasks.update" => tasks_update,
        "tasks.delete" => tasks_delete,
        "tasks.reply" => tasks_reply,
        "tasks.replies" => tasks_replies,
        "tasks.gradeReply" => tasks_grade_reply,
        "tasks.forStudent" => tasks_for_student,
        _ => return None,
    };
    Some(respond(
        &req.id,
        db_conn(state).and_then(|conn| handler(conn, &req.params)),
    ))
}
