use crate::ipc::helpers::{
    db_conn, load_snapshot, optional_str, respond, to_json, HandlerErr, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::model::ALL_CLASSES;
use crate::snapshot::Snapshot;
use crate::stats::honor::{build_student_stats, filter_by_class, honor_board, StudentStats};
use rusqlite::Connection;
use serde_json::json;

/// Stats for the whole school, then narrowed to `classId` when given.
fn scoped_stats(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<(Option<String>, Vec<StudentStats>), HandlerErr> {
    let class_id = optional_str(params, "classId")?.filter(|c| c != ALL_CLASSES);
    let snap: Snapshot = load_snapshot(conn)?;
    if let Some(cid) = class_id.as_deref() {
        if snap.class(cid).is_none() {
            return Err(HandlerErr::not_found("class"));
        }
    }
    let stats = filter_by_class(build_student_stats(&snap), class_id.as_deref());
    Ok((class_id, stats))
}

fn honor_stats(conn: &Connection, params: &serde_json::Value) -> HandlerResult {
    let (class_id, stats) = scoped_stats(conn, params)?;
    Ok(json!({ "classId": class_id, "stats": to_json(&stats)? }))
}

fn honor_board_sections(conn: &Connection, params: &serde_json::Value) -> HandlerResult {
    let (class_id, stats) = scoped_stats(conn, params)?;
    Ok(json!({ "classId": class_id, "sections": to_json(&honor_board(&stats))? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let handler: fn(&Connection, &serde_json::Value) -> HandlerResult = match req.method.as_str()
    {
        "honor.stats" => honor_stats,
        "honor.board" => honor_board_sections,
        _ => return None,
    };
    Some(respond(
        &req.id,
        db_conn(state).and_then(|conn| handler(conn, &req.params)),
    ))
}
