use super::core::configured_top_n;
use crate::ipc::helpers::{
    db_conn, load_snapshot, optional_i64, optional_str, respond, to_json, HandlerErr,
    HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::stats::dashboard::build_overview;
use crate::stats::ranking::BOARD_SIZES;
use chrono::NaiveDate;
use rusqlite::Connection;
use serde_json::json;

fn dashboard_overview(conn: &Connection, params: &serde_json::Value) -> HandlerResult {
    let today = match optional_str(params, "today")? {
        Some(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
            .map_err(|_| HandlerErr::bad_params("today must be YYYY-MM-DD"))?,
        None => chrono::Local::now().date_naive(),
    };
    let top_n = match optional_i64(params, "topN")? {
        Some(n) => {
            let n = usize::try_from(n).unwrap_or(0);
            if !BOARD_SIZES.contains(&n) {
                return Err(HandlerErr::bad_params(format!("topN must be one of {BOARD_SIZES:?}"))
                    .with_details(json!({ "topN": n })));
            }
            n
        }
        None => configured_top_n(conn),
    };

    let snap = load_snapshot(conn)?;
    to_json(&build_overview(&snap, today, top_n))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "dashboard.overview" => Some(respond(
            &req.id,
            db_conn(state).and_then(|conn| dashboard_overview(conn, &req.params)),
        )),
        _ => None,
    }
}
