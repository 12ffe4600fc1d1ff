use crate::ipc::helpers::{
    db_conn, load_snapshot, required_str, respond, to_json, HandlerErr, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::stats::period::{build_period_report, Period, PeriodError};
use rusqlite::Connection;

fn period_err(e: PeriodError) -> HandlerErr {
    HandlerErr::bad_params(e.to_string())
}

fn report(conn: &Connection, class_id: &str, period: Period) -> HandlerResult {
    // Fresh snapshot per request; a failed load aborts the report.
    let snap = load_snapshot(conn)?;
    if snap.class(class_id).is_none() {
        return Err(HandlerErr::not_found("class"));
    }
    let report = build_period_report(&snap, class_id, &period);
    tracing::info!(
        class_id,
        period = %report.period,
        attendance_rate = report.attendance.rate,
        "period report built"
    );
    to_json(&report)
}

fn reports_weekly(conn: &Connection, params: &serde_json::Value) -> HandlerResult {
    let class_id = required_str(params, "classId")?;
    let date = required_str(params, "date")?;
    let period = Period::weekly(&date).map_err(period_err)?;
    report(conn, &class_id, period)
}

fn reports_monthly(conn: &Connection, params: &serde_json::Value) -> HandlerResult {
    let class_id = required_str(params, "classId")?;
    let month = required_str(params, "month")?;
    let period = Period::monthly(&month).map_err(period_err)?;
    report(conn, &class_id, period)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let handler: fn(&Connection, &serde_json::Value) -> HandlerResult = match req.method.as_str()
    {
        "reports.weekly" => reports_weekly,
        "reports.monthly" => reports_monthly,
        _ => return None,
    };
    Some(respond(
        &req.id,
        db_conn(state).and_then(|conn| handler(conn, &req.params)),
    ))
}
