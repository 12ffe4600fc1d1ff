use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, required_str, respond, HandlerErr, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::stats::ranking::BOARD_SIZES;
use serde_json::json;
use std::path::PathBuf;

pub const TOP_N_SETTING: &str = "dashboard.topN";
pub const DEFAULT_TOP_N: usize = 5;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    match crate::ipc::open_workspace(state, &path) {
        Ok(()) => {
            tracing::info!("workspace selected: {}", path.display());
            ok(&req.id, json!({ "workspacePath": path.to_string_lossy() }))
        }
        Err(e) => err(&req.id, "db_open_failed", format!("{e:?}"), None),
    }
}

fn validate_setting(key: &str, value: &serde_json::Value) -> Result<(), HandlerErr> {
    if key == TOP_N_SETTING {
        let n = value.as_u64().unwrap_or(0) as usize;
        if !BOARD_SIZES.contains(&n) {
            return Err(HandlerErr::bad_params(format!(
                "{TOP_N_SETTING} must be one of {BOARD_SIZES:?}"
            ))
            .with_details(json!({ "value": value })));
        }
    }
    Ok(())
}

fn settings_get(state: &AppState, params: &serde_json::Value) -> HandlerResult {
    let conn = db_conn(state)?;
    let key = required_str(params, "key")?;
    let value = db::settings_get_json(conn, &key)
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
    Ok(json!({ "key": key, "value": value }))
}

fn settings_set(state: &AppState, params: &serde_json::Value) -> HandlerResult {
    let conn = db_conn(state)?;
    let key = required_str(params, "key")?;
    let value = params
        .get("value")
        .cloned()
        .ok_or_else(|| HandlerErr::bad_params("missing value"))?;
    validate_setting(&key, &value)?;
    db::settings_set_json(conn, &key, &value)
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    Ok(json!({ "key": key, "value": value }))
}

/// Dashboard honor-board size from workspace settings.
pub fn configured_top_n(conn: &rusqlite::Connection) -> usize {
    match db::settings_get_json(conn, TOP_N_SETTING) {
        Ok(Some(v)) => v
            .as_u64()
            .map(|n| n as usize)
            .filter(|n| BOARD_SIZES.contains(n))
            .unwrap_or(DEFAULT_TOP_N),
        Ok(None) => DEFAULT_TOP_N,
        Err(e) => {
            tracing::warn!("failed to read {TOP_N_SETTING}: {e:?}");
            DEFAULT_TOP_N
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "settings.get" => Some(respond(&req.id, settings_get(state, &req.params))),
        "settings.set" => Some(respond(&req.id, settings_set(state, &req.params))),
        _ => None,
    }
}
