use crate::backup;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn path_param(req: &Request, key: &str) -> Option<PathBuf> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
}

fn handle_backup_export(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(out) = path_param(req, "outPath") else {
        return err(&req.id, "bad_params", "missing outPath", None);
    };
    let Some(workspace_path) = state.workspace.clone() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    if let Some(conn) = state.db.as_ref() {
        if let Err(e) = conn.execute_batch("PRAGMA wal_checkpoint(FULL)") {
            tracing::debug!("wal checkpoint before export failed: {e}");
        }
    }

    match backup::export_workspace_bundle(&workspace_path, &out) {
        Ok(export) => ok(
            &req.id,
            json!({
                "path": out.to_string_lossy(),
                "bundleFormat": export.bundle_format,
                "entryCount": export.entry_count,
                "dbSha256": export.db_sha256,
            }),
        ),
        Err(e) => {
            tracing::warn!("backup export failed: {e:#}");
            err(
                &req.id,
                "backup_export_failed",
                format!("{e:#}"),
                Some(json!({ "path": out.to_string_lossy() })),
            )
        }
    }
}

fn handle_backup_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(src) = path_param(req, "inPath") else {
        return err(&req.id, "bad_params", "missing inPath", None);
    };
    let Some(workspace_path) = path_param(req, "workspacePath").or_else(|| state.workspace.clone())
    else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    if !src.is_file() {
        return err(
            &req.id,
            "not_found",
            "bundle file not found",
            Some(json!({ "path": src.to_string_lossy() })),
        );
    }

    // Validate before touching the live workspace.
    let bundle = match backup::verify_workspace_bundle(&src) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("backup import rejected: {e:#}");
            return err(
                &req.id,
                "backup_import_failed",
                format!("{e:#}"),
                Some(json!({ "path": src.to_string_lossy() })),
            );
        }
    };

    // Drop open handle before replacing file.
    let previous = state.workspace.take();
    state.db = None;

    let import = match backup::install_workspace_bundle(bundle, &workspace_path) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("backup import failed: {e:#}");
            if let Some(prev) = previous {
                if let Err(reopen) = crate::ipc::open_workspace(state, &prev) {
                    tracing::warn!("failed to reopen {}: {reopen:#}", prev.display());
                }
            }
            return err(
                &req.id,
                "backup_import_failed",
                format!("{e:#}"),
                Some(json!({ "path": src.to_string_lossy() })),
            );
        }
    };

    match crate::ipc::open_workspace(state, &workspace_path) {
        Ok(()) => ok(
            &req.id,
            json!({
                "workspacePath": workspace_path.to_string_lossy(),
                "bundleFormat": import.bundle_format,
                "dbBytes": import.db_bytes,
            }),
        ),
        Err(e) => err(&req.id, "db_open_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "backup.export" => Some(handle_backup_export(state, req)),
        "backup.import" => Some(handle_backup_import(state, req)),
        _ => None,
    }
}
