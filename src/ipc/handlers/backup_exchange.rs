use serde_json::json;
use std::path::PathBuf;

use crate::backup;
use crate::ipc::error::ok;
use crate::ipc::helpers::{get_required_str, store_of, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::store::Store;

fn backup_export(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let store = store_of(state)?;
    let out_path = PathBuf::from(get_required_str(params, "outPath")?);

    let summary = backup::export_data_bundle(store.data_dir(), &out_path)
        .map_err(|e| HandlerErr::new("io", format!("{e:#}")))?;

    Ok(json!({
        "outPath": out_path.to_string_lossy(),
        "bundleFormat": summary.bundle_format,
        "documentCount": summary.document_count,
    }))
}

/// Restores a bundle into the target workspace and selects it, so follow-up
/// requests read the imported documents.
fn backup_import(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let in_path = PathBuf::from(get_required_str(params, "inPath")?);
    let workspace = PathBuf::from(get_required_str(params, "path")?);

    let summary = backup::import_data_bundle(&in_path, &workspace).map_err(|e| {
        let message = format!("{e:#}");
        let code = if message.contains("digest mismatch") {
            "corrupt"
        } else {
            "io"
        };
        HandlerErr::new(code, message)
    })?;

    let store =
        Store::open(&workspace).map_err(|e| HandlerErr::new("io", format!("{e:#}")))?;
    state.workspace = Some(workspace.clone());
    state.store = Some(store);

    Ok(json!({
        "workspacePath": workspace.to_string_lossy(),
        "bundleFormat": summary.bundle_format_detected,
        "documentCount": summary.document_count,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "backup.export" => backup_export(state, &req.params),
        "backup.import" => backup_import(state, &req.params),
        _ => return None,
    };
    Some(match result {
        Ok(value) => ok(&req.id, value),
        Err(e) => e.response(&req.id),
    })
}
