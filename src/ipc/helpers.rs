use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::ipc::error::err;
use crate::ipc::types::AppState;
use crate::store::{DocKind, Store};

/// Typed failure carried out of handler bodies; `response` turns it into the
/// wire envelope.
pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> HandlerErr {
        HandlerErr {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(
        code: &'static str,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> HandlerErr {
        HandlerErr {
            code,
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    let value = params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| HandlerErr::new("bad_params", format!("missing {}", key)))?;
    if value.is_empty() {
        return Err(HandlerErr::new("bad_params", format!("{} must not be empty", key)));
    }
    Ok(value)
}

pub fn get_optional_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn get_required_i64(params: &serde_json::Value, key: &str) -> Result<i64, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| HandlerErr::new("bad_params", format!("missing {}", key)))
}

pub fn get_required_f64(params: &serde_json::Value, key: &str) -> Result<f64, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| HandlerErr::new("bad_params", format!("missing {}", key)))
}

pub fn get_bool(params: &serde_json::Value, key: &str) -> bool {
    params.get(key).and_then(|v| v.as_bool()).unwrap_or(false)
}

pub fn store_of(state: &AppState) -> Result<&Store, HandlerErr> {
    state
        .store
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

// Store access with failures mapped to wire codes: a document that exists but
// cannot be read back is `corrupt`; failed writes and listings are `io`.

pub fn read_doc<T: DeserializeOwned>(
    store: &Store,
    kind: DocKind,
    name: &str,
) -> Result<Option<T>, HandlerErr> {
    store
        .read(kind, name)
        .map_err(|e| HandlerErr::new("corrupt", format!("{e:#}")))
}

pub fn write_doc<T: Serialize>(
    store: &Store,
    kind: DocKind,
    name: &str,
    value: &T,
) -> Result<(), HandlerErr> {
    store
        .write(kind, name, value)
        .map_err(|e| HandlerErr::new("io", format!("{e:#}")))
}

pub fn remove_doc(store: &Store, kind: DocKind, name: &str) -> Result<bool, HandlerErr> {
    store
        .remove(kind, name)
        .map_err(|e| HandlerErr::new("io", format!("{e:#}")))
}

pub fn list_docs(store: &Store, kind: DocKind, suffix: &str) -> Result<Vec<String>, HandlerErr> {
    store
        .list(kind, suffix)
        .map_err(|e| HandlerErr::new("io", format!("{e:#}")))
}
