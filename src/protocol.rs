use crate::error::{Result, SynergyError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::OnceLock;

/// Unanchored: matches anywhere inside the ID, as myLink hosts have always accepted
const TARGET_ID_PATTERN: &str = r"[A-Z0-9]+\.[0-9]+";
const STRICT_TARGET_ID_PATTERN: &str = r"^[A-Z0-9]+\.[0-9]+$";

/// API request structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    pub method: String,
    pub params: Params,
}

/// Request parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Params {
    /// System ID configured in the myLink app
    pub auth: String,
    #[serde(rename = "targetID")]
    pub target_id: String,
}

/// API reply structure
///
/// Only `id` and `result` are documented; `error` is accepted so a
/// controller-side failure is surfaced instead of resolving with `null`.
/// An explicit `"result": null` counts as absent, so it loses to `error`.
#[derive(Debug, Clone, Deserialize)]
pub struct Reply {
    pub id: u64,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
}

impl Request {
    /// Create a new request for a single target
    pub fn new(
        id: u64,
        method: impl Into<String>,
        system_id: impl Into<String>,
        target_id: impl Into<String>,
    ) -> Self {
        Self {
            id,
            method: method.into(),
            params: Params {
                auth: system_id.into(),
                target_id: target_id.into(),
            },
        }
    }

    /// Serialize to the wire format (a single unterminated JSON document)
    pub fn to_wire(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

impl Reply {
    /// Read the correlation id of an inbound document, if it has one
    pub fn peek_id(doc: &Value) -> Result<Option<u64>> {
        let obj = doc
            .as_object()
            .ok_or_else(|| SynergyError::Protocol(format!("Reply is not an object: {}", doc)))?;
        Ok(obj.get("id").and_then(Value::as_u64))
    }

    /// Convert a matched document into the caller's result
    pub fn from_document(doc: Value) -> Result<Self> {
        serde_json::from_value(doc).map_err(SynergyError::from)
    }

    /// Turn the reply into the caller-facing outcome
    pub fn into_result(self) -> Result<Value> {
        match (self.result, self.error) {
            (Some(result), _) => Ok(result),
            (None, Some(error)) => Err(SynergyError::Device {
                message: match error {
                    Value::String(s) => s,
                    other => other.to_string(),
                },
            }),
            (None, None) => Ok(Value::Null),
        }
    }
}

fn target_id_regex(strict: bool) -> &'static Regex {
    static LOOSE: OnceLock<Regex> = OnceLock::new();
    static STRICT: OnceLock<Regex> = OnceLock::new();
    let (cell, pattern) = if strict {
        (&STRICT, STRICT_TARGET_ID_PATTERN)
    } else {
        (&LOOSE, TARGET_ID_PATTERN)
    };
    cell.get_or_init(|| Regex::new(pattern).expect("target id pattern is valid"))
}

/// Check a target ID before it is put on the wire
///
/// With `strict == false` the pattern only has to appear somewhere in the ID,
/// so `"xCC.1x"` passes. `strict` requires the whole ID to match.
pub fn validate_target_id(target_id: &str, strict: bool) -> Result<()> {
    if target_id_regex(strict).is_match(target_id) {
        Ok(())
    } else {
        Err(SynergyError::InvalidTarget(target_id.to_string()))
    }
}
