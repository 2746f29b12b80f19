//! Parsing and normalization of the inbound lead payload.
//!
//! Clients in the wild send the same data in slightly different shapes, so
//! the parser accepts both `first_name` and `firstName`, numeric or string
//! scores, tag lists or comma separated tag strings, and bodies that were
//! JSON-encoded twice.

use crate::config::SyncConfig;
use crate::errors::SyncError;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;

/// Lead as sent by the client
#[derive(Debug, Default, Deserialize, PartialEq)]
pub struct LeadPayload {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, alias = "firstName")]
    pub first_name: Option<String>,
    #[serde(default, alias = "Score")]
    pub score: Option<Value>,
    #[serde(default, rename = "tagNames", alias = "tag_names", alias = "tags")]
    pub tag_names: Option<TagNames>,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum TagNames {
    List(Vec<String>),
    /// Comma separated tag names
    Joined(String),
}

impl TagNames {
    fn into_vec(self) -> Vec<String> {
        match self {
            TagNames::List(names) => names,
            TagNames::Joined(joined) => joined.split(',').map(String::from).collect(),
        }
    }
}

/// Normalized lead, ready to be synced
#[derive(Clone, Debug, PartialEq)]
pub struct Lead {
    /// Trimmed and lowercased
    pub email: String,
    pub first_name: Option<String>,
    pub score: Option<String>,
    /// Requested tags followed by the forced tags, unique ignoring case
    pub tag_names: Vec<String>,
}

impl Lead {
    /// Parses and normalizes a raw request body.
    pub fn from_body(body: &[u8], config: &SyncConfig) -> Result<Self, SyncError> {
        let payload = parse_payload(body)?;
        Lead::from_payload(payload, config)
    }

    pub fn from_payload(payload: LeadPayload, config: &SyncConfig) -> Result<Self, SyncError> {
        let email = payload
            .email
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty())
            .ok_or_else(|| SyncError::Validation("email is required".into()))?;

        if !email.contains('@') {
            return Err(SyncError::Validation(format!("invalid email: {email}")));
        }

        let first_name = payload
            .first_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());

        let score = payload.score.map(normalize_score).transpose()?.flatten();

        let requested = payload
            .tag_names
            .map(TagNames::into_vec)
            .unwrap_or_default();
        let tag_names = dedupe_tags(requested.into_iter().chain(config.forced_tags.clone()));

        Ok(Lead {
            email,
            first_name,
            score,
            tag_names,
        })
    }
}

fn parse_payload(body: &[u8]) -> Result<LeadPayload, SyncError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(LeadPayload::default());
    }

    let mut value: Value = serde_json::from_slice(body)
        .map_err(|e| SyncError::Validation(format!("body is not valid JSON: {e}")))?;

    // Some clients stringify the payload before sending it
    if let Value::String(inner) = &value {
        value = serde_json::from_str(inner)
            .map_err(|e| SyncError::Validation(format!("body is not valid JSON: {e}")))?;
    }

    if !value.is_object() {
        return Err(SyncError::Validation(
            "body must be a JSON object".to_string(),
        ));
    }

    serde_json::from_value(value).map_err(|e| SyncError::Validation(e.to_string()))
}

fn normalize_score(score: Value) -> Result<Option<String>, SyncError> {
    match score {
        Value::Null => Ok(None),
        Value::String(s) => {
            let s = s.trim();
            Ok((!s.is_empty()).then(|| s.to_string()))
        }
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Some(i.to_string()))
            } else if let Some(u) = n.as_u64() {
                Ok(Some(u.to_string()))
            } else {
                let f = n.as_f64().unwrap_or_default();
                // 87.0 is sent as "87"
                if f.fract() == 0.0 && f.abs() < 1e15 {
                    Ok(Some((f as i64).to_string()))
                } else {
                    Ok(Some(f.to_string()))
                }
            }
        }
        _ => Err(SyncError::Validation(
            "score must be a string or a number".to_string(),
        )),
    }
}

/// Trims names, drops empty ones and keeps the first spelling of names that
/// only differ in case.
fn dedupe_tags<I>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    names
        .into_iter()
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty() && seen.insert(n.to_lowercase()))
        .collect()
}
