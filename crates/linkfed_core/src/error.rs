/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use http::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("gone: {0}")]
    Gone(String),

    #[error("invalid: {0}")]
    Invalid(String),

    #[error("cancelled")]
    Cancelled,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected status {status} for {iri}")]
    Status { status: u16, iri: String },

    #[error("json error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type SyncResult<T> = Result<T, SyncError>;

impl SyncError {
    /// Maps a non-success response to the taxonomy. `body` is only used to
    /// enrich the message.
    pub fn from_status(status: StatusCode, iri: &str, body: &str) -> Self {
        let detail = error_detail(body)
            .map(|d| format!("{iri}: {d}"))
            .unwrap_or_else(|| iri.to_string());
        match status {
            StatusCode::NOT_FOUND => SyncError::NotFound(detail),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SyncError::Unauthorized(detail),
            StatusCode::CONFLICT => SyncError::Conflict(detail),
            StatusCode::GONE => SyncError::Gone(detail),
            _ => SyncError::Status {
                status: status.as_u16(),
                iri: iri.to_string(),
            },
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        SyncError::Invalid(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, SyncError::Conflict(_))
    }

    pub fn is_gone(&self) -> bool {
        matches!(self, SyncError::Gone(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SyncError::Cancelled)
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, SyncError::Unauthorized(_))
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        SyncError::Transport(format!("{e:#}"))
    }
}

impl From<url::ParseError> for SyncError {
    fn from(e: url::ParseError) -> Self {
        SyncError::Invalid(format!("bad iri: {e}"))
    }
}

// The service answers failures with {"errors": [{"message": ".."}]}.
fn error_detail(body: &str) -> Option<String> {
    let v: serde_json::Value = serde_json::from_str(body).ok()?;
    let first = v.get("errors")?.as_array()?.first()?;
    first
        .get("message")
        .and_then(|m| m.as_str())
        .filter(|m| !m.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_statuses() {
        let iri = "https://fed.example/objects/1";
        assert!(SyncError::from_status(StatusCode::NOT_FOUND, iri, "").is_not_found());
        assert!(SyncError::from_status(StatusCode::FORBIDDEN, iri, "").is_unauthorized());
        assert!(SyncError::from_status(StatusCode::CONFLICT, iri, "").is_conflict());
        assert!(SyncError::from_status(StatusCode::GONE, iri, "").is_gone());
        assert!(matches!(
            SyncError::from_status(StatusCode::BAD_GATEWAY, iri, ""),
            SyncError::Status { status: 502, .. }
        ));
    }

    #[test]
    fn error_body_message_is_kept() {
        let body = r#"{"errors":[{"message":"object already deleted"}]}"#;
        let err = SyncError::from_status(StatusCode::GONE, "https://fed.example/o/1", body);
        assert_eq!(
            err.to_string(),
            "gone: https://fed.example/o/1: object already deleted"
        );
    }
}
