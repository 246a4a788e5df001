use serde::Deserialize;
use thiserror::Error;

use crate::models::{CoreError, CoreErrorKind, SyncScope};

/// Failure of a single HTTP exchange, before it is mapped onto the domain
/// error taxonomy.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("could not decode response: {0}")]
    Decode(String),
}

impl HttpError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn into_core_error(self, scope: SyncScope) -> CoreError {
        match self {
            Self::Status { status, body } => {
                CoreError::new(classify_status(status), vendor_error_detail(status, &body))
                    .with_status(status)
                    .with_scope(scope)
            }
            Self::Transport(message) => {
                CoreError::new(CoreErrorKind::RemoteUnavailable, message).with_scope(scope)
            }
            Self::Decode(message) => {
                CoreError::new(CoreErrorKind::ParseFailure, message).with_scope(scope)
            }
        }
    }
}

impl From<ureq::Error> for HttpError {
    fn from(error: ureq::Error) -> Self {
        match error {
            ureq::Error::Status(status, response) => Self::Status {
                status,
                body: response.into_string().unwrap_or_default(),
            },
            ureq::Error::Transport(transport) => Self::Transport(transport.to_string()),
        }
    }
}

impl From<std::io::Error> for HttpError {
    fn from(error: std::io::Error) -> Self {
        Self::Decode(error.to_string())
    }
}

pub fn classify_status(status: u16) -> CoreErrorKind {
    match status {
        401 | 403 => CoreErrorKind::AuthFailure,
        400..=499 => CoreErrorKind::RemoteRejected,
        _ => CoreErrorKind::RemoteUnavailable,
    }
}

#[derive(Debug, Default, Deserialize)]
struct VendorErrorBody {
    #[serde(default)]
    errors: Vec<VendorError>,
}

#[derive(Debug, Default, Deserialize)]
struct VendorError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

/// Renders the vendor's structured `errors[]` body so the operator sees the
/// exact validation message. Falls back to the raw body.
pub fn vendor_error_detail(status: u16, body: &str) -> String {
    let parsed = serde_json::from_str::<VendorErrorBody>(body).unwrap_or_default();
    let details: Vec<String> = parsed
        .errors
        .iter()
        .filter_map(|error| {
            let parts: Vec<&str> = [&error.title, &error.detail]
                .into_iter()
                .filter_map(|part| part.as_deref())
                .filter(|part| !part.trim().is_empty())
                .collect();
            if parts.is_empty() {
                return error.code.clone();
            }
            Some(parts.join(": "))
        })
        .collect();

    if !details.is_empty() {
        return format!("HTTP {status}: {}", details.join("; "));
    }

    let body = body.trim();
    if body.is_empty() {
        format!("HTTP {status}")
    } else {
        format!("HTTP {status}: {body}")
    }
}
