use std::{io::Read, str::FromStr as _, time::Duration};

use serde::Deserialize;

/// An error response from the API.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The API responded with an application-level error code.
    ErrorResponse {
        /// The HTTP status on the overall response.
        status: http::StatusCode,
        /// The error code from the API.
        kind: ApiErrorKind,
        /// A longer description of the error encountered.
        message: Option<String>,
    },
    /// The API asked us to slow down (HTTP 429).
    RateLimited {
        /// The `Retry-After` delay advertised by the server, if any.
        retry_after: Option<Duration>,
    },
    /// The HTTP status was non-2xx, and the response did not contain an
    /// error code.
    Other(http::StatusCode),
    /// The API response was invalid.
    InvalidResponse(http::StatusCode, #[source] serde_json::Error),
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::ErrorResponse { kind, message, .. } => {
                write!(f, "{kind}")?;
                if let Some(message) = &message {
                    write!(f, ": {message}")?;
                }
            }
            ApiError::RateLimited {
                retry_after: Some(delay),
            } => {
                write!(f, "Rate limited, retry after {}s", delay.as_secs())?;
            }
            ApiError::RateLimited { retry_after: None } => {
                write!(f, "Rate limited")?;
            }
            ApiError::Other(status) => {
                write!(f, "{status}")?;
            }
            ApiError::InvalidResponse(status, _) => {
                write!(f, "Invalid response ({status})")?;
            }
        }

        Ok(())
    }
}

/// Indicates that the error code was unrecognized.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Invalid error kind: {0}")]
pub struct InvalidErrorKind(String);

macro_rules! api_error_kinds {
    ($($code:literal => $variant:ident),* $(,)?) => {
        /// An error code from the API.
        #[derive(Debug, Clone, PartialEq, Eq)]
        #[non_exhaustive]
        pub enum ApiErrorKind {
            $(
                #[doc = $code]
                $variant,
            )*
            /// An unknown error code.
            Unknown(String),
        }

        impl std::fmt::Display for ApiErrorKind {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(match self {
                    $(ApiErrorKind::$variant => $code,)*
                    ApiErrorKind::Unknown(kind) => kind,
                })
            }
        }

        impl std::str::FromStr for ApiErrorKind {
            type Err = InvalidErrorKind;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(match s {
                    $($code => ApiErrorKind::$variant,)*
                    _ => return Err(InvalidErrorKind(s.to_string())),
                })
            }
        }
    };
}

api_error_kinds! {
    "API_TOKEN_NOT_ALLOWED" => ApiTokenNotAllowed,
    "AUTHENTICATION_REQUIRED" => AuthenticationRequired,
    "BAD_JSON" => BadJson,
    "BASE_NOT_FOUND" => BaseNotFound,
    "FIELD_NOT_FOUND" => FieldNotFound,
    "FORBIDDEN" => Forbidden,
    "INTERNAL_SERVER_ERROR" => InternalServerError,
    "INVALID_FILTER" => InvalidFilter,
    "INVALID_LIMIT_VALUE" => InvalidLimitValue,
    "INVALID_OFFSET_VALUE" => InvalidOffsetValue,
    "INVALID_PAGE_VALUE" => InvalidPageValue,
    "NOT_IMPLEMENTED" => NotImplemented,
    "RECORD_NOT_FOUND" => RecordNotFound,
    "REQUIRED_FIELD_MISSING" => RequiredFieldMissing,
    "SOURCE_NOT_FOUND" => SourceNotFound,
    "TABLE_NOT_FOUND" => TableNotFound,
    "UNAUTHORIZED" => Unauthorized,
    "USER_NOT_FOUND" => UserNotFound,
    "VIEW_NOT_FOUND" => ViewNotFound,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawApiError {
    error: String,
    message: Option<String>,
}

impl ApiError {
    /// The application-level error code, if the response carried one.
    pub fn kind(&self) -> Option<&ApiErrorKind> {
        match self {
            ApiError::ErrorResponse { kind, .. } => Some(kind),
            _ => None,
        }
    }

    /// Whether the error indicates a missing record, table, or other entity.
    pub fn is_not_found(&self) -> bool {
        match self {
            ApiError::ErrorResponse { kind, .. } => matches!(
                kind,
                ApiErrorKind::RecordNotFound
                    | ApiErrorKind::TableNotFound
                    | ApiErrorKind::ViewNotFound
                    | ApiErrorKind::FieldNotFound
                    | ApiErrorKind::BaseNotFound
                    | ApiErrorKind::SourceNotFound
                    | ApiErrorKind::UserNotFound
            ),
            ApiError::Other(status) => *status == http::StatusCode::NOT_FOUND,
            _ => false,
        }
    }

    /// Whether the error indicates a rejected or missing API token.
    pub fn is_auth_failure(&self) -> bool {
        match self {
            ApiError::ErrorResponse { status, kind, .. } => {
                matches!(
                    kind,
                    ApiErrorKind::AuthenticationRequired
                        | ApiErrorKind::ApiTokenNotAllowed
                        | ApiErrorKind::Unauthorized
                        | ApiErrorKind::Forbidden
                ) || status.as_u16() == 401
                    || status.as_u16() == 403
            }
            ApiError::Other(status) => status.as_u16() == 401 || status.as_u16() == 403,
            _ => false,
        }
    }

    /// The server-advertised retry delay, for rate-limit errors.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ApiError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// How long to wait before retrying, if the error is retryable at all.
    /// Rate limits honor the server-advertised delay; server errors back off
    /// exponentially from `backoff_factor` seconds.
    pub(crate) fn retry_delay(&self, attempt: u32, backoff_factor: f64) -> Option<Duration> {
        let backoff =
            || Duration::from_secs_f64(backoff_factor.max(0.0) * 2f64.powi(attempt as i32));

        match self {
            ApiError::RateLimited { retry_after } => Some(retry_after.unwrap_or_else(backoff)),
            ApiError::ErrorResponse { status, .. } | ApiError::Other(status)
                if status.is_server_error() =>
            {
                Some(backoff())
            }
            _ => None,
        }
    }

    pub(crate) fn from_raw(status: http::StatusCode, raw: RawApiError) -> Self {
        let kind = ApiErrorKind::from_str(&raw.error).unwrap_or(ApiErrorKind::Unknown(raw.error));

        ApiError::ErrorResponse {
            status,
            kind,
            message: raw.message,
        }
    }

    /// Decode a non-2xx response into the error taxonomy.
    pub(crate) fn from_parts(parts: http::response::Parts, body: impl Read) -> Self {
        if parts.status == http::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = parts
                .headers
                .get(http::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs);

            return ApiError::RateLimited { retry_after };
        }

        match serde_json::from_reader::<_, RawApiError>(body) {
            Ok(raw) => ApiError::from_raw(parts.status, raw),
            Err(_) => ApiError::Other(parts.status),
        }
    }
}
