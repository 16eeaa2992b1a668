//! Call outcome codes and their wire mappings.

use std::fmt;

use http::StatusCode;
use portico_app::{auth::AuthServiceError, store::StoreError, users::UsersServiceError};
use thiserror::Error;
use tracing::error;

/// Opaque message returned for every internal fault.
pub(crate) const INTERNAL_MESSAGE: &str = "internal error";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Code {
    Ok,
    InvalidArgument,
    Unauthenticated,
    PermissionDenied,
    NotFound,
    AlreadyExists,
    Internal,
    Unavailable,
    DeadlineExceeded,
    Unimplemented,
}

impl Code {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::InvalidArgument => "invalid_argument",
            Self::Unauthenticated => "unauthenticated",
            Self::PermissionDenied => "permission_denied",
            Self::NotFound => "not_found",
            Self::AlreadyExists => "already_exists",
            Self::Internal => "internal",
            Self::Unavailable => "unavailable",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::Unimplemented => "unimplemented",
        }
    }

    /// Numeric code carried in `grpc-status`.
    pub(crate) const fn grpc(self) -> u16 {
        match self {
            Self::Ok => 0,
            Self::InvalidArgument => 3,
            Self::DeadlineExceeded => 4,
            Self::NotFound => 5,
            Self::AlreadyExists => 6,
            Self::PermissionDenied => 7,
            Self::Unimplemented => 12,
            Self::Internal => 13,
            Self::Unavailable => 14,
            Self::Unauthenticated => 16,
        }
    }

    pub(crate) const fn http(self) -> StatusCode {
        match self {
            Self::Ok => StatusCode::OK,
            Self::InvalidArgument => StatusCode::BAD_REQUEST,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::PermissionDenied => StatusCode::FORBIDDEN,
            Self::NotFound | Self::Unimplemented => StatusCode::NOT_FOUND,
            Self::AlreadyExists => StatusCode::CONFLICT,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failed call outcome, safe to return to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub(crate) struct Status {
    pub(crate) code: Code,
    pub(crate) message: String,
}

impl Status {
    pub(crate) fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    pub(crate) fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(Code::Unauthenticated, message)
    }

    pub(crate) fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(Code::PermissionDenied, message)
    }

    pub(crate) fn not_found(message: impl Into<String>) -> Self {
        Self::new(Code::NotFound, message)
    }

    pub(crate) fn already_exists(message: impl Into<String>) -> Self {
        Self::new(Code::AlreadyExists, message)
    }

    pub(crate) fn internal() -> Self {
        Self::new(Code::Internal, INTERNAL_MESSAGE)
    }

    pub(crate) fn unavailable() -> Self {
        Self::new(Code::Unavailable, "service temporarily unavailable")
    }

    pub(crate) fn deadline_exceeded() -> Self {
        Self::new(Code::DeadlineExceeded, "deadline exceeded")
    }

    pub(crate) fn unimplemented(method: &str) -> Self {
        Self::new(Code::Unimplemented, format!("unknown method `{method}`"))
    }
}

impl From<StoreError> for Status {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound => Self::not_found("not found"),
            StoreError::AlreadyExists => Self::already_exists("already exists"),
            StoreError::Unavailable(source) => {
                error!("storage unavailable: {source}");
                Self::unavailable()
            }
            other => {
                error!("storage error: {other:?}");
                Self::internal()
            }
        }
    }
}

impl From<AuthServiceError> for Status {
    fn from(error: AuthServiceError) -> Self {
        if error.is_unauthenticated() {
            return Self::unauthenticated(error.to_string());
        }

        match error {
            AuthServiceError::NotFound => Self::not_found("token not found"),
            AuthServiceError::Store(source) => source.into(),
            other => {
                error!("auth service error: {other:?}");
                Self::internal()
            }
        }
    }
}

impl From<UsersServiceError> for Status {
    fn from(error: UsersServiceError) -> Self {
        match error {
            UsersServiceError::NotFound => Self::not_found("user not found"),
            UsersServiceError::AlreadyExists => Self::already_exists("username is already taken"),
            UsersServiceError::InvalidUsername(_)
            | UsersServiceError::InvalidPassword(_)
            | UsersServiceError::EmptyUpdate => Self::invalid_argument(error.to_string()),
            UsersServiceError::SignupDisabled => Self::permission_denied(error.to_string()),
            UsersServiceError::Store(source) => source.into(),
            UsersServiceError::Password(source) => {
                error!("password hashing failed: {source}");
                Self::internal()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_map_to_http_and_grpc() {
        let cases = [
            (Code::InvalidArgument, 400, 3),
            (Code::Unauthenticated, 401, 16),
            (Code::PermissionDenied, 403, 7),
            (Code::NotFound, 404, 5),
            (Code::AlreadyExists, 409, 6),
            (Code::Internal, 500, 13),
            (Code::Unavailable, 503, 14),
            (Code::DeadlineExceeded, 504, 4),
            (Code::Unimplemented, 404, 12),
        ];

        for (code, http, grpc) in cases {
            assert_eq!(code.http().as_u16(), http, "http status for {code}");
            assert_eq!(code.grpc(), grpc, "grpc status for {code}");
        }
    }

    #[test]
    fn internal_storage_errors_are_opaque() {
        let status = Status::from(StoreError::InvalidData("column `role` was 'root'".into()));

        assert_eq!(status, Status::internal());
        assert_eq!(status.message, INTERNAL_MESSAGE);
    }

    #[test]
    fn store_conflicts_keep_their_meaning() {
        assert_eq!(Status::from(StoreError::NotFound).code, Code::NotFound);
        assert_eq!(
            Status::from(StoreError::AlreadyExists).code,
            Code::AlreadyExists
        );
    }

    #[test]
    fn credential_failures_are_unauthenticated_not_forbidden() {
        let status = Status::from(AuthServiceError::InvalidRefreshToken);

        assert_eq!(status.code, Code::Unauthenticated);
    }
}
