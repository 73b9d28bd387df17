//! RPC status codes and types.
//!
//! This module provides the outcome model used by every transport:
//! - [`Code`]: canonical RPC status codes
//! - [`Status`]: a code plus a human-readable message
//! - [`Code::http_status`] / [`http_status_from_i32`]: the HTTP status table
//!   that governs every JSON error surface

use http::StatusCode;

/// RPC status codes, numbered as in the gRPC wire protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Code {
    Ok = 0,
    Canceled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    Aborted = 10,
    OutOfRange = 11,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
    DataLoss = 15,
    Unauthenticated = 16,
}

/// Every code, in numeric order.
pub const ALL_CODES: [Code; 17] = [
    Code::Ok,
    Code::Canceled,
    Code::Unknown,
    Code::InvalidArgument,
    Code::DeadlineExceeded,
    Code::NotFound,
    Code::AlreadyExists,
    Code::PermissionDenied,
    Code::ResourceExhausted,
    Code::FailedPrecondition,
    Code::Aborted,
    Code::OutOfRange,
    Code::Unimplemented,
    Code::Internal,
    Code::Unavailable,
    Code::DataLoss,
    Code::Unauthenticated,
];

/// Non-standard "client closed request" status used for cancelled calls.
const CLIENT_CLOSED_REQUEST: u16 = 499;

impl Code {
    /// Get the string representation of this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Code::Ok => "ok",
            Code::Canceled => "canceled",
            Code::Unknown => "unknown",
            Code::InvalidArgument => "invalid_argument",
            Code::DeadlineExceeded => "deadline_exceeded",
            Code::NotFound => "not_found",
            Code::AlreadyExists => "already_exists",
            Code::PermissionDenied => "permission_denied",
            Code::ResourceExhausted => "resource_exhausted",
            Code::FailedPrecondition => "failed_precondition",
            Code::Aborted => "aborted",
            Code::OutOfRange => "out_of_range",
            Code::Unimplemented => "unimplemented",
            Code::Internal => "internal",
            Code::Unavailable => "unavailable",
            Code::DataLoss => "data_loss",
            Code::Unauthenticated => "unauthenticated",
        }
    }

    /// Look up a code by its numeric value.
    ///
    /// Returns `None` for values outside the enumeration.
    pub fn from_i32(value: i32) -> Option<Code> {
        ALL_CODES.get(usize::try_from(value).ok()?).copied()
    }

    /// HTTP status code reported to JSON callers for this code.
    ///
    /// `FailedPrecondition` deliberately maps to 400, not 412 Precondition Failed.
    ///
    /// ```
    /// use healthmux_core::Code;
    /// use http::StatusCode;
    ///
    /// assert_eq!(Code::NotFound.http_status(), StatusCode::NOT_FOUND);
    /// assert_eq!(Code::Canceled.http_status().as_u16(), 499);
    /// ```
    pub fn http_status(&self) -> StatusCode {
        match self {
            Code::Ok => StatusCode::OK,
            Code::Canceled => StatusCode::from_u16(CLIENT_CLOSED_REQUEST)
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Code::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
            Code::InvalidArgument => StatusCode::BAD_REQUEST,
            Code::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            Code::NotFound => StatusCode::NOT_FOUND,
            Code::AlreadyExists => StatusCode::CONFLICT,
            Code::PermissionDenied => StatusCode::FORBIDDEN,
            Code::Unauthenticated => StatusCode::UNAUTHORIZED,
            Code::ResourceExhausted => StatusCode::TOO_MANY_REQUESTS,
            Code::FailedPrecondition => StatusCode::BAD_REQUEST,
            Code::Aborted => StatusCode::CONFLICT,
            Code::OutOfRange => StatusCode::BAD_REQUEST,
            Code::Unimplemented => StatusCode::NOT_IMPLEMENTED,
            Code::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            Code::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Code::DataLoss => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// HTTP status code for a raw numeric RPC code.
///
/// Values outside the enumeration map to 500.
pub fn http_status_from_i32(value: i32) -> StatusCode {
    Code::from_i32(value).map_or(StatusCode::INTERNAL_SERVER_ERROR, |code| code.http_status())
}

impl std::fmt::Display for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Status - the failure value carried by every transport
// ============================================================================

/// RPC status representing the failed outcome of a call.
///
/// # Example
///
/// ```
/// use healthmux_core::{Code, Status};
///
/// let status = Status::not_found("unknown service");
/// assert_eq!(status.code(), Code::NotFound);
/// assert_eq!(status.message(), "unknown service");
/// assert_eq!(status.http_status().as_u16(), 404);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{code}{}", message_suffix(.message))]
pub struct Status {
    code: Code,
    message: String,
}

impl Status {
    /// Create a new status with a code and message.
    pub fn new<S: Into<String>>(code: Code, message: S) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Create a new status with just a code.
    pub fn from_code(code: Code) -> Self {
        Self {
            code,
            message: String::new(),
        }
    }

    /// Get the error code.
    pub fn code(&self) -> Code {
        self.code
    }

    /// Get the error message. Empty when none was given.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// HTTP status code for this status's code.
    pub fn http_status(&self) -> StatusCode {
        self.code.http_status()
    }

    /// Create a canceled status.
    pub fn cancelled<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Canceled, message)
    }

    /// Create an unknown status.
    pub fn unknown<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Unknown, message)
    }

    /// Create an invalid argument status.
    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    /// Create a deadline exceeded status.
    pub fn deadline_exceeded<S: Into<String>>(message: S) -> Self {
        Self::new(Code::DeadlineExceeded, message)
    }

    /// Create a not found status.
    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::new(Code::NotFound, message)
    }

    /// Create a failed precondition status.
    pub fn failed_precondition<S: Into<String>>(message: S) -> Self {
        Self::new(Code::FailedPrecondition, message)
    }

    /// Create an unimplemented status.
    pub fn unimplemented<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Unimplemented, message)
    }

    /// Create an internal status.
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Internal, message)
    }

    /// Create an unavailable status.
    pub fn unavailable<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Unavailable, message)
    }
}

fn message_suffix(message: &str) -> String {
    if message.is_empty() {
        String::new()
    } else {
        format!(": {message}")
    }
}

// ---- Conversions from and to tonic types (feature-gated) ----

#[cfg(feature = "tonic")]
impl From<::tonic::Code> for Code {
    fn from(code: ::tonic::Code) -> Self {
        match code {
            ::tonic::Code::Ok => Code::Ok,
            ::tonic::Code::Cancelled => Code::Canceled,
            ::tonic::Code::Unknown => Code::Unknown,
            ::tonic::Code::InvalidArgument => Code::InvalidArgument,
            ::tonic::Code::DeadlineExceeded => Code::DeadlineExceeded,
            ::tonic::Code::NotFound => Code::NotFound,
            ::tonic::Code::AlreadyExists => Code::AlreadyExists,
            ::tonic::Code::PermissionDenied => Code::PermissionDenied,
            ::tonic::Code::ResourceExhausted => Code::ResourceExhausted,
            ::tonic::Code::FailedPrecondition => Code::FailedPrecondition,
            ::tonic::Code::Aborted => Code::Aborted,
            ::tonic::Code::OutOfRange => Code::OutOfRange,
            ::tonic::Code::Unimplemented => Code::Unimplemented,
            ::tonic::Code::Internal => Code::Internal,
            ::tonic::Code::Unavailable => Code::Unavailable,
            ::tonic::Code::DataLoss => Code::DataLoss,
            ::tonic::Code::Unauthenticated => Code::Unauthenticated,
        }
    }
}

#[cfg(feature = "tonic")]
impl From<Code> for ::tonic::Code {
    fn from(code: Code) -> Self {
        match code {
            Code::Ok => ::tonic::Code::Ok,
            Code::Canceled => ::tonic::Code::Cancelled,
            Code::Unknown => ::tonic::Code::Unknown,
            Code::InvalidArgument => ::tonic::Code::InvalidArgument,
            Code::DeadlineExceeded => ::tonic::Code::DeadlineExceeded,
            Code::NotFound => ::tonic::Code::NotFound,
            Code::AlreadyExists => ::tonic::Code::AlreadyExists,
            Code::PermissionDenied => ::tonic::Code::PermissionDenied,
            Code::ResourceExhausted => ::tonic::Code::ResourceExhausted,
            Code::FailedPrecondition => ::tonic::Code::FailedPrecondition,
            Code::Aborted => ::tonic::Code::Aborted,
            Code::OutOfRange => ::tonic::Code::OutOfRange,
            Code::Unimplemented => ::tonic::Code::Unimplemented,
            Code::Internal => ::tonic::Code::Internal,
            Code::Unavailable => ::tonic::Code::Unavailable,
            Code::DataLoss => ::tonic::Code::DataLoss,
            Code::Unauthenticated => ::tonic::Code::Unauthenticated,
        }
    }
}

#[cfg(feature = "tonic")]
impl From<::tonic::Status> for Status {
    fn from(status: ::tonic::Status) -> Self {
        // Metadata and binary details have no counterpart here.
        Status::new(status.code().into(), status.message())
    }
}

#[cfg(feature = "tonic")]
impl From<Status> for ::tonic::Status {
    fn from(status: Status) -> Self {
        ::tonic::Status::new(status.code.into(), status.message)
    }
}
