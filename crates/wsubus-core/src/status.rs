//! Bus status codes.
//!
//! These are the integers carried as the first element of every `result`
//! array on the wire. `0` is success; everything else is an error with no
//! payload.

use serde::{Deserialize, Serialize};

/// Status code returned by a bus operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
#[repr(i32)]
pub enum BusStatus {
    /// Success.
    Ok = 0,
    /// The command itself was invalid.
    InvalidCommand = 1,
    /// An argument had the wrong type or was missing.
    InvalidArgument = 2,
    /// The object exists but has no such method.
    MethodNotFound = 3,
    /// No such object, subscription, or other target.
    NotFound = 4,
    /// The call produced no data.
    NoData = 5,
    /// The caller is not allowed to do this.
    PermissionDenied = 6,
    /// The operation did not complete in time.
    Timeout = 7,
    /// Not supported in the current state.
    NotSupported = 8,
    /// Generic failure.
    UnknownError = 9,
    /// The link to the backing peer failed.
    ConnectionFailed = 10,
}

impl BusStatus {
    /// Numeric wire code.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Whether this is [`BusStatus::Ok`].
    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }

    /// Map a wire code back to a status. Unknown codes collapse to
    /// [`BusStatus::UnknownError`].
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => Self::Ok,
            1 => Self::InvalidCommand,
            2 => Self::InvalidArgument,
            3 => Self::MethodNotFound,
            4 => Self::NotFound,
            5 => Self::NoData,
            6 => Self::PermissionDenied,
            7 => Self::Timeout,
            8 => Self::NotSupported,
            10 => Self::ConnectionFailed,
            _ => Self::UnknownError,
        }
    }

    /// Human-readable description, used in logs.
    pub fn describe(self) -> &'static str {
        match self {
            Self::Ok => "success",
            Self::InvalidCommand => "invalid command",
            Self::InvalidArgument => "invalid argument",
            Self::MethodNotFound => "method not found",
            Self::NotFound => "not found",
            Self::NoData => "no response",
            Self::PermissionDenied => "permission denied",
            Self::Timeout => "request timed out",
            Self::NotSupported => "operation not supported",
            Self::UnknownError => "unknown error",
            Self::ConnectionFailed => "connection failed",
        }
    }
}

impl From<BusStatus> for i32 {
    fn from(status: BusStatus) -> Self {
        status.code()
    }
}

impl TryFrom<i32> for BusStatus {
    type Error = String;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        let status = Self::from_code(i64::from(code));
        if status == Self::UnknownError && code != 9 {
            return Err(format!("unknown bus status code {code}"));
        }
        Ok(status)
    }
}

impl std::fmt::Display for BusStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.describe(), self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_wire_values() {
        assert_eq!(BusStatus::Ok.code(), 0);
        assert_eq!(BusStatus::MethodNotFound.code(), 3);
        assert_eq!(BusStatus::NotFound.code(), 4);
        assert_eq!(BusStatus::NotSupported.code(), 8);
        assert_eq!(BusStatus::ConnectionFailed.code(), 10);
    }

    #[test]
    fn from_code_maps_unknown_to_generic_failure() {
        assert_eq!(BusStatus::from_code(7), BusStatus::Timeout);
        assert_eq!(BusStatus::from_code(42), BusStatus::UnknownError);
        assert_eq!(BusStatus::from_code(-1), BusStatus::UnknownError);
    }

    #[test]
    fn serializes_as_integer() {
        let json = serde_json::to_string(&BusStatus::NotFound).unwrap();
        assert_eq!(json, "4");
        let back: BusStatus = serde_json::from_str("8").unwrap();
        assert_eq!(back, BusStatus::NotSupported);
    }

    #[test]
    fn rejects_unknown_code_on_deserialize() {
        assert!(serde_json::from_str::<BusStatus>("99").is_err());
    }

    #[test]
    fn display_includes_code() {
        assert_eq!(BusStatus::Timeout.to_string(), "request timed out (7)");
    }
}
