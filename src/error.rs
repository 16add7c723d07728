//
// Copyright (c) 2024 Oracle and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
use num_enum::TryFromPrimitive;

/// Enumeration of all possible errors returned by this library.
#[derive(Debug, Clone)]
pub struct RecoveryError {
    pub code: RecoveryErrorCode,
    pub message: String,
}

impl std::error::Error for RecoveryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

impl std::fmt::Display for RecoveryError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        return write!(f, "code={:?} message=\"{}\"", self.code, self.message);
    }
}

impl RecoveryError {
    pub fn new(code: RecoveryErrorCode, msg: &str) -> RecoveryError {
        RecoveryError {
            code,
            message: msg.to_string(),
        }
    }

    pub fn from_int(icode: i32, msg: &str) -> RecoveryError {
        if let Ok(code) = RecoveryErrorCode::try_from(icode) {
            return RecoveryError {
                code: code,
                message: msg.to_string(),
            };
        }
        RecoveryError {
            code: RecoveryErrorCode::UnknownError,
            message: format!("Invalid integer error code {}", icode),
        }
    }
}

macro_rules! ia_error {
    ($($t:tt)*) => {{
        RecoveryError {
            code: crate::error::RecoveryErrorCode::IllegalArgument,
            message: format!($($t)*),
        }
    }};
}

pub(crate) use ia_error;

macro_rules! ia_err {
    ($($t:tt)*) => {{
        Err(RecoveryError {
            code: crate::error::RecoveryErrorCode::IllegalArgument,
            message: format!($($t)*),
        })
    }};
}

pub(crate) use ia_err;

macro_rules! cfg_err {
    ($($t:tt)*) => {{
        Err(RecoveryError {
            code: crate::error::RecoveryErrorCode::Configuration,
            message: format!($($t)*),
        })
    }};
}

pub(crate) use cfg_err;

impl From<std::io::Error> for RecoveryError {
    fn from(e: std::io::Error) -> Self {
        RecoveryError {
            code: RecoveryErrorCode::Io,
            message: format!("io error: {}", e),
        }
    }
}

impl From<chrono::ParseError> for RecoveryError {
    fn from(e: chrono::ParseError) -> Self {
        ia_error!("invalid datetime value: {}", e)
    }
}

impl From<serde_json::Error> for RecoveryError {
    fn from(e: serde_json::Error) -> Self {
        RecoveryError {
            code: RecoveryErrorCode::Configuration,
            message: format!("config parse error: {}", e),
        }
    }
}

impl From<tokio::task::JoinError> for RecoveryError {
    fn from(e: tokio::task::JoinError) -> Self {
        RecoveryError {
            code: RecoveryErrorCode::IllegalState,
            message: format!("worker task failed: {}", e),
        }
    }
}

// RecoveryErrorCode represents the error code.
// Error codes are divided into categories as follows:
//
// 1. Error codes for caller-generated errors, range from 1 to 50(exclusive).
// These include illegal arguments, bad configuration, and a local address
// that is absent from the routing table. All of them are fatal before any
// worker starts.
//
// 2. Error codes for per-range pipeline failures, range from 50 to
// 100(exclusive). These never escape a range: the reconciler converts them
// into a failed (or skipped) range result and the run continues.
//
// 3. Error codes for store/transport issues and internal states, begin
// from 100.
//
#[derive(Debug, Clone, Copy, Eq, PartialEq, TryFromPrimitive)]
#[repr(i32)]
pub enum RecoveryErrorCode {
    /// NoError represents there is no error.
    NoError = 0,

    /// IllegalArgument error represents the application provided an illegal
    /// argument for the operation.
    IllegalArgument = 1,

    /// Configuration error represents an invalid or incomplete run
    /// configuration (bad address, unparseable group list, missing temp
    /// directory).
    Configuration = 2,

    /// Routing error represents that the local address does not appear in
    /// the routing table.
    Routing = 3,

    /// IteratorFailed error represents a failed iterator invocation.
    /// Fatal for the range when the local replica is the one that failed,
    /// otherwise the remote is dropped from the range.
    IteratorFailed = 50,

    /// SortFailed error represents a failed container sort. Fatal for the
    /// range; sort counters already added for the range are reversed.
    SortFailed = 51,

    /// DiffFailed error represents a failed per-remote diff computation.
    /// The remote's diff is omitted and the others proceed.
    DiffFailed = 52,

    /// MergeFailed error represents a failure while merging per-remote
    /// diffs into the per-source recovery plan. Fatal for the range.
    MergeFailed = 53,

    /// BulkReadFailed error represents a whole-bulk transport failure.
    /// Every key in the affected chunk is counted as a failure and the
    /// next chunk proceeds.
    BulkReadFailed = 54,

    /// WriteFailed error represents a failed per-key write. The key is
    /// counted as a failure and is not re-tried within the run.
    WriteFailed = 55,

    /// CorruptContainer error represents a truncated or malformed record
    /// in an iterator result file. Treated the same as an I/O failure:
    /// fatal for the range.
    CorruptContainer = 56,

    /// Io error represents a local filesystem failure while building or
    /// reading iterator result containers.
    Io = 100,

    /// StoreUnavailable error represents a failure to open a direct
    /// session to a store endpoint.
    StoreUnavailable = 101,

    /// Interrupted error represents operator cancellation: the pool is
    /// terminated and the whole run fails fast.
    Interrupted = 125,

    /// UnknownError represents an unknown error has occurred.
    UnknownError = 126,

    /// IllegalState error represents an illegal state.
    IllegalState = 127,
}
