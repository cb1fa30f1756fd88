// SPDX-License-Identifier: MIT

use core::fmt;

use stratio::errors::IoError;

/// Unified error type for volume discovery and partition access.
///
/// Signature mismatches are not errors (probing callers get `Ok(None)`)
/// and checksum mismatches are recorded as corruption flags; only the
/// unrecoverable cases below surface here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolError {
    /// Read from the backing source failed; carries the attempted offset.
    Io { source: IoError, offset: u64 },
    /// A decoded value is structurally out of bounds, or both header
    /// copies are corrupt.
    Invalid(&'static str),
    /// Structurally valid but unhandled configuration.
    Unsupported(&'static str),
    /// No partition table found at any probed sector size.
    NotFound,
    /// Local precondition failure on a caller-supplied value.
    Argument(&'static str),
    /// Discovery was cancelled through `Volume::signal_abort`.
    Aborted,
}

impl VolError {
    #[inline]
    pub(crate) fn io(source: IoError, offset: u64) -> Self {
        VolError::Io { source, offset }
    }

    pub fn msg(&self) -> &'static str {
        match self {
            VolError::Io { source, .. } => source.msg(),
            VolError::Invalid(msg) => msg,
            VolError::Unsupported(msg) => msg,
            VolError::NotFound => "No partition table found",
            VolError::Argument(msg) => msg,
            VolError::Aborted => "Aborted",
        }
    }
}

impl From<&'static str> for VolError {
    fn from(msg: &'static str) -> Self {
        VolError::Invalid(msg)
    }
}

impl fmt::Display for VolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VolError::Io { source, offset } => {
                write!(f, "{} (at offset {offset})", source.msg())
            }
            _ => write!(f, "{}", self.msg()),
        }
    }
}

impl core::error::Error for VolError {}

pub type VolResult<T = ()> = Result<T, VolError>;
