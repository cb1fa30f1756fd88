// SPDX-License-Identifier: MIT

use core::fmt;

/// Result type for VolIO operations.
pub type IoResult<T = ()> = core::result::Result<T, IoError>;

/// Error type for VolIO operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoError {
    Other(&'static str),
    OutOfBounds,
    Closed,
}

impl IoError {
    pub fn msg(&self) -> &'static str {
        match self {
            IoError::Other(msg) => msg,
            IoError::OutOfBounds => "Out of bounds",
            IoError::Closed => "Source is closed",
        }
    }
}

impl From<&'static str> for IoError {
    #[inline]
    fn from(msg: &'static str) -> Self {
        IoError::Other(msg)
    }
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg())
    }
}

impl core::error::Error for IoError {}
