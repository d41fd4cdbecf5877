use std::fmt;
use thiserror::Error;

/// A raw NTSTATUS value as seen by the original caller.
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct NtStatus(pub i32);

impl NtStatus {
    pub const SUCCESS: NtStatus = NtStatus(0x0000_0000);
    pub const PENDING: NtStatus = NtStatus(0x0000_0103);
    pub const NOTIFY_CLEANUP: NtStatus = NtStatus(0x0000_010B);
    pub const NOTIFY_ENUM_DIR: NtStatus = NtStatus(0x0000_010C);
    pub const BUFFER_OVERFLOW: NtStatus = NtStatus(0x8000_0005_u32 as i32);
    pub const NO_MORE_FILES: NtStatus = NtStatus(0x8000_0006_u32 as i32);
    pub const INVALID_PARAMETER: NtStatus = NtStatus(0xC000_000D_u32 as i32);
    pub const NO_SUCH_FILE: NtStatus = NtStatus(0xC000_000F_u32 as i32);
    pub const INVALID_DEVICE_REQUEST: NtStatus = NtStatus(0xC000_0010_u32 as i32);
    pub const BUFFER_TOO_SMALL: NtStatus = NtStatus(0xC000_0023_u32 as i32);
    pub const INSUFFICIENT_RESOURCES: NtStatus = NtStatus(0xC000_009A_u32 as i32);
    pub const NOT_A_DIRECTORY: NtStatus = NtStatus(0xC000_0103_u32 as i32);
    pub const CANCELLED: NtStatus = NtStatus(0xC000_0120_u32 as i32);

    /// Success and informational codes, i.e. `NT_SUCCESS`.
    pub const fn is_success(self) -> bool {
        self.0 >= 0
    }

    /// Error severity codes.
    pub const fn is_error(self) -> bool {
        (self.0 as u32) >> 30 == 3
    }

    /// Turn the status into a `Result`, wrapping failures as [`BridgeError::Status`].
    pub fn ok(self) -> Result<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(BridgeError::Status(self))
        }
    }
}

impl fmt::Debug for NtStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NtStatus({:#010x})", self.0 as u32)
    }
}

impl fmt::Display for NtStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0 as u32)
    }
}

/// Error type for the directory-control bridge.
///
/// Every variant maps onto the status the original caller is resolved with,
/// see [`BridgeError::to_ntstatus`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// Missing or malformed handle context, missing file object or bad parameters.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// The directory-control minor function is not one the bridge serves.
    #[error("unsupported directory control operation {0:#04x}")]
    UnsupportedOperation(u8),
    /// Allocation or pin budget exhausted while building a request.
    #[error("insufficient resources")]
    ResourceExhausted,
    /// The destination buffer is absent or shorter than the answer.
    #[error("buffer too small: answer needs {required} bytes, {available} available")]
    BufferTooSmall { required: u32, available: u32 },
    /// Change notification requested on a non-directory node.
    #[error("not a directory")]
    NotADirectory,
    /// The original call was cancelled before an answer arrived.
    #[error("request cancelled")]
    Cancelled,
    /// A boundary message failed length validation.
    #[error("malformed message: {0}")]
    MalformedMessage(&'static str),
    /// Wraps a raw status, e.g. a user-mode answer status.
    #[error("NTSTATUS {0}")]
    Status(NtStatus),
}

impl BridgeError {
    /// Get the corresponding NTSTATUS for this error.
    pub fn to_ntstatus(&self) -> NtStatus {
        match self {
            BridgeError::InvalidArgument(_) | BridgeError::UnsupportedOperation(_) => {
                NtStatus::INVALID_PARAMETER
            }
            BridgeError::ResourceExhausted => NtStatus::INSUFFICIENT_RESOURCES,
            BridgeError::BufferTooSmall { .. } => NtStatus::BUFFER_TOO_SMALL,
            BridgeError::NotADirectory => NtStatus::NOT_A_DIRECTORY,
            BridgeError::Cancelled => NtStatus::CANCELLED,
            BridgeError::MalformedMessage(_) => NtStatus::INVALID_PARAMETER,
            BridgeError::Status(s) => *s,
        }
    }
}

/// Result type for the bridge.
pub type Result<T> = std::result::Result<T, BridgeError>;

impl From<NtStatus> for BridgeError {
    fn from(s: NtStatus) -> Self {
        BridgeError::Status(s)
    }
}

impl From<std::collections::TryReserveError> for BridgeError {
    fn from(_: std::collections::TryReserveError) -> Self {
        BridgeError::ResourceExhausted
    }
}

#[cfg(all(windows, feature = "windows-rs-error"))]
mod windows_rs {
    use super::{BridgeError, NtStatus};
    use windows::Win32::Foundation::NTSTATUS;

    impl From<NTSTATUS> for NtStatus {
        fn from(s: NTSTATUS) -> Self {
            NtStatus(s.0)
        }
    }

    impl From<NtStatus> for NTSTATUS {
        fn from(s: NtStatus) -> Self {
            NTSTATUS(s.0)
        }
    }

    impl From<NTSTATUS> for BridgeError {
        fn from(s: NTSTATUS) -> Self {
            BridgeError::Status(s.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_classification() {
        assert!(NtStatus::SUCCESS.is_success());
        assert!(NtStatus::PENDING.is_success());
        assert!(!NtStatus::NO_MORE_FILES.is_success());
        assert!(!NtStatus::NO_MORE_FILES.is_error());
        assert!(NtStatus::BUFFER_TOO_SMALL.is_error());
    }

    #[test]
    fn errors_map_to_caller_status() {
        assert_eq!(
            BridgeError::UnsupportedOperation(7).to_ntstatus(),
            NtStatus::INVALID_PARAMETER
        );
        assert_eq!(
            BridgeError::BufferTooSmall {
                required: 150,
                available: 100
            }
            .to_ntstatus(),
            NtStatus::BUFFER_TOO_SMALL
        );
        assert_eq!(
            BridgeError::Status(NtStatus::NO_MORE_FILES).to_ntstatus(),
            NtStatus::NO_MORE_FILES
        );
        assert_eq!(NtStatus::CANCELLED.ok(), Err(BridgeError::Cancelled.to_ntstatus().into()));
    }
}
