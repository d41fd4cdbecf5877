use crate::host::DirectoryOperation;

/// Selects the directory-control operations whose dispatch is traced in a `directory_control`
/// span, with the outcome of each request logged at debug level.
///
/// Bit `n` stands for the [`DirectoryOperation`] with discriminant `n`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct DebugMode(u32);

impl DebugMode {
    /// Trace nothing.
    pub const fn none() -> Self {
        Self(0)
    }

    /// Trace every operation, including ones added later.
    pub const fn all() -> Self {
        Self(u32::MAX)
    }

    const fn bit(operation: DirectoryOperation) -> u32 {
        1 << operation as usize
    }

    /// Also trace `operation`.
    pub const fn enable_kind(self, operation: DirectoryOperation) -> Self {
        Self(self.0 | Self::bit(operation))
    }

    /// Stop tracing `operation`.
    pub const fn disable_kind(self, operation: DirectoryOperation) -> Self {
        Self(self.0 & !Self::bit(operation))
    }

    pub const fn is_enabled(self, operation: DirectoryOperation) -> bool {
        self.0 & Self::bit(operation) != 0
    }
}

impl From<DebugMode> for u32 {
    fn from(mode: DebugMode) -> Self {
        mode.0
    }
}

impl From<u32> for DebugMode {
    fn from(mask: u32) -> Self {
        Self(mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operations_toggle_independently() {
        let mode = DebugMode::all().disable_kind(DirectoryOperation::WatchChanges);
        assert!(mode.is_enabled(DirectoryOperation::Enumerate));
        assert!(!mode.is_enabled(DirectoryOperation::WatchChanges));
        assert_eq!(DebugMode::default(), DebugMode::none());
        assert_eq!(u32::from(DebugMode::from(0b10)), 0b10);
        assert!(DebugMode::from(0b10).is_enabled(DirectoryOperation::WatchChanges));
    }
}
