use crate::host::DebugMode;

/// Parameters that control how the host validates, packs and pins directory-control requests.
#[derive(Debug, Clone)]
pub struct HostParams {
    pub(crate) volume_id: u64,
    pub(crate) max_message_length: u32,
    pub(crate) max_pinned_bytes: u64,
    pub(crate) debug_mode: DebugMode,
    pub(crate) forward_process_id: bool,
    pub(crate) reject_unknown_information_class: bool,
}

macro_rules! make_setters {
    (
        $(
            $(#[$outer:meta])*
            $name: ident: $ty:ty;
        )+
    ) => {
        $(
            $(#[$outer])*
            pub fn $name(&mut self, n: $ty) -> &mut Self {
                self.$name = n;
                self
            }
        )+
    };
    (
        $(
            $(#[$outer:meta])*
            $name: ident;
        )+
    ) => {
        $(
            $(#[$outer])*
            pub fn $name(&mut self, n: bool) -> &mut Self {
                self.$name = n;
                self
            }

            paste::paste! {
                #[doc = "Whether `" $name "` is set."]
                pub fn [<is_ $name>](&self) -> bool {
                    self.$name
                }
            }
        )+
    };
}

/// Default upper bound of a packed enumeration request: header plus two maximum-length paths.
pub const DEFAULT_MAX_MESSAGE_LENGTH: u32 = 64 * 1024;

impl Default for HostParams {
    fn default() -> Self {
        HostParams::new()
    }
}

impl HostParams {
    /// Create a new `HostParams`
    pub fn new() -> Self {
        Self {
            volume_id: 0,
            max_message_length: DEFAULT_MAX_MESSAGE_LENGTH,
            max_pinned_bytes: u64::MAX,
            debug_mode: DebugMode::none(),
            forward_process_id: true,
            reject_unknown_information_class: false,
        }
    }

    make_setters! {
        /// Set the identity of the volume. Only handle contexts opened for this volume are served.
        volume_id: u64;
        /// Set the largest enumeration request the host will pack. Larger requests fail with
        /// insufficient resources.
        max_message_length: u32;
        /// Set how many output bytes may be pinned at once across all pending requests.
        max_pinned_bytes: u64;
        /// Set which directory-control operations are traced in detail.
        debug_mode: DebugMode;
    }

    make_setters! {
        /// Set whether the requestor process id is forwarded to user mode.
        forward_process_id;
        /// Set whether queries for an information class unknown to the host are refused instead
        /// of being forwarded.
        reject_unknown_information_class;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::DirectoryOperation;

    #[test]
    fn setters_chain() {
        let mut params = HostParams::new();
        params
            .volume_id(3)
            .max_message_length(128)
            .forward_process_id(false)
            .debug_mode(DebugMode::none().enable_kind(DirectoryOperation::Enumerate));
        assert_eq!(params.volume_id, 3);
        assert_eq!(params.max_message_length, 128);
        assert!(!params.is_forward_process_id());
        assert!(!params.is_reject_unknown_information_class());
        assert!(params.debug_mode.is_enabled(DirectoryOperation::Enumerate));
        assert!(!params.debug_mode.is_enabled(DirectoryOperation::WatchChanges));
    }
}
