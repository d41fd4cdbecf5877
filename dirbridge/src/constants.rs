//! Directory-control codes and flags understood by the bridge.

/// `IRP_MN_QUERY_DIRECTORY`
pub const IRP_MN_QUERY_DIRECTORY: u8 = 0x01;
/// `IRP_MN_NOTIFY_CHANGE_DIRECTORY`
pub const IRP_MN_NOTIFY_CHANGE_DIRECTORY: u8 = 0x02;

/// Stack-location flags of a query-directory request.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum QueryFlag {
    RestartScan = 0x01,
    ReturnSingleEntry = 0x02,
    IndexSpecified = 0x04,
}

impl QueryFlag {
    /// Check if the provided bitfield has a flag.
    pub fn is_flagged(&self, flags: u8) -> bool {
        (*self as u8) & flags != 0
    }
}

/// Stack-location flag of a notify-change-directory request asking to watch the whole subtree.
pub const SL_WATCH_TREE: u8 = 0x01;

/// The shape of answer the caller asked for, forwarded verbatim to user mode.
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct InformationClass(pub u32);

impl InformationClass {
    pub const DIRECTORY: InformationClass = InformationClass(1);
    pub const FULL_DIRECTORY: InformationClass = InformationClass(2);
    pub const BOTH_DIRECTORY: InformationClass = InformationClass(3);
    pub const NAMES: InformationClass = InformationClass(12);
    pub const ID_BOTH_DIRECTORY: InformationClass = InformationClass(37);
    pub const ID_FULL_DIRECTORY: InformationClass = InformationClass(38);

    /// The well-known name of this class, if the bridge knows it.
    pub fn name(&self) -> Option<&'static str> {
        Some(match *self {
            Self::DIRECTORY => "FileDirectoryInformation",
            Self::FULL_DIRECTORY => "FileFullDirectoryInformation",
            Self::BOTH_DIRECTORY => "FileBothDirectoryInformation",
            Self::NAMES => "FileNamesInformation",
            Self::ID_BOTH_DIRECTORY => "FileIdBothDirectoryInformation",
            Self::ID_FULL_DIRECTORY => "FileIdFullDirectoryInformation",
            _ => return None,
        })
    }
}

impl std::fmt::Debug for InformationClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "InformationClass({})", self.0),
        }
    }
}

/// Change-notification completion filter bits.
pub mod completion_filter {
    pub const FILE_NAME: u32 = 0x0000_0001;
    pub const DIR_NAME: u32 = 0x0000_0002;
    pub const ATTRIBUTES: u32 = 0x0000_0004;
    pub const SIZE: u32 = 0x0000_0008;
    pub const LAST_WRITE: u32 = 0x0000_0010;
    pub const LAST_ACCESS: u32 = 0x0000_0020;
    pub const CREATION: u32 = 0x0000_0040;
    pub const EA: u32 = 0x0000_0080;
    pub const SECURITY: u32 = 0x0000_0100;
    pub const STREAM_NAME: u32 = 0x0000_0200;
    pub const STREAM_SIZE: u32 = 0x0000_0400;
    pub const STREAM_WRITE: u32 = 0x0000_0800;
    pub const ALL: u32 = 0x0000_0FFF;
}

/// Change-notification action codes.
#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NotifyAction {
    Added = 1,
    Removed = 2,
    Modified = 3,
    RenamedOldName = 4,
    RenamedNewName = 5,
}
