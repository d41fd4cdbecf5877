use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use widestring::{U16Str, U16String};

use crate::error::Result;

/// The kind of file-system object a node stands for.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Directory,
}

/// Mutable node state guarded by the node lock.
#[derive(Debug, Default)]
pub struct NodeState {
    open_handles: usize,
}

impl NodeState {
    /// The number of open handles to the node.
    pub fn open_handles(&self) -> usize {
        self.open_handles
    }
}

/// Per-object state shared by every handle opened on the same file-system object.
///
/// The node never points back at its handles; handles hold an `Arc` to the node and take the
/// node lock when they need a consistent view of the node.
pub struct FileNodeContext {
    name: U16String,
    kind: NodeKind,
    lock: RwLock<NodeState>,
}

impl FileNodeContext {
    pub fn new(name: U16String, kind: NodeKind) -> Arc<Self> {
        Arc::new(Self {
            name,
            kind,
            lock: RwLock::new(NodeState::default()),
        })
    }

    /// Create a node from a UTF-8 path.
    pub fn with_name(name: &str, kind: NodeKind) -> Arc<Self> {
        Self::new(U16String::from_str(name), kind)
    }

    pub fn name(&self) -> &U16Str {
        &self.name
    }

    /// The name as raw UTF-16 bytes, the way it crosses the boundary.
    pub fn name_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(self.name.as_slice())
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn is_directory(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    /// Acquire the node lock shared.
    pub fn read(&self) -> RwLockReadGuard<'_, NodeState> {
        self.lock.read()
    }

    /// Acquire the node lock exclusive.
    pub fn write(&self) -> RwLockWriteGuard<'_, NodeState> {
        self.lock.write()
    }
}

impl fmt::Debug for FileNodeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileNodeContext")
            .field("name", &self.name.display())
            .field("kind", &self.kind)
            .finish()
    }
}

/// Identity of an open handle.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(pub u64);

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Enumeration-session state of one handle.
///
/// Once the first query of a session has run, exactly one of `search_pattern` and `match_all`
/// holds until the session is reset.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EnumerationState {
    search_pattern: Option<U16String>,
    match_all: bool,
    cursor: u32,
    continuation_token: u64,
}

impl EnumerationState {
    pub fn search_pattern(&self) -> Option<&U16Str> {
        self.search_pattern.as_deref()
    }

    pub fn match_all(&self) -> bool {
        self.match_all
    }

    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    pub fn continuation_token(&self) -> u64 {
        self.continuation_token
    }

    /// Whether no query has fixed the pattern for this session yet.
    pub fn is_initial(&self) -> bool {
        self.search_pattern.is_none() && !self.match_all
    }

    /// Fix the session pattern. Only the first call of a session has any effect.
    /// An empty pattern matches everything.
    ///
    /// Returns whether this call was the initial one.
    pub(crate) fn capture(&mut self, pattern: Option<&U16Str>) -> Result<bool> {
        if !self.is_initial() {
            return Ok(false);
        }
        match pattern {
            Some(pattern) if !pattern.is_empty() => {
                let mut owned = Vec::new();
                owned.try_reserve_exact(pattern.len())?;
                owned.extend_from_slice(pattern.as_slice());
                self.search_pattern = Some(U16String::from_vec(owned));
            }
            _ => self.match_all = true,
        }
        Ok(true)
    }

    pub(crate) fn apply_answer(&mut self, next_cursor: u32, continuation_token: u64) {
        self.cursor = next_cursor;
        self.continuation_token = continuation_token;
    }

    fn reset(&mut self) {
        *self = EnumerationState::default();
    }
}

/// Per-open-handle state.
pub struct FileHandleContext {
    id: HandleId,
    volume_id: u64,
    node: Arc<FileNodeContext>,
    state: Mutex<EnumerationState>,
    cleaned_up: AtomicBool,
}

impl FileHandleContext {
    /// Open a handle on `node` for the volume identified by `volume_id`.
    pub fn open(node: &Arc<FileNodeContext>, volume_id: u64) -> Arc<Self> {
        node.write().open_handles += 1;
        Arc::new(Self {
            id: HandleId(NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed)),
            volume_id,
            node: node.clone(),
            state: Mutex::new(EnumerationState::default()),
            cleaned_up: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn node(&self) -> &Arc<FileNodeContext> {
        &self.node
    }

    /// A consistent copy of the enumeration state.
    pub fn snapshot(&self) -> EnumerationState {
        let _node = self.node.read();
        self.state.lock().clone()
    }

    /// Lock the enumeration state. Callers hold the node lock for the duration.
    pub(crate) fn state(&self) -> MutexGuard<'_, EnumerationState> {
        self.state.lock()
    }

    /// End the current enumeration session; the next query starts a new one.
    pub fn reset_enumeration(&self) {
        let _node = self.node.read();
        self.state.lock().reset();
    }

    /// Flag the handle cleaned up, under the node lock exclusive. Handlers recheck the flag under
    /// the shared lock before parking anything on the handle.
    pub(crate) fn mark_cleaned_up(&self) -> bool {
        let _node = self.node.write();
        !self.cleaned_up.swap(true, Ordering::AcqRel)
    }

    pub fn is_cleaned_up(&self) -> bool {
        self.cleaned_up.load(Ordering::Acquire)
    }

    /// Whether this handle was opened on `volume_id` and is still live.
    pub fn is_valid_for(&self, volume_id: u64) -> bool {
        self.volume_id == volume_id && !self.is_cleaned_up()
    }
}

impl Drop for FileHandleContext {
    fn drop(&mut self) {
        let mut node = self.node.write();
        node.open_handles = node.open_handles.saturating_sub(1);
    }
}

impl fmt::Debug for FileHandleContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileHandleContext")
            .field("id", &self.id)
            .field("node", &self.node)
            .finish_non_exhaustive()
    }
}
