use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use widestring::U16String;

use dirbridge::constants::{completion_filter, NotifyAction};
use dirbridge::filesystem::{FileNodeContext, NodeKind};
use dirbridge::notify::DirNotifyList;
use dirbridge::protocol::{EnumerationAnswer, EnumerationRequest};
use dirbridge::NtStatus;

use crate::fs::dirinfo::{
    is_supported, DirInfoBuffer, FileInfo, FILE_ATTRIBUTE_DIRECTORY, FILE_ATTRIBUTE_NORMAL,
};

const SEPARATOR: char = '\\';

/// Match `name` against a wildcard pattern, ignoring case.
///
/// `*` matches any run of characters, `?` exactly one.
pub fn wildcard_match(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().flat_map(char::to_lowercase).collect();
    let name: Vec<char> = name.chars().flat_map(char::to_lowercase).collect();

    let (mut p, mut n) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;
    while n < name.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, n));
                p += 1;
            }
            Some(&c) if c == '?' || c == name[n] => {
                p += 1;
                n += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    n = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|c| *c == '*')
}

fn key(path: &str) -> String {
    path.to_lowercase()
}

fn parent(path: &str) -> Option<&str> {
    match path.rsplit_once(SEPARATOR)? {
        ("", "") => None,
        ("", _) => Some("\\"),
        (parent, _) => Some(parent),
    }
}

fn file_name(path: &str) -> &str {
    path.rsplit_once(SEPARATOR).map_or(path, |(_, name)| name)
}

#[derive(Debug, Clone)]
struct Entry {
    path: String,
    kind: NodeKind,
    info: FileInfo,
}

/// An in-memory file tree that answers enumeration requests.
#[derive(Debug)]
pub struct MemFs {
    entries: RwLock<BTreeMap<String, Entry>>,
    nodes: Mutex<HashMap<String, Arc<FileNodeContext>>>,
    next_index: AtomicU64,
    generation: AtomicU64,
    notify: Option<Arc<DirNotifyList>>,
}

impl Default for MemFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemFs {
    /// Create an empty tree holding only the root directory.
    pub fn new() -> Self {
        let fs = Self {
            entries: RwLock::new(BTreeMap::new()),
            nodes: Mutex::new(HashMap::new()),
            next_index: AtomicU64::new(1),
            generation: AtomicU64::new(1),
            notify: None,
        };
        fs.insert("\\", NodeKind::Directory, 0);
        fs
    }

    /// Create an empty tree that reports its changes to `notify`.
    pub fn with_notify(notify: Arc<DirNotifyList>) -> Self {
        Self {
            notify: Some(notify),
            ..Self::new()
        }
    }

    fn insert(&self, path: &str, kind: NodeKind, size: u64) {
        let index = self.next_index.fetch_add(1, Ordering::Relaxed);
        let info = FileInfo {
            file_attributes: match kind {
                NodeKind::Directory => FILE_ATTRIBUTE_DIRECTORY,
                NodeKind::File => FILE_ATTRIBUTE_NORMAL,
            },
            allocation_size: size.next_multiple_of(4096),
            file_size: size,
            index_number: index,
            ..Default::default()
        };
        self.entries.write().insert(
            key(path),
            Entry {
                path: path.to_string(),
                kind,
                info,
            },
        );
    }

    fn create(&self, path: &str, kind: NodeKind, size: u64) -> anyhow::Result<()> {
        let parent_path = parent(path).ok_or_else(|| anyhow::anyhow!("{path} has no parent"))?;
        {
            let entries = self.entries.read();
            match entries.get(&key(parent_path)) {
                Some(entry) if entry.kind == NodeKind::Directory => {}
                Some(_) => anyhow::bail!("{parent_path} is not a directory"),
                None => anyhow::bail!("{parent_path} does not exist"),
            }
            if entries.contains_key(&key(path)) {
                anyhow::bail!("{path} already exists");
            }
        }
        self.insert(path, kind, size);
        self.generation.fetch_add(1, Ordering::AcqRel);
        tracing::debug!(path, ?kind, "created");
        self.report(path, kind, NotifyAction::Added);
        Ok(())
    }

    pub fn create_dir(&self, path: &str) -> anyhow::Result<()> {
        self.create(path, NodeKind::Directory, 0)
    }

    pub fn create_file(&self, path: &str, size: u64) -> anyhow::Result<()> {
        self.create(path, NodeKind::File, size)
    }

    /// Remove an entry. Directories must be empty.
    pub fn remove(&self, path: &str) -> anyhow::Result<()> {
        let removed = {
            let mut entries = self.entries.write();
            let target = key(path);
            let Some(entry) = entries.get(&target) else {
                anyhow::bail!("{path} does not exist");
            };
            if entry.kind == NodeKind::Directory
                && entries
                    .values()
                    .any(|e| parent(&e.path).map(key).as_deref() == Some(target.as_str()))
            {
                anyhow::bail!("{path} is not empty");
            }
            entries.remove(&target)
        };
        if let Some(entry) = removed {
            self.nodes.lock().remove(&key(path));
            self.generation.fetch_add(1, Ordering::AcqRel);
            self.report(&entry.path, entry.kind, NotifyAction::Removed);
        }
        Ok(())
    }

    fn report(&self, path: &str, kind: NodeKind, action: NotifyAction) {
        if let Some(notify) = &self.notify {
            let filter = match kind {
                NodeKind::Directory => completion_filter::DIR_NAME,
                NodeKind::File => completion_filter::FILE_NAME,
            };
            notify.report_change(&U16String::from_str(path), filter, action);
        }
    }

    /// The node context for `path`, shared by every handle opened on it.
    pub fn node_context(&self, path: &str) -> anyhow::Result<Arc<FileNodeContext>> {
        let entry = self
            .entries
            .read()
            .get(&key(path))
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("{path} does not exist"))?;
        Ok(self
            .nodes
            .lock()
            .entry(key(path))
            .or_insert_with(|| FileNodeContext::with_name(&entry.path, entry.kind))
            .clone())
    }

    /// Answer one enumeration request.
    ///
    /// The cursor counts matching entries already returned; the continuation context carries the
    /// tree generation the answer was taken from.
    pub fn answer(&self, request: &EnumerationRequest<'_>) -> EnumerationAnswer {
        let reply = |status: NtStatus, buffer: Vec<u8>, next_cursor: u32| EnumerationAnswer {
            correlation_id: request.correlation_id,
            status,
            buffer,
            next_cursor,
            continuation_context: self.generation.load(Ordering::Acquire),
        };

        if !is_supported(request.information_class) {
            return reply(NtStatus::INVALID_PARAMETER, Vec::new(), request.cursor);
        }
        let directory = request.directory_name.to_string_lossy();
        let pattern = request
            .search_pattern
            .as_ref()
            .map(|p| p.to_string_lossy());

        let entries = self.entries.read();
        match entries.get(&key(&directory)) {
            Some(entry) if entry.kind == NodeKind::Directory => {}
            Some(_) => return reply(NtStatus::NOT_A_DIRECTORY, Vec::new(), request.cursor),
            None => return reply(NtStatus::NO_SUCH_FILE, Vec::new(), request.cursor),
        }

        let directory_key = key(&directory);
        let children: Vec<&Entry> = entries
            .values()
            .filter(|e| parent(&e.path).map(key).as_deref() == Some(directory_key.as_str()))
            .filter(|e| {
                pattern
                    .as_deref()
                    .map_or(true, |p| wildcard_match(p, file_name(&e.path)))
            })
            .collect();

        let start = request.cursor as usize;
        if start >= children.len() {
            let status = if start == 0 {
                NtStatus::NO_SUCH_FILE
            } else {
                NtStatus::NO_MORE_FILES
            };
            return reply(status, Vec::new(), request.cursor);
        }

        let mut buffer = DirInfoBuffer::new(request.information_class, request.buffer_length);
        for (index, entry) in children.iter().enumerate().skip(start) {
            let name = U16String::from_str(file_name(&entry.path));
            if !buffer.push(index as u32, &name, &entry.info) {
                break;
            }
            if request.return_single_entry() {
                break;
            }
        }
        if buffer.count() == 0 {
            return reply(NtStatus::BUFFER_OVERFLOW, Vec::new(), request.cursor);
        }
        let next_cursor = request.cursor + buffer.count() as u32;
        tracing::debug!(
            directory = %directory,
            cursor = request.cursor,
            next_cursor,
            "answered enumeration"
        );
        reply(NtStatus::SUCCESS, buffer.into_inner(), next_cursor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcards() {
        assert!(wildcard_match("*", "anything"));
        assert!(wildcard_match("*.txt", "Notes.TXT"));
        assert!(!wildcard_match("*.txt", "notes.log"));
        assert!(wildcard_match("a?c", "abc"));
        assert!(!wildcard_match("a?c", "ac"));
        assert!(wildcard_match("*a*b", "xxaxxb"));
        assert!(!wildcard_match("*a*b", "xxaxxbc"));
        assert!(wildcard_match("", ""));
        assert!(!wildcard_match("", "a"));
    }

    #[test]
    fn paths() {
        assert_eq!(parent("\\docs\\a.txt"), Some("\\docs"));
        assert_eq!(parent("\\docs"), Some("\\"));
        assert_eq!(parent("\\"), None);
        assert_eq!(file_name("\\docs\\a.txt"), "a.txt");
    }

    #[test]
    fn create_requires_an_existing_parent() {
        let fs = MemFs::new();
        assert!(fs.create_file("\\missing\\a.txt", 1).is_err());
        fs.create_dir("\\docs").unwrap();
        fs.create_file("\\docs\\a.txt", 1).unwrap();
        assert!(fs.create_file("\\DOCS\\A.TXT", 1).is_err());
        assert!(fs.remove("\\docs").is_err());
        fs.remove("\\docs\\a.txt").unwrap();
        fs.remove("\\docs").unwrap();
    }

    #[test]
    fn node_contexts_are_shared() {
        let fs = MemFs::new();
        fs.create_dir("\\docs").unwrap();
        let a = fs.node_context("\\docs").unwrap();
        let b = fs.node_context("\\Docs").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(a.is_directory());
    }
}
