use parking_lot::Mutex;
use widestring::{U16Str, U16String};

use crate::constants::NotifyAction;
use crate::error::{BridgeError, NtStatus};
use crate::filesystem::{HandleId, NotifyList, NotifyRegistration};
use crate::notify::NotifyInfo;

const SEPARATOR: u16 = b'\\' as u16;

/// Name of `changed` relative to `watched`, if a watch on `watched` covers it.
fn relative_name<'p>(watched: &[u16], watch_tree: bool, changed: &'p [u16]) -> Option<&'p [u16]> {
    let rest = changed.strip_prefix(watched)?;
    let rest = if watched.last() == Some(&SEPARATOR) {
        rest
    } else {
        rest.strip_prefix(&[SEPARATOR])?
    };
    if rest.is_empty() || (!watch_tree && rest.contains(&SEPARATOR)) {
        return None;
    }
    Some(rest)
}

/// An in-memory notify list.
///
/// Each registration fires at most once. A matching change resolves it with a single change
/// record, or with `STATUS_NOTIFY_ENUM_DIR` when the caller supplied no room for the record.
#[derive(Debug, Default)]
pub struct DirNotifyList {
    registrations: Mutex<Vec<NotifyRegistration>>,
}

impl DirNotifyList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report a change to the object at `path` and resolve every registration it matches.
    ///
    /// Returns the number of registrations resolved.
    pub fn report_change(&self, path: &U16Str, filter: u32, action: NotifyAction) -> usize {
        let fired: Vec<(NotifyRegistration, U16String)> = {
            let mut registrations = self.registrations.lock();
            let mut fired = Vec::new();
            let mut i = 0;
            while i < registrations.len() {
                let registration = &registrations[i];
                let relative = (registration.completion_filter & filter != 0)
                    .then(|| {
                        relative_name(
                            registration.path.as_slice(),
                            registration.watch_tree,
                            path.as_slice(),
                        )
                    })
                    .flatten()
                    .map(|r| U16String::from_vec(r.to_vec()));
                match relative {
                    Some(relative) => fired.push((registrations.remove(i), relative)),
                    None => i += 1,
                }
            }
            fired
        };

        let count = fired.len();
        for (registration, relative) in fired {
            let handle = registration.handle;
            let info = NotifyInfo::new(filter, action, &relative);
            let (status, _) = Self::fire(registration, &info);
            tracing::debug!(
                %handle,
                name = %relative.display(),
                ?action,
                status = %status,
                "change notification fired"
            );
        }
        count
    }

    /// The number of parked registrations.
    pub fn len(&self) -> usize {
        self.registrations.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn fire(registration: NotifyRegistration, info: &NotifyInfo) -> (NtStatus, u32) {
        let NotifyRegistration {
            output,
            buffer_length,
            completion,
            ..
        } = registration;

        let result = match (output.as_ref(), info.to_bytes()) {
            (Some(output), Ok(record)) if record.len() <= buffer_length as usize => {
                output.fill(buffer_length, &record);
                (NtStatus::SUCCESS, record.len() as u32)
            }
            _ => (NtStatus::NOTIFY_ENUM_DIR, 0),
        };
        if let Some(output) = output {
            output.release();
        }
        completion.complete(result.0, result.1);
        result
    }

    fn drain(&self, handle: HandleId, status: NtStatus) -> usize {
        let drained: Vec<NotifyRegistration> = {
            let mut registrations = self.registrations.lock();
            let mut drained = Vec::new();
            let mut i = 0;
            while i < registrations.len() {
                if registrations[i].handle == handle {
                    drained.push(registrations.remove(i));
                } else {
                    i += 1;
                }
            }
            drained
        };
        let count = drained.len();
        for registration in drained {
            let NotifyRegistration {
                output, completion, ..
            } = registration;
            if let Some(output) = output {
                output.release();
            }
            completion.complete(status, 0);
        }
        count
    }
}

impl NotifyList for DirNotifyList {
    fn register(&self, registration: NotifyRegistration) {
        self.registrations.lock().push(registration);
    }

    fn cleanup(&self, handle: HandleId) -> usize {
        self.drain(handle, NtStatus::NOTIFY_CLEANUP)
    }

    fn cancel(&self, handle: HandleId) -> usize {
        self.drain(handle, BridgeError::Cancelled.to_ntstatus())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use widestring::u16str;

    fn relative(watched: &str, watch_tree: bool, changed: &str) -> Option<String> {
        let watched = U16String::from_str(watched);
        let changed = U16String::from_str(changed);
        relative_name(watched.as_slice(), watch_tree, changed.as_slice())
            .map(|r| String::from_utf16_lossy(r))
    }

    #[test]
    fn direct_children_match_without_watch_tree() {
        assert_eq!(relative("\\dir", false, "\\dir\\a.txt"), Some("a.txt".into()));
        assert_eq!(relative("\\dir", false, "\\dir\\sub\\a.txt"), None);
        assert_eq!(relative("\\dir", false, "\\dirt\\a.txt"), None);
        assert_eq!(relative("\\dir", false, "\\dir"), None);
    }

    #[test]
    fn subtree_matches_with_watch_tree() {
        assert_eq!(
            relative("\\dir", true, "\\dir\\sub\\a.txt"),
            Some("sub\\a.txt".into())
        );
        assert_eq!(relative("\\", false, "\\a.txt"), Some("a.txt".into()));
        assert_eq!(relative("\\", true, "\\x\\y"), Some("x\\y".into()));
    }

    #[test]
    fn empty_list_ignores_changes() {
        let list = DirNotifyList::new();
        assert_eq!(
            list.report_change(u16str!("\\a"), u32::MAX, NotifyAction::Added),
            0
        );
        assert!(list.is_empty());
    }
}
