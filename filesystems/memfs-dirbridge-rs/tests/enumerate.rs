use std::sync::Arc;

use dirbridge::constants::{InformationClass, QueryFlag};
use dirbridge::filesystem::FileHandleContext;
use dirbridge::host::{event_channel, DirectoryControlHost, HostParams};
use dirbridge::irp::{DirectoryControlRequest, IoStatusBlock, OutputBuffer};
use dirbridge::notify::DirNotifyList;
use dirbridge::util::IoBuffer;
use dirbridge::NtStatus;
use memfs_dirbridge_rs::fs::dirinfo::read_names;
use memfs_dirbridge_rs::{spawn_responder, MemFs};

struct Mounted {
    fs: Arc<MemFs>,
    host: Arc<DirectoryControlHost>,
}

fn mount() -> Mounted {
    let notify = Arc::new(DirNotifyList::new());
    let fs = Arc::new(MemFs::with_notify(notify.clone()));
    fs.create_dir("\\docs").unwrap();
    for name in ["b.txt", "a.txt", "c.log", "D.TXT"] {
        fs.create_file(&format!("\\docs\\{name}"), 10).unwrap();
    }
    let (tx, events) = event_channel();
    let host = Arc::new(DirectoryControlHost::new(HostParams::default(), tx, notify));
    spawn_responder(fs.clone(), host.clone(), events);
    Mounted { fs, host }
}

async fn query(
    host: &DirectoryControlHost,
    handle: &Arc<FileHandleContext>,
    pattern: Option<&str>,
    flags: u8,
    size: usize,
) -> (IoStatusBlock, Vec<String>) {
    let buffer = IoBuffer::new(size);
    let (request, pending) = DirectoryControlRequest::query_directory(
        handle,
        InformationClass::NAMES,
        pattern,
        flags,
        0,
        OutputBuffer::user(buffer.clone()),
    );
    host.dispatch(request).unwrap();
    let iosb = pending.await;
    let names = read_names(
        InformationClass::NAMES,
        &buffer.to_vec()[..iosb.information as usize],
    )
    .unwrap();
    (iosb, names)
}

#[tokio::test]
async fn enumerates_in_order_until_no_more_files() {
    let vol = mount();
    let handle = vol.host.open(&vol.fs.node_context("\\docs").unwrap());

    let (iosb, names) = query(&vol.host, &handle, None, 0, 1024).await;
    assert_eq!(iosb.status, NtStatus::SUCCESS);
    assert_eq!(names, ["a.txt", "b.txt", "c.log", "D.TXT"]);

    let (iosb, names) = query(&vol.host, &handle, None, 0, 1024).await;
    assert_eq!(iosb, IoStatusBlock::new(NtStatus::NO_MORE_FILES, 0));
    assert!(names.is_empty());
}

#[tokio::test]
async fn pattern_is_fixed_by_the_first_query() {
    let vol = mount();
    let handle = vol.host.open(&vol.fs.node_context("\\docs").unwrap());
    let single = QueryFlag::ReturnSingleEntry as u8;

    let (_, names) = query(&vol.host, &handle, Some("*.txt"), single, 1024).await;
    assert_eq!(names, ["a.txt"]);
    let (_, names) = query(&vol.host, &handle, Some("*.log"), 0, 1024).await;
    assert_eq!(names, ["b.txt", "D.TXT"]);

    let restart = QueryFlag::RestartScan as u8;
    let (_, names) = query(&vol.host, &handle, None, restart, 1024).await;
    assert_eq!(names, ["a.txt", "b.txt", "D.TXT"]);
}

#[tokio::test]
async fn small_buffers_page_through_the_directory() {
    let vol = mount();
    let handle = vol.host.open(&vol.fs.node_context("\\docs").unwrap());

    let mut seen = Vec::new();
    loop {
        // room for exactly one names entry
        let (iosb, names) = query(&vol.host, &handle, None, 0, 24).await;
        if iosb.status == NtStatus::NO_MORE_FILES {
            break;
        }
        assert_eq!(iosb.status, NtStatus::SUCCESS);
        assert_eq!(names.len(), 1);
        seen.extend(names);
    }
    assert_eq!(seen, ["a.txt", "b.txt", "c.log", "D.TXT"]);
}

#[tokio::test]
async fn no_match_reports_no_such_file() {
    let vol = mount();
    let handle = vol.host.open(&vol.fs.node_context("\\docs").unwrap());
    let (iosb, _) = query(&vol.host, &handle, Some("*.exe"), 0, 1024).await;
    assert_eq!(iosb.status, NtStatus::NO_SUCH_FILE);
}
