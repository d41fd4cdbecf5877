use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use dirbridge::constants::{completion_filter, InformationClass, QueryFlag};
use dirbridge::host::{event_channel, DebugMode, DirectoryControlHost, HostParams};
use dirbridge::irp::{DirectoryControlRequest, OutputBuffer};
use dirbridge::notify::{DirNotifyList, NotifyInfo};
use dirbridge::util::IoBuffer;
use dirbridge::NtStatus;
use memfs_dirbridge_rs::fs::dirinfo::read_names;
use memfs_dirbridge_rs::{spawn_responder, MemFs};

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Class {
    Names,
    Directory,
}

impl From<Class> for InformationClass {
    fn from(class: Class) -> Self {
        match class {
            Class::Names => InformationClass::NAMES,
            Class::Directory => InformationClass::DIRECTORY,
        }
    }
}

/// MainArgs
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None,)]
pub struct Args {
    /// operation trace mask, -1: trace all operations
    #[clap(short = 'd', default_value = "0", allow_hyphen_values = true)]
    flags: i32,

    /// directory to enumerate
    #[clap(short = 'p', long, default_value = "\\docs")]
    directory: String,

    /// search pattern of the enumeration session
    #[clap(short = 's', long)]
    pattern: Option<String>,

    /// files created under the directory before enumerating
    #[clap(short = 'n', long, default_value = "12")]
    entries: usize,

    /// output buffer size of each query
    #[clap(short = 'b', long, default_value = "256")]
    buffer_size: usize,

    /// ask for one entry per query
    #[clap(long)]
    single: bool,

    #[clap(short = 'c', long, value_enum, default_value = "names")]
    class: Class,
}

fn populate(fs: &MemFs, directory: &str, entries: usize) -> anyhow::Result<()> {
    fs.create_dir(directory)?;
    for i in 0..entries {
        let extension = if i % 3 == 0 { "log" } else { "txt" };
        fs.create_file(&format!("{directory}\\file-{i:02}.{extension}"), (i * 512) as u64)?;
    }
    fs.create_dir(&format!("{directory}\\archive"))?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if args.flags != 0 { "debug" } else { "info" })
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let notify = Arc::new(DirNotifyList::new());
    let fs = Arc::new(MemFs::with_notify(notify.clone()));
    populate(&fs, &args.directory, args.entries)?;

    let mut params = HostParams::new();
    params.debug_mode(DebugMode::from(args.flags as u32));
    let (tx, events) = event_channel();
    let host = Arc::new(DirectoryControlHost::new(params, tx, notify.clone()));
    let responder = spawn_responder(fs.clone(), host.clone(), events);

    let node = fs.node_context(&args.directory)?;
    let handle = host.open(&node);
    let class = InformationClass::from(args.class);
    let buffer = IoBuffer::new(args.buffer_size);
    let flags = if args.single {
        QueryFlag::ReturnSingleEntry as u8
    } else {
        0
    };

    let mut total = 0;
    loop {
        let (request, pending) = DirectoryControlRequest::query_directory(
            &handle,
            class,
            args.pattern.as_deref(),
            flags,
            0,
            OutputBuffer::user(buffer.clone()),
        );
        host.dispatch(request)?;
        let iosb = pending.await;
        if iosb.status == NtStatus::NO_MORE_FILES || iosb.status == NtStatus::NO_SUCH_FILE {
            break;
        }
        iosb.status.ok()?;
        let data = buffer.to_vec();
        for name in read_names(class, &data[..iosb.information as usize])? {
            println!("{name}");
            total += 1;
        }
    }
    tracing::info!(total, directory = %args.directory, "enumeration finished");

    let record = IoBuffer::new(256);
    let (request, pending) = DirectoryControlRequest::notify_change_directory(
        &handle,
        completion_filter::FILE_NAME,
        false,
        Some(OutputBuffer::user(record.clone())),
    );
    host.dispatch(request)?;
    fs.create_file(&format!("{}\\created-while-watching.txt", args.directory), 0)?;
    let iosb = pending.await;
    iosb.status.ok()?;
    let (action, name) = NotifyInfo::parse(&record.to_vec()[..iosb.information as usize])?;
    println!("change {action}: {}", name.display());

    host.cleanup(&handle);
    responder.abort();
    Ok(())
}
