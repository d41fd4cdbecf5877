pub mod fs;

pub use fs::memfs::MemFs;
pub use fs::responder::spawn_responder;
