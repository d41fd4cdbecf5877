pub mod dirinfo;
pub mod memfs;
pub mod responder;
