//! Built-in [`RawSessionSource`](crate::RawSessionSource) implementations

mod file;
mod memory;

pub use file::FileSource;
pub use memory::MemorySource;
