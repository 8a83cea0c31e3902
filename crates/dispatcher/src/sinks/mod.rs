//! Storage and viewer implementations
//!
//! Contains LogStorage, MemoryStorage and LogViewer.

mod log;
mod memory;
mod viewer;

pub use self::log::LogStorage;
pub use self::memory::{MemoryContents, MemoryStorage};
pub use self::viewer::LogViewer;
