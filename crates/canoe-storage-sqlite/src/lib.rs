pub mod queue;
pub mod storage;

pub use queue::*;
pub use storage::*;
