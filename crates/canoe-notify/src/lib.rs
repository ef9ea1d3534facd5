pub mod format;
pub mod notifier;

pub use format::*;
pub use notifier::*;
