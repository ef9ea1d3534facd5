pub mod dispatcher;
pub mod memory;
pub mod transport;

pub use dispatcher::*;
pub use memory::*;
pub use transport::*;
