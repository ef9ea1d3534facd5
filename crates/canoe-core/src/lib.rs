pub mod diff;
pub mod envelope;
pub mod error;
pub mod hierarchy;
pub mod ids;
pub mod model;
pub mod snapshot;

pub use diff::*;
pub use envelope::*;
pub use error::*;
pub use hierarchy::*;
pub use ids::*;
pub use model::*;
pub use snapshot::*;
