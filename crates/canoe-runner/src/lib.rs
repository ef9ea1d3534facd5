pub mod config;
pub mod diff;
pub mod doctor;
pub mod pipeline;
pub mod runner;

pub use config::*;
pub use diff::*;
pub use doctor::*;
pub use pipeline::*;
pub use runner::*;
