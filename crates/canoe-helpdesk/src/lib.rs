pub mod api;
pub mod client;
pub mod error;
pub mod memory;
pub mod xml;

pub use api::*;
pub use client::*;
pub use error::*;
pub use memory::*;
