pub mod aggregate;
pub mod engine;
pub mod gate;
pub mod persistence;
pub mod sequential;
pub mod store;
pub mod types;

pub use engine::ProgressEngine;
pub use types::*;
