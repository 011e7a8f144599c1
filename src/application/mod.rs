// Application layer: the accounting engine and the use cases built on top
// of the stores. This is the primary interface for any client (CLI, API).

pub mod engine;
pub mod error;
pub mod reporting;

pub use engine::*;
pub use error::*;
pub use reporting::*;
