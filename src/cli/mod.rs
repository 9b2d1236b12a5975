//! CLI command handling

pub mod care;
pub mod output;
pub mod patients;
pub mod submit;
pub mod summary;

pub use care::*;
pub use output::*;
pub use patients::*;
pub use submit::*;
pub use summary::*;
