//! Request handlers.

pub mod download;
pub mod health;
pub mod process;

pub use download::*;
pub use health::*;
pub use process::*;
