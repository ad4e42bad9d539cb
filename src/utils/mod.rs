//! The `utils` module holds the pieces shared by every other module: the crate
//! error type and logging initialisation.

pub mod error;
pub mod logging;

pub use error::{Error, Result};
