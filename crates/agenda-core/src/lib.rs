//! # agenda-core - Core Domain Types
//!
//! Foundation crate for Agenda. Provides the error stack, structured failure
//! values, the `User` record and logging setup.
//!
//! This crate has **zero internal dependencies** -- it only depends on external
//! crates (serde, thiserror, tracing).
//!
//! ## Public API
//!
//! ### Error Handling (`error`)
//! - [`Error`] - Custom error enum with `fatal` vs `recoverable` classification
//! - [`Result`] - Type alias for `std::result::Result<T, Error>`
//! - [`ResultExt`] - Extension trait for adding error context
//!
//! ### Failures (`failure`)
//! - [`Failure`] - Structured error value (title, code, description, metadata, severity)
//! - [`Severity`] - Operational classification of a failure
//!
//! ### Domain Types (`user`)
//! - [`User`] - The signed-in user carried by session states
//!
//! ## Prelude
//!
//! Import commonly used types with:
//! ```rust
//! use agenda_core::prelude::*;
//! ```

pub mod error;
pub mod failure;
pub mod logging;
pub mod user;

/// Prelude for common imports used throughout all Agenda crates
pub mod prelude {
    pub use super::error::{Error, Result, ResultExt};
    pub use super::failure::{Failure, Severity};
    pub use super::user::User;
    pub use tracing::{debug, error, info, instrument, trace, warn};
}

// Re-export commonly used types at crate root for convenience
pub use error::{Error, Result, ResultExt};
pub use failure::{codes, Failure, Severity};
pub use user::User;
