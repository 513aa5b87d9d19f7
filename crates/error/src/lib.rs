//! # credguard-error
//!
//! The single error type shared by the credguard crates.
//!
//! Every fallible operation returns [`CredentialResult`]. Errors carry an
//! [`ErrorKind`], a [`Severity`], a retryability flag, a free-form context
//! map and the original cause when one exists.
//!
//! ```rust
//! use credguard_error::{CredentialError, ErrorKind};
//!
//! let err = CredentialError::from_message("connect ECONNREFUSED 10.0.0.5:5432");
//! assert_eq!(err.kind(), ErrorKind::Network);
//! assert!(err.is_retryable());
//! ```

#![forbid(unsafe_code)]

mod classify;
mod error;
mod kind;

pub use classify::classify_message;
pub use error::{CredentialError, CredentialResult, ErrorSource};
pub use kind::{ErrorKind, Severity};
