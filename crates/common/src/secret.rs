//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports from the [`secrecy`] crate. `SecretString` implements `Debug`
//! with redaction, so any struct that derives `Debug` while holding one gets
//! safe logging behavior for free, and the value is zeroized on drop.
//!
//! Use `SecretString` for the admin code and relay-server credentials; call
//! `expose_secret()` only at the point of use.

pub use secrecy::{ExposeSecret, SecretString};
