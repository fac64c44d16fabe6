//! Secret handling re-exports, so callers need not depend on secrecy
//! directly to read the database URL.

pub use secrecy::{ExposeSecret, SecretString};
