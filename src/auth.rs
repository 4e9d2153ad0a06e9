//! Identity-side inputs to cache-key derivation: identifiers, claims, and secrets.

pub mod claims;
pub mod id;
pub mod secret;

pub use claims::*;
pub use id::*;
pub use secret::*;
