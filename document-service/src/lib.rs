//! Permission-gated document service for DocShare
//!
//! Owns document and user records and consults the authorization core around
//! every action:
//! - Creation records the creator as owner before the document is visible
//! - Reads, updates, deletes and shares are checked first and denied on any doubt
//! - Deletion revokes every grant on the document
//!
//! The `docshare` binary in this crate wires configuration, logging and a
//! tuple store together for operators.

pub mod bootstrap;
pub mod settings;
pub mod error;
pub mod models;
pub mod service;
pub mod store;

pub use bootstrap::*;
pub use settings::*;
pub use error::*;
pub use models::*;
pub use service::*;
pub use store::*;
