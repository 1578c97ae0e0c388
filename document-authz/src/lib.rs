//! Relationship-based authorization core for the DocShare document store
//!
//! Every read, write, delete or share action on a document is gated by a
//! permission check expressed as a relation between a user and a document:
//! - Direct relationship tuples (`user:alice owner document:42`)
//! - A fixed relation set: `owner`, `reader`, `writer`, `can_share`
//! - One level of computed membership: holding `owner` satisfies every other relation
//! - Idempotent, batch-atomic tuple writes and deletes
//!
//! # Core Concepts
//!
//! - **Subject**: the user a permission is granted to
//! - **Object**: the protected document
//! - **Relation**: the capability linking the two
//! - **Tuple**: a directly granted fact, "subject has relation to object"
//!
//! Derived permissions are never stored; they are computed at check time from
//! the tuple set, which is the single source of truth.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use document_authz::{
//!     repository::InMemoryTupleStore, AuthorizationEngine, ObjectRef, PermissionFacade,
//!     PermissionKind, Subject,
//! };
//!
//! # async fn run() -> Result<(), document_authz::AuthzError> {
//! let engine = AuthorizationEngine::new(Arc::new(InMemoryTupleStore::new()));
//! let facade = PermissionFacade::new(Arc::new(engine));
//!
//! let alice = Subject::user("alice");
//! let bob = Subject::user("bob");
//! let doc = ObjectRef::document("doc1");
//!
//! facade.grant_ownership(&alice, &doc).await?;
//! facade.share_with(&bob, &doc, PermissionKind::Read).await?;
//!
//! assert!(facade.check_permission(&alice, &doc, PermissionKind::Delete).await.is_allowed());
//! assert!(facade.check_permission(&bob, &doc, PermissionKind::Read).await.is_allowed());
//! assert!(!facade.check_permission(&bob, &doc, PermissionKind::Write).await.is_allowed());
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod error;
pub mod facade;
pub mod models;
pub mod relation_graph;
pub mod repository;

pub use engine::*;
pub use error::*;
pub use facade::*;
pub use models::*;
pub use relation_graph::*;
