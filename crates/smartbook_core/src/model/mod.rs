//! Domain model for saved bookmarks and the authenticated session.
//!
//! # Responsibility
//! - Define canonical record shapes used by reconciliation and services.
//! - Validate loosely-typed gateway payloads at the boundary.
//!
//! # Invariants
//! - Every bookmark is identified by a gateway-assigned `BookmarkId`.
//! - Placeholder ids (`local-` prefix) never reach the gateway.

pub mod bookmark;
pub mod session;
