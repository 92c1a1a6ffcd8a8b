//! Use-case services for presentation callers.
//!
//! # Responsibility
//! - Turn user actions (sign-in callback, add, delete, sign-out) into
//!   gateway calls wrapped in optimistic reconciliation.
//! - Keep presentation layers decoupled from gateway and list details.

pub mod bookmark_service;
