//! Derived search views over the reconciled list.
//!
//! # Responsibility
//! - Filter bookmarks for the search box without mutating the list.
//!
//! # Invariants
//! - Results borrow from the list and keep its order.
//! - No index is cached; every call recomputes.

pub mod filter;
