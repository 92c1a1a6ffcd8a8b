//! Client-side bookmark list reconciliation.
//!
//! # Responsibility
//! - Merge bulk fetches, optimistic local mutations and remote change events
//!   into one ordered, duplicate-free list per authenticated session.
//!
//! # Invariants
//! - At most one record per `BookmarkId` is present at any time.
//! - The list is ordered by `created_at` descending.
//! - Duplicate suppression compares ids only; the first arrival wins.
//! - All list mutations run on the owner's execution context.

pub mod events;
pub mod list;
pub mod reconciler;
