//! Aggregate counts over the reconciled list.
//!
//! Counting only; charts and presentation live outside the core.

pub mod stats;
