//! Core domain logic for SmartBook.
//! This crate is the single source of truth for bookmark reconciliation.

pub mod analytics;
pub mod config;
pub mod db;
pub mod gateway;
pub mod logging;
pub mod model;
pub mod reconcile;
pub mod search;
pub mod service;

pub use analytics::stats::{extract_domain, BookmarkStats, DailyCount, DomainCount};
pub use config::{ConfigError, CoreConfig};
pub use gateway::local::LocalGateway;
pub use gateway::{
    ChangeMessage, GatewayError, GatewayResult, RecordListQuery, RecordOrder, RemoteGateway,
    SubscriptionGuard, SubscriptionId,
};
pub use logging::{default_log_level, init_logging, init_logging_with_config, logging_status};
pub use model::bookmark::{BookmarkId, BookmarkRecord, NewBookmark, RecordValidationError};
pub use model::session::{Session, SessionChange};
pub use reconcile::events::{decode_change, ChangeEvent, EventDecodeError};
pub use reconcile::list::ReconciledList;
pub use reconcile::reconciler::{
    ApplyOutcome, Completion, CoreError, CoreResult, ListRevision, PendingDelete, PendingInsert,
    ReconciliationCore,
};
pub use search::filter::filter_bookmarks;
pub use service::bookmark_service::{normalize_url, BookmarkService};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
