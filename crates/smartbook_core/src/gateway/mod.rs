//! Remote data gateway contract.
//!
//! # Responsibility
//! - Describe the managed backend the core consumes: auth session, record
//!   storage and the change feed.
//! - Provide scoped subscription handles that release on drop.
//!
//! # Invariants
//! - Gateway rows cross this boundary as untyped JSON; callers validate them.
//! - Every subscription id handed out is released at most once.

pub mod local;

use crate::db::DbError;
use crate::model::bookmark::{BookmarkId, NewBookmark, RecordValidationError};
use crate::model::session::{Session, SessionChange};
use crossbeam::channel::Sender;
use log::debug;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Failure reported by a gateway call.
#[derive(Debug)]
pub enum GatewayError {
    /// No active session for an operation requiring one.
    Unauthenticated,
    /// Network or service failure.
    Unavailable(String),
    /// Mutation rejected by the backend, e.g. permission denial.
    Conflict(String),
    /// Request fields failed backend validation.
    MalformedRecord(RecordValidationError),
    Db(DbError),
}

impl Display for GatewayError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unauthenticated => write!(f, "no active session"),
            Self::Unavailable(message) => write!(f, "gateway unavailable: {message}"),
            Self::Conflict(message) => write!(f, "gateway rejected mutation: {message}"),
            Self::MalformedRecord(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for GatewayError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::MalformedRecord(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for GatewayError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for GatewayError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<RecordValidationError> for GatewayError {
    fn from(value: RecordValidationError) -> Self {
        Self::MalformedRecord(value)
    }
}

/// Handle for one change-feed or session-listener registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

/// Message delivered on a change-feed channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeMessage {
    /// Raw realtime payload, decoded by `reconcile::events`.
    Payload(Value),
    /// The backend dropped the channel; no further payloads follow.
    Closed { reason: String },
}

/// Sort order for bulk fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordOrder {
    #[default]
    CreatedAtDesc,
    CreatedAtAsc,
}

/// Filter and order options for `RemoteGateway::list_records`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordListQuery {
    pub owner_id: String,
    pub order: RecordOrder,
}

impl RecordListQuery {
    pub fn newest_first(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            order: RecordOrder::CreatedAtDesc,
        }
    }
}

/// Managed backend consumed by the reconciliation core.
///
/// Change and session notifications are pushed onto caller-owned channels;
/// the core drains them on its own execution context and never polls the
/// gateway for changes.
pub trait RemoteGateway {
    fn current_session(&self) -> GatewayResult<Option<Session>>;
    fn on_session_change(&self, sink: Sender<SessionChange>) -> GatewayResult<SubscriptionId>;
    fn exchange_code_for_session(&self, code: &str) -> GatewayResult<Session>;
    fn sign_out(&self) -> GatewayResult<()>;

    fn list_records(&self, collection: &str, query: &RecordListQuery)
        -> GatewayResult<Vec<Value>>;
    fn insert_record(&self, collection: &str, fields: &NewBookmark) -> GatewayResult<Value>;
    fn delete_record(&self, collection: &str, id: &BookmarkId) -> GatewayResult<()>;

    fn subscribe_to_changes(
        &self,
        collection: &str,
        sink: Sender<ChangeMessage>,
    ) -> GatewayResult<SubscriptionId>;
    /// Releases a change-feed or session-listener registration.
    ///
    /// Unknown ids are ignored.
    fn unsubscribe(&self, id: SubscriptionId);
}

/// Scoped ownership of one gateway subscription.
///
/// Dropping the guard releases the subscription, so every exit path of the
/// owner (including early `?` returns) unsubscribes exactly once.
pub struct SubscriptionGuard<G: RemoteGateway> {
    gateway: Arc<G>,
    id: Option<SubscriptionId>,
}

impl<G: RemoteGateway> SubscriptionGuard<G> {
    pub fn new(gateway: Arc<G>, id: SubscriptionId) -> Self {
        Self {
            gateway,
            id: Some(id),
        }
    }

    pub fn id(&self) -> Option<SubscriptionId> {
        self.id
    }

    /// Releases the subscription now instead of at drop.
    pub fn release(&mut self) {
        if let Some(id) = self.id.take() {
            debug!(
                "event=subscription_release module=gateway status=ok subscription_id={}",
                id.get()
            );
            self.gateway.unsubscribe(id);
        }
    }
}

impl<G: RemoteGateway> Drop for SubscriptionGuard<G> {
    fn drop(&mut self) {
        self.release();
    }
}
