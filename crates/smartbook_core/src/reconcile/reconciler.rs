//! Session-scoped reconciliation core.
//!
//! # Responsibility
//! - Own the reconciled bookmark list for one authenticated session.
//! - Merge bulk fetches, optimistic mutations and remote change events.
//! - Roll back optimistic mutations the gateway did not commit.
//!
//! # Invariants
//! - The list is only mutated through this type, on the caller's thread.
//! - `initialize` acquires the change-feed subscription and `teardown` (or
//!   drop) releases it, on every exit path.
//! - Work started under one session epoch never mutates a later session.
//! - Records that fail validation are logged and dropped, never applied.

use crate::gateway::{
    ChangeMessage, GatewayError, GatewayResult, RecordListQuery, RemoteGateway,
    SubscriptionGuard,
};
use crate::model::bookmark::{BookmarkId, BookmarkRecord, NewBookmark, RecordValidationError};
use crate::model::session::Session;
use crate::reconcile::events::{decode_change, ChangeEvent};
use crate::reconcile::list::ReconciledList;
use crate::search::filter::filter_bookmarks;
use chrono::Utc;
use crossbeam::channel::{unbounded, Receiver, Sender, TryRecvError};
use log::{debug, info, warn};
use serde_json::Value;
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

pub type CoreResult<T> = Result<T, CoreError>;

/// Monotonic counter bumped on every list change.
pub type ListRevision = u64;

/// Error taxonomy surfaced to presentation callers.
#[derive(Debug)]
pub enum CoreError {
    /// No active session for an operation requiring one.
    Unauthenticated,
    /// Network/service failure on fetch, insert, delete or subscribe.
    GatewayUnavailable(String),
    /// Mutation rejected by the backend.
    Conflict(String),
    /// A gateway record is missing required fields.
    MalformedRecord(RecordValidationError),
    /// The change feed was lost; a manual `refresh` is required.
    SubscriptionLost(String),
    /// Caller-provided input was rejected before reaching the gateway.
    InvalidInput(String),
}

impl Display for CoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unauthenticated => write!(f, "sign in required"),
            Self::GatewayUnavailable(message) => write!(f, "backend unavailable: {message}"),
            Self::Conflict(message) => write!(f, "backend rejected change: {message}"),
            Self::MalformedRecord(err) => write!(f, "malformed record: {err}"),
            Self::SubscriptionLost(reason) => write!(f, "live updates stopped: {reason}"),
            Self::InvalidInput(message) => write!(f, "invalid input: {message}"),
        }
    }
}

impl Error for CoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::MalformedRecord(err) => Some(err),
            _ => None,
        }
    }
}

impl From<GatewayError> for CoreError {
    fn from(value: GatewayError) -> Self {
        match value {
            GatewayError::Unauthenticated => Self::Unauthenticated,
            GatewayError::Unavailable(message) => Self::GatewayUnavailable(message),
            GatewayError::Conflict(message) => Self::Conflict(message),
            GatewayError::MalformedRecord(err) => Self::MalformedRecord(err),
            GatewayError::Db(err) => Self::GatewayUnavailable(err.to_string()),
        }
    }
}

impl From<RecordValidationError> for CoreError {
    fn from(value: RecordValidationError) -> Self {
        Self::MalformedRecord(value)
    }
}

/// Effect of one merge operation on the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The list changed.
    Applied,
    /// Duplicate insert or absent delete; the list is untouched.
    Unchanged,
    /// No active session; the input was dropped.
    Discarded,
    /// The list was rebuilt from a fresh bulk fetch.
    Refetched,
}

/// Result of completing a pending optimistic mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion<T> {
    Confirmed(T),
    /// The session ended or was replaced before the gateway answered.
    Stale,
}

/// Optimistic insert awaiting the gateway's canonical record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingInsert {
    epoch: u64,
    placeholder_id: BookmarkId,
}

impl PendingInsert {
    pub fn placeholder_id(&self) -> &BookmarkId {
        &self.placeholder_id
    }
}

/// Optimistic delete awaiting gateway acknowledgment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDelete {
    epoch: u64,
    id: BookmarkId,
    removed: Option<BookmarkRecord>,
}

impl PendingDelete {
    pub fn id(&self) -> &BookmarkId {
        &self.id
    }
}

struct SessionContext<G: RemoteGateway> {
    session: Session,
    epoch: u64,
    events: Receiver<ChangeMessage>,
    subscription: SubscriptionGuard<G>,
    lost_reason: Option<String>,
}

/// Authoritative in-memory bookmark list for the signed-in user.
pub struct ReconciliationCore<G: RemoteGateway> {
    gateway: Arc<G>,
    collection: String,
    list: ReconciledList,
    context: Option<SessionContext<G>>,
    epoch: u64,
    revision: ListRevision,
    listeners: Vec<Sender<ListRevision>>,
    /// Placeholder ids minted by `begin_insert` and not yet completed.
    pending_placeholders: HashSet<BookmarkId>,
}

impl<G: RemoteGateway> ReconciliationCore<G> {
    pub fn new(gateway: Arc<G>, collection: impl Into<String>) -> Self {
        Self {
            gateway,
            collection: collection.into(),
            list: ReconciledList::new(),
            context: None,
            epoch: 0,
            revision: 0,
            listeners: Vec::new(),
            pending_placeholders: HashSet::new(),
        }
    }

    /// Starts a session: subscribes to changes, then bulk-fetches newest-first.
    ///
    /// Any previous session is torn down first. On fetch failure the list is
    /// left empty, the subscription is released and the error is returned.
    pub fn initialize(&mut self, session: Option<&Session>) -> CoreResult<()> {
        let session = match session {
            Some(session) if session.is_active() => session.clone(),
            _ => {
                warn!("event=core_initialize module=reconcile status=error error_code=unauthenticated");
                return Err(CoreError::Unauthenticated);
            }
        };
        self.teardown();

        let (sink, events) = unbounded();
        let subscription_id = self
            .gateway
            .subscribe_to_changes(&self.collection, sink)
            .map_err(|err| {
                warn!(
                    "event=core_initialize module=reconcile status=error error_code=subscribe_failed error={err}"
                );
                CoreError::from(err)
            })?;
        let subscription = SubscriptionGuard::new(Arc::clone(&self.gateway), subscription_id);

        // `subscription` drops on `?`, releasing the feed.
        let records = self.fetch_records(&session.user_id)?;

        self.epoch += 1;
        self.list.replace_all(records);
        info!(
            "event=core_initialize module=reconcile status=ok epoch={} count={}",
            self.epoch,
            self.list.len()
        );
        self.context = Some(SessionContext {
            session,
            epoch: self.epoch,
            events,
            subscription,
            lost_reason: None,
        });
        self.notify_changed();
        Ok(())
    }

    /// Rebuilds the session from scratch, re-subscribing if the feed was lost.
    pub fn refresh(&mut self) -> CoreResult<()> {
        let session = self
            .context
            .as_ref()
            .map(|context| context.session.clone())
            .ok_or(CoreError::Unauthenticated)?;
        self.initialize(Some(&session))
    }

    /// Inserts `record` at its ordered position unless its id is present.
    ///
    /// Whichever of the optimistic insert and its remote echo arrives first
    /// wins; the second is a no-op and never overwrites fields.
    pub fn apply_optimistic_insert(&mut self, record: BookmarkRecord) -> ApplyOutcome {
        if self.context.is_none() {
            debug!(
                "event=insert_discard module=reconcile status=skip id={}",
                record.id
            );
            return ApplyOutcome::Discarded;
        }
        if self.list.insert_if_absent(record) {
            self.notify_changed();
            ApplyOutcome::Applied
        } else {
            ApplyOutcome::Unchanged
        }
    }

    /// Removes the record with `id`; absent ids are a no-op.
    pub fn apply_optimistic_delete(&mut self, id: &BookmarkId) -> ApplyOutcome {
        if self.context.is_none() {
            debug!("event=delete_discard module=reconcile status=skip id={id}");
            return ApplyOutcome::Discarded;
        }
        if self.list.remove(id).is_some() {
            self.notify_changed();
            ApplyOutcome::Applied
        } else {
            ApplyOutcome::Unchanged
        }
    }

    /// Merges one remote change.
    ///
    /// Inserts and deletes merge like their optimistic counterparts; any
    /// other kind triggers a full refetch. Inserts owned by another user are
    /// ignored.
    pub fn apply_remote_event(&mut self, event: ChangeEvent) -> CoreResult<ApplyOutcome> {
        let Some(context) = self.context.as_ref() else {
            debug!("event=remote_discard module=reconcile status=skip reason=no_session");
            return Ok(ApplyOutcome::Discarded);
        };

        match event {
            ChangeEvent::Insert(record) => {
                if record.owner_id != context.session.user_id {
                    debug!(
                        "event=remote_insert module=reconcile status=skip reason=foreign_owner id={}",
                        record.id
                    );
                    return Ok(ApplyOutcome::Unchanged);
                }
                Ok(self.apply_optimistic_insert(record))
            }
            ChangeEvent::Delete(id) => Ok(self.apply_optimistic_delete(&id)),
            ChangeEvent::Other { kind } => {
                info!("event=remote_refetch module=reconcile status=start kind={kind}");
                self.refetch()?;
                Ok(ApplyOutcome::Refetched)
            }
        }
    }

    /// Drains queued change messages in arrival order.
    ///
    /// Returns the number of payloads merged. A closed or disconnected feed
    /// yields `SubscriptionLost` now and on every later call until `refresh`.
    pub fn pump_events(&mut self) -> CoreResult<usize> {
        let mut applied = 0;
        loop {
            let message = {
                let Some(context) = self.context.as_mut() else {
                    return Ok(applied);
                };
                if let Some(reason) = &context.lost_reason {
                    return Err(CoreError::SubscriptionLost(reason.clone()));
                }
                match context.events.try_recv() {
                    Ok(message) => message,
                    Err(TryRecvError::Empty) => return Ok(applied),
                    Err(TryRecvError::Disconnected) => {
                        ChangeMessage::Closed {
                            reason: "change feed disconnected".to_string(),
                        }
                    }
                }
            };

            match message {
                ChangeMessage::Payload(payload) => match decode_change(&payload) {
                    Ok(event) => {
                        self.apply_remote_event(event)?;
                        applied += 1;
                    }
                    Err(err) => {
                        warn!(
                            "event=remote_drop module=reconcile status=error error_code=malformed_record error={err}"
                        );
                    }
                },
                ChangeMessage::Closed { reason } => {
                    warn!("event=subscription_lost module=reconcile status=error reason={reason}");
                    if let Some(context) = self.context.as_mut() {
                        context.subscription.release();
                        context.lost_reason = Some(reason.clone());
                    }
                    return Err(CoreError::SubscriptionLost(reason));
                }
            }
        }
    }

    /// Shows `fields` immediately under a placeholder id.
    pub fn begin_insert(&mut self, fields: &NewBookmark) -> CoreResult<PendingInsert> {
        let epoch = self.require_context()?.epoch;
        fields
            .validate()
            .map_err(|err| CoreError::InvalidInput(err.to_string()))?;

        let placeholder = fields.to_provisional(BookmarkId::placeholder(), now_epoch_ms());
        let placeholder_id = placeholder.id.clone();
        self.pending_placeholders.insert(placeholder_id.clone());
        if self.list.insert_if_absent(placeholder) {
            self.notify_changed();
        }
        Ok(PendingInsert {
            epoch,
            placeholder_id,
        })
    }

    /// Replaces the placeholder with the canonical record, or rolls it back.
    ///
    /// If the remote echo already delivered the canonical id, only the
    /// placeholder is removed.
    pub fn complete_insert(
        &mut self,
        pending: PendingInsert,
        result: GatewayResult<Value>,
    ) -> CoreResult<Completion<BookmarkRecord>> {
        if !self.is_current(pending.epoch) {
            info!(
                "event=insert_complete module=reconcile status=skip reason=stale_epoch epoch={}",
                pending.epoch
            );
            return Ok(Completion::Stale);
        }

        self.pending_placeholders.remove(&pending.placeholder_id);
        let removed = self.list.remove(&pending.placeholder_id).is_some();
        let canonical = result
            .map_err(CoreError::from)
            .and_then(|row| BookmarkRecord::from_value(&row).map_err(CoreError::from));

        match canonical {
            Ok(record) => {
                let inserted = self.list.insert_if_absent(record.clone());
                if removed || inserted {
                    self.notify_changed();
                }
                info!(
                    "event=insert_complete module=reconcile status=ok id={} echo_first={}",
                    record.id, !inserted
                );
                Ok(Completion::Confirmed(record))
            }
            Err(err) => {
                if removed {
                    self.notify_changed();
                }
                warn!(
                    "event=insert_rollback module=reconcile status=error placeholder_id={} error={err}",
                    pending.placeholder_id
                );
                Err(err)
            }
        }
    }

    /// Hides the record with `id` immediately.
    pub fn begin_delete(&mut self, id: &BookmarkId) -> CoreResult<PendingDelete> {
        let epoch = self.require_context()?.epoch;
        let removed = self.list.remove(id);
        if removed.is_some() {
            self.notify_changed();
        }
        Ok(PendingDelete {
            epoch,
            id: id.clone(),
            removed,
        })
    }

    /// Confirms a delete, or restores the removed record on failure.
    pub fn complete_delete(
        &mut self,
        pending: PendingDelete,
        result: GatewayResult<()>,
    ) -> CoreResult<Completion<()>> {
        if !self.is_current(pending.epoch) {
            info!(
                "event=delete_complete module=reconcile status=skip reason=stale_epoch epoch={}",
                pending.epoch
            );
            return Ok(Completion::Stale);
        }

        match result {
            Ok(()) => {
                info!(
                    "event=delete_complete module=reconcile status=ok id={}",
                    pending.id
                );
                Ok(Completion::Confirmed(()))
            }
            Err(err) => {
                if let Some(record) = pending.removed {
                    if self.list.insert_if_absent(record) {
                        self.notify_changed();
                    }
                }
                warn!(
                    "event=delete_rollback module=reconcile status=error id={} error={err}",
                    pending.id
                );
                Err(err.into())
            }
        }
    }

    /// Case-insensitive substring filter over title and url.
    pub fn search(&self, term: &str) -> Vec<&BookmarkRecord> {
        filter_bookmarks(self.list.as_slice(), term)
    }

    /// Releases the change feed and clears the list. Safe to call repeatedly.
    pub fn teardown(&mut self) {
        self.pending_placeholders.clear();
        if let Some(context) = self.context.take() {
            self.epoch += 1;
            info!(
                "event=core_teardown module=reconcile status=ok epoch={}",
                context.epoch
            );
            drop(context);
        }
        if !self.list.is_empty() {
            self.list.clear();
            self.notify_changed();
        }
    }

    /// Registers for list-changed notifications carrying the new revision.
    pub fn subscribe_list_changes(&mut self) -> Receiver<ListRevision> {
        let (sink, revisions) = unbounded();
        self.listeners.push(sink);
        revisions
    }

    /// Read-only snapshot in presentation order.
    pub fn snapshot(&self) -> &[BookmarkRecord] {
        self.list.as_slice()
    }

    pub fn session(&self) -> Option<&Session> {
        self.context.as_ref().map(|context| &context.session)
    }

    /// True while `id` is a placeholder this core issued and has not completed.
    pub fn is_pending_placeholder(&self, id: &BookmarkId) -> bool {
        self.pending_placeholders.contains(id)
    }

    pub fn is_initialized(&self) -> bool {
        self.context.is_some()
    }

    pub fn is_subscription_lost(&self) -> bool {
        self.context
            .as_ref()
            .is_some_and(|context| context.lost_reason.is_some())
    }

    pub fn revision(&self) -> ListRevision {
        self.revision
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn require_context(&self) -> CoreResult<&SessionContext<G>> {
        self.context.as_ref().ok_or(CoreError::Unauthenticated)
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.context
            .as_ref()
            .is_some_and(|context| context.epoch == epoch)
    }

    fn refetch(&mut self) -> CoreResult<()> {
        let user_id = self.require_context()?.session.user_id.clone();
        self.list.clear();
        let result = self.fetch_records(&user_id);
        match result {
            Ok(records) => {
                self.list.replace_all(records);
                info!(
                    "event=remote_refetch module=reconcile status=ok count={}",
                    self.list.len()
                );
                self.notify_changed();
                Ok(())
            }
            Err(err) => {
                self.notify_changed();
                Err(err)
            }
        }
    }

    fn fetch_records(&self, owner_id: &str) -> CoreResult<Vec<BookmarkRecord>> {
        let rows = self
            .gateway
            .list_records(&self.collection, &RecordListQuery::newest_first(owner_id))
            .map_err(|err| {
                warn!("event=bulk_fetch module=reconcile status=error error={err}");
                CoreError::from(err)
            })?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            match BookmarkRecord::from_value(row) {
                Ok(record) if record.owner_id == owner_id => records.push(record),
                Ok(record) => debug!(
                    "event=bulk_fetch module=reconcile status=skip reason=foreign_owner id={}",
                    record.id
                ),
                Err(err) => warn!(
                    "event=record_drop module=reconcile status=error error_code=malformed_record error={err}"
                ),
            }
        }
        Ok(records)
    }

    fn notify_changed(&mut self) {
        self.revision += 1;
        let revision = self.revision;
        self.listeners.retain(|sink| sink.send(revision).is_ok());
    }
}

fn now_epoch_ms() -> i64 {
    Utc::now().timestamp_millis()
}
