//! In-process gateway backed by SQLite.
//!
//! # Responsibility
//! - Stand in for the managed backend: session issuance, bookmark rows and a
//!   realtime change feed, all in one process.
//! - Enforce owner-scoped access the way row-level security would.
//!
//! # Invariants
//! - Ids are uuid v4 strings assigned at insert; `created_at` is epoch ms.
//! - Every committed insert/delete is broadcast to live subscribers after
//!   the row change, in commit order.
//! - Subscribers whose receiving end is gone are pruned on the next send.

use crate::db::{open_db, open_db_in_memory};
use crate::gateway::{
    ChangeMessage, GatewayError, GatewayResult, RecordListQuery, RecordOrder, RemoteGateway,
    SubscriptionId,
};
use crate::model::bookmark::{BookmarkId, BookmarkRecord, NewBookmark};
use crate::model::session::{Session, SessionChange};
use chrono::Utc;
use crossbeam::channel::Sender;
use log::{info, warn};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

const DEFAULT_COLLECTION: &str = "bookmarks";

/// SQLite-backed `RemoteGateway` with an in-memory change feed.
pub struct LocalGateway {
    collection: String,
    conn: Mutex<Connection>,
    session: Mutex<Option<Session>>,
    auth_codes: Mutex<HashMap<String, Session>>,
    change_subscribers: Mutex<BTreeMap<SubscriptionId, Sender<ChangeMessage>>>,
    session_listeners: Mutex<BTreeMap<SubscriptionId, Sender<SessionChange>>>,
    next_subscription_id: AtomicU64,
    available: AtomicBool,
}

impl LocalGateway {
    /// Wraps an already-migrated connection serving the `bookmarks` collection.
    pub fn new(conn: Connection) -> Self {
        Self {
            collection: DEFAULT_COLLECTION.to_string(),
            conn: Mutex::new(conn),
            session: Mutex::new(None),
            auth_codes: Mutex::new(HashMap::new()),
            change_subscribers: Mutex::new(BTreeMap::new()),
            session_listeners: Mutex::new(BTreeMap::new()),
            next_subscription_id: AtomicU64::new(1),
            available: AtomicBool::new(true),
        }
    }

    pub fn open(path: impl AsRef<Path>) -> GatewayResult<Self> {
        Ok(Self::new(open_db(path)?))
    }

    pub fn open_in_memory() -> GatewayResult<Self> {
        Ok(Self::new(open_db_in_memory()?))
    }

    /// Serves rows under a different collection name.
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    /// Issues a session directly, as a completed sign-in would.
    pub fn sign_in(&self, session: Session) {
        info!(
            "event=session_issue module=gateway status=ok user_id={}",
            session.user_id
        );
        *lock(&self.session) = Some(session.clone());
        self.notify_session(SessionChange::SignedIn(session));
    }

    /// Re-issues credentials for the signed-in user.
    pub fn refresh_token(&self) -> GatewayResult<Session> {
        let session = self.require_session()?;
        self.notify_session(SessionChange::TokenRefreshed(session.clone()));
        Ok(session)
    }

    /// Registers a one-time OAuth code redeemable for `session`.
    pub fn register_auth_code(&self, code: impl Into<String>, session: Session) {
        lock(&self.auth_codes).insert(code.into(), session);
    }

    /// Toggles simulated backend reachability.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Drops every change-feed channel, telling subscribers why.
    pub fn close_subscriptions(&self, reason: &str) {
        let subscribers = std::mem::take(&mut *lock(&self.change_subscribers));
        warn!(
            "event=change_feed_close module=gateway status=error subscribers={}",
            subscribers.len()
        );
        for sink in subscribers.into_values() {
            let _ = sink.send(ChangeMessage::Closed {
                reason: reason.to_string(),
            });
        }
    }

    pub fn change_subscriber_count(&self) -> usize {
        lock(&self.change_subscribers).len()
    }

    /// Updates a bookmark title and broadcasts an `UPDATE` event.
    pub fn update_title(&self, id: &BookmarkId, title: &str) -> GatewayResult<()> {
        self.ensure_available()?;
        let session = self.require_session()?;
        let record = {
            let conn = lock(&self.conn);
            let Some(existing) = select_record(&conn, id)? else {
                return Err(GatewayError::Conflict(format!("bookmark `{id}` does not exist")));
            };
            if existing.owner_id != session.user_id {
                return Err(GatewayError::Conflict(
                    "row-level security denied update".to_string(),
                ));
            }
            conn.execute(
                "UPDATE bookmarks SET title = ?1 WHERE id = ?2;",
                params![title, id.as_str()],
            )?;
            BookmarkRecord {
                title: title.to_string(),
                ..existing
            }
        };

        self.broadcast(json!({
            "eventType": "UPDATE",
            "new": record.to_value(),
            "old": { "id": id.as_str() },
        }));
        Ok(())
    }

    fn ensure_available(&self) -> GatewayResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(GatewayError::Unavailable("backend unreachable".to_string()))
        }
    }

    fn ensure_collection(&self, collection: &str) -> GatewayResult<()> {
        if collection == self.collection {
            Ok(())
        } else {
            Err(GatewayError::Unavailable(format!(
                "unknown collection `{collection}`"
            )))
        }
    }

    fn require_session(&self) -> GatewayResult<Session> {
        match lock(&self.session).as_ref() {
            Some(session) if session.is_active() => Ok(session.clone()),
            _ => Err(GatewayError::Unauthenticated),
        }
    }

    fn allocate_subscription_id(&self) -> SubscriptionId {
        SubscriptionId::new(self.next_subscription_id.fetch_add(1, Ordering::SeqCst))
    }

    fn broadcast(&self, payload: Value) {
        let mut subscribers = lock(&self.change_subscribers);
        subscribers.retain(|_, sink| sink.send(ChangeMessage::Payload(payload.clone())).is_ok());
    }

    fn notify_session(&self, change: SessionChange) {
        let mut listeners = lock(&self.session_listeners);
        listeners.retain(|_, sink| sink.send(change.clone()).is_ok());
    }
}

impl RemoteGateway for LocalGateway {
    fn current_session(&self) -> GatewayResult<Option<Session>> {
        self.ensure_available()?;
        Ok(lock(&self.session).clone())
    }

    fn on_session_change(&self, sink: Sender<SessionChange>) -> GatewayResult<SubscriptionId> {
        let id = self.allocate_subscription_id();
        lock(&self.session_listeners).insert(id, sink);
        Ok(id)
    }

    fn exchange_code_for_session(&self, code: &str) -> GatewayResult<Session> {
        self.ensure_available()?;
        let Some(session) = lock(&self.auth_codes).remove(code.trim()) else {
            warn!("event=auth_exchange module=gateway status=error error_code=unknown_code");
            return Err(GatewayError::Unauthenticated);
        };
        self.sign_in(session.clone());
        Ok(session)
    }

    fn sign_out(&self) -> GatewayResult<()> {
        let previous = lock(&self.session).take();
        if previous.is_some() {
            info!("event=session_revoke module=gateway status=ok");
            self.notify_session(SessionChange::SignedOut);
        }
        Ok(())
    }

    fn list_records(
        &self,
        collection: &str,
        query: &RecordListQuery,
    ) -> GatewayResult<Vec<Value>> {
        self.ensure_available()?;
        self.ensure_collection(collection)?;
        let session = self.require_session()?;
        if query.owner_id != session.user_id {
            // Rows of other owners are invisible, not an error.
            return Ok(Vec::new());
        }

        let order = match query.order {
            RecordOrder::CreatedAtDesc => "created_at DESC, seq DESC",
            RecordOrder::CreatedAtAsc => "created_at ASC, seq ASC",
        };
        let conn = lock(&self.conn);
        let mut stmt = conn.prepare(&format!(
            "SELECT id, title, url, owner_id, created_at
             FROM bookmarks
             WHERE owner_id = ?1
             ORDER BY {order};"
        ))?;
        let mut rows = stmt.query([query.owner_id.as_str()])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(parse_record_row(row)?.to_value());
        }

        Ok(records)
    }

    fn insert_record(&self, collection: &str, fields: &NewBookmark) -> GatewayResult<Value> {
        self.ensure_available()?;
        self.ensure_collection(collection)?;
        let session = self.require_session()?;
        fields.validate()?;
        if fields.owner_id != session.user_id {
            return Err(GatewayError::Conflict(
                "row-level security denied insert for another owner".to_string(),
            ));
        }

        let record = BookmarkRecord {
            id: BookmarkId::new(Uuid::new_v4().to_string()),
            title: fields.title.clone(),
            url: fields.url.clone(),
            owner_id: fields.owner_id.clone(),
            created_at: Utc::now().timestamp_millis(),
        };
        lock(&self.conn).execute(
            "INSERT INTO bookmarks (id, title, url, owner_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                record.id.as_str(),
                record.title.as_str(),
                record.url.as_str(),
                record.owner_id.as_str(),
                record.created_at,
            ],
        )?;
        info!(
            "event=record_insert module=gateway status=ok id={}",
            record.id
        );

        let row = record.to_value();
        self.broadcast(json!({
            "eventType": "INSERT",
            "new": row.clone(),
            "old": {},
        }));
        Ok(row)
    }

    fn delete_record(&self, collection: &str, id: &BookmarkId) -> GatewayResult<()> {
        self.ensure_available()?;
        self.ensure_collection(collection)?;
        let session = self.require_session()?;

        {
            let conn = lock(&self.conn);
            let owner: Option<String> = conn
                .query_row(
                    "SELECT owner_id FROM bookmarks WHERE id = ?1;",
                    [id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            match owner {
                None => return Ok(()),
                Some(owner) if owner != session.user_id => {
                    return Err(GatewayError::Conflict(
                        "row-level security denied delete".to_string(),
                    ));
                }
                Some(_) => {}
            }
            conn.execute("DELETE FROM bookmarks WHERE id = ?1;", [id.as_str()])?;
        }
        info!("event=record_delete module=gateway status=ok id={id}");

        self.broadcast(json!({
            "eventType": "DELETE",
            "new": {},
            "old": { "id": id.as_str() },
        }));
        Ok(())
    }

    fn subscribe_to_changes(
        &self,
        collection: &str,
        sink: Sender<ChangeMessage>,
    ) -> GatewayResult<SubscriptionId> {
        self.ensure_available()?;
        self.ensure_collection(collection)?;
        let id = self.allocate_subscription_id();
        lock(&self.change_subscribers).insert(id, sink);
        info!(
            "event=change_feed_subscribe module=gateway status=ok subscription_id={}",
            id.get()
        );
        Ok(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        let removed_change = lock(&self.change_subscribers).remove(&id).is_some();
        let removed_session = lock(&self.session_listeners).remove(&id).is_some();
        if removed_change || removed_session {
            info!(
                "event=unsubscribe module=gateway status=ok subscription_id={}",
                id.get()
            );
        }
    }
}

fn select_record(conn: &Connection, id: &BookmarkId) -> GatewayResult<Option<BookmarkRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, title, url, owner_id, created_at FROM bookmarks WHERE id = ?1;",
    )?;
    let mut rows = stmt.query([id.as_str()])?;
    match rows.next()? {
        Some(row) => Ok(Some(parse_record_row(row)?)),
        None => Ok(None),
    }
}

fn parse_record_row(row: &Row<'_>) -> GatewayResult<BookmarkRecord> {
    let id: String = row.get("id")?;
    let record = BookmarkRecord {
        id: BookmarkId::new(id),
        title: row.get("title")?,
        url: row.get("url")?,
        owner_id: row.get("owner_id")?,
        created_at: row.get("created_at")?,
    };
    record.validate()?;
    Ok(record)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
