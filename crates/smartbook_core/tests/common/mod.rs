//! Shared test doubles for integration tests.

#![allow(dead_code)]

use crossbeam::channel::Sender;
use serde_json::{json, Value};
use smartbook_core::{
    BookmarkId, ChangeMessage, GatewayError, GatewayResult, NewBookmark, RecordListQuery,
    RemoteGateway, Session, SessionChange, SubscriptionId,
};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

pub const USER: &str = "user-1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Unavailable,
    Conflict,
}

impl Failure {
    fn into_error(self) -> GatewayError {
        match self {
            Self::Unavailable => GatewayError::Unavailable("injected outage".to_string()),
            Self::Conflict => GatewayError::Conflict("injected denial".to_string()),
        }
    }
}

/// Scriptable gateway: rows are raw JSON, failures are injected per call
/// kind and change events are emitted by the test.
pub struct MockGateway {
    session: RefCell<Option<Session>>,
    rows: RefCell<Vec<Value>>,
    clock: Cell<i64>,
    next_row_id: Cell<u64>,
    next_subscription_id: Cell<u64>,
    list_failure: Cell<Option<Failure>>,
    insert_failure: Cell<Option<Failure>>,
    delete_failure: Cell<Option<Failure>>,
    subscribe_failure: Cell<Option<Failure>>,
    change_sinks: RefCell<BTreeMap<SubscriptionId, Sender<ChangeMessage>>>,
    session_sinks: RefCell<BTreeMap<SubscriptionId, Sender<SessionChange>>>,
    released: RefCell<Vec<SubscriptionId>>,
    list_calls: Cell<usize>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            session: RefCell::new(Some(session())),
            rows: RefCell::new(Vec::new()),
            clock: Cell::new(1_000),
            next_row_id: Cell::new(100),
            next_subscription_id: Cell::new(1),
            list_failure: Cell::new(None),
            insert_failure: Cell::new(None),
            delete_failure: Cell::new(None),
            subscribe_failure: Cell::new(None),
            change_sinks: RefCell::new(BTreeMap::new()),
            session_sinks: RefCell::new(BTreeMap::new()),
            released: RefCell::new(Vec::new()),
            list_calls: Cell::new(0),
        }
    }

    pub fn with_rows(rows: Vec<Value>) -> Self {
        let gateway = Self::new();
        *gateway.rows.borrow_mut() = rows;
        gateway
    }

    pub fn set_rows(&self, rows: Vec<Value>) {
        *self.rows.borrow_mut() = rows;
    }

    pub fn set_clock(&self, now: i64) {
        self.clock.set(now);
    }

    pub fn fail_list(&self, failure: Option<Failure>) {
        self.list_failure.set(failure);
    }

    pub fn fail_insert(&self, failure: Option<Failure>) {
        self.insert_failure.set(failure);
    }

    pub fn fail_delete(&self, failure: Option<Failure>) {
        self.delete_failure.set(failure);
    }

    pub fn fail_subscribe(&self, failure: Option<Failure>) {
        self.subscribe_failure.set(failure);
    }

    /// Pushes a raw payload to every live change subscriber.
    pub fn emit(&self, payload: Value) {
        self.change_sinks
            .borrow_mut()
            .retain(|_, sink| sink.send(ChangeMessage::Payload(payload.clone())).is_ok());
    }

    pub fn close_feed(&self, reason: &str) {
        for sink in self.change_sinks.borrow().values() {
            let _ = sink.send(ChangeMessage::Closed {
                reason: reason.to_string(),
            });
        }
    }

    pub fn announce(&self, change: SessionChange) {
        self.session_sinks
            .borrow_mut()
            .retain(|_, sink| sink.send(change.clone()).is_ok());
    }

    pub fn live_change_subscribers(&self) -> usize {
        self.change_sinks.borrow().len()
    }

    pub fn released(&self) -> Vec<SubscriptionId> {
        self.released.borrow().clone()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.get()
    }
}

impl RemoteGateway for MockGateway {
    fn current_session(&self) -> GatewayResult<Option<Session>> {
        Ok(self.session.borrow().clone())
    }

    fn on_session_change(&self, sink: Sender<SessionChange>) -> GatewayResult<SubscriptionId> {
        let id = self.allocate_id();
        self.session_sinks.borrow_mut().insert(id, sink);
        Ok(id)
    }

    fn exchange_code_for_session(&self, code: &str) -> GatewayResult<Session> {
        if code == "good-code" {
            let session = session();
            *self.session.borrow_mut() = Some(session.clone());
            Ok(session)
        } else {
            Err(GatewayError::Unauthenticated)
        }
    }

    fn sign_out(&self) -> GatewayResult<()> {
        *self.session.borrow_mut() = None;
        Ok(())
    }

    fn list_records(
        &self,
        _collection: &str,
        _query: &RecordListQuery,
    ) -> GatewayResult<Vec<Value>> {
        self.list_calls.set(self.list_calls.get() + 1);
        if let Some(failure) = self.list_failure.get() {
            return Err(failure.into_error());
        }
        Ok(self.rows.borrow().clone())
    }

    fn insert_record(&self, _collection: &str, fields: &NewBookmark) -> GatewayResult<Value> {
        if let Some(failure) = self.insert_failure.get() {
            return Err(failure.into_error());
        }
        let id = self.next_row_id.get();
        self.next_row_id.set(id + 1);
        let created_at = self.clock.get();
        self.clock.set(created_at + 1);

        let row = json!({
            "id": format!("srv-{id}"),
            "title": fields.title,
            "url": fields.url,
            "owner_id": fields.owner_id,
            "created_at": created_at,
        });
        self.rows.borrow_mut().insert(0, row.clone());
        Ok(row)
    }

    fn delete_record(&self, _collection: &str, id: &BookmarkId) -> GatewayResult<()> {
        if let Some(failure) = self.delete_failure.get() {
            return Err(failure.into_error());
        }
        self.rows
            .borrow_mut()
            .retain(|row| row["id"].as_str() != Some(id.as_str()));
        Ok(())
    }

    fn subscribe_to_changes(
        &self,
        _collection: &str,
        sink: Sender<ChangeMessage>,
    ) -> GatewayResult<SubscriptionId> {
        if let Some(failure) = self.subscribe_failure.get() {
            return Err(failure.into_error());
        }
        let id = self.allocate_id();
        self.change_sinks.borrow_mut().insert(id, sink);
        Ok(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        let removed_change = self.change_sinks.borrow_mut().remove(&id).is_some();
        let removed_session = self.session_sinks.borrow_mut().remove(&id).is_some();
        if removed_change || removed_session {
            self.released.borrow_mut().push(id);
        }
    }
}

impl MockGateway {
    fn allocate_id(&self) -> SubscriptionId {
        let id = self.next_subscription_id.get();
        self.next_subscription_id.set(id + 1);
        SubscriptionId::new(id)
    }
}

pub fn session() -> Session {
    Session::authenticated(USER, "user-1@example.com")
}

pub fn row(id: &str, created_at: i64) -> Value {
    row_for(id, created_at, USER)
}

pub fn row_for(id: &str, created_at: i64, owner_id: &str) -> Value {
    json!({
        "id": id,
        "title": format!("Title {id}"),
        "url": format!("https://{id}.example.com/page"),
        "owner_id": owner_id,
        "created_at": created_at,
    })
}

pub fn insert_event(row: Value) -> Value {
    json!({ "eventType": "INSERT", "new": row, "old": {} })
}

pub fn delete_event(id: &str) -> Value {
    json!({ "eventType": "DELETE", "new": {}, "old": { "id": id } })
}

pub fn update_event(row: Value) -> Value {
    json!({ "eventType": "UPDATE", "new": row, "old": {} })
}
