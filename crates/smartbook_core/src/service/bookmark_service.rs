//! Bookmark use-case service.
//!
//! # Responsibility
//! - Drive the reconciliation core from session changes.
//! - Validate and normalize add-form input before it reaches the gateway.
//! - Surface gateway failures after the core rolled back local state.
//!
//! # Invariants
//! - Session changes are processed before queued change events.
//! - Every gateway mutation is bracketed by `begin_*`/`complete_*`.

use crate::analytics::stats::BookmarkStats;
use crate::config::CoreConfig;
use crate::gateway::{RemoteGateway, SubscriptionGuard};
use crate::model::bookmark::{BookmarkId, BookmarkRecord, NewBookmark};
use crate::model::session::{Session, SessionChange};
use crate::reconcile::reconciler::{
    Completion, CoreError, CoreResult, ListRevision, ReconciliationCore,
};
use crossbeam::channel::{unbounded, Receiver};
use log::info;
use std::sync::Arc;

/// Facade pairing a gateway with its reconciliation core.
pub struct BookmarkService<G: RemoteGateway> {
    gateway: Arc<G>,
    core: ReconciliationCore<G>,
    config: CoreConfig,
    session_changes: Receiver<SessionChange>,
    _session_listener: SubscriptionGuard<G>,
}

impl<G: RemoteGateway> BookmarkService<G> {
    /// Registers for session changes; call `start` to load the current user.
    pub fn new(gateway: Arc<G>, config: CoreConfig) -> CoreResult<Self> {
        config
            .validate()
            .map_err(|err| CoreError::InvalidInput(err.to_string()))?;
        let (sink, session_changes) = unbounded();
        let listener_id = gateway.on_session_change(sink)?;
        let session_listener = SubscriptionGuard::new(Arc::clone(&gateway), listener_id);
        let core = ReconciliationCore::new(Arc::clone(&gateway), config.collection.clone());
        Ok(Self {
            gateway,
            core,
            config,
            session_changes,
            _session_listener: session_listener,
        })
    }

    /// Loads the list when a session already exists.
    pub fn start(&mut self) -> CoreResult<()> {
        match self.gateway.current_session()? {
            Some(session) if session.is_active() => self.core.initialize(Some(&session)),
            _ => {
                self.core.teardown();
                Ok(())
            }
        }
    }

    /// Applies pending session changes, then queued change events.
    ///
    /// Returns the number of change events merged.
    pub fn pump(&mut self) -> CoreResult<usize> {
        while let Ok(change) = self.session_changes.try_recv() {
            self.handle_session_change(change)?;
        }
        self.core.pump_events()
    }

    pub fn handle_session_change(&mut self, change: SessionChange) -> CoreResult<()> {
        match change {
            SessionChange::SignedIn(session) | SessionChange::TokenRefreshed(session) => {
                if self.is_current_user(&session) {
                    return Ok(());
                }
                info!(
                    "event=session_change module=service status=ok action=rebuild user_id={}",
                    session.user_id
                );
                self.core.initialize(Some(&session))
            }
            SessionChange::SignedOut => {
                info!("event=session_change module=service status=ok action=teardown");
                self.core.teardown();
                Ok(())
            }
        }
    }

    /// Redeems an OAuth callback code and loads the new user's list.
    pub fn complete_oauth_callback(&mut self, code: &str) -> CoreResult<Session> {
        let code = code.trim();
        if code.is_empty() {
            return Err(CoreError::InvalidInput("missing auth code".to_string()));
        }
        let session = self.gateway.exchange_code_for_session(code)?;
        self.core.initialize(Some(&session))?;
        Ok(session)
    }

    pub fn sign_out(&mut self) -> CoreResult<()> {
        self.gateway.sign_out()?;
        self.core.teardown();
        Ok(())
    }

    /// Saves a bookmark, showing it before the gateway confirms.
    ///
    /// On gateway failure the provisional entry is removed and the error is
    /// returned for display.
    pub fn add_bookmark(&mut self, title: &str, url: &str) -> CoreResult<BookmarkRecord> {
        let owner_id = self
            .core
            .session()
            .map(|session| session.user_id.clone())
            .ok_or(CoreError::Unauthenticated)?;

        let title = title.trim();
        if title.is_empty() {
            return Err(CoreError::InvalidInput("title is required".to_string()));
        }
        if url.trim().is_empty() {
            return Err(CoreError::InvalidInput("url is required".to_string()));
        }
        let fields = NewBookmark::new(
            title,
            normalize_url(url, &self.config.default_url_scheme),
            owner_id,
        );

        let pending = self.core.begin_insert(&fields)?;
        let result = self.gateway.insert_record(self.core.collection(), &fields);
        match self.core.complete_insert(pending, result)? {
            Completion::Confirmed(record) => Ok(record),
            Completion::Stale => Err(CoreError::Unauthenticated),
        }
    }

    /// Deletes a bookmark, hiding it before the gateway confirms.
    ///
    /// On gateway failure the record is restored at its ordered position.
    pub fn delete_bookmark(&mut self, id: &BookmarkId) -> CoreResult<()> {
        if self.core.is_pending_placeholder(id) {
            return Err(CoreError::InvalidInput(
                "bookmark is still being saved".to_string(),
            ));
        }

        let pending = self.core.begin_delete(id)?;
        let result = self.gateway.delete_record(self.core.collection(), id);
        match self.core.complete_delete(pending, result)? {
            Completion::Confirmed(()) => Ok(()),
            Completion::Stale => Err(CoreError::Unauthenticated),
        }
    }

    /// Re-fetches after a lost change feed.
    pub fn refresh(&mut self) -> CoreResult<()> {
        self.core.refresh()
    }

    pub fn search(&self, term: &str) -> Vec<&BookmarkRecord> {
        self.core.search(term)
    }

    pub fn bookmarks(&self) -> &[BookmarkRecord] {
        self.core.snapshot()
    }

    pub fn stats(&self) -> BookmarkStats {
        BookmarkStats::from_records(self.core.snapshot())
    }

    pub fn subscribe_list_changes(&mut self) -> Receiver<ListRevision> {
        self.core.subscribe_list_changes()
    }

    pub fn session(&self) -> Option<&Session> {
        self.core.session()
    }

    pub fn core(&self) -> &ReconciliationCore<G> {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut ReconciliationCore<G> {
        &mut self.core
    }

    fn is_current_user(&self, session: &Session) -> bool {
        self.core
            .session()
            .is_some_and(|current| current.user_id == session.user_id)
    }
}

/// Trims `raw` and prepends `scheme://` unless it already starts with `http`.
pub fn normalize_url(raw: &str, scheme: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.to_ascii_lowercase().starts_with("http") {
        trimmed.to_string()
    } else {
        format!("{scheme}://{trimmed}")
    }
}
