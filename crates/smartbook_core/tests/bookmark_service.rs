mod common;

use common::{row, Failure, MockGateway};
use smartbook_core::{
    BookmarkId, BookmarkService, CoreConfig, CoreError, GatewayError, LocalGateway, NewBookmark,
    RemoteGateway, Session, SessionChange,
};
use std::sync::Arc;

fn local_service(user_id: &str) -> (Arc<LocalGateway>, BookmarkService<LocalGateway>) {
    let gateway = Arc::new(LocalGateway::open_in_memory().unwrap());
    gateway.sign_in(Session::authenticated(user_id, format!("{user_id}@example.com")));
    let mut service = BookmarkService::new(Arc::clone(&gateway), CoreConfig::default()).unwrap();
    service.start().unwrap();
    (gateway, service)
}

fn titles(service: &BookmarkService<LocalGateway>) -> Vec<String> {
    service
        .bookmarks()
        .iter()
        .map(|record| record.title.clone())
        .collect()
}

#[test]
fn add_then_echo_keeps_one_entry_with_normalized_url() {
    let (_gateway, mut service) = local_service("user-1");

    let record = service.add_bookmark("  Google ", " google.com ").unwrap();
    assert_eq!(record.title, "Google");
    assert_eq!(record.url, "https://google.com");
    assert!(!service.core().is_pending_placeholder(&record.id));

    assert_eq!(service.pump().unwrap(), 1);
    assert_eq!(service.bookmarks().len(), 1);
    assert_eq!(service.bookmarks()[0].id, record.id);
}

#[test]
fn newest_bookmark_is_listed_first() {
    let (_gateway, mut service) = local_service("user-1");
    service.add_bookmark("first", "https://first.dev").unwrap();
    service.add_bookmark("second", "https://second.dev").unwrap();
    service.pump().unwrap();

    let listed = titles(&service);
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0], "second");
}

#[test]
fn add_rejects_blank_input_before_touching_the_list() {
    let (_gateway, mut service) = local_service("user-1");

    let err = service.add_bookmark("   ", "https://a.dev").unwrap_err();
    assert!(matches!(err, CoreError::InvalidInput(_)));
    let err = service.add_bookmark("title", "  ").unwrap_err();
    assert!(matches!(err, CoreError::InvalidInput(_)));
    assert!(service.bookmarks().is_empty());
}

#[test]
fn delete_then_echo_is_a_no_op() {
    let (gateway, mut service) = local_service("user-1");
    let record = service.add_bookmark("Docs", "https://docs.rs").unwrap();
    service.pump().unwrap();

    service.delete_bookmark(&record.id).unwrap();
    assert!(service.bookmarks().is_empty());
    assert_eq!(service.pump().unwrap(), 1);
    assert!(service.bookmarks().is_empty());

    let rows = gateway
        .list_records(
            "bookmarks",
            &smartbook_core::RecordListQuery::newest_first("user-1"),
        )
        .unwrap();
    assert!(rows.is_empty());
}

#[test]
fn other_client_inserts_arrive_through_the_change_feed() {
    let (gateway, mut service) = local_service("user-1");

    gateway
        .insert_record(
            "bookmarks",
            &NewBookmark::new("From phone", "https://phone.dev", "user-1"),
        )
        .unwrap();
    assert!(service.bookmarks().is_empty());

    service.pump().unwrap();
    assert_eq!(titles(&service), vec!["From phone".to_string()]);
}

#[test]
fn title_update_refetches_the_list() {
    let (gateway, mut service) = local_service("user-1");
    let record = service.add_bookmark("Old", "https://a.dev").unwrap();
    service.pump().unwrap();

    gateway.update_title(&record.id, "New").unwrap();
    service.pump().unwrap();
    assert_eq!(titles(&service), vec!["New".to_string()]);
}

#[test]
fn unavailable_backend_rolls_back_add_and_delete() {
    let (gateway, mut service) = local_service("user-1");
    let kept = service.add_bookmark("Keep", "https://keep.dev").unwrap();
    service.pump().unwrap();

    gateway.set_available(false);
    let err = service.add_bookmark("Lost", "https://lost.dev").unwrap_err();
    assert!(matches!(err, CoreError::GatewayUnavailable(_)));
    assert_eq!(titles(&service), vec!["Keep".to_string()]);

    let err = service.delete_bookmark(&kept.id).unwrap_err();
    assert!(matches!(err, CoreError::GatewayUnavailable(_)));
    assert_eq!(titles(&service), vec!["Keep".to_string()]);
}

#[test]
fn backend_rejection_surfaces_conflict_after_rollback() {
    let gateway = Arc::new(MockGateway::with_rows(vec![row("1", 10)]));
    let mut service = BookmarkService::new(Arc::clone(&gateway), CoreConfig::default()).unwrap();
    service.start().unwrap();

    gateway.fail_delete(Some(Failure::Conflict));
    let err = service.delete_bookmark(&BookmarkId::new("1")).unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)));
    assert_eq!(service.bookmarks().len(), 1);

    gateway.fail_insert(Some(Failure::Conflict));
    let err = service.add_bookmark("t", "t.dev").unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)));
    assert_eq!(service.bookmarks().len(), 1);
}

#[test]
fn unconfirmed_insert_cannot_be_deleted_until_completed() {
    let (_gateway, mut service) = local_service("user-1");
    let pending = service
        .core_mut()
        .begin_insert(&NewBookmark::new("Saving", "https://saving.dev", "user-1"))
        .unwrap();
    let placeholder = pending.placeholder_id().clone();

    let err = service.delete_bookmark(&placeholder).unwrap_err();
    assert!(matches!(err, CoreError::InvalidInput(_)));
    assert_eq!(service.bookmarks().len(), 1);

    let rollback = service.core_mut().complete_insert(
        pending,
        Err(GatewayError::Unavailable("offline".to_string())),
    );
    assert!(rollback.is_err());
    assert!(service.bookmarks().is_empty());

    // Once completed the id is an ordinary id again; the gateway acks absent rows.
    service.delete_bookmark(&placeholder).unwrap();
}

#[test]
fn gateway_ids_are_opaque_even_with_a_local_prefix() {
    let gateway = Arc::new(MockGateway::with_rows(vec![row("local-7", 10)]));
    let mut service = BookmarkService::new(Arc::clone(&gateway), CoreConfig::default()).unwrap();
    service.start().unwrap();

    service.delete_bookmark(&BookmarkId::new("local-7")).unwrap();
    assert!(service.bookmarks().is_empty());

    service.refresh().unwrap();
    assert!(service.bookmarks().is_empty());
}

#[test]
fn sign_out_clears_list_and_blocks_mutations() {
    let (gateway, mut service) = local_service("user-1");
    service.add_bookmark("Docs", "https://docs.rs").unwrap();

    service.sign_out().unwrap();
    assert!(service.bookmarks().is_empty());
    assert!(service.session().is_none());
    assert_eq!(gateway.change_subscriber_count(), 0);

    service.pump().unwrap();
    let err = service.add_bookmark("x", "https://x.dev").unwrap_err();
    assert!(matches!(err, CoreError::Unauthenticated));
}

#[test]
fn session_changes_drive_initialize_and_teardown() {
    let gateway = Arc::new(LocalGateway::open_in_memory().unwrap());
    let mut service = BookmarkService::new(Arc::clone(&gateway), CoreConfig::default()).unwrap();
    service.start().unwrap();
    assert!(service.session().is_none());

    gateway.sign_in(Session::authenticated("user-1", "one@example.com"));
    service.pump().unwrap();
    assert_eq!(service.session().map(|s| s.user_id.as_str()), Some("user-1"));

    service.add_bookmark("Mine", "https://mine.dev").unwrap();
    let revision = service.core().revision();
    gateway.refresh_token().unwrap();
    service.pump().unwrap();
    assert_eq!(service.core().revision(), revision);
    assert_eq!(titles(&service), vec!["Mine".to_string()]);

    gateway.sign_out().unwrap();
    service.pump().unwrap();
    assert!(service.session().is_none());
    assert!(service.bookmarks().is_empty());
}

#[test]
fn signing_in_as_another_user_shows_only_their_rows() {
    let (gateway, mut service) = local_service("user-1");
    service.add_bookmark("One", "https://one.dev").unwrap();

    gateway.sign_in(Session::authenticated("user-2", "two@example.com"));
    service.pump().unwrap();
    assert!(service.bookmarks().is_empty());

    gateway
        .insert_record(
            "bookmarks",
            &NewBookmark::new("Two", "https://two.dev", "user-2"),
        )
        .unwrap();
    service.pump().unwrap();
    assert_eq!(titles(&service), vec!["Two".to_string()]);
}

#[test]
fn oauth_callback_exchanges_code_and_loads_list() {
    let gateway = Arc::new(LocalGateway::open_in_memory().unwrap());
    gateway.register_auth_code("code-123", Session::authenticated("user-9", "n@example.com"));
    let mut service = BookmarkService::new(Arc::clone(&gateway), CoreConfig::default()).unwrap();
    service.start().unwrap();

    let err = service.complete_oauth_callback("  ").unwrap_err();
    assert!(matches!(err, CoreError::InvalidInput(_)));
    let err = service.complete_oauth_callback("wrong").unwrap_err();
    assert!(matches!(err, CoreError::Unauthenticated));

    let session = service.complete_oauth_callback("code-123").unwrap();
    assert_eq!(session.user_id, "user-9");
    assert!(service.core().is_initialized());

    let revision = service.core().revision();
    service.pump().unwrap();
    assert_eq!(service.core().revision(), revision);
}

#[test]
fn lost_feed_requires_manual_refresh() {
    let (gateway, mut service) = local_service("user-1");
    gateway.close_subscriptions("server restart");

    let err = service.pump().unwrap_err();
    assert!(matches!(err, CoreError::SubscriptionLost(_)));

    gateway
        .insert_record(
            "bookmarks",
            &NewBookmark::new("Missed", "https://missed.dev", "user-1"),
        )
        .unwrap();
    service.refresh().unwrap();
    assert_eq!(titles(&service), vec!["Missed".to_string()]);
    assert_eq!(service.pump().unwrap(), 0);
}

#[test]
fn search_and_stats_read_the_reconciled_list() {
    let (_gateway, mut service) = local_service("user-1");
    service.add_bookmark("Rust Book", "doc.rust-lang.org/book").unwrap();
    service.add_bookmark("Std docs", "https://doc.rust-lang.org/std").unwrap();
    service.add_bookmark("Crates", "https://crates.io").unwrap();

    assert_eq!(service.search("").len(), 3);
    assert_eq!(service.search("BOOK").len(), 1);
    assert!(service.search("python").is_empty());

    let stats = service.stats();
    assert_eq!(stats.total, 3);
    let top = stats.top_domain.expect("top domain");
    assert_eq!(top.domain, "doc.rust-lang.org");
    assert_eq!(top.count, 2);
    assert_eq!(stats.daily_counts.iter().map(|d| d.count).sum::<usize>(), 3);
}

#[test]
fn list_change_receivers_see_every_revision() {
    let gateway = Arc::new(MockGateway::new());
    let mut service = BookmarkService::new(Arc::clone(&gateway), CoreConfig::default()).unwrap();
    let revisions = service.subscribe_list_changes();
    service.start().unwrap();

    service.add_bookmark("a", "https://a.dev").unwrap();
    gateway.announce(SessionChange::SignedOut);
    service.pump().unwrap();

    // load, placeholder shown, placeholder swapped for the saved row, cleared
    let seen: Vec<u64> = revisions.try_iter().collect();
    assert_eq!(seen, vec![1, 2, 3, 4]);
    assert!(service.bookmarks().is_empty());
}

#[test]
fn invalid_config_is_rejected_before_registering() {
    let gateway = Arc::new(LocalGateway::open_in_memory().unwrap());
    let config = CoreConfig {
        default_url_scheme: "ftp".to_string(),
        ..CoreConfig::default()
    };
    let err = BookmarkService::new(Arc::clone(&gateway), config).err().unwrap();
    assert!(matches!(err, CoreError::InvalidInput(_)));
}
