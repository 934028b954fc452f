//! End-to-end tests of the assembled storefront on in-memory storage.

use std::sync::Arc;

use app::{Config, Reported, Status, Storefront, default_collaborators, report};
use domain::{BookDetails, CancellationToken, Money, NewAccount};
use handlers::{Collaborators, InMemoryNotifier, InMemoryQueryCache};
use storage::{AuditLogStore, InMemoryAuditLog};

struct Fixture {
    storefront: Storefront<storage::InMemoryStorage>,
    audit_log: Arc<InMemoryAuditLog>,
    notifier: Arc<InMemoryNotifier>,
}

fn fixture() -> Fixture {
    let audit_log = Arc::new(InMemoryAuditLog::new());
    let notifier = Arc::new(InMemoryNotifier::new());
    let collaborators = Collaborators {
        audit_log: audit_log.clone(),
        cache: Arc::new(InMemoryQueryCache::new()),
        notifier: notifier.clone(),
        admin_emails: vec!["admin@example.com".to_string()],
    };

    Fixture {
        storefront: Storefront::in_memory(&collaborators),
        audit_log,
        notifier,
    }
}

#[tokio::test]
async fn test_catalog_to_delivery() {
    let f = fixture();
    let shop = &f.storefront;
    let cancel = CancellationToken::new();

    let genre = shop
        .genres()
        .create_genre("Fantasy".to_string(), &cancel)
        .await
        .unwrap();
    let book = shop
        .books()
        .create_book(
            BookDetails::new("The Hobbit", "Tolkien", "There and back", Money::from_cents(1250), 4)
                .with_genres([genre.id()]),
            &cancel,
        )
        .await
        .unwrap();
    let account = shop
        .accounts()
        .register(
            NewAccount::register("bilbo", "bilbo@example.com", "hash", None).unwrap(),
            &cancel,
        )
        .await
        .unwrap();

    let line = shop.books().order_line(book.id(), 2).await.unwrap();
    let order = shop
        .orders()
        .create_order(account.id().as_i64(), None, vec![line], &cancel)
        .await
        .unwrap();
    assert_eq!(order.total(), Money::from_cents(2500));

    shop.orders().confirm_order(order.id(), &cancel).await.unwrap();
    shop.orders()
        .ship_order(order.id(), None, &cancel)
        .await
        .unwrap();
    let delivered = shop.orders().deliver_order(order.id(), &cancel).await.unwrap();
    assert!(delivered.is_terminal());

    // genre, book, account and four order events
    assert_eq!(f.audit_log.len().await, 7);
    assert_eq!(
        f.audit_log
            .entries_for("Order", &order.id().to_string())
            .await
            .unwrap()
            .len(),
        4
    );
    // genre created, order created (realtime + email) and three status mails
    assert_eq!(f.notifier.sent().await.len(), 6);

    let err = shop.books().delete_book(book.id(), &cancel).await.unwrap_err();
    assert_eq!(app::BoundaryError::from(err).status, Status::Conflict);
}

#[tokio::test]
async fn test_report_flags_committed_dispatch_failure() {
    let f = fixture();
    let shop = &f.storefront;
    let cancel = CancellationToken::new();

    let genre = shop
        .genres()
        .create_genre("Horror".to_string(), &cancel)
        .await
        .unwrap();
    f.audit_log.set_fail_on_append(true).await;

    let reported = report(
        shop.genres()
            .rename_genre(genre.id(), "Gothic".to_string(), &cancel)
            .await,
    )
    .unwrap();

    match reported {
        Reported::CommittedWithWarning {
            value,
            undispatched,
            ..
        } => {
            assert_eq!(undispatched, 1);
            assert_eq!(value.map(|genre| genre.name().to_string()).as_deref(), Some("Gothic"));
        }
        Reported::Completed(_) => panic!("audit failure must surface as a warning"),
    }
    let stored = shop.genres().get_genre(genre.id()).await.unwrap();
    assert_eq!(stored.name(), "Gothic");
}

#[tokio::test]
async fn test_created_order_survives_dispatch_failure() {
    let f = fixture();
    let shop = &f.storefront;
    let cancel = CancellationToken::new();
    f.audit_log.set_fail_on_append(true).await;

    let reported = report(
        shop.orders()
            .create_order(7, Some("rush".to_string()), Vec::new(), &cancel)
            .await,
    )
    .unwrap();
    assert!(!reported.is_completed());

    let order = reported.into_value().unwrap();
    let stored = shop.orders().get_order(order.id()).await.unwrap();
    assert!(stored.is_announced());
    assert_eq!(stored.note(), Some("rush"));
}

#[tokio::test]
async fn test_report_maps_failures_to_status() {
    let f = fixture();
    let cancel = CancellationToken::new();

    let err = report(
        f.storefront
            .orders()
            .create_order(42, None, Vec::new(), &cancel)
            .await,
    )
    .unwrap_err();

    assert_eq!(err.status, Status::BadRequest);
    assert!(!err.committed);
    assert_eq!(f.audit_log.len().await, 0);
}

#[tokio::test]
async fn test_wired_router_covers_every_event_type() {
    let f = fixture();
    let table = f.storefront.router().table();
    assert_eq!(table.route_count(), 15);
    assert_eq!(
        table.handler_names::<domain::OrderCreated>(),
        vec!["activity_log", "cache_invalidation", "audit_log", "notification"]
    );
}

#[tokio::test]
async fn test_default_collaborators_use_configured_admins() {
    let config = Config {
        admin_emails: vec!["ops@example.com".to_string()],
        ..Config::default()
    };
    let audit_log: Arc<dyn AuditLogStore> = Arc::new(InMemoryAuditLog::new());
    let collaborators = default_collaborators(&config, audit_log);
    assert_eq!(collaborators.admin_emails, vec!["ops@example.com"]);

    let shop = Storefront::in_memory(&collaborators);
    let cancel = CancellationToken::new();
    shop.genres()
        .create_genre("Essays".to_string(), &cancel)
        .await
        .unwrap();
    assert_eq!(collaborators.audit_log.all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_connect_requires_database_url() {
    let result = Storefront::connect(&Config::default()).await;
    assert!(matches!(result, Err(app::AppError::MissingDatabaseUrl)));
}
