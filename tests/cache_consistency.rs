//! Read-your-writes and fill-race behaviour of the article cache.

mod support;

use std::sync::Arc;

use folio::application::accelerator::Accelerator;
use folio::application::articles::{ArticleError, UpdateArticleCommand};
use folio::application::repos::ArticleQuery;
use folio::domain::entities::ArticleRecord;
use folio::domain::types::ArticleStatus;
use uuid::Uuid;

use support::{FlakyAccelerator, Harness, create_command};

fn rename(article: &ArticleRecord, title: &str) -> UpdateArticleCommand {
    UpdateArticleCommand {
        id: article.id,
        title: title.to_string(),
        body: article.body.clone(),
        excerpt: None,
        cover: article.cover.clone(),
        status: article.status,
        category_id: article.category_id,
        tags: article.tags.clone(),
        published_at: article.published_at,
    }
}

#[tokio::test]
async fn detail_reads_are_served_from_cache_after_the_first_miss() {
    let harness = Harness::with_memory().await;
    let article = harness.repo.seed("Cached", "body");

    let first = harness.service.get_by_id(article.id).await.expect("read");
    let second = harness.service.get_by_id(article.id).await.expect("read");

    assert_eq!(first, second);
    assert_eq!(harness.repo.find_by_id_calls(), 1);
    assert!(harness.cache.get_detail(article.id).await.is_some());
}

#[tokio::test]
async fn updates_are_visible_to_the_next_read() {
    let harness = Harness::with_memory().await;
    let article = harness.repo.seed("Before", "body");

    harness.service.get_by_id(article.id).await.expect("warm");
    harness
        .service
        .update(rename(&article, "After"))
        .await
        .expect("update");

    let read = harness.service.get_by_id(article.id).await.expect("read");
    assert_eq!(read.title, "After");
}

#[tokio::test]
async fn stale_fill_is_discarded_when_an_update_lands_mid_read() {
    let harness = Harness::with_memory().await;
    let article = harness.repo.seed("Original", "body");
    let (entered, release) = harness.repo.gate_next_read();

    let reader = {
        let service = harness.service.clone();
        tokio::spawn(async move { service.get_by_id(article.id).await })
    };

    // the reader holds the old row; now the writer commits and invalidates
    entered.notified().await;
    harness
        .service
        .update(rename(&article, "Revised"))
        .await
        .expect("update");
    release.notify_one();

    let stale = reader.await.expect("join").expect("read");
    assert_eq!(stale.title, "Original");

    assert!(harness.cache.get_detail(article.id).await.is_none());
    let fresh = harness.service.get_by_id(article.id).await.expect("read");
    assert_eq!(fresh.title, "Revised");
}

#[tokio::test]
async fn fill_ticket_rejects_writes_after_invalidation() {
    let harness = Harness::with_memory().await;
    let article = harness.repo.seed("Ticket", "body");

    let ticket = harness.cache.begin_fill(article.id).await;
    assert!(ticket.is_armed());
    harness.cache.invalidate_detail(article.id).await;
    harness.cache.complete_fill(ticket, &article).await;

    assert!(harness.cache.get_detail(article.id).await.is_none());

    harness.cache.put_detail(&article).await;
    assert_eq!(harness.cache.get_detail(article.id).await, Some(article));
}

#[tokio::test]
async fn snapshots_from_an_older_generation_are_ignored() {
    let harness = Harness::with_memory().await;
    let article = harness.repo.seed("Generations", "body");
    let accelerator = harness.accelerator.clone().expect("accelerator");

    harness.cache.put_detail(&article).await;
    // bump the generation without deleting the snapshot
    accelerator
        .incr_by(&harness.keys.generation_key(article.id), 1)
        .await
        .expect("incr");

    assert!(harness.cache.get_detail(article.id).await.is_none());
}

#[tokio::test]
async fn list_pages_are_invalidated_by_every_write() {
    let harness = Harness::with_memory().await;
    harness.repo.seed("One", "body");
    harness.repo.seed("Two", "body");

    let query = ArticleQuery {
        status: Some(ArticleStatus::Published),
        ..Default::default()
    };
    let before = harness.service.list(&query).await.expect("list");
    assert_eq!(before.total, 2);
    assert!(
        harness
            .cache
            .get_list(&query.normalized().signature())
            .await
            .is_some()
    );

    let created = harness
        .service
        .create(create_command("Three", "body"))
        .await
        .expect("create");
    let after_create = harness.service.list(&query).await.expect("list");
    assert_eq!(after_create.total, 3);

    harness.service.delete(created.id).await.expect("delete");
    let after_delete = harness.service.list(&query).await.expect("list");
    assert_eq!(after_delete.total, 2);
    assert!(after_delete.items.iter().all(|item| item.id != created.id));
}

#[tokio::test]
async fn equivalent_list_queries_share_one_entry() {
    let harness = Harness::with_memory().await;
    harness.repo.seed("Only", "body");

    let canonical = ArticleQuery::default();
    let sloppy = ArticleQuery {
        page: 0,
        page_size: 0,
        search: Some("   ".to_string()),
        ..Default::default()
    };

    harness.service.list(&sloppy).await.expect("list");
    assert!(
        harness
            .cache
            .get_list(&canonical.signature())
            .await
            .is_some()
    );
}

#[tokio::test]
async fn slug_reads_resolve_through_the_pointer() {
    let harness = Harness::with_memory().await;
    let created = harness
        .service
        .create(create_command("Hello Cache", "body"))
        .await
        .expect("create");
    assert_eq!(created.slug, "hello-cache");

    let read = harness
        .service
        .get_by_slug("hello-cache")
        .await
        .expect("by slug");
    assert_eq!(read.id, created.id);
    assert_eq!(
        harness.cache.get_slug("hello-cache").await,
        Some(created.id)
    );

    assert_eq!(harness.repo.find_by_slug_calls(), 1);

    // pointer known: one guarded read fills the snapshot
    let again = harness
        .service
        .get_by_slug("hello-cache")
        .await
        .expect("by slug");
    assert_eq!(again.id, created.id);
    assert_eq!(harness.repo.find_by_slug_calls(), 2);
    assert!(harness.cache.get_detail(created.id).await.is_some());

    let cached = harness
        .service
        .get_by_slug("hello-cache")
        .await
        .expect("by slug");
    assert_eq!(cached.id, created.id);
    assert_eq!(harness.repo.find_by_slug_calls(), 2);
    assert_eq!(harness.repo.find_by_id_calls(), 0);
}

#[tokio::test]
async fn stale_slug_fill_is_discarded_when_an_update_lands_mid_read() {
    let harness = Harness::with_memory().await;
    let article = harness.repo.seed("Slugged", "body");
    harness
        .service
        .get_by_slug(&article.slug)
        .await
        .expect("learn pointer");
    let (entered, release) = harness.repo.gate_next_read();

    let reader = {
        let service = harness.service.clone();
        let slug = article.slug.clone();
        tokio::spawn(async move { service.get_by_slug(&slug).await })
    };

    entered.notified().await;
    harness
        .service
        .update(rename(&article, "Renamed"))
        .await
        .expect("update");
    release.notify_one();

    let stale = reader.await.expect("join").expect("read");
    assert_eq!(stale.title, "Slugged");
    assert!(harness.cache.get_detail(article.id).await.is_none());

    let fresh = harness
        .service
        .get_by_slug(&article.slug)
        .await
        .expect("read");
    assert_eq!(fresh.title, "Renamed");
}

#[tokio::test]
async fn deleted_articles_disappear_from_every_read_path() {
    let harness = Harness::with_memory().await;
    let created = harness
        .service
        .create(create_command("Short Lived", "body"))
        .await
        .expect("create");

    harness.service.get_by_id(created.id).await.expect("warm");
    harness
        .service
        .get_by_slug(&created.slug)
        .await
        .expect("warm slug");
    harness.service.delete(created.id).await.expect("delete");

    assert!(matches!(
        harness.service.get_by_id(created.id).await,
        Err(ArticleError::NotFound)
    ));
    assert!(matches!(
        harness.service.get_by_slug(&created.slug).await,
        Err(ArticleError::NotFound)
    ));
    assert!(harness.cache.get_slug(&created.slug).await.is_none());
    assert!(matches!(
        harness.service.delete(created.id).await,
        Err(ArticleError::NotFound)
    ));
}

#[tokio::test]
async fn colliding_titles_get_suffixed_slugs_until_exhausted() {
    let harness = Harness::with_memory().await;

    let first = harness
        .service
        .create(create_command("Same Title", "body"))
        .await
        .expect("create");
    let second = harness
        .service
        .create(create_command("Same Title", "body"))
        .await
        .expect("create");
    assert_eq!(first.slug, "same-title");
    assert_eq!(second.slug, "same-title-2");

    for _ in 2..33 {
        harness
            .service
            .create(create_command("Same Title", "body"))
            .await
            .expect("create");
    }

    let err = harness
        .service
        .create(create_command("Same Title", "body"))
        .await
        .expect_err("exhausted");
    assert!(matches!(
        err,
        ArticleError::Conflict { ref base, attempts: 33 } if base == "same-title"
    ));
}

#[tokio::test]
async fn blank_titles_are_rejected_before_touching_the_store() {
    let harness = Harness::with_memory().await;

    assert!(matches!(
        harness.service.create(create_command("   ", "body")).await,
        Err(ArticleError::Validation("title"))
    ));
    assert!(matches!(
        harness.service.create(create_command("Title", "")).await,
        Err(ArticleError::Validation("body"))
    ));
}

#[tokio::test]
async fn reads_survive_an_accelerator_outage() {
    let accelerator = FlakyAccelerator::new();
    let harness = Harness::new(Some(accelerator.clone() as Arc<dyn Accelerator>), None).await;
    let article = harness.repo.seed("Resilient", "body");

    harness.service.get_by_id(article.id).await.expect("warm");
    accelerator.set_down(true);

    let read = harness.service.get_by_id(article.id).await.expect("read");
    assert_eq!(read.id, article.id);
    let page = harness
        .service
        .list(&ArticleQuery::default())
        .await
        .expect("list");
    assert_eq!(page.total, 1);
    harness
        .service
        .update(rename(&article, "Written while down"))
        .await
        .expect("update");

    assert_eq!(
        harness.repo.row(article.id).map(|row| row.title),
        Some("Written while down".to_string())
    );
}

#[tokio::test]
async fn reads_without_an_accelerator_go_to_the_store() {
    let harness = Harness::new(None, None).await;
    let article = harness.repo.seed("Uncached", "body");

    harness.service.get_by_id(article.id).await.expect("read");
    harness.service.get_by_id(article.id).await.expect("read");

    assert_eq!(harness.repo.find_by_id_calls(), 2);
    assert!(!harness.cache.is_enabled());
    assert!(matches!(
        harness.service.get_by_id(Uuid::new_v4()).await,
        Err(ArticleError::NotFound)
    ));
}
