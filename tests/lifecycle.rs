//! Preview → Commit lifecycle against a mocked credits service.

use std::sync::Arc;
use std::time::Duration;

use httpmock::prelude::*;
use image::RgbaImage;
use tempfile::TempDir;

use postforge_core::{
    CommitService, EngineError, HttpCreditDebit, PostStore, PreviewStore, SqlitePostStore,
};

const DEBIT_PATH: &str = "/me/use-credit";
const UNREACHABLE: &str = "http://127.0.0.1:1/me/use-credit";

struct Harness {
    _tmp: TempDir,
    previews: PreviewStore,
    posts: Arc<SqlitePostStore>,
}

impl Harness {
    fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let previews = PreviewStore::new(tmp.path().join("generated"), "/static/generated");
        Self {
            _tmp: tmp,
            previews,
            posts: Arc::new(SqlitePostStore::open_in_memory().unwrap()),
        }
    }

    fn service(&self, endpoint: String, timeout: Duration, disabled: bool) -> CommitService {
        let debit = HttpCreditDebit::new(endpoint, timeout).unwrap();
        CommitService::new(
            self.previews.clone(),
            Arc::new(debit),
            Arc::clone(&self.posts) as Arc<dyn PostStore>,
            disabled,
        )
    }

    fn png_preview(&self) -> String {
        let id = self.previews.next_id(chrono::Utc::now());
        self.previews.write_png(&id, &RgbaImage::new(8, 8)).unwrap();
        id
    }

    fn svg_preview(&self) -> String {
        let id = self.previews.next_id(chrono::Utc::now());
        self.previews
            .write_svg(&id, r#"<svg xmlns="http://www.w3.org/2000/svg" width="8" height="8"/>"#)
            .unwrap();
        id
    }

    fn rows(&self) -> i64 {
        self.posts.count().unwrap()
    }
}

fn urls(id: &str) -> Vec<String> {
    vec![format!("/static/generated/{id}.png")]
}

#[tokio::test]
async fn successful_debit_records_post_and_forwards_auth() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path(DEBIT_PATH)
                .header("authorization", "Bearer user-token");
            then.status(200).json_body(serde_json::json!({ "remaining": 4 }));
        })
        .await;

    let h = Harness::new();
    let service = h.service(server.url(DEBIT_PATH), Duration::from_secs(5), false);
    let preview = h.png_preview();

    let post = service
        .commit(&preview, &urls(&preview), Some("Bearer user-token"))
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(post.preview_id, preview);
    assert_eq!(post.urls, urls(&preview));
    assert_eq!(h.rows(), 1);
}

#[tokio::test]
async fn forbidden_debit_leaves_store_untouched() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path(DEBIT_PATH);
            then.status(403).json_body(serde_json::json!({ "detail": "no credits" }));
        })
        .await;

    let h = Harness::new();
    let service = h.service(server.url(DEBIT_PATH), Duration::from_secs(5), false);
    let preview = h.png_preview();

    let err = service.commit(&preview, &urls(&preview), Some("Bearer x")).await.unwrap_err();

    assert!(matches!(err, EngineError::Unauthorized));
    assert_eq!(h.rows(), 0);
}

#[tokio::test]
async fn server_error_is_debit_failure_with_detail() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path(DEBIT_PATH);
            then.status(500).body("ledger offline");
        })
        .await;

    let h = Harness::new();
    let service = h.service(server.url(DEBIT_PATH), Duration::from_secs(5), false);
    let preview = h.svg_preview();

    let err = service.commit(&preview, &[], None).await.unwrap_err();

    match err {
        EngineError::DebitFailed(detail) => {
            assert!(detail.starts_with("500"));
            assert!(detail.contains("ledger offline"));
        }
        other => panic!("expected debit failure, got {other:?}"),
    }
    assert_eq!(h.rows(), 0);
}

#[tokio::test]
async fn unreachable_service_is_unavailable() {
    let h = Harness::new();
    let service = h.service(UNREACHABLE.into(), Duration::from_secs(2), false);
    let preview = h.png_preview();

    let err = service.commit(&preview, &urls(&preview), None).await.unwrap_err();

    assert_eq!(err.kind(), "service_unavailable");
    assert_eq!(h.rows(), 0);
}

#[tokio::test]
async fn slow_service_times_out_as_unavailable() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path(DEBIT_PATH);
            then.status(200).delay(Duration::from_secs(3));
        })
        .await;

    let h = Harness::new();
    let service = h.service(server.url(DEBIT_PATH), Duration::from_millis(200), false);
    let preview = h.png_preview();

    let err = service.commit(&preview, &urls(&preview), None).await.unwrap_err();

    assert_eq!(err.kind(), "service_unavailable");
    assert_eq!(h.rows(), 0);
}

#[tokio::test]
async fn missing_preview_is_rejected_before_debit() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path(DEBIT_PATH);
            then.status(200);
        })
        .await;

    let h = Harness::new();
    let service = h.service(server.url(DEBIT_PATH), Duration::from_secs(5), false);

    let err = service
        .commit("prev_0_000000000000", &[], None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::PreviewNotFound(_)));

    let err = service.commit("../../etc/passwd", &[], None).await.unwrap_err();
    assert!(err.is_not_found());

    mock.assert_hits_async(0).await;
    assert_eq!(h.rows(), 0);
}

#[tokio::test]
async fn disabled_guard_commits_without_billing() {
    let h = Harness::new();
    let service = h.service(UNREACHABLE.into(), Duration::from_secs(1), true);
    let preview = h.png_preview();

    let post = service.commit(&preview, &urls(&preview), None).await.unwrap();

    assert_eq!(post.preview_id, preview);
    assert_eq!(h.rows(), 1);
}

#[tokio::test]
async fn committed_listing_is_newest_first_and_clamped() {
    let h = Harness::new();
    let service = h.service(UNREACHABLE.into(), Duration::from_secs(1), true);
    let preview = h.png_preview();
    for _ in 0..25 {
        service.commit(&preview, &urls(&preview), None).await.unwrap();
    }

    let page = service.list(None, None).unwrap();
    assert_eq!(page.limit, 20);
    assert_eq!(page.count, 20);
    assert_eq!(page.items[0].id, 25);
    assert!(page.items.windows(2).all(|w| w[0].id > w[1].id));

    let page = service.list(Some(500), Some(20)).unwrap();
    assert_eq!(page.limit, 100);
    assert_eq!(page.count, 5);
    assert_eq!(page.items.last().map(|p| p.id), Some(1));

    let page = service.list(Some(0), Some(-3)).unwrap();
    assert_eq!((page.limit, page.offset, page.count), (1, 0, 1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_commits_each_record_one_post() {
    let h = Harness::new();
    let service = Arc::new(h.service(UNREACHABLE.into(), Duration::from_secs(1), true));
    let preview = h.png_preview();

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let service = Arc::clone(&service);
            let preview = preview.clone();
            tokio::spawn(async move { service.commit(&preview, &urls(&preview), None).await })
        })
        .collect();

    let mut ids = Vec::new();
    for task in tasks {
        ids.push(task.await.unwrap().unwrap().id);
    }
    ids.sort_unstable();
    ids.dedup();

    assert_eq!(ids.len(), 8);
    assert_eq!(h.rows(), 8);
}
