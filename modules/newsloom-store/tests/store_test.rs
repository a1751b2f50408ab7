use chrono::{TimeZone, Utc};
use newsloom_common::{
    content_hash, word_count, DateSource, NewArticle, ProxyEndpoint, ProxyProtocol, SeedUrl,
    UrlStatus,
};
use newsloom_store::{FailureUpdate, StateStore, SuccessOutcome};
use tempfile::TempDir;

async fn open_store(dir: &TempDir) -> StateStore {
    StateStore::open(&dir.path().join("newsloom.db"))
        .await
        .expect("open store")
}

fn seed(url: &str, source: &str) -> SeedUrl {
    SeedUrl {
        normalized_url: url.to_string(),
        source: source.to_string(),
        gdelt_publish_date: Some(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()),
        gdelt_themes: Some("CONFLICT;DIPLOMACY".to_string()),
        gdelt_tone: Some("-2.4".to_string()),
    }
}

fn article(url: &str, source: &str, body: &str) -> NewArticle {
    NewArticle {
        normalized_url: url.to_string(),
        source: source.to_string(),
        headline: Some("Example headline".to_string()),
        authors: Some("A. Reporter; B. Editor".to_string()),
        publish_date: Some(Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap()),
        publish_date_source: Some(DateSource::JsonLd),
        date_divergence: false,
        full_text: body.to_string(),
        word_count: word_count(body),
        content_hash: content_hash(body),
    }
}

#[tokio::test]
async fn seed_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    let records = vec![
        seed("https://www.reuters.com/world/a", "reuters"),
        seed("https://apnews.com/article/b", "apnews"),
    ];

    let first = store.seed(records.clone()).await.unwrap();
    assert_eq!(first, 2);

    let second = store.seed(records).await.unwrap();
    assert_eq!(second, 0, "re-seeding must not create rows");

    assert_eq!(store.count_by_status(UrlStatus::Pending).await.unwrap(), 2);
    store.close().await;
}

#[tokio::test]
async fn claim_next_flips_rows_and_never_hands_out_twice() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    let records: Vec<SeedUrl> = (0..10)
        .map(|i| seed(&format!("https://apnews.com/article/{i}"), "apnews"))
        .collect();
    store.seed(records).await.unwrap();

    let first = store.claim_next(6).await.unwrap();
    assert_eq!(first.len(), 6);
    assert!(first.iter().all(|r| r.status == UrlStatus::Processing));

    let second = store.claim_next(6).await.unwrap();
    assert_eq!(second.len(), 4, "only unclaimed rows remain");

    let first_urls: Vec<&str> = first.iter().map(|r| r.normalized_url.as_str()).collect();
    for rec in &second {
        assert!(!first_urls.contains(&rec.normalized_url.as_str()));
    }

    assert!(store.claim_next(6).await.unwrap().is_empty());
    store.close().await;
}

#[tokio::test]
async fn reset_in_flight_returns_processing_to_pending() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    store
        .seed(vec![
            seed("https://apnews.com/article/a", "apnews"),
            seed("https://apnews.com/article/b", "apnews"),
        ])
        .await
        .unwrap();
    store.claim_next(1).await.unwrap();

    assert_eq!(store.count_by_status(UrlStatus::Processing).await.unwrap(), 1);

    let reset = store.reset_in_flight().await.unwrap();
    assert_eq!(reset, 1);
    assert_eq!(store.count_by_status(UrlStatus::Processing).await.unwrap(), 0);
    assert_eq!(store.count_by_status(UrlStatus::Pending).await.unwrap(), 2);
    store.close().await;
}

#[tokio::test]
async fn record_success_inserts_article_and_marks_url() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    let url = "https://www.reuters.com/world/a";
    store.seed(vec![seed(url, "reuters")]).await.unwrap();
    store.claim_next(1).await.unwrap();

    let body = "word ".repeat(200);
    let outcome = store
        .record_success(article(url, "reuters", &body), "primary")
        .await
        .unwrap();
    assert!(matches!(outcome, SuccessOutcome::Inserted { .. }));

    let rec = store.get_url(url).await.unwrap().unwrap();
    assert_eq!(rec.status, UrlStatus::Success);
    assert_eq!(rec.extractor_used.as_deref(), Some("primary"));

    let stored = store.get_article_by_url(url).await.unwrap().unwrap();
    assert_eq!(stored.source, "reuters");
    assert_eq!(stored.word_count, 200);
    assert_eq!(stored.content_hash, content_hash(&body));
    assert_eq!(stored.publish_date_source, Some(DateSource::JsonLd));
    store.close().await;
}

#[tokio::test]
async fn duplicate_content_hash_yields_no_second_article() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    let a = "https://apnews.com/article/a";
    let b = "https://www.washingtonpost.com/politics/b";
    store
        .seed(vec![seed(a, "apnews"), seed(b, "washingtonpost")])
        .await
        .unwrap();
    store.claim_next(2).await.unwrap();

    let body = "identical wire copy ".repeat(40);
    let first = store
        .record_success(article(a, "apnews", &body), "primary")
        .await
        .unwrap();
    let SuccessOutcome::Inserted { article_id } = first else {
        panic!("first write must insert");
    };

    let second = store
        .record_success(article(b, "washingtonpost", &body), "primary")
        .await
        .unwrap();
    assert_eq!(
        second,
        SuccessOutcome::Duplicate {
            existing_article_id: article_id
        }
    );

    assert_eq!(store.article_count().await.unwrap(), 1);
    let b_rec = store.get_url(b).await.unwrap().unwrap();
    assert_eq!(b_rec.status, UrlStatus::Duplicate);
    assert!(store.get_article_by_url(b).await.unwrap().is_none());
    store.close().await;
}

#[tokio::test]
async fn record_failure_increments_attempt_count() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    let url = "https://www.nytimes.com/2026/03/01/world/story";
    store.seed(vec![seed(url, "nytimes")]).await.unwrap();
    store.claim_next(1).await.unwrap();

    let mut previous = 0i64;
    for expected in 1..=2i64 {
        store
            .record_failure(FailureUpdate {
                normalized_url: url.to_string(),
                status: UrlStatus::ErrorNetwork,
                error_message: Some("connect timeout".to_string()),
                block_reason: Some(newsloom_common::BlockReason::Transport),
                extractor_used: None,
            })
            .await
            .unwrap();

        let rec = store.get_url(url).await.unwrap().unwrap();
        assert_eq!(rec.attempt_count, expected);
        assert!(rec.attempt_count >= previous, "attempt_count never decreases");
        assert_eq!(rec.status, UrlStatus::ErrorNetwork);
        previous = rec.attempt_count;
    }
    store.close().await;
}

#[tokio::test]
async fn record_failure_for_unknown_url_errors() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    let result = store
        .record_failure(FailureUpdate {
            normalized_url: "https://apnews.com/article/ghost".to_string(),
            status: UrlStatus::Dead,
            error_message: None,
            block_reason: None,
            extractor_used: None,
        })
        .await;
    assert!(result.is_err());
    store.close().await;
}

#[tokio::test]
async fn metrics_group_by_source_and_status() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    store
        .seed(vec![
            seed("https://apnews.com/article/a", "apnews"),
            seed("https://apnews.com/article/b", "apnews"),
            seed("https://www.reuters.com/world/c", "reuters"),
        ])
        .await
        .unwrap();
    store.claim_next(3).await.unwrap();

    let body = "some article text ".repeat(30);
    store
        .record_success(article("https://apnews.com/article/a", "apnews", &body), "primary")
        .await
        .unwrap();
    store
        .record_failure(FailureUpdate {
            normalized_url: "https://apnews.com/article/b".to_string(),
            status: UrlStatus::Dead,
            error_message: Some("HTTP 404".to_string()),
            block_reason: Some(newsloom_common::BlockReason::Deleted),
            extractor_used: None,
        })
        .await
        .unwrap();

    let metrics = store.metrics().await.unwrap();
    let get = |source: &str, status: UrlStatus| {
        metrics
            .iter()
            .find(|m| m.source == source && m.status == status)
            .map(|m| m.count)
            .unwrap_or(0)
    };
    assert_eq!(get("apnews", UrlStatus::Success), 1);
    assert_eq!(get("apnews", UrlStatus::Dead), 1);
    assert_eq!(get("reuters", UrlStatus::Processing), 1);
    store.close().await;
}

#[tokio::test]
async fn publish_date_range_spans_successes() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    assert!(store.publish_date_range().await.unwrap().is_none());

    let a = "https://apnews.com/article/a";
    let b = "https://apnews.com/article/b";
    store.seed(vec![seed(a, "apnews"), seed(b, "apnews")]).await.unwrap();
    store.claim_next(2).await.unwrap();

    let mut early = article(a, "apnews", &"early body text ".repeat(30));
    early.publish_date = Some(Utc.with_ymd_and_hms(2026, 1, 5, 0, 0, 0).unwrap());
    let mut late = article(b, "apnews", &"late body text ".repeat(30));
    late.publish_date = Some(Utc.with_ymd_and_hms(2026, 4, 20, 0, 0, 0).unwrap());

    store.record_success(early, "primary").await.unwrap();
    store.record_success(late, "secondary").await.unwrap();

    let (min, max) = store.publish_date_range().await.unwrap().unwrap();
    assert_eq!(min, Utc.with_ymd_and_hms(2026, 1, 5, 0, 0, 0).unwrap());
    assert_eq!(max, Utc.with_ymd_and_hms(2026, 4, 20, 0, 0, 0).unwrap());
    store.close().await;
}

#[tokio::test]
async fn proxy_lifecycle_upsert_outcomes_retire() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    let endpoint = ProxyEndpoint {
        host: "10.0.0.1".to_string(),
        port: 8080,
        protocol: ProxyProtocol::Http,
    };
    store.proxy_upsert(vec![endpoint.clone()]).await.unwrap();

    let active = store.list_active_proxies().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].endpoint, endpoint);

    // Failures accumulate, success resets.
    assert_eq!(
        store
            .proxy_record_outcome(endpoint.clone(), false)
            .await
            .unwrap(),
        1
    );
    assert_eq!(
        store
            .proxy_record_outcome(endpoint.clone(), false)
            .await
            .unwrap(),
        2
    );
    assert_eq!(
        store
            .proxy_record_outcome(endpoint.clone(), true)
            .await
            .unwrap(),
        0
    );

    store.retire_proxy(endpoint.clone()).await.unwrap();
    assert!(store.list_active_proxies().await.unwrap().is_empty());

    // Re-upserting reactivates with a clean failure count.
    store.proxy_upsert(vec![endpoint]).await.unwrap();
    let active = store.list_active_proxies().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].consecutive_failure_count, 0);
    store.close().await;
}

#[tokio::test]
async fn writes_after_close_fail_cleanly() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    store.close().await;

    let result = store.seed(vec![seed("https://apnews.com/article/x", "apnews")]).await;
    assert!(result.is_err());
}
