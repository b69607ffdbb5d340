use super::*;
use crate::filter::Filter;
use crate::generator::GeneratorSpec;
use crate::permalink::PermalinkPattern;
use crate::resource::{EventHandler, MemorySource, ResourceEvent, ResourceType, SourceError};
use crate::routing::RouterId;

fn spec(identifier: &str, filter: &str, permalink: &str) -> GeneratorSpec {
    GeneratorSpec {
        identifier: RouterId::new(identifier),
        filter: Filter::parse(filter).unwrap(),
        resource_type: ResourceType::Posts,
        permalink: PermalinkPattern::parse(permalink).unwrap(),
    }
}

fn post(id: &str, slug: &str) -> Resource {
    Resource::new(id, ResourceType::Posts)
        .with("slug", slug)
        .with("status", "published")
        .with("published_at", "2024-03-05T10:00:00Z")
}

fn options() -> ServiceOptions {
    ServiceOptions {
        utils: UrlUtils::new("https://example.com/blog/").unwrap(),
        init_tolerance: Duration::from_millis(10),
        ..ServiceOptions::default()
    }
}

fn service_with(options: ServiceOptions) -> UrlService {
    let service = UrlService::new(options);
    service.on_router_added(spec("collection:/podcast/", "tag:podcast", "/podcast/:slug/"));
    service.on_router_added(spec("collection:/", "", "/:slug/"));
    service
}

fn source() -> MemorySource {
    MemorySource::from_resources([
        post("1", "hello"),
        post("2", "episode-1").with("tags", serde_json::json!([{ "slug": "podcast" }])),
        post("3", "draft-one").with("status", "draft"),
    ])
}

#[tokio::test]
async fn test_round_trip() {
    let service = service_with(options());
    service.init(&source(), InitOptions::default()).await.unwrap();
    assert!(service.has_finished());

    for entry in service.urls().entries() {
        let id = &entry.resource.id;
        assert_eq!(service.get_resource_by_id(id).unwrap().id, *id);
        assert_eq!(
            service.get_url_by_resource_id(id, UrlOptions::default()),
            entry.url.as_str()
        );
        let found = service.get_resource(entry.url.as_str()).unwrap().unwrap();
        assert_eq!(found.id, *id);
    }

    assert_eq!(service.urls().len(), 2);
    assert_eq!(
        service.get_url_by_resource_id(&"2".into(), UrlOptions::default()),
        "/podcast/episode-1/"
    );
}

#[tokio::test]
async fn test_not_ready_then_absent() {
    let service = service_with(options());
    assert!(matches!(
        service.get_resource("/hello/"),
        Err(UrlServiceError::NotReady)
    ));

    service.init(&source(), InitOptions::default()).await.unwrap();
    assert!(service.get_resource("/nothing-here/").unwrap().is_none());
    assert!(service.get_resource("/hello/").unwrap().is_some());
}

#[tokio::test]
async fn test_missing_resource_url() {
    let service = service_with(options());
    service.init(&source(), InitOptions::default()).await.unwrap();

    let missing: ResourceId = "missing-id".into();
    assert_eq!(
        service.get_url_by_resource_id(&missing, UrlOptions::default()),
        "/404/"
    );
    assert_eq!(
        service.get_url_by_resource_id(
            &missing,
            UrlOptions {
                absolute: true,
                ..UrlOptions::default()
            }
        ),
        service.utils().create_url("/404/", true)
    );
    assert_eq!(
        service.get_url_by_resource_id(
            &"1".into(),
            UrlOptions {
                with_subdirectory: true,
                ..UrlOptions::default()
            }
        ),
        "/blog/hello/"
    );
    assert!(matches!(
        service.get_resource_by_id(&missing),
        Err(UrlServiceError::ResourceNotFound(_))
    ));
}

#[tokio::test]
async fn test_earlier_generator_wins_shared_url() {
    let service = UrlService::new(options());
    service.on_router_added(spec("collection:/a/", "tag:a", "/shared/"));
    service.on_router_added(spec("collection:/b/", "tag:b", "/shared/"));

    let source = MemorySource::from_resources([
        post("b", "b").with("tags", serde_json::json!(["b"])),
        post("a", "a").with("tags", serde_json::json!(["a"])),
    ]);
    service.init(&source, InitOptions::default()).await.unwrap();

    assert_eq!(service.urls().conflicts().len(), 1);
    for _ in 0..3 {
        let entry = service.get_resource_entry("/shared/").unwrap().unwrap();
        assert_eq!(entry.resource.id.as_str(), "a");
        assert_eq!(entry.generator_id.0, 0);
    }
}

#[tokio::test]
async fn test_rapid_edits_keep_one_entry() {
    let service = service_with(options());
    let source = source();
    service.init(&source, InitOptions::default()).await.unwrap();

    for i in 0..20 {
        let mut edited = post("1", &format!("hello-{i}"));
        if i % 2 == 0 {
            edited = edited.with("tags", serde_json::json!([{ "slug": "podcast" }]));
        }
        source.emit(ResourceEvent::Edited(edited));
    }

    let entries: Vec<_> = service
        .urls()
        .entries()
        .into_iter()
        .filter(|e| e.resource.id.as_str() == "1")
        .collect();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].url, "/hello-19/");
    assert!(service.owns("collection:/", &"1".into()));
    assert!(!service.owns("collection:/podcast/", &"1".into()));
}

#[tokio::test]
async fn test_live_events_after_init() {
    let service = service_with(options());
    let source = source();
    service.init(&source, InitOptions::default()).await.unwrap();

    source.emit(ResourceEvent::Added(post("4", "fresh")));
    assert_eq!(
        service.get_url_by_resource_id(&"4".into(), UrlOptions::default()),
        "/fresh/"
    );

    source.emit(ResourceEvent::Edited(post("3", "draft-one")));
    assert!(service.get_resource("/draft-one/").unwrap().is_some());

    source.emit(ResourceEvent::Deleted {
        id: "4".into(),
        resource_type: ResourceType::Posts,
    });
    assert!(service.get_resource("/fresh/").unwrap().is_none());
}

#[tokio::test]
async fn test_permalink_by_url() {
    let service = service_with(options());
    service.init(&source(), InitOptions::default()).await.unwrap();

    let plain = service
        .get_permalink_by_url("/podcast/episode-1/", PermalinkOptions::default())
        .unwrap();
    assert_eq!(plain.as_deref(), Some("/podcast/:slug/"));

    let with_options = service
        .get_permalink_by_url(
            "/hello/",
            PermalinkOptions {
                with_url_options: true,
            },
        )
        .unwrap();
    assert_eq!(with_options.as_deref(), Some("/:slug/:options(edit)?/"));
}

#[tokio::test]
async fn test_router_updated() {
    let service = service_with(options());
    service.init(&source(), InitOptions::default()).await.unwrap();
    assert_eq!(service.on_router_updated("collection:/").unwrap(), 1);
    assert!(matches!(
        service.on_router_updated("collection:/nope/"),
        Err(UrlServiceError::UnknownRouter(_))
    ));
}

#[tokio::test]
async fn test_finished_hooks() {
    let service = service_with(options());
    let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));

    let counter = Arc::clone(&calls);
    service.on_finished(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    service.init(&source(), InitOptions::default()).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let counter = Arc::clone(&calls);
    service.on_finished(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_cache_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let cached = || ServiceOptions {
        cache: Some(LocalFileCache::new(dir.path(), false)),
        ..options()
    };

    let first = service_with(cached());
    first.init(&source(), InitOptions { url_cache: true }).await.unwrap();
    first.shutdown().await.unwrap();
    assert!(dir.path().join("urls.json").exists());

    let second = service_with(cached());
    second
        .init(&MemorySource::new(), InitOptions { url_cache: true })
        .await
        .unwrap();

    assert!(second.has_finished());
    assert_eq!(second.urls().entries(), first.urls().entries());
    assert_eq!(second.store().len(), first.store().len());
    assert!(second.owns("collection:/", &"1".into()));
}

#[tokio::test]
async fn test_cache_fingerprint_mismatch_rebuilds() {
    let dir = tempfile::tempdir().unwrap();
    let cached = || ServiceOptions {
        cache: Some(LocalFileCache::new(dir.path(), false)),
        ..options()
    };

    let first = service_with(cached());
    first.init(&source(), InitOptions { url_cache: true }).await.unwrap();
    first.shutdown().await.unwrap();

    let second = UrlService::new(cached());
    second.on_router_added(spec("collection:/", "", "/posts/:slug/"));
    second
        .init(&source(), InitOptions { url_cache: true })
        .await
        .unwrap();

    assert_ne!(second.fingerprint(), first.fingerprint());
    assert_eq!(
        second.get_url_by_resource_id(&"1".into(), UrlOptions::default()),
        "/posts/hello/"
    );
}

#[tokio::test]
async fn test_reset_generators_releases() {
    let service = service_with(options());
    service.init(&source(), InitOptions::default()).await.unwrap();

    service.reset_generators(ResetGeneratorOptions {
        release_resources_only: true,
    });
    assert!(!service.has_finished());
    assert!(service.urls().is_empty());
    assert!(service.generators().is_empty());
    assert_eq!(service.store().pending_of(ResourceType::Posts).len(), 2);

    service.soft_reset();
    assert!(service.store().is_empty());

    service.reset(ResetOptions::default());
    assert!(!service.store().is_listening());
}

/// Source whose backend is down.
#[derive(Default)]
struct OfflineSource {
    fetches: std::sync::atomic::AtomicUsize,
    subscriptions: std::sync::atomic::AtomicUsize,
}

impl ResourceSource for OfflineSource {
    async fn fetch_all(&self, _resource_type: ResourceType) -> Result<Vec<Resource>, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Err(SourceError::Unavailable("database".to_string()))
    }

    fn subscribe(&self, _handler: EventHandler) {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_fetch_failure_aborts_init() {
    let service = service_with(options());
    let source = OfflineSource::default();

    let err = service
        .init(&source, InitOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        UrlServiceError::Fetch {
            source: SourceError::Unavailable(_),
            ..
        }
    ));
    assert_eq!(err.code(), "URLSERVICE_FETCH_FAILED");

    assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    assert_eq!(source.subscriptions.load(Ordering::SeqCst), 0);
    assert!(!service.has_finished());
    assert!(!service.store().is_listening());
    assert!(service.urls().is_empty());
    assert!(matches!(service.get_resource("/anything/"), Err(UrlServiceError::NotReady)));
}
