use super::*;
use crate::core::UrlUtils;
use crate::generator::GeneratorId;
use crate::resource::MemorySource;
use crate::urls::UrlEntry;
use std::sync::atomic::AtomicUsize;

fn post(id: &str, status: &str) -> Resource {
    Resource::new(id, ResourceType::Posts)
        .with("slug", id)
        .with("status", status)
}

fn store() -> (Arc<Queue>, Arc<ResourceStore>) {
    let queue = Arc::new(Queue::new());
    let store = Arc::new(ResourceStore::new(Arc::clone(&queue)));
    (queue, store)
}

/// Observer that keeps or drops everything it is told about.
struct Recorder {
    keep: bool,
    updated: AtomicUsize,
    removed: AtomicUsize,
}

impl Recorder {
    fn new(keep: bool) -> Arc<Self> {
        Arc::new(Self {
            keep,
            updated: AtomicUsize::new(0),
            removed: AtomicUsize::new(0),
        })
    }
}

impl ResourceObserver for Recorder {
    fn on_updated(&self, _resource: &Arc<Resource>) -> Ownership {
        self.updated.fetch_add(1, Ordering::SeqCst);
        if self.keep {
            Ownership::Retained
        } else {
            Ownership::Released
        }
    }

    fn on_removed(&self, _id: &ResourceId) {
        self.removed.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_default_config_admission() {
    let config = ResourceConfig::default();
    assert!(config.admits(&post("1", "published")));
    assert!(!config.admits(&post("1", "draft")));
    assert!(!config.admits(&Resource::new("t", ResourceType::Tags).with("visibility", "internal")));
    assert!(config.admits(&Resource::new("a", ResourceType::Authors)));
}

#[tokio::test]
async fn test_fetch_keeps_order_and_admission() {
    let (_, store) = store();
    let source = MemorySource::from_resources([
        post("b", "published"),
        post("draft", "draft"),
        post("a", "published"),
        Resource::new("t1", ResourceType::Tags).with("visibility", "public"),
    ]);

    let admitted = store.fetch_resources(&source).await.unwrap();
    assert_eq!(admitted, 3);

    let ids: Vec<_> = store
        .resources_of(ResourceType::Posts)
        .iter()
        .map(|r| r.id.to_string())
        .collect();
    assert_eq!(ids, vec!["b", "a"]);
    assert_eq!(store.state_of(&"a".into()), Some(ResourceState::Pending));
    assert!(store.get_by_id(&"draft".into()).is_none());
}

#[test]
fn test_claim_is_exclusive() {
    let (_, store) = store();
    store.handle_event(ResourceEvent::Added(post("1", "published")));

    assert!(store.claim(&"1".into(), GeneratorId(0)));
    assert!(!store.claim(&"1".into(), GeneratorId(1)));
    assert_eq!(store.owner_of(&"1".into()), Some(GeneratorId(0)));
    assert!(store.pending_of(ResourceType::Posts).is_empty());

    assert!(store.release(&"1".into()));
    assert!(!store.release(&"1".into()));
    assert_eq!(store.pending_of(ResourceType::Posts).len(), 1);
}

#[test]
fn test_added_is_offered_on_queue() {
    let (queue, store) = store();
    let offered = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&offered);
    queue.subscribe(&Stage::added(ResourceType::Posts), move |event| {
        assert!(event.resource.is_some());
        counter.fetch_add(1, Ordering::SeqCst);
        crate::queue::Flow::Continue
    });

    store.handle_event(ResourceEvent::Added(post("1", "published")));
    store.handle_event(ResourceEvent::Added(post("2", "draft")));
    assert_eq!(offered.load(Ordering::SeqCst), 1);
}

#[test]
fn test_untracked_type_ignored() {
    let (_, store) = store();
    store.init_resource_config(ResourceConfig::new().track(ResourceType::Pages, Filter::all()));
    store.handle_event(ResourceEvent::Added(post("1", "published")));
    assert!(store.is_empty());
}

#[test]
fn test_owned_edit_goes_to_owner() {
    let (_, store) = store();
    let recorder = Recorder::new(true);
    store.register_observer(GeneratorId(3), Arc::downgrade(&recorder) as Weak<dyn ResourceObserver>);

    store.handle_event(ResourceEvent::Added(post("1", "published")));
    store.claim(&"1".into(), GeneratorId(3));
    store.handle_event(ResourceEvent::Edited(post("1", "published").with("title", "new")));

    assert_eq!(recorder.updated.load(Ordering::SeqCst), 1);
    assert_eq!(store.owner_of(&"1".into()), Some(GeneratorId(3)));
    assert_eq!(
        store.get_by_id(&"1".into()).unwrap().attr_str("title"),
        Some("new")
    );
}

#[test]
fn test_released_edit_is_reoffered() {
    let (_, store) = store();
    let recorder = Recorder::new(false);
    store.register_observer(GeneratorId(0), Arc::downgrade(&recorder) as Weak<dyn ResourceObserver>);

    store.handle_event(ResourceEvent::Added(post("1", "published")));
    store.claim(&"1".into(), GeneratorId(0));
    store.handle_event(ResourceEvent::Edited(post("1", "published")));

    assert_eq!(store.owner_of(&"1".into()), None);
    assert_eq!(store.state_of(&"1".into()), Some(ResourceState::Pending));
}

#[test]
fn test_edit_transitions() {
    let (_, store) = store();
    let recorder = Recorder::new(true);
    store.register_observer(GeneratorId(0), Arc::downgrade(&recorder) as Weak<dyn ResourceObserver>);

    // not stored, not admitted
    store.handle_event(ResourceEvent::Edited(post("1", "draft")));
    assert!(store.is_empty());

    // not stored, admitted
    store.handle_event(ResourceEvent::Edited(post("1", "published")));
    assert_eq!(store.len(), 1);

    // stored and owned, no longer admitted
    store.claim(&"1".into(), GeneratorId(0));
    store.handle_event(ResourceEvent::Edited(post("1", "draft")));
    assert!(store.is_empty());
    assert_eq!(recorder.removed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_delete_unknown_is_noop() {
    let (_, store) = store();
    store.handle_event(ResourceEvent::Deleted {
        id: "ghost".into(),
        resource_type: ResourceType::Posts,
    });
    assert!(store.is_empty());
}

#[test]
fn test_listeners_follow_source() {
    let (_, store) = store();
    let source = MemorySource::new();

    store.init_event_listeners(&source);
    store.init_event_listeners(&source);
    source.emit(ResourceEvent::Added(post("1", "published")));
    assert_eq!(store.len(), 1);

    store.reset();
    assert!(!store.is_listening());
    source.emit(ResourceEvent::Added(post("2", "published")));
    assert!(store.is_empty());

    store.init_event_listeners(&source);
    source.emit(ResourceEvent::Added(post("3", "published")));
    assert_eq!(store.len(), 1);
}

#[test]
fn test_release_all_and_soft_reset() {
    let (_, store) = store();
    store.handle_event(ResourceEvent::Added(post("1", "published")));
    store.handle_event(ResourceEvent::Added(post("2", "published")));
    store.claim(&"1".into(), GeneratorId(0));

    store.release_all();
    assert_eq!(store.pending_of(ResourceType::Posts).len(), 2);

    store.soft_reset();
    assert!(store.is_empty());
}

#[test]
fn test_restore_takes_ownership_from_urls() {
    let (_, store) = store();
    let urls = UrlTable::new(UrlUtils::default());
    let owned = Arc::new(post("1", "published"));
    urls.restore(crate::urls::UrlSnapshot {
        fingerprint: String::new(),
        entries: vec![UrlEntry {
            url: "/1/".into(),
            generator_id: GeneratorId(2),
            resource: Arc::clone(&owned),
        }],
    });

    store.restore(
        ResourceSnapshot {
            fingerprint: String::new(),
            resources: vec![post("1", "published"), post("2", "published")],
        },
        &urls,
    );

    assert_eq!(store.owner_of(&"1".into()), Some(GeneratorId(2)));
    assert!(Arc::ptr_eq(&store.get_by_id(&"1".into()).unwrap(), &owned));
    assert_eq!(store.state_of(&"2".into()), Some(ResourceState::Pending));
    assert_eq!(store.snapshot().resources.len(), 2);
}
