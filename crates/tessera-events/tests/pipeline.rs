//! Integration tests for the layering → diff → event pipeline.
//!
//! Sources of different kinds are layered by ordinal, mutated through the
//! manager, and the published change events are checked end to end.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Deserialize;
use tempfile::TempDir;
use tessera_core::functions;
use tessera_core::source::ordinals;
use tessera_core::sources::{EnvPropertySource, MapPropertySource};
use tessera_core::{CollectingPolicy, RegexPropertyFilter};
use tessera_events::{
    ChangeObserver, ConfigEvent, ConfigEventKind, ConfigEventListener, ConfigEventManager,
    ConfigurationManager, FrozenConfiguration, ObserverConfig,
};
use tokio_test::block_on;

// =============================================================================
// Helpers
// =============================================================================

/// Listener appending into a log shared with the test
struct Collector {
    events: Arc<Mutex<Vec<ConfigEvent>>>,
}

impl Collector {
    fn register(events: &ConfigEventManager) -> (Arc<dyn ConfigEventListener>, Arc<Mutex<Vec<ConfigEvent>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let listener: Arc<dyn ConfigEventListener> = Arc::new(Collector { events: log.clone() });
        events.add_listener(&listener);
        (listener, log)
    }
}

impl ConfigEventListener for Collector {
    fn on_event(&self, event: &ConfigEvent) {
        self.events.lock().push(event.clone());
    }
}

fn defaults() -> MapPropertySource {
    MapPropertySource::builder("defaults")
        .property("server.host", "localhost")
        .property("server.port", "8080")
        .property("db.password", "changeme")
        .build()
}

fn env() -> EnvPropertySource {
    EnvPropertySource::from_vars([("APP__SERVER__PORT", "8181")], Some("APP".to_string()))
}

#[derive(Debug, Deserialize, PartialEq)]
struct ServerSettings {
    host: String,
    port: u16,
}

// =============================================================================
// Tests
// =============================================================================

#[test]
fn layered_sources_resolve_by_ordinal() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("app.toml");
    std::fs::write(&config_path, "[server]\nhost = \"0.0.0.0\"\nport = 9090\n").unwrap();

    let manager = ConfigurationManager::builder()
        .with_source(defaults())
        .with_file(&config_path)
        .with_source(env())
        .build()
        .unwrap();

    let config = manager.config();
    let server: ServerSettings = config.bind("server").unwrap();
    assert_eq!(
        server,
        ServerSettings {
            host: "0.0.0.0".to_string(),
            port: 8181,
        }
    );
    assert_eq!(
        config.get_value("server.port").unwrap().source(),
        "environment:APP"
    );
}

#[test]
fn file_change_flows_to_listeners() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("app.toml");
    std::fs::write(&config_path, "[server]\nport = 9090\n").unwrap();

    let events = ConfigEventManager::new();
    let (_listener, log) = Collector::register(&events);

    let manager = ConfigurationManager::builder()
        .with_source(defaults())
        .with_file(&config_path)
        .with_event_manager(events)
        .build()
        .unwrap();

    std::fs::write(&config_path, "[server]\nport = 9191\n[cache]\nttl = 60\n").unwrap();
    let change = manager.reload();
    assert_eq!(change.updated_size(), 1);
    assert_eq!(change.added_size(), 1);

    // Nothing changed on disk since the last reload
    assert!(manager.reload().is_empty());

    let events = log.lock();
    assert_eq!(events.len(), 1);
    match &events[0] {
        ConfigEvent::Configuration(published) => {
            assert_eq!(published.version(), change.version());
            assert_eq!(published.configuration().get("server.port"), Some("9090"));
        }
        ConfigEvent::Source(_) => panic!("expected a configuration change"),
    }
}

#[test]
fn runtime_overrides_are_transactional() {
    let manager = ConfigurationManager::builder()
        .with_source(defaults())
        .with_source(env())
        .with_mutable_source("runtime")
        .build()
        .unwrap();
    let before = manager.snapshot();

    let tx = manager.start_transaction().unwrap();
    manager.put(tx, "server.port", "7070").unwrap();
    manager.put(tx, "feature.beta", "on").unwrap();
    assert_eq!(manager.config().get("server.port").as_deref(), Some("8181"));

    let change = manager.commit(tx).unwrap();
    assert!(change.is_updated("server.port"));
    assert!(change.is_added("feature.beta"));
    assert_eq!(manager.config().get_as::<bool>("feature.beta").unwrap(), Some(true));
    assert_eq!(change.configuration(), &before);

    assert!(manager.commit(tx).is_err());
}

#[test]
fn filters_and_policies_shape_published_values() {
    let manager = ConfigurationManager::builder()
        .with_source(defaults())
        .with_source(
            MapPropertySource::builder("extra")
                .ordinal(ordinals::FILE)
                .property("server.host", "example.org")
                .build(),
        )
        .with_filter(RegexPropertyFilter::new().exclude(r"password$").unwrap())
        .with_policy(CollectingPolicy::default())
        .build()
        .unwrap();

    let snapshot = manager.snapshot();
    assert!(snapshot.get("db.password").is_none());
    assert_eq!(snapshot.get("server.host"), Some("localhost,example.org"));

    let server_keys = manager
        .config()
        .with(functions::section("server", true))
        .properties();
    assert_eq!(server_keys.len(), 2);
    assert!(server_keys.contains_key("port"));
}

#[test]
fn dropped_listener_stops_receiving() {
    let manager = ConfigurationManager::builder()
        .with_mutable_source("runtime")
        .build()
        .unwrap();

    let (listener, log) = Collector::register(manager.events());
    manager.set("a", "1").unwrap();
    assert_eq!(log.lock().len(), 2);

    drop(listener);
    manager.set("a", "2").unwrap();
    assert_eq!(log.lock().len(), 2);
    assert_eq!(manager.events().listener_count(), 0);
}

#[test]
fn observer_sees_manager_updates() {
    block_on(async {
        let manager = ConfigurationManager::builder()
            .with_mutable_source("runtime")
            .build()
            .unwrap();

        let observed = manager.clone();
        let observer = ChangeObserver::new(
            move || observed.config(),
            ConfigEventManager::new(),
            ObserverConfig::default(),
        );

        manager.set("a", "1").unwrap();
        let change = observer.check_now().unwrap();
        assert!(change.is_added("a"));
        assert_eq!(change.configuration(), &FrozenConfiguration::empty());

        let published = manager
            .events()
            .fire_async(change)
            .unwrap()
            .await
            .unwrap();
        assert_eq!(published, 0);
    });
}

#[tokio::test]
async fn subscribers_receive_events_in_order() {
    let manager = ConfigurationManager::builder()
        .with_mutable_source("runtime")
        .build()
        .unwrap();
    let mut rx = manager.subscribe();

    manager.set("a", "1").unwrap();
    manager.set("a", "2").unwrap();

    let kinds: Vec<ConfigEventKind> = (0..4)
        .map(|_| rx.try_recv().unwrap().kind())
        .collect();
    assert_eq!(
        kinds,
        vec![
            ConfigEventKind::Source,
            ConfigEventKind::Configuration,
            ConfigEventKind::Source,
            ConfigEventKind::Configuration,
        ]
    );
}
