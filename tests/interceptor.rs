use async_trait::async_trait;
use http_scenario_mock::error::LoadError;
use http_scenario_mock::{
    ConfigError, FilingKind, HttpRequest, HttpResponse, InterceptError, InterceptorBuilder,
    MemoryStore, MethodPathPolicy, MirrorPathPolicy, Mode, RecordingError, ResponseDescriptor,
    ScenarioLoader, ScenarioSink, Transport, TransportError,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

struct LiveServer {
    calls: AtomicU64,
}

impl LiveServer {
    fn new() -> Self {
        Self {
            calls: AtomicU64::new(0),
        }
    }

    fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for LiveServer {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if request.path() == "/down" {
            return Err(TransportError::new("connection refused"));
        }
        Ok(HttpResponse::new(200)
            .with_header("Content-Type", "application/json")
            .with_header("X-Served-By", "live")
            .with_body(format!(r#"{{"path":"{}"}}"#, request.path())))
    }
}

/// Loader that remembers which files were asked for.
struct TracingLoader {
    inner: MemoryStore,
    requested: Mutex<Vec<String>>,
}

impl TracingLoader {
    fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            requested: Mutex::new(Vec::new()),
        }
    }

    fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

impl ScenarioLoader for TracingLoader {
    fn load(&self, id: &str) -> Result<Vec<u8>, LoadError> {
        self.requested.lock().unwrap().push(id.to_string());
        self.inner.load(id)
    }
}

struct ReadOnlySink;

impl ScenarioSink for ReadOnlySink {
    fn write(&self, _id: &str, _bytes: &[u8]) -> std::io::Result<()> {
        Err(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only filesystem",
        ))
    }
}

const USERS: &str = r#"{
  "rules": [
    {
      "id": "list",
      "request": { "method": ["GET"] },
      "response": {
        "status": 200,
        "body": { "type": "json", "content": [{ "id": 1 }] }
      }
    },
    {
      "id": "create",
      "request": { "method": ["POST"] },
      "response": { "status": 201 },
      "delay": { "fixed_ms": 10 }
    }
  ]
}"#;

fn users_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.insert("users.json", USERS);
    store
}

#[tokio::test]
async fn test_disabled_mode_never_consults_providers() {
    let consulted = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&consulted);
    let interceptor = InterceptorBuilder::new()
        .mode(Mode::Disabled)
        .loader(users_store())
        .add_callback(move |_: &HttpRequest| -> Option<ResponseDescriptor> {
            counter.fetch_add(1, Ordering::SeqCst);
            Some(ResponseDescriptor::new(500))
        })
        .build()
        .unwrap();
    let live = LiveServer::new();

    let response = interceptor
        .intercept(&HttpRequest::get("https://api.test/users"), &live)
        .await
        .unwrap();

    assert_eq!(response.header("x-served-by"), Some("live"));
    assert_eq!(live.calls(), 1);
    assert_eq!(consulted.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_enabled_serves_first_matching_rule() {
    let interceptor = InterceptorBuilder::new()
        .loader(users_store())
        .build()
        .unwrap();
    let live = LiveServer::new();

    let listed = interceptor
        .intercept(&HttpRequest::get("https://api.test/users"), &live)
        .await
        .unwrap();
    assert_eq!(listed.status, 200);
    assert_eq!(listed.header("content-type"), Some("application/json"));
    assert_eq!(listed.body_text(), r#"[{"id":1}]"#);

    let created = interceptor
        .intercept(&HttpRequest::post("https://api.test/users"), &live)
        .await
        .unwrap();
    assert_eq!(created.status, 201);
    assert!(created.body.is_empty());
    assert_eq!(live.calls(), 0);
}

#[tokio::test]
async fn test_enabled_unmatched_is_error_without_live_call() {
    let interceptor = InterceptorBuilder::new()
        .loader(users_store())
        .build()
        .unwrap();
    let live = LiveServer::new();

    let missing_file = interceptor
        .intercept(&HttpRequest::get("https://api.test/orders"), &live)
        .await
        .unwrap_err();
    assert!(matches!(
        missing_file,
        InterceptError::NoMatch { ref method, ref url }
            if method == "GET" && url == "https://api.test/orders"
    ));

    let no_rule = interceptor
        .intercept(&HttpRequest::new("DELETE", "https://api.test/users"), &live)
        .await
        .unwrap_err();
    assert!(no_rule.is_no_match());
    assert_eq!(live.calls(), 0);
}

#[tokio::test]
async fn test_callbacks_win_over_files() {
    let interceptor = InterceptorBuilder::new()
        .loader(users_store())
        .add_callback(|r: &HttpRequest| {
            (r.header("x-override").is_some())
                .then(|| ResponseDescriptor::new(299).with_body("from callback"))
        })
        .build()
        .unwrap();
    let live = LiveServer::new();

    let overridden = interceptor
        .intercept(
            &HttpRequest::get("/users").with_header("X-Override", "1"),
            &live,
        )
        .await
        .unwrap();
    assert_eq!(overridden.status, 299);

    let from_file = interceptor
        .intercept(&HttpRequest::get("/users"), &live)
        .await
        .unwrap();
    assert_eq!(from_file.status, 200);
}

#[tokio::test]
async fn test_static_providers_consulted_in_policy_order() {
    let store = MemoryStore::new();
    store.insert("users.json", USERS);
    let loader = Arc::new(TracingLoader::new(store));
    let interceptor = InterceptorBuilder::new()
        .loader(loader.clone())
        .add_filing_policy(Arc::new(MethodPathPolicy::new("json")))
        .add_filing_policy(Arc::new(MirrorPathPolicy::new("json")))
        .build()
        .unwrap();
    let live = LiveServer::new();

    let response = interceptor
        .intercept(&HttpRequest::get("/users"), &live)
        .await
        .unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(loader.requested(), vec!["get/users.json", "users.json"]);
}

#[tokio::test]
async fn test_first_static_provider_short_circuits() {
    let store = MemoryStore::new();
    store.insert("get/users.json", r#"{"rules":[{"response":{"status":203}}]}"#);
    store.insert("users.json", USERS);
    let loader = Arc::new(TracingLoader::new(store));
    let interceptor = InterceptorBuilder::new()
        .loader(loader.clone())
        .add_filing_policy(Arc::new(MethodPathPolicy::new("json")))
        .add_filing_policy(Arc::new(MirrorPathPolicy::new("json")))
        .build()
        .unwrap();

    let response = interceptor
        .intercept(&HttpRequest::get("/users"), &LiveServer::new())
        .await
        .unwrap();
    assert_eq!(response.status, 203);
    assert_eq!(loader.requested(), vec!["get/users.json"]);
}

#[tokio::test]
async fn test_mixed_mode_falls_back_to_live_once() {
    let interceptor = InterceptorBuilder::new()
        .mode(Mode::Mixed)
        .loader(users_store())
        .build()
        .unwrap();
    let live = LiveServer::new();

    let mocked = interceptor
        .intercept(&HttpRequest::get("/users"), &live)
        .await
        .unwrap();
    assert_eq!(mocked.header("x-served-by"), None);
    assert_eq!(live.calls(), 0);

    let fallback = interceptor
        .intercept(&HttpRequest::get("/orders"), &live)
        .await
        .unwrap();
    assert_eq!(fallback.body_text(), r#"{"path":"/orders"}"#);
    assert_eq!(live.calls(), 1);
}

#[tokio::test]
async fn test_mixed_mode_propagates_transport_error() {
    let interceptor = InterceptorBuilder::new()
        .mode(Mode::Mixed)
        .loader(users_store())
        .build()
        .unwrap();

    let err = interceptor
        .intercept(&HttpRequest::get("/down"), &LiveServer::new())
        .await
        .unwrap_err();
    assert!(matches!(err, InterceptError::Transport(_)));
}

#[tokio::test]
async fn test_repeated_requests_resolve_identically() {
    let interceptor = InterceptorBuilder::new()
        .loader(users_store())
        .build()
        .unwrap();
    let live = LiveServer::new();
    let request = HttpRequest::get("/users");

    let first = interceptor.intercept(&request, &live).await.unwrap();
    let second = interceptor.intercept(&request, &live).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_edited_scenario_visible_on_next_request() {
    let store = users_store();
    let interceptor = InterceptorBuilder::new()
        .loader(store.clone())
        .build()
        .unwrap();
    let live = LiveServer::new();

    let before = interceptor
        .intercept(&HttpRequest::get("/users"), &live)
        .await
        .unwrap();
    store.insert("users.json", r#"{"rules":[{"response":{"status":410}}]}"#);
    let after = interceptor
        .intercept(&HttpRequest::get("/users"), &live)
        .await
        .unwrap();

    assert_eq!(before.status, 200);
    assert_eq!(after.status, 410);
}

#[tokio::test]
async fn test_recorded_exchange_replays_in_enabled_mode() {
    let dir = TempDir::new().unwrap();
    let interceptor = InterceptorBuilder::new()
        .mode(Mode::Record)
        .storage_root(dir.path())
        .scenario_root(dir.path())
        .build()
        .unwrap();
    let live = LiveServer::new();
    let request = HttpRequest::get("https://api.test/items/9?expand=owner");

    let recorded = interceptor.intercept(&request, &live).await.unwrap();
    assert_eq!(live.calls(), 1);
    assert!(dir.path().join("items/9.json").is_file());
    assert_eq!(interceptor.stats().recorded, 1);

    interceptor.set_mode(Mode::Enabled).unwrap();
    let replayed = interceptor.intercept(&request, &live).await.unwrap();

    assert_eq!(live.calls(), 1);
    assert_eq!(replayed, recorded);

    // Recorded rules match the query they were captured with
    let other_query = interceptor
        .intercept(&HttpRequest::get("https://api.test/items/9"), &live)
        .await
        .unwrap_err();
    assert!(other_query.is_no_match());
}

#[tokio::test]
async fn test_record_overwrites_previous_recording() {
    let dir = TempDir::new().unwrap();
    let interceptor = InterceptorBuilder::new()
        .mode(Mode::Record)
        .storage_root(dir.path())
        .scenario_root(dir.path())
        .build()
        .unwrap();
    let live = LiveServer::new();

    interceptor
        .intercept(&HttpRequest::get("/a"), &live)
        .await
        .unwrap();
    interceptor
        .intercept(&HttpRequest::post("/a"), &live)
        .await
        .unwrap();
    interceptor.set_mode(Mode::Enabled).unwrap();

    let post = interceptor
        .intercept(&HttpRequest::post("/a"), &live)
        .await
        .unwrap();
    assert_eq!(post.status, 200);
    let get = interceptor
        .intercept(&HttpRequest::get("/a"), &live)
        .await
        .unwrap_err();
    assert!(get.is_no_match());
}

#[tokio::test]
async fn test_recording_failure_swallowed_by_default() {
    let interceptor = InterceptorBuilder::new()
        .mode(Mode::Record)
        .recording_sink(Arc::new(ReadOnlySink))
        .build()
        .unwrap();
    let live = LiveServer::new();

    let response = interceptor
        .intercept(&HttpRequest::get("/users"), &live)
        .await
        .unwrap();
    assert_eq!(response.header("x-served-by"), Some("live"));
    assert_eq!(interceptor.stats().recording_failures, 1);
}

#[tokio::test]
async fn test_recording_failure_surfaced_when_strict() {
    let interceptor = InterceptorBuilder::new()
        .mode(Mode::Record)
        .recording_sink(Arc::new(ReadOnlySink))
        .fail_on_recording_error(true)
        .build()
        .unwrap();
    let live = LiveServer::new();

    let err = interceptor
        .intercept(&HttpRequest::get("/users"), &live)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        InterceptError::Recording(RecordingError::Write { .. })
    ));
    assert_eq!(live.calls(), 1);
}

#[tokio::test]
async fn test_mixed_fallback_recorded_when_enabled() {
    let sink = Arc::new(MemoryStore::new());
    let interceptor = InterceptorBuilder::new()
        .mode(Mode::Mixed)
        .loader(users_store())
        .recording_sink(sink.clone())
        .record_mixed_fallback(true)
        .build()
        .unwrap();
    let live = LiveServer::new();

    interceptor
        .intercept(&HttpRequest::get("/users"), &live)
        .await
        .unwrap();
    interceptor
        .intercept(&HttpRequest::get("/orders"), &live)
        .await
        .unwrap();

    assert_eq!(sink.len(), 1);
    assert!(sink.get("orders.json").is_some());
}

#[tokio::test(start_paused = true)]
async fn test_rule_delay_overrides_global_delay() {
    let interceptor = InterceptorBuilder::new()
        .loader(users_store())
        .delay(Duration::from_millis(500))
        .build()
        .unwrap();
    let live = LiveServer::new();

    let start = tokio::time::Instant::now();
    interceptor
        .intercept(&HttpRequest::get("/users"), &live)
        .await
        .unwrap();
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(500) && elapsed < Duration::from_millis(501));

    let start = tokio::time::Instant::now();
    interceptor
        .intercept(&HttpRequest::post("/users"), &live)
        .await
        .unwrap();
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(10) && elapsed < Duration::from_millis(11));
}

#[tokio::test(start_paused = true)]
async fn test_live_responses_are_not_delayed() {
    let interceptor = InterceptorBuilder::new()
        .mode(Mode::Disabled)
        .delay(Duration::from_secs(5))
        .build()
        .unwrap();

    let start = tokio::time::Instant::now();
    interceptor
        .intercept(&HttpRequest::get("/users"), &LiveServer::new())
        .await
        .unwrap();
    assert!(start.elapsed() < Duration::from_millis(1));
}

#[test]
fn test_record_mode_requires_storage() {
    let result = InterceptorBuilder::new().mode(Mode::Record).build();
    assert!(matches!(result, Err(ConfigError::MissingStorageRoot)));
}

#[test]
fn test_mode_toggle_between_requests() {
    let interceptor = InterceptorBuilder::new()
        .loader(users_store())
        .build()
        .unwrap();
    let live = LiveServer::new();

    let mocked = tokio_test::block_on(interceptor.intercept(&HttpRequest::get("/users"), &live));
    assert!(mocked.is_ok());

    assert_eq!(interceptor.set_mode(Mode::Disabled).unwrap(), Mode::Enabled);
    let forwarded = tokio_test::block_on(interceptor.intercept(&HttpRequest::get("/users"), &live));
    assert_eq!(forwarded.unwrap().header("x-served-by"), Some("live"));
    assert_eq!(live.calls(), 1);
}

#[test]
fn test_yaml_config_builds_interceptor() {
    let dir = TempDir::new().unwrap();
    let yaml = format!(
        "mode: record\nstorage_root: {}\nformat: yaml\nfiling: [method_path]\n",
        dir.path().display()
    );
    let path = dir.path().join("mock-interceptor.yaml");
    std::fs::write(&path, yaml).unwrap();

    let config = http_scenario_mock::InterceptorConfig::from_file(&path).unwrap();
    assert_eq!(config.filing, vec![FilingKind::MethodPath]);

    let interceptor = config.into_builder().build().unwrap();
    assert_eq!(interceptor.mode(), Mode::Record);
    assert_eq!(interceptor.provider_names(), vec!["static:yaml#0"]);
}

#[tokio::test(start_paused = true)]
async fn test_delayed_mock_does_not_hold_up_other_requests() {
    let store = users_store();
    store.insert(
        "slow.json",
        r#"{"rules":[{"response":{"status":200},"delay":{"fixed_ms":1000}}]}"#,
    );
    let interceptor = Arc::new(InterceptorBuilder::new().loader(store).build().unwrap());

    let start = tokio::time::Instant::now();
    let slow = {
        let interceptor = Arc::clone(&interceptor);
        tokio::spawn(async move {
            let response = interceptor
                .intercept(&HttpRequest::get("/slow"), &LiveServer::new())
                .await;
            (response, start.elapsed())
        })
    };
    tokio::task::yield_now().await;

    let fast = interceptor
        .intercept(&HttpRequest::get("/users"), &LiveServer::new())
        .await
        .unwrap();
    assert_eq!(fast.status, 200);
    assert!(start.elapsed() < Duration::from_millis(1));
    assert!(!slow.is_finished());

    let (slow_response, slow_elapsed) = slow.await.unwrap();
    assert_eq!(slow_response.unwrap().status, 200);
    assert!(slow_elapsed >= Duration::from_millis(1000));
}

#[tokio::test]
async fn test_malformed_file_in_first_provider_is_not_skipped() {
    let store = MemoryStore::new();
    store.insert("get/users.json", "{ \"rules\": [");
    store.insert("users.json", USERS);
    let loader = Arc::new(TracingLoader::new(store));
    let interceptor = InterceptorBuilder::new()
        .mode(Mode::Mixed)
        .loader(loader.clone())
        .add_filing_policy(Arc::new(MethodPathPolicy::new("json")))
        .add_filing_policy(Arc::new(MirrorPathPolicy::new("json")))
        .build()
        .unwrap();
    let live = LiveServer::new();

    let err = interceptor
        .intercept(&HttpRequest::get("/users"), &live)
        .await
        .unwrap_err();

    assert!(matches!(err, InterceptError::Decode(_)));
    assert_eq!(loader.requested(), vec!["get/users.json"]);
    assert_eq!(live.calls(), 0);
}
