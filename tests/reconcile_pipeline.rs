//! Black-box tests for the full reconcile pipeline: scripted telemetry
//! client, real reconciler and driver, in-memory record store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use airsyncd::directory::{DeviceDirectory, SiteEntry};
use airsyncd::reconciler::Reconciler;
use airsyncd::store::{DeviceRecord, MemoryStore, RecordStore, StoreError};
use airsyncd::sync::Driver;
use airsyncd::telemetry::TelemetryClient;

/// Telemetry client serving canned bodies per device identifier.
struct ScriptedClient {
    responses: HashMap<String, Result<String, String>>,
}

impl ScriptedClient {
    fn new() -> Self {
        Self {
            responses: HashMap::new(),
        }
    }

    fn body(mut self, device_id: &str, body: impl Into<String>) -> Self {
        self.responses.insert(device_id.to_string(), Ok(body.into()));
        self
    }

    fn failing(mut self, device_id: &str) -> Self {
        self.responses
            .insert(device_id.to_string(), Err("connection refused".to_string()));
        self
    }
}

impl TelemetryClient for ScriptedClient {
    async fn fetch_raw(&self, device_id: &str) -> Result<String> {
        match self.responses.get(device_id) {
            Some(Ok(body)) => Ok(body.clone()),
            Some(Err(msg)) => Err(anyhow!("{msg}")),
            None => Err(anyhow!("no scripted response for {device_id}")),
        }
    }
}

fn feed_body(device_id: &str, reading_name: &str) -> String {
    format!(
        r#"{{
            "device_id": "{device_id}",
            "source": "last_all_v2",
            "feeds": [
                {{
                    "AirBox": {{
                        "timestamp": "2024-05-01T07:12:00Z",
                        "siteName": "{reading_name}",
                        "area": "campus",
                        "device_ID": "{device_id}",
                        "name": "{reading_name}",
                        "s_d1": 9.0,
                        "s_h0": 55.0,
                        "s_t0": 23.5
                    }}
                }}
            ]
        }}"#
    )
}

/// Store wrapper counting write operations per partition, so tests can
/// observe write counts rather than just converged final state.
struct CountingStore {
    inner: MemoryStore,
    writes: Mutex<HashMap<String, usize>>,
}

impl CountingStore {
    fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            writes: Mutex::new(HashMap::new()),
        }
    }

    fn record_write(&self, id: &str) {
        *self
            .writes
            .lock()
            .expect("writes lock")
            .entry(id.to_string())
            .or_insert(0) += 1;
    }

    fn writes_for(&self, id: &str) -> usize {
        self.writes
            .lock()
            .expect("writes lock")
            .get(id)
            .copied()
            .unwrap_or(0)
    }
}

impl RecordStore for CountingStore {
    async fn get(&self, id: &str) -> Result<DeviceRecord, StoreError> {
        self.inner.get(id).await
    }

    async fn replace(&self, id: &str, record: &DeviceRecord) -> Result<DeviceRecord, StoreError> {
        self.record_write(id);
        self.inner.replace(id, record).await
    }

    async fn create_if_absent(
        &self,
        id: &str,
        record: &DeviceRecord,
    ) -> Result<DeviceRecord, StoreError> {
        self.record_write(id);
        self.inner.create_if_absent(id, record).await
    }
}

fn directory(ids: &[&str]) -> DeviceDirectory {
    DeviceDirectory::new(
        ids.iter()
            .enumerate()
            .map(|(i, id)| SiteEntry {
                label: format!("site-{i}"),
                device_id: (*id).to_string(),
            })
            .collect(),
    )
}

fn driver(client: ScriptedClient) -> Driver<ScriptedClient, MemoryStore> {
    Driver::new(Arc::new(Reconciler::new(client, MemoryStore::new())))
}

#[tokio::test]
async fn test_two_device_scenario() {
    // X1 has a valid prior record and a healthy upstream naming "Library";
    // X2 has no prior record and a non-JSON upstream body.
    let client = ScriptedClient::new()
        .body("X1", feed_body("X1", "Library"))
        .body("X2", "<html>gateway timeout</html>");
    let driver = driver(client);

    driver
        .reconciler()
        .store()
        .replace(
            "X1",
            &DeviceRecord::live("X1", Default::default(), "OldName".to_string()),
        )
        .await
        .expect("seed X1");

    driver.run_pass(&directory(&["X1", "X2"])).join().await;

    let store = driver.reconciler().store();

    let x1 = store.get("X1").await.expect("X1 exists");
    assert_eq!(x1.site_name, "Library");
    assert!(!x1.json_is_broken);
    assert!(x1.airbox.is_some());

    let x2 = store.get("X2").await.expect("X2 exists");
    assert!(x2.json_is_broken);
    assert!(x2.airbox.is_none());
    assert_eq!(x2.site_name, "");
}

#[tokio::test]
async fn test_exactly_one_write_per_invocation() {
    // REPLACED: prior record, healthy feed. CREATED: no prior, healthy
    // feed. CORRUPT: unparsable body. DOWN: transport failure, no write.
    let client = ScriptedClient::new()
        .body("REPLACED", feed_body("REPLACED", "Library"))
        .body("CREATED", feed_body("CREATED", "Gym"))
        .body("CORRUPT", "<html>bad gateway</html>")
        .failing("DOWN");
    let driver = Driver::new(Arc::new(Reconciler::new(client, CountingStore::new())));

    let store = driver.reconciler().store();
    store
        .replace(
            "REPLACED",
            &DeviceRecord::live("REPLACED", Default::default(), "Old".to_string()),
        )
        .await
        .expect("seed REPLACED");

    let seed_writes = store.writes_for("REPLACED");

    driver
        .run_pass(&directory(&["REPLACED", "CREATED", "CORRUPT", "DOWN"]))
        .join()
        .await;

    let store = driver.reconciler().store();
    assert_eq!(store.writes_for("REPLACED") - seed_writes, 1);
    assert_eq!(store.writes_for("CREATED"), 1);
    assert_eq!(store.writes_for("CORRUPT"), 1);
    assert_eq!(store.writes_for("DOWN"), 0);
}

#[tokio::test]
async fn test_exactly_one_record_per_identifier() {
    let client = ScriptedClient::new()
        .body("A", feed_body("A", "North"))
        .body("B", feed_body("B", "South"));
    let driver = driver(client);

    driver.run_pass(&directory(&["A", "B"])).join().await;

    let store = driver.reconciler().store();
    assert_eq!(store.len().await, 2);
    assert_eq!(store.get("A").await.expect("A").site_name, "North");
    assert_eq!(store.get("B").await.expect("B").site_name, "South");
}

#[tokio::test]
async fn test_double_pass_is_idempotent() {
    let client = ScriptedClient::new()
        .body("A", feed_body("A", "North"))
        .body("B", r#"{"device_id": "B", "source": "t", "feeds": []}"#)
        .body("C", "definitely not json");
    let driver = driver(client);
    let dir = directory(&["A", "B", "C"]);

    driver.run_pass(&dir).join().await;

    let store = driver.reconciler().store();
    let mut first = Vec::new();
    for id in ["A", "B", "C"] {
        let record = store.get(id).await.expect("record after first pass");
        first.push(serde_json::to_string(&record).expect("serialize"));
    }

    driver.run_pass(&dir).join().await;

    for (i, id) in ["A", "B", "C"].iter().enumerate() {
        let record = store.get(id).await.expect("record after second pass");
        let bytes = serde_json::to_string(&record).expect("serialize");
        assert_eq!(bytes, first[i], "record for {id} changed between passes");
    }
}

#[tokio::test]
async fn test_transport_failure_isolated_to_its_identifier() {
    let client = ScriptedClient::new()
        .body("A", feed_body("A", "North"))
        .failing("B")
        .body("C", feed_body("C", "East"));
    let driver = driver(client);

    driver.run_pass(&directory(&["A", "B", "C"])).join().await;

    let store = driver.reconciler().store();
    assert!(store.get("A").await.is_ok());
    assert!(store.get("C").await.is_ok());
    assert!(matches!(
        store.get("B").await,
        Err(StoreError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_concurrent_invocations_stay_in_their_partitions() {
    let mut client = ScriptedClient::new();
    let ids: Vec<String> = (0..50).map(|i| format!("DEV{i:03}")).collect();
    for id in &ids {
        client = client.body(id, feed_body(id, &format!("Site {id}")));
    }
    let driver = driver(client);

    let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    driver.run_pass(&directory(&id_refs)).join().await;

    let store = driver.reconciler().store();
    assert_eq!(store.len().await, ids.len());
    for id in &ids {
        let record = store.get(id).await.expect("record exists");
        assert_eq!(record.id, *id);
        assert_eq!(record.partition_key, *id);
        assert_eq!(record.site_name, format!("Site {id}"));
    }
}

#[tokio::test]
async fn test_corrupt_overwrites_previous_healthy_record() {
    let driver = driver(ScriptedClient::new().body("A", "oops"));
    let store_feed = airsyncd::feed::parse(&feed_body("A", "North")).expect("decode");

    driver
        .reconciler()
        .store()
        .replace("A", &DeviceRecord::live("A", store_feed, "North".to_string()))
        .await
        .expect("seed");

    driver.run_pass(&directory(&["A"])).join().await;

    let record = driver.reconciler().store().get("A").await.expect("record");
    assert!(record.json_is_broken);
    assert!(record.airbox.is_none(), "corruption replaces, never merges");
}

#[tokio::test]
async fn test_empty_feed_name_laws_through_the_pipeline() {
    let empty = r#"{"device_id": "x", "source": "t", "feeds": []}"#;
    let client = ScriptedClient::new().body("KNOWN", empty).body("NEW", empty);
    let driver = driver(client);

    driver
        .reconciler()
        .store()
        .replace(
            "KNOWN",
            &DeviceRecord::live("KNOWN", Default::default(), "Kept".to_string()),
        )
        .await
        .expect("seed");

    driver.run_pass(&directory(&["KNOWN", "NEW"])).join().await;

    let store = driver.reconciler().store();
    assert_eq!(store.get("KNOWN").await.expect("KNOWN").site_name, "Kept");
    assert_eq!(store.get("NEW").await.expect("NEW").site_name, "");
}

#[tokio::test]
async fn test_duplicate_directory_entries_each_reconcile() {
    let client = ScriptedClient::new().body("A", feed_body("A", "North"));
    let driver = driver(client);

    let handles = driver.run_pass(&directory(&["A", "A", "A"]));
    assert_eq!(handles.len(), 3, "duplicates are not deduplicated");
    handles.join().await;

    let store = driver.reconciler().store();
    assert_eq!(store.len().await, 1);
    assert_eq!(store.get("A").await.expect("A").site_name, "North");
}
