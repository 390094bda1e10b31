//! crates/poc_portal_core/src/memory.rs
//!
//! An in-memory `RecordStore` and a hand-driven `Clock`, for tests.

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::filter::Filter;
use crate::ports::{Clock, PortError, PortResult, RecordStore};

/// A call observed by the store, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    List { collection: String, filter: String, per_page: u32 },
    Create { collection: String, body: Value },
    Update { collection: String, id: String, body: Value },
    Delete { collection: String, id: String },
}

#[derive(Default)]
struct Inner {
    collections: HashMap<String, Vec<Value>>,
    next_id: u64,
    calls: Vec<StoreCall>,
    failing_creates: HashSet<String>,
    password_resets: Vec<String>,
    healthy: bool,
}

/// Keeps every collection as a vector of JSON objects and evaluates filters the way
/// the backend does.
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                healthy: true,
                ..Default::default()
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Seeds a record and returns its generated id.
    pub fn insert(&self, collection: &str, record: Value) -> String {
        let mut inner = self.lock();
        insert_record(&mut inner, collection, record)
    }

    pub fn records(&self, collection: &str) -> Vec<Value> {
        self.lock().collections.get(collection).cloned().unwrap_or_default()
    }

    pub fn record(&self, collection: &str, id: &str) -> Option<Value> {
        self.records(collection)
            .into_iter()
            .find(|r| r.get("id").and_then(Value::as_str) == Some(id))
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.lock().calls.clone()
    }

    /// Bodies of every update sent to `collection`.
    pub fn updates(&self, collection: &str) -> Vec<Value> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                StoreCall::Update { collection: c, body, .. } if c == collection => Some(body),
                _ => None,
            })
            .collect()
    }

    /// Number of calls that wrote anything (create, update or delete).
    pub fn write_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| !matches!(c, StoreCall::List { .. }))
            .count()
    }

    pub fn password_resets(&self) -> Vec<String> {
        self.lock().password_resets.clone()
    }

    /// Makes every later create in `collection` fail with a backend error.
    pub fn fail_creates_in(&self, collection: &str) {
        self.lock().failing_creates.insert(collection.to_string());
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.lock().healthy = healthy;
    }
}

fn insert_record(inner: &mut Inner, collection: &str, record: Value) -> String {
    inner.next_id += 1;
    let id = format!("rec{:012}", inner.next_id);
    let mut object = match record {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    object.insert("id".to_string(), Value::String(id.clone()));
    inner
        .collections
        .entry(collection.to_string())
        .or_default()
        .push(Value::Object(object));
    id
}

fn not_found(collection: &str, id: &str) -> PortError {
    PortError::Backend {
        status: 404,
        message: format!(r#"{{"message":"The requested resource wasn't found.","collection":"{collection}","id":"{id}"}}"#),
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn list(&self, collection: &str, filter: &Filter, per_page: u32) -> PortResult<Vec<Value>> {
        let mut inner = self.lock();
        inner.calls.push(StoreCall::List {
            collection: collection.to_string(),
            filter: filter.to_string(),
            per_page,
        });
        Ok(inner
            .collections
            .get(collection)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| filter.matches(r))
                    .take(per_page as usize)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create(&self, collection: &str, body: Value) -> PortResult<Value> {
        let mut inner = self.lock();
        inner.calls.push(StoreCall::Create {
            collection: collection.to_string(),
            body: body.clone(),
        });
        if inner.failing_creates.contains(collection) {
            return Err(PortError::Backend {
                status: 400,
                message: format!(r#"{{"message":"Failed to create record in {collection}."}}"#),
            });
        }
        let id = insert_record(&mut inner, collection, body);
        inner
            .collections
            .get(collection)
            .and_then(|records| records.last().cloned())
            .ok_or_else(|| not_found(collection, &id))
    }

    async fn update(&self, collection: &str, id: &str, body: Value) -> PortResult<Value> {
        let mut inner = self.lock();
        inner.calls.push(StoreCall::Update {
            collection: collection.to_string(),
            id: id.to_string(),
            body: body.clone(),
        });
        let record = inner
            .collections
            .get_mut(collection)
            .and_then(|records| {
                records
                    .iter_mut()
                    .find(|r| r.get("id").and_then(Value::as_str) == Some(id))
            })
            .ok_or_else(|| not_found(collection, id))?;
        if let (Value::Object(target), Value::Object(fields)) = (&mut *record, body) {
            target.extend(fields);
        }
        Ok(record.clone())
    }

    async fn delete(&self, collection: &str, id: &str) -> PortResult<()> {
        let mut inner = self.lock();
        inner.calls.push(StoreCall::Delete {
            collection: collection.to_string(),
            id: id.to_string(),
        });
        let records = inner
            .collections
            .get_mut(collection)
            .ok_or_else(|| not_found(collection, id))?;
        let before = records.len();
        records.retain(|r| r.get("id").and_then(Value::as_str) != Some(id));
        if records.len() == before {
            return Err(not_found(collection, id));
        }
        Ok(())
    }

    async fn request_password_reset(&self, email: &str) -> PortResult<()> {
        self.lock().password_resets.push(email.to_string());
        Ok(())
    }

    async fn health(&self) -> PortResult<()> {
        if self.lock().healthy {
            Ok(())
        } else {
            Err(PortError::Unexpected("connection refused".to_string()))
        }
    }
}

/// A clock that advances one second every time it is read.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(start) }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        let start = Utc
            .with_ymd_and_hms(2025, 12, 4, 9, 0, 0)
            .single()
            .unwrap_or_else(Utc::now);
        Self::starting_at(start)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let current = *now;
        *now = current + Duration::seconds(1);
        current
    }
}
