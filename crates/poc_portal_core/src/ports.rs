//! crates/poc_portal_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the portal's core logic.
//! The record store behind them is an external, schema-driven REST service; the
//! core only ever speaks to it through `RecordStore`.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use crate::filter::Filter;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Unauthorized")]
    Unauthorized,
    /// Any non-2xx answer from the backend, with its original body text.
    #[error("Backend returned {status}: {message}")]
    Backend { status: u16, message: String },
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// The generic records API of the backend.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Returns the first page of records in `collection` matching `filter`.
    async fn list(&self, collection: &str, filter: &Filter, per_page: u32) -> PortResult<Vec<Value>>;

    async fn create(&self, collection: &str, body: Value) -> PortResult<Value>;

    /// Partial update: only the fields present in `body` are written.
    async fn update(&self, collection: &str, id: &str, body: Value) -> PortResult<Value>;

    async fn delete(&self, collection: &str, id: &str) -> PortResult<()>;

    /// Asks the backend to mail a password-reset link to a user.
    async fn request_password_reset(&self, email: &str) -> PortResult<()>;

    /// Checks that the backend answers and accepts our credentials.
    async fn health(&self) -> PortResult<()>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Formats an instant the way the backend's date fields are written, e.g.
/// `2025-12-04T09:30:00.000Z`.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
