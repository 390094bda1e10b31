//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use poc_portal_core::PortalService;
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: PortalService,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(service: PortalService, config: Arc<Config>) -> Self {
        Self { service, config }
    }
}
