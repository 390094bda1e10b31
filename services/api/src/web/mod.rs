pub mod middleware;
pub mod protocol;
pub mod rest;
pub mod state;

// Re-export the router so the binary can build the web server from one call.
pub use rest::{router, ApiDoc};
pub use state::AppState;
