//! HTTP and WebSocket surface.
//!
//! Routes are nested under `/api/` and pass through a single middleware
//! stack: CORS → Cache-Control → Auth resolver → Audit → Handler.
//! The real-time channel lives at `/ws/connect`.

pub mod endpoints;
pub mod error;
pub mod middleware;
pub mod router;
pub mod server;
pub mod types;
pub mod websocket;

pub use router::api_router;
pub use server::{start_server, ApiServer};
pub use types::ApiContext;
