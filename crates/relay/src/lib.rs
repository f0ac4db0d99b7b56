//! Relay service for lamp devices and web dashboards.
//!
//! This service:
//! - Accepts WebSocket connections from lamp devices and dashboards
//! - Tracks each connection's group membership (set by its own updates)
//! - Rebroadcasts every state update to the sender's whole group
//! - Probes liveness with a ping/pong heartbeat and reaps silent peers
//! - Sends periodic keepalive notices so idle proxies keep connections open
//!
//! ## Architecture
//!
//! ```text
//! lamp / dashboard (WebSocket)
//!         ↓
//! ws_server (per-connection loop)
//!         ↓
//! LampRouter (group fan-out)
//!         ↓
//! ClientRegistry (DashMap-based, lock-free)
//!         ↑
//! Sweeper (heartbeat + keepalive intervals)
//! ```
//!
//! ## Design Notes
//!
//! - The registry is the only shared state; everything else is per-connection
//! - Pre-serialized messages for broadcast
//! - Unbounded channels to avoid backpressure blocking
//! - The server process holds no durable state; clients reconnect on restart

pub mod client;
pub mod error;
pub mod group;
pub mod heartbeat;
pub mod protocol;
pub mod router;
pub mod ws_server;

pub use client::{ClientId, ClientRegistry, ClientState};
pub use error::{RelayError, Result};
pub use group::GroupId;
pub use heartbeat::{Sweeper, SweeperConfig};
pub use protocol::{LampUpdate, ServerMessage, GREETING};
pub use router::LampRouter;
pub use ws_server::{create_router, AppState};
