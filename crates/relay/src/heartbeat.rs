//! Liveness monitor and keepalive pulse.
//!
//! Two interval tasks sweep the shared registry. The monitor runs the
//! probe-and-reap cycle: a connection proves liveness once per interval
//! (pong or application traffic) or is terminated on the next tick. The
//! pulse sends a fixed notice to live connections so intermediary proxies
//! never see an idle stream and cut the transport.

use crate::client::ClientRegistry;
use crate::protocol::{ServerMessage, GREETING};
use axum::extract::ws::Message;
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

/// Configuration for the sweep tasks.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// Interval between liveness probes. A connection that neither answers
    /// a ping nor sends an update for a full interval is terminated on the
    /// following tick.
    pub heartbeat_interval: Duration,
    /// Interval between keepalive notices. Kept below common proxy idle
    /// timeouts (reference deployments cut at 30 minutes).
    pub keepalive_interval: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(6),
            keepalive_interval: Duration::from_secs(29 * 60),
        }
    }
}

/// Runs the heartbeat and keepalive sweeps over the registry.
pub struct Sweeper {
    registry: Arc<ClientRegistry>,
    config: SweeperConfig,
}

impl Sweeper {
    /// Create a new sweeper.
    pub fn new(registry: Arc<ClientRegistry>, config: SweeperConfig) -> Self {
        Self { registry, config }
    }

    /// Spawn both sweep tasks. They run until aborted at shutdown.
    pub fn spawn(self: Arc<Self>) -> (JoinHandle<()>, JoinHandle<()>) {
        let heartbeat = {
            let sweeper = self.clone();
            tokio::spawn(async move {
                let mut ticker = interval(sweeper.config.heartbeat_interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    ticker.tick().await;
                    sweeper.heartbeat_sweep();
                }
            })
        };

        let keepalive = tokio::spawn(async move {
            let mut ticker = interval(self.config.keepalive_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick fires immediately; skip it so freshly started
            // servers don't pulse an empty registry.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.keepalive_sweep();
            }
        });

        (heartbeat, keepalive)
    }

    /// One probe-and-reap pass.
    ///
    /// A client whose flag is still down missed every chance to prove
    /// liveness since the previous pass: terminate it. Everyone else has
    /// their flag lowered and a ping queued; the pong (or any update)
    /// raises it again before we come back.
    pub fn heartbeat_sweep(&self) {
        let clients = self.registry.snapshot();
        debug!("Pinging {} clients", clients.len());

        for client in clients {
            if !client.is_alive() {
                warn!("Heartbeat not received - id {}", client.id);
                counter!("relay_clients_reaped_total").increment(1);
                client.terminate();
                continue;
            }
            client.mark_pending();
            if !client.send_raw(Message::Ping(Vec::new())) {
                debug!("Failed to ping client {}", client.id);
            }
        }
    }

    /// One keepalive pass: a no-op notice to every live connection.
    /// Connections already pending termination are skipped.
    pub fn keepalive_sweep(&self) {
        debug!("Sending keepalive notices");
        let notice = ServerMessage::notice(GREETING);

        for client in self.registry.snapshot() {
            if !client.is_alive() {
                continue;
            }
            if client.send(&notice).is_err() {
                debug!("Failed to send keepalive to client {}", client.id);
            }
        }
        counter!("relay_keepalive_sweeps_total").increment(1);
    }
}
