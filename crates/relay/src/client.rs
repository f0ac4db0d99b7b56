//! Client state and registry management.
//!
//! Uses lock-free DashMap for concurrent access: the per-connection loops,
//! the router, and the two sweep tasks all touch the registry without any
//! outer lock. A reverse index maps each group to its member ids so a
//! broadcast never scans unrelated connections.

use crate::error::{RelayError, Result};
use crate::group::GroupId;
use crate::protocol::ServerMessage;
use axum::extract::ws::Message;
use chrono::Utc;
use dashmap::{DashMap, DashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::{mpsc, Notify};
use tracing::info;
use uuid::Uuid;

/// Unique client identifier. Diagnostics only, never used for routing.
pub type ClientId = Uuid;

/// State for a single connected client.
pub struct ClientState {
    /// Unique client identifier, assigned at connect.
    pub id: ClientId,
    /// Channel to the connection's writer task.
    pub tx: mpsc::UnboundedSender<Message>,
    /// Group this connection belongs to. `None` until its first update;
    /// last-write-wins afterwards.
    group: RwLock<Option<GroupId>>,
    /// Liveness flag. Lowered by the heartbeat sweep before each probe,
    /// raised by pongs and by any inbound update.
    alive: AtomicBool,
    /// Signalled when the server force-closes this connection.
    closed: Notify,
    /// Timestamp when the client connected.
    pub connected_at: i64,
}

impl ClientState {
    pub fn new(tx: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx,
            group: RwLock::new(None),
            alive: AtomicBool::new(true),
            closed: Notify::new(),
            connected_at: Utc::now().timestamp_millis(),
        }
    }

    /// Send a protocol message to this client. Fire-and-forget: queues on
    /// the writer channel, never waits for the peer.
    pub fn send(&self, msg: &ServerMessage) -> Result<()> {
        let json = serde_json::to_string(msg)?;
        self.tx
            .send(Message::Text(json))
            .map_err(|_| RelayError::ChannelSend)
    }

    /// Queue a raw frame. Returns false if the writer is gone.
    pub fn send_raw(&self, msg: Message) -> bool {
        self.tx.send(msg).is_ok()
    }

    /// Forcibly terminate the connection: queue a close frame and wake the
    /// connection loop, which unregisters on exit.
    pub fn terminate(&self) {
        let _ = self.tx.send(Message::Close(None));
        self.closed.notify_one();
    }

    /// Resolves once [`terminate`](Self::terminate) has been called.
    pub async fn wait_closed(&self) {
        self.closed.notified().await;
    }

    pub fn group(&self) -> Option<GroupId> {
        self.group.read().unwrap().clone()
    }

    /// Replace the group slot, returning the previous membership.
    fn set_group(&self, group: GroupId) -> Option<GroupId> {
        self.group.write().unwrap().replace(group)
    }

    pub fn mark_alive(&self) {
        self.alive.store(true, Ordering::Relaxed);
    }

    /// Lower the liveness flag; the client must raise it again (pong or
    /// update) before the next sweep or be terminated.
    pub fn mark_pending(&self) {
        self.alive.store(false, Ordering::Relaxed);
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }
}

/// Lock-free registry of connected clients.
///
/// Maintains:
/// - Client ID → Client State mapping
/// - Group → Client IDs reverse index for O(members) broadcasts
pub struct ClientRegistry {
    /// Client ID → Client State.
    clients: DashMap<ClientId, Arc<ClientState>>,
    /// Group → member ids. Entries are dropped once their last member leaves.
    groups: DashMap<GroupId, DashSet<ClientId>>,
}

impl ClientRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            clients: DashMap::new(),
            groups: DashMap::new(),
        }
    }

    /// Register a new client.
    pub fn register(&self, client: Arc<ClientState>) -> ClientId {
        let id = client.id;
        self.clients.insert(id, client);
        info!("Client {} registered", id);
        id
    }

    /// Unregister a client and clean up its group membership.
    pub fn unregister(&self, client_id: &ClientId) {
        if let Some((_, client)) = self.clients.remove(client_id) {
            if let Some(group) = client.group() {
                self.drop_membership(&group, client_id);
            }
            info!("Client {} unregistered", client_id);
        }
    }

    /// Get a client by ID.
    pub fn get(&self, client_id: &ClientId) -> Option<Arc<ClientState>> {
        self.clients.get(client_id).map(|r| r.clone())
    }

    /// Move a client into `group`, leaving its previous group if any.
    /// A connection belongs to at most one group at a time.
    pub fn join_group(&self, client_id: &ClientId, group: GroupId) -> Result<()> {
        let client = self
            .clients
            .get(client_id)
            .ok_or_else(|| RelayError::ClientNotFound(client_id.to_string()))?
            .clone();

        let previous = client.set_group(group.clone());
        match previous {
            Some(prev) if prev != group => self.drop_membership(&prev, client_id),
            _ => {}
        }

        self.groups.entry(group).or_default().insert(*client_id);
        Ok(())
    }

    fn drop_membership(&self, group: &GroupId, client_id: &ClientId) {
        let now_empty = match self.groups.get(group) {
            Some(members) => {
                members.remove(client_id);
                members.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.groups.remove_if(group, |_, members| members.is_empty());
        }
    }

    /// All current members of `group`.
    pub fn group_members(&self, group: &GroupId) -> Vec<Arc<ClientState>> {
        if let Some(member_ids) = self.groups.get(group) {
            member_ids
                .iter()
                .filter_map(|id| self.clients.get(&*id).map(|c| c.clone()))
                .collect()
        } else {
            Vec::new()
        }
    }

    /// Snapshot of every connected client, for the sweep tasks.
    pub fn snapshot(&self) -> Vec<Arc<ClientState>> {
        self.clients.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Get the total number of connected clients.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Get the number of groups with at least one member.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}
