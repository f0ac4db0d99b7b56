//! Update routing: one member's state change fans out to its whole group.

use crate::client::{ClientRegistry, ClientState};
use crate::error::{RelayError, Result};
use crate::group::GroupId;
use crate::protocol::{LampUpdate, ServerMessage};
use axum::extract::ws::Message;
use metrics::counter;
use std::sync::Arc;
use tracing::debug;

/// Routes inbound state updates to the sender's groupmates.
pub struct LampRouter {
    /// Client registry for membership lookups.
    registry: Arc<ClientRegistry>,
}

impl LampRouter {
    /// Create a new router.
    pub fn new(registry: Arc<ClientRegistry>) -> Self {
        Self { registry }
    }

    /// Handle one inbound frame from `client`.
    ///
    /// The frame (re)assigns the sender's group, refreshes its liveness,
    /// and is rebroadcast to every current group member, the sender
    /// included. Clients ignore echoes of their own state, so the echo is
    /// harmless and keeps delivery uniform across the group.
    pub fn route_update(&self, client: &Arc<ClientState>, payload: &[u8]) -> Result<()> {
        let update: LampUpdate = serde_json::from_slice(payload)?;
        let group = GroupId::from_scalar(&update.group_id).ok_or_else(|| {
            RelayError::InvalidPayload(format!("groupId must be a scalar, got {}", update.group_id))
        })?;

        debug!("Data received from {} for group {}", client.id, group);

        self.registry.join_group(&client.id, group.clone())?;
        client.mark_alive();

        counter!("relay_updates_received_total").increment(1);

        self.broadcast(&group, &ServerMessage::lamp_state(update.lamp_state))
    }

    /// Deliver a message to every current member of `group`.
    ///
    /// The payload is serialized once; a failed send on one member is
    /// logged and never aborts delivery to the rest.
    pub fn broadcast(&self, group: &GroupId, msg: &ServerMessage) -> Result<()> {
        let members = self.registry.group_members(group);
        if members.is_empty() {
            debug!("No members in group {}", group);
            return Ok(());
        }

        let json = serde_json::to_string(msg)?;

        debug!("Routing update for group {} to {} clients", group, members.len());

        for member in members {
            if !member.send_raw(Message::Text(json.clone())) {
                debug!("Failed to send to client {}", member.id);
                counter!("relay_send_failures_total").increment(1);
            }
        }

        counter!("relay_updates_routed_total").increment(1);

        Ok(())
    }
}
