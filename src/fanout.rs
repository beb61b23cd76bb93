//! C15 Connection fan-out: per-connection outbound channels, scoped by
//! role, owned by a single session actor (§4.8). Grounded on the
//! `UserSession { sender: Option<mpsc::UnboundedSender<ServerMessage>> }`
//! pattern from the quiz-slide-app example: each live connection gets its
//! own outbound queue, and a broadcast is just "write to every live queue",
//! no separate pub/sub layer needed for a single-process coordinator.

use crate::events::OutboundEvent;
use crate::token::Role;
use std::collections::HashMap;
use tokio::sync::mpsc;

pub type ConnectionId = u64;

pub struct Connection {
    pub role: Role,
    /// Identifies the authenticated principal: participant id for
    /// `Participant`/`Tester`, host subject for `Controller`/`Bigscreen`.
    pub subject: String,
    pub sender: mpsc::Sender<OutboundEvent>,
}

#[derive(Default)]
pub struct FanOut {
    connections: HashMap<ConnectionId, Connection>,
    next_id: ConnectionId,
}

impl FanOut {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, role: Role, subject: String, sender: mpsc::Sender<OutboundEvent>) -> ConnectionId {
        let id = self.next_id;
        self.next_id += 1;
        self.connections.insert(id, Connection { role, subject, sender });
        id
    }

    pub fn unregister(&mut self, connection_id: ConnectionId) {
        self.connections.remove(&connection_id);
    }

    pub fn connection(&self, connection_id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&connection_id)
    }

    /// Sends to every live connection regardless of role. A full channel
    /// (a stalled client) drops the event for that connection rather than
    /// blocking every other connection's delivery.
    pub async fn broadcast(&self, event: OutboundEvent) {
        for connection in self.connections.values() {
            let _ = connection.sender.try_send(event.clone());
        }
    }

    pub async fn broadcast_to_role(&self, role: Role, event: OutboundEvent) {
        for connection in self.connections.values().filter(|c| c.role == role) {
            let _ = connection.sender.try_send(event.clone());
        }
    }

    pub async fn send_to(&self, connection_id: ConnectionId, event: OutboundEvent) {
        if let Some(connection) = self.connections.get(&connection_id) {
            let _ = connection.sender.try_send(event);
        }
    }

    pub async fn send_to_subject(&self, subject: &str, event: OutboundEvent) {
        for connection in self.connections.values().filter(|c| c.subject == subject) {
            let _ = connection.sender.try_send(event.clone());
        }
    }

    pub fn connection_ids_for_subject(&self, subject: &str) -> Vec<ConnectionId> {
        self.connections
            .iter()
            .filter(|(_, c)| c.subject == subject)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn is_connected(&self, subject: &str) -> bool {
        self.connections.values().any(|c| c.subject == subject)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ErrorPayload;
    use crate::errors::AppErrorCode;

    #[tokio::test]
    async fn broadcast_reaches_all_connections() {
        let mut fanout = FanOut::new();
        let (tx1, mut rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);
        fanout.register(Role::Participant, "p1".into(), tx1);
        fanout.register(Role::Controller, "host".into(), tx2);

        fanout
            .broadcast(OutboundEvent::Error(ErrorPayload {
                code: AppErrorCode::Internal,
                message: "test".into(),
            }))
            .await;

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn role_scoped_broadcast_skips_other_roles() {
        let mut fanout = FanOut::new();
        let (tx1, mut rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);
        fanout.register(Role::Participant, "p1".into(), tx1);
        fanout.register(Role::Controller, "host".into(), tx2);

        fanout.broadcast_to_role(Role::Controller, OutboundEvent::Pong).await;

        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn unregister_stops_delivery() {
        let mut fanout = FanOut::new();
        let (tx, mut rx) = mpsc::channel(8);
        let id = fanout.register(Role::Participant, "p1".into(), tx);
        fanout.unregister(id);
        fanout.broadcast(OutboundEvent::Pong).await;
        assert!(rx.try_recv().is_err());
    }
}
