//! Connection registry and fan-out

use std::collections::HashMap;

use tokio::sync::mpsc;
use uuid::Uuid;

use super::types::{ConnectionId, NodeSession};
use crate::protocol::{HubFrame, Join, RosterEntry};

#[derive(Debug)]
struct Connection {
    session: NodeSession,
    tx: mpsc::UnboundedSender<HubFrame>,
}

/// Registry of connected devices
#[derive(Debug, Default)]
pub struct NodeRegistry {
    connections: HashMap<ConnectionId, Connection>,
}

impl NodeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a freshly accepted connection
    pub fn connect(&mut self, tx: mpsc::UnboundedSender<HubFrame>) -> ConnectionId {
        let id = ConnectionId::new();
        let session = NodeSession {
            id,
            entry: None,
            session_id: None,
            connected_at: chrono::Utc::now(),
        };
        self.connections.insert(id, Connection { session, tx });
        id
    }

    /// Record a `join`, returning false for an unknown connection
    ///
    /// A repeated join replaces the earlier name and room.
    pub fn join(&mut self, id: ConnectionId, join: Join) -> bool {
        let Some(conn) = self.connections.get_mut(&id) else {
            return false;
        };
        conn.session.entry = Some(RosterEntry {
            name: join.name,
            folder: join.folder,
        });
        true
    }

    /// Issue a fresh session id to a connection, replacing any earlier one
    pub fn issue_session(&mut self, id: ConnectionId) -> Option<String> {
        let conn = self.connections.get_mut(&id)?;
        let session = Uuid::new_v4().to_string();
        conn.session.session_id = Some(session.clone());
        Some(session)
    }

    /// Whether a session id belongs to a live connection
    #[must_use]
    pub fn has_session(&self, session: &str) -> bool {
        self.connections
            .values()
            .any(|c| c.session.session_id.as_deref() == Some(session))
    }

    /// Forget a connection, invalidating its session id
    pub fn disconnect(&mut self, id: ConnectionId) -> Option<NodeSession> {
        self.connections.remove(&id).map(|c| c.session)
    }

    #[must_use]
    pub fn get(&self, id: ConnectionId) -> Option<&NodeSession> {
        self.connections.get(&id).map(|c| &c.session)
    }

    /// Joined devices, oldest connection first
    #[must_use]
    pub fn roster(&self) -> Vec<RosterEntry> {
        let mut joined: Vec<&NodeSession> = self
            .connections
            .values()
            .map(|c| &c.session)
            .filter(|s| s.entry.is_some())
            .collect();
        joined.sort_by_key(|s| s.connected_at);
        joined.into_iter().filter_map(|s| s.entry.clone()).collect()
    }

    /// Send to one connection
    pub fn send_to(&self, id: ConnectionId, frame: HubFrame) -> bool {
        self.connections
            .get(&id)
            .is_some_and(|c| c.tx.send(frame).is_ok())
    }

    /// Send to every joined connection with `name`, returning the count
    pub fn send_to_name(&self, name: &str, frame: &HubFrame) -> usize {
        self.connections
            .values()
            .filter(|c| c.session.name() == Some(name))
            .filter(|c| c.tx.send(frame.clone()).is_ok())
            .count()
    }

    /// Send to every connection, returning the count
    pub fn broadcast(&self, frame: &HubFrame) -> usize {
        self.connections
            .values()
            .filter(|c| c.tx.send(frame.clone()).is_ok())
            .count()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn join(name: &str) -> Join {
        Join {
            name: name.to_string(),
            folder: format!("/{}", name.to_lowercase()),
        }
    }

    #[test]
    fn roster_lists_joined_connections_only() {
        let mut registry = NodeRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let a = registry.connect(tx.clone());
        registry.connect(tx);
        assert!(registry.join(a, join("Print")));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.roster(), vec![RosterEntry {
            name: "Print".to_string(),
            folder: "/print".to_string()
        }]);
    }

    #[test]
    fn sessions_die_with_their_connection() {
        let mut registry = NodeRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let id = registry.connect(tx);
        let first = registry.issue_session(id).unwrap();
        let second = registry.issue_session(id).unwrap();
        assert_ne!(first, second);
        assert!(!registry.has_session(&first));
        assert!(registry.has_session(&second));

        registry.disconnect(id);
        assert!(!registry.has_session(&second));
        assert!(registry.is_empty());
    }

    #[test]
    fn routed_send_reaches_named_connection() {
        let mut registry = NodeRegistry::new();
        let (admin_tx, mut admin_rx) = mpsc::unbounded_channel();
        let (print_tx, mut print_rx) = mpsc::unbounded_channel();
        let admin = registry.connect(admin_tx);
        let print = registry.connect(print_tx);
        registry.join(admin, join("Admin"));
        registry.join(print, join("Print"));

        let frame = HubFrame::SessionId("x".to_string());
        assert_eq!(registry.send_to_name("Admin", &frame), 1);
        assert_eq!(admin_rx.try_recv().unwrap(), frame);
        assert!(print_rx.try_recv().is_err());

        assert_eq!(registry.broadcast(&frame), 2);
    }

    #[test]
    fn unknown_connection_cannot_join() {
        let mut registry = NodeRegistry::new();
        assert!(!registry.join(ConnectionId::new(), join("Ghost")));
        assert!(registry.issue_session(ConnectionId::new()).is_none());
    }
}
