//! Connection state kept for replay after a reconnect.

use crate::commands::{
    Command, CommandVisitor, ConnectionId, ConnectionInfo, DataStructure, ProducerId,
    ProducerInfo, RemoveInfo, SessionId, SessionInfo,
};
use crate::error::Error;
use tracing::trace;

#[derive(Debug, Clone)]
struct SessionState {
    info: SessionInfo,
    producers: Vec<ProducerInfo>,
}

#[derive(Debug, Clone)]
struct ConnectionState {
    info: ConnectionInfo,
    sessions: Vec<SessionState>,
}

/// Remembers the connections, sessions and producers opened through a
/// failover transport so a new member can be brought to the same state.
///
/// Sessions are only kept under a tracked connection and producers under a
/// tracked session. A `RemoveInfo` drops the named object and everything
/// below it. Insertion order is kept, so a restore opens objects in the order
/// they were first created.
#[derive(Debug, Default)]
pub(crate) struct ConnectionStateTracker {
    connections: Vec<ConnectionState>,
}

impl ConnectionStateTracker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// True for the commands [`ConnectionStateTracker::track`] reacts to.
    pub(crate) fn is_state_command(command: &Command) -> bool {
        matches!(
            command,
            Command::ConnectionInfo(_)
                | Command::SessionInfo(_)
                | Command::ProducerInfo(_)
                | Command::RemoveInfo(_)
        )
    }

    pub(crate) fn track(&mut self, command: &Command) {
        // Tracking never fails.
        let _ = command.visit(self);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Commands that rebuild the tracked state: each connection, marked as a
    /// failover reconnect, followed by its sessions, each followed by its
    /// producers.
    pub(crate) fn restore_commands(&self) -> Vec<Command> {
        let mut commands = Vec::new();
        for connection in &self.connections {
            let mut info = connection.info.clone();
            info.failover_reconnect = true;
            commands.push(info.into());
            for session in &connection.sessions {
                commands.push(session.info.clone().into());
                commands.extend(session.producers.iter().cloned().map(Command::from));
            }
        }
        commands
    }

    fn connection_mut(&mut self, id: &ConnectionId) -> Option<&mut ConnectionState> {
        self.connections
            .iter_mut()
            .find(|state| state.info.connection_id.as_ref() == Some(id))
    }

    fn session_mut(&mut self, id: &SessionId) -> Option<&mut SessionState> {
        self.connection_mut(&id.parent_id())?
            .sessions
            .iter_mut()
            .find(|state| state.info.session_id.as_ref() == Some(id))
    }

    fn remove_connection(&mut self, id: &ConnectionId) {
        self.connections
            .retain(|state| state.info.connection_id.as_ref() != Some(id));
    }

    fn remove_session(&mut self, id: &SessionId) {
        if let Some(connection) = self.connection_mut(&id.parent_id()) {
            connection
                .sessions
                .retain(|state| state.info.session_id.as_ref() != Some(id));
        }
    }

    fn remove_producer(&mut self, id: &ProducerId) {
        if let Some(session) = self.session_mut(&id.parent_id()) {
            session
                .producers
                .retain(|info| info.producer_id.as_ref() != Some(id));
        }
    }
}

impl CommandVisitor for ConnectionStateTracker {
    fn process_connection_info(&mut self, info: &ConnectionInfo) -> Result<Option<Command>, Error> {
        let Some(id) = &info.connection_id else {
            return Ok(None);
        };
        trace!(connection = %id, "Tracking connection");
        let state = ConnectionState {
            info: info.clone(),
            sessions: Vec::new(),
        };
        match self.connection_mut(id) {
            Some(existing) => *existing = state,
            None => self.connections.push(state),
        }
        Ok(None)
    }

    fn process_session_info(&mut self, info: &SessionInfo) -> Result<Option<Command>, Error> {
        let Some(id) = &info.session_id else {
            return Ok(None);
        };
        let Some(connection) = self.connection_mut(&id.parent_id()) else {
            return Ok(None);
        };
        let state = SessionState {
            info: info.clone(),
            producers: Vec::new(),
        };
        match connection
            .sessions
            .iter_mut()
            .find(|session| session.info.session_id.as_ref() == Some(id))
        {
            Some(existing) => *existing = state,
            None => connection.sessions.push(state),
        }
        Ok(None)
    }

    fn process_producer_info(&mut self, info: &ProducerInfo) -> Result<Option<Command>, Error> {
        let Some(id) = &info.producer_id else {
            return Ok(None);
        };
        let Some(session) = self.session_mut(&id.parent_id()) else {
            return Ok(None);
        };
        match session
            .producers
            .iter_mut()
            .find(|producer| producer.producer_id.as_ref() == Some(id))
        {
            Some(existing) => *existing = info.clone(),
            None => session.producers.push(info.clone()),
        }
        Ok(None)
    }

    fn process_remove_info(&mut self, info: &RemoveInfo) -> Result<Option<Command>, Error> {
        match info.object_id.as_deref() {
            Some(DataStructure::ConnectionId(id)) => self.remove_connection(id),
            Some(DataStructure::SessionId(id)) => self.remove_session(id),
            Some(DataStructure::ProducerId(id)) => self.remove_producer(id),
            _ => {}
        }
        Ok(None)
    }
}
