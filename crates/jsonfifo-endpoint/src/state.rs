use std::fmt;

/// Whether the peer is currently reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => f.write_str("disconnected"),
            ConnectionState::Connected => f.write_str("connected"),
        }
    }
}

/// An edge in the connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Connected,
    Disconnected,
}

/// Two-state, edge-triggered peer presence tracker.
///
/// Every method returns `Some` only when the state actually changes, so a
/// stream of frames yields a single `Connected` and repeated failures yield
/// a single `Disconnected`.
#[derive(Debug, Default)]
pub struct ConnectionStateMachine {
    state: ConnectionState,
}

impl ConnectionStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// A frame (data or `start`) was decoded from the peer.
    pub fn on_frame(&mut self) -> Option<Transition> {
        self.set(ConnectionState::Connected)
    }

    /// The peer announced a deliberate close with `end`.
    pub fn on_end(&mut self) -> Option<Transition> {
        self.set(ConnectionState::Disconnected)
    }

    /// Writing to the peer failed.
    pub fn on_write_failure(&mut self) -> Option<Transition> {
        self.set(ConnectionState::Disconnected)
    }

    /// Streams are being torn down (restart or local close).
    pub fn reset(&mut self) -> Option<Transition> {
        self.set(ConnectionState::Disconnected)
    }

    fn set(&mut self, next: ConnectionState) -> Option<Transition> {
        if self.state == next {
            return None;
        }
        self.state = next;
        Some(match next {
            ConnectionState::Connected => Transition::Connected,
            ConnectionState::Disconnected => Transition::Disconnected,
        })
    }
}
