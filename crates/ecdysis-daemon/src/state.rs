// crates/ecdysis-daemon/src/state.rs
//
// Node state machine for the Ecdysis daemon.
//
// Valid transitions:
//   Initializing -> Upgrading -> Running -> Halted
//   Any state -> ShuttingDown

use std::fmt;

/// Lifecycle states of the daemon node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeState {
    /// Node is starting up and loading configuration and pending upgrades.
    Initializing,
    /// Node is running startup migration stages before consensus resumes.
    Upgrading,
    /// Node is producing blocks.
    Running,
    /// Node stopped at an upgrade height and waits for a binary swap.
    Halted,
    /// Node is shutting down gracefully.
    ShuttingDown,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeState::Initializing => write!(f, "Initializing"),
            NodeState::Upgrading => write!(f, "Upgrading"),
            NodeState::Running => write!(f, "Running"),
            NodeState::Halted => write!(f, "Halted"),
            NodeState::ShuttingDown => write!(f, "ShuttingDown"),
        }
    }
}

/// State machine for managing node lifecycle transitions.
pub struct NodeStateMachine {
    pub current: NodeState,
}

impl NodeStateMachine {
    /// Create a new state machine starting in the Initializing state.
    pub fn new() -> Self {
        Self {
            current: NodeState::Initializing,
        }
    }

    /// Attempt to transition to a new state.
    ///
    /// Returns an error if the transition is not valid.
    pub fn transition(&mut self, new_state: NodeState) -> Result<(), String> {
        let valid = new_state == NodeState::ShuttingDown
            || matches!(
                (&self.current, &new_state),
                (NodeState::Initializing, NodeState::Upgrading)
                    | (NodeState::Upgrading, NodeState::Running)
                    | (NodeState::Running, NodeState::Halted)
            );

        if valid {
            tracing::info!("State transition: {} -> {}", self.current, new_state);
            self.current = new_state;
            Ok(())
        } else {
            Err(format!(
                "Invalid state transition: {} -> {}",
                self.current, new_state
            ))
        }
    }
}

impl Default for NodeStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
