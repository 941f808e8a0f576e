//! Infra existence state machine: explicit states and legal transition guards.
//!
//! The guarantor calls `advance()` as it moves from local initialization to a
//! ready infra repository. Each call validates the edge and records it, so a
//! run can be diagnosed from its transition log.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::error::ForgeError;

/// States of the infra existence check.
///
/// Every run starts at `LocalInit` and terminates at `Ready` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InfraState {
    /// Initializing the local working tree.
    LocalInit,
    /// No driver owns the infra remote.
    NoUpstreamOwner,
    /// Running the create pipeline of the infra-owning driver.
    UpstreamOwnerPresent,
    /// Rebuilding the local repository from an existing remote.
    Restore,
    /// Infra repository exists with at least one commit. Terminal state.
    Ready,
    /// Terminal state.
    Failed,
}

impl InfraState {
    /// Whether this is a terminal state (no further transitions allowed).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ready | Self::Failed)
    }
}

impl fmt::Display for InfraState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LocalInit => write!(f, "LocalInit"),
            Self::NoUpstreamOwner => write!(f, "NoUpstreamOwner"),
            Self::UpstreamOwnerPresent => write!(f, "UpstreamOwnerPresent"),
            Self::Restore => write!(f, "Restore"),
            Self::Ready => write!(f, "Ready"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// ```text
/// LocalInit → NoUpstreamOwner | UpstreamOwnerPresent
/// NoUpstreamOwner → Ready
/// UpstreamOwnerPresent → Ready | Restore
/// Restore → Ready
/// ```
fn is_legal_transition(from: InfraState, to: InfraState) -> bool {
    use InfraState::*;

    if to == Failed && !from.is_terminal() {
        return true;
    }

    matches!(
        (from, to),
        (LocalInit, NoUpstreamOwner)
            | (LocalInit, UpstreamOwnerPresent)
            | (NoUpstreamOwner, Ready)
            | (UpstreamOwnerPresent, Ready)
            | (UpstreamOwnerPresent, Restore)
            | (Restore, Ready)
    )
}

/// A single recorded state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: InfraState,
    pub to: InfraState,
    /// Milliseconds since the state machine was created.
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Error returned when an illegal transition is attempted.
#[derive(Debug, Clone)]
pub struct IllegalTransition {
    pub from: InfraState,
    pub to: InfraState,
}

impl fmt::Display for IllegalTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Illegal state transition: {} → {}", self.from, self.to)
    }
}

impl std::error::Error for IllegalTransition {}

impl From<IllegalTransition> for ForgeError {
    fn from(e: IllegalTransition) -> Self {
        ForgeError::InvalidStateTransition {
            from: e.from.to_string(),
            to: e.to.to_string(),
        }
    }
}

/// Tracks the infra existence check and its transition log.
pub struct InfraStateMachine {
    current: InfraState,
    created_at: Instant,
    transitions: Vec<TransitionRecord>,
}

impl InfraStateMachine {
    pub fn new() -> Self {
        Self {
            current: InfraState::LocalInit,
            created_at: Instant::now(),
            transitions: Vec::new(),
        }
    }

    pub fn current(&self) -> InfraState {
        self.current
    }

    /// Attempt to advance to the next state.
    pub fn advance(&mut self, to: InfraState, reason: Option<&str>) -> Result<(), IllegalTransition> {
        if !is_legal_transition(self.current, to) {
            return Err(IllegalTransition {
                from: self.current,
                to,
            });
        }

        let record = TransitionRecord {
            from: self.current,
            to,
            elapsed_ms: self.created_at.elapsed().as_millis() as u64,
            reason: reason.map(String::from),
        };

        tracing::debug!(from = %self.current, to = %to, "Infra state transition");

        self.transitions.push(record);
        self.current = to;
        Ok(())
    }

    /// Transition to `Failed` from any non-terminal state.
    pub fn fail(&mut self, reason: &str) -> Result<(), IllegalTransition> {
        self.advance(InfraState::Failed, Some(reason))
    }

    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    /// Whether the run went through `state`
    pub fn visited(&self, state: InfraState) -> bool {
        self.transitions.iter().any(|t| t.to == state)
    }

    pub fn summary(&self) -> String {
        let states: Vec<String> = self.transitions.iter().map(|t| t.to.to_string()).collect();
        let mut summary = format!(
            "{} → {} ({}ms, {} transitions)",
            InfraState::LocalInit,
            self.current,
            self.created_at.elapsed().as_millis(),
            self.transitions.len(),
        );
        if !states.is_empty() {
            summary.push_str(&format!(" [{}]", states.join(" → ")));
        }
        summary
    }
}

impl Default for InfraStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
