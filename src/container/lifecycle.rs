//! The container state machine (spec §3, §4.2).

use serde::{Deserialize, Serialize};

/// Lifecycle state. Transitions form a DAG: Stopped→Starting→{Running,
/// Dead}; Running↔Paused; Running→Dead; any→Stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum State {
    Stopped,
    Starting,
    Running,
    Paused,
    /// A container with no command, used purely as a hierarchy/namespace
    /// anchor.
    Meta,
    Dead,
}

impl State {
    /// True while the container owns a live task pid (spec §8 invariant:
    /// `State ∈ {Starting, Running, Paused, Meta} ⇒ pid is a live child`).
    pub fn has_task(self) -> bool {
        matches!(self, State::Starting | State::Running | State::Paused | State::Meta)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            State::Stopped => "stopped",
            State::Starting => "starting",
            State::Running => "running",
            State::Paused => "paused",
            State::Meta => "meta",
            State::Dead => "dead",
        }
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lifecycle event that can drive a state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Start,
    ChildExitClean,
    ChildExitError,
    ChildExitNone,
    Stop,
    Pause,
    Resume,
    Kill,
}

/// Validate and compute the next state for `(state, trigger)`, per the
/// table in spec §4.2. Returns `None` for an illegal transition.
pub fn transition(state: State, trigger: Trigger) -> Option<State> {
    use State::*;
    use Trigger::*;
    match (state, trigger) {
        (Stopped, Start) | (Dead, Start) => Some(Starting),
        (Starting, ChildExitNone) => Some(Meta),
        (Starting, ChildExitClean) => Some(Running),
        (Starting, ChildExitError) => Some(Dead),
        (Running, ChildExitClean) | (Running, ChildExitError) => Some(Dead),
        (Meta, ChildExitClean) | (Meta, ChildExitError) => Some(Dead),
        (Running, Stop) | (Starting, Stop) | (Paused, Stop) | (Meta, Stop) | (Dead, Stop) | (Stopped, Stop) => {
            Some(Stopped)
        }
        (Running, Pause) => Some(Paused),
        (Paused, Resume) => Some(Running),
        // Kill just delivers a signal; the resulting state change always
        // arrives later via a ChildExit trigger, never directly.
        (Running, Kill) => Some(Running),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stopped_to_starting_on_start() {
        assert_eq!(transition(State::Stopped, Trigger::Start), Some(State::Starting));
    }

    #[test]
    fn paused_cannot_start() {
        assert_eq!(transition(State::Paused, Trigger::Start), None);
    }

    #[test]
    fn running_pauses_and_resumes() {
        assert_eq!(transition(State::Running, Trigger::Pause), Some(State::Paused));
        assert_eq!(transition(State::Paused, Trigger::Resume), Some(State::Running));
    }

    #[test]
    fn any_state_stops() {
        for s in [State::Stopped, State::Starting, State::Running, State::Paused, State::Meta, State::Dead] {
            assert_eq!(transition(s, Trigger::Stop), Some(State::Stopped));
        }
    }

    #[test]
    fn dead_restarts() {
        assert_eq!(transition(State::Dead, Trigger::Start), Some(State::Starting));
    }
}
