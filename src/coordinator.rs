//! Generation lifecycle for one chat view.
//!
//! The coordinator is the only thing allowed to decide whether a pushed
//! fragment reaches the message list and whether the send/input controls are
//! enabled. It is a plain state machine: feed it an [`Event`], get back the
//! [`Effect`]s to perform, in order. It never touches a view or a socket
//! itself, which keeps it testable without either.
//!
//! ## Phases
//! - `Idle`: nothing in flight, controls enabled.
//! - `Submitted`: a message went out, no reply fragment seen yet.
//! - `Generating`: reply fragments are arriving and being applied.
//! - `Cancelling`: the user asked to stop; fragments keep arriving but are
//!   rejected until the terminal one.
//!
//! Only a terminal fragment, a transport failure or a stall returns to
//! `Idle`. Stopping is advisory: the server decides when the turn ends.

use crate::fragment::Continuation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Submitted,
    Generating,
    Cancelling,
}

/// The generation state. `allow_swaps == false` can only occur while
/// generating because it is derived from the `Cancelling` phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GenerationState {
    phase: Phase,
}

impl GenerationState {
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn generating(&self) -> bool {
        self.phase != Phase::Idle
    }

    pub fn allow_swaps(&self) -> bool {
        self.phase != Phase::Cancelling
    }
}

/// Enabled flags of the send button and the input box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Controls {
    pub send_enabled: bool,
    pub input_enabled: bool,
}

impl Controls {
    pub const ENABLED: Controls = Controls {
        send_enabled: true,
        input_enabled: true,
    };
    pub const DISABLED: Controls = Controls {
        send_enabled: false,
        input_enabled: false,
    };
}

impl Default for Controls {
    fn default() -> Self {
        Controls::ENABLED
    }
}

/// Inputs to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The user pressed send with this text.
    SendRequested(String),
    /// The user pressed stop.
    StopRequested,
    /// A fragment arrived and is about to be applied. `list_len` is the
    /// number of messages currently in the list.
    FragmentIncoming {
        continuation: Continuation,
        list_len: usize,
    },
    /// A fragment that was not rejected has been rendered.
    FragmentApplied,
    /// The outbound channel failed or the connection dropped.
    TransportFailed,
    /// No fragment arrived within the stall timeout.
    Stalled,
}

/// Side effects requested by the coordinator, to be performed in order.
/// `Transmit` and `SendStop` are always last so a delivery failure can be
/// fed back without later effects undoing the reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    ClearInput,
    ResetInputHeight,
    Transmit(String),
    SendStop,
    SetControls(Controls),
    FocusInput,
    ApplyFragment,
    RejectFragment,
    ScrollToBottom,
}

#[derive(Debug, Default)]
pub struct GenerationCoordinator {
    state: GenerationState,
    controls: Controls,
}

impl GenerationCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> GenerationState {
        self.state
    }

    pub fn controls(&self) -> Controls {
        self.controls
    }

    /// Advance the state machine by one event.
    pub fn handle(&mut self, event: Event) -> Vec<Effect> {
        let before = self.state.phase;
        let effects = match event {
            Event::SendRequested(text) => self.on_send(text),
            Event::StopRequested => self.on_stop(),
            Event::FragmentIncoming {
                continuation,
                list_len,
            } => self.on_fragment_incoming(continuation, list_len),
            Event::FragmentApplied => vec![Effect::ScrollToBottom],
            Event::TransportFailed | Event::Stalled => {
                if self.state.generating() {
                    tracing::warn!(phase = ?before, "turn abandoned, restoring idle");
                    self.finish()
                } else {
                    Vec::new()
                }
            }
        };
        if before != self.state.phase {
            tracing::debug!(from = ?before, to = ?self.state.phase, "generation phase changed");
        }
        effects
    }

    fn on_send(&mut self, text: String) -> Vec<Effect> {
        if self.state.phase != Phase::Idle {
            tracing::debug!(phase = ?self.state.phase, "send ignored while a turn is in flight");
            return Vec::new();
        }
        if text.trim().is_empty() {
            return Vec::new();
        }
        self.state.phase = Phase::Submitted;
        self.controls = Controls::DISABLED;
        vec![
            Effect::ClearInput,
            Effect::ResetInputHeight,
            Effect::SetControls(Controls::DISABLED),
            Effect::Transmit(text),
        ]
    }

    fn on_stop(&mut self) -> Vec<Effect> {
        match self.state.phase {
            Phase::Submitted | Phase::Generating => {
                self.state.phase = Phase::Cancelling;
                vec![Effect::SendStop]
            }
            Phase::Idle | Phase::Cancelling => Vec::new(),
        }
    }

    fn on_fragment_incoming(&mut self, continuation: Continuation, list_len: usize) -> Vec<Effect> {
        let phase = self.state.phase;

        // A fragment landing in an empty list belongs to no turn we know of.
        if list_len == 0 && matches!(phase, Phase::Idle | Phase::Submitted) {
            return vec![Effect::ApplyFragment];
        }

        let mut effects = Vec::with_capacity(4);
        if phase == Phase::Cancelling {
            effects.push(Effect::RejectFragment);
        } else {
            self.state.phase = Phase::Generating;
            effects.push(Effect::ApplyFragment);
        }
        if self.controls != Controls::DISABLED {
            self.controls = Controls::DISABLED;
            effects.push(Effect::SetControls(Controls::DISABLED));
        }

        if continuation.is_terminal() {
            effects.extend(self.finish());
        }
        effects
    }

    fn finish(&mut self) -> Vec<Effect> {
        self.state.phase = Phase::Idle;
        self.controls = Controls::ENABLED;
        vec![Effect::SetControls(Controls::ENABLED), Effect::FocusInput]
    }
}
