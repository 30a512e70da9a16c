//! Executes coordinator effects against a view and an outbound transport.
//!
//! All handlers are synchronous and take `&mut self`, so fragments delivered
//! back-to-back are processed strictly one after another, in arrival order.

use crate::coordinator::{Controls, Effect, Event, GenerationCoordinator, GenerationState};
use crate::error::Result;
use crate::fragment::Fragment;

/// The parts of the chat UI the coordinator drives.
pub trait ChatView {
    fn clear_input(&mut self);
    fn reset_input_height(&mut self);
    fn set_controls(&mut self, controls: Controls);
    fn focus_input(&mut self);
    /// Number of messages currently in the message list.
    fn message_count(&self) -> usize;
    fn apply_fragment(&mut self, fragment: &Fragment);
    fn scroll_to_bottom(&mut self);
}

/// Outbound half of the connection.
pub trait Transport {
    fn send_message(&mut self, text: &str) -> Result<()>;
    fn send_stop(&mut self) -> Result<()>;
}

/// What happened to a received fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Applied,
    Rejected,
}

pub struct ChatSession<V, T> {
    coordinator: GenerationCoordinator,
    view: V,
    transport: T,
    marker: String,
}

impl<V: ChatView, T: Transport> ChatSession<V, T> {
    pub fn new(view: V, transport: T, marker: impl Into<String>) -> Self {
        Self {
            coordinator: GenerationCoordinator::new(),
            view,
            transport,
            marker: marker.into(),
        }
    }

    pub fn state(&self) -> GenerationState {
        self.coordinator.state()
    }

    pub fn controls(&self) -> Controls {
        self.coordinator.controls()
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut V {
        &mut self.view
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn send(&mut self, text: &str) {
        self.dispatch(Event::SendRequested(text.to_string()));
    }

    pub fn stop(&mut self) {
        self.dispatch(Event::StopRequested);
    }

    pub fn transport_failed(&mut self) {
        self.dispatch(Event::TransportFailed);
    }

    pub fn stalled(&mut self) {
        self.dispatch(Event::Stalled);
    }

    /// Gate and, if allowed, render one pushed fragment.
    pub fn receive_fragment(&mut self, raw: &str) -> Disposition {
        let fragment = Fragment::parse(raw, &self.marker);
        let event = Event::FragmentIncoming {
            continuation: fragment.continuation(),
            list_len: self.view.message_count(),
        };
        let effects = self.coordinator.handle(event);

        let mut disposition = Disposition::Rejected;
        for effect in effects {
            match effect {
                Effect::ApplyFragment => {
                    self.view.apply_fragment(&fragment);
                    disposition = Disposition::Applied;
                }
                Effect::RejectFragment => {
                    tracing::debug!("fragment suppressed after stop");
                }
                other => self.perform(other),
            }
        }

        if disposition == Disposition::Applied {
            self.dispatch(Event::FragmentApplied);
        }
        disposition
    }

    fn dispatch(&mut self, event: Event) {
        for effect in self.coordinator.handle(event) {
            self.perform(effect);
        }
    }

    fn perform(&mut self, effect: Effect) {
        match effect {
            Effect::ClearInput => self.view.clear_input(),
            Effect::ResetInputHeight => self.view.reset_input_height(),
            Effect::SetControls(controls) => self.view.set_controls(controls),
            Effect::FocusInput => self.view.focus_input(),
            Effect::ScrollToBottom => self.view.scroll_to_bottom(),
            Effect::Transmit(text) => {
                if let Err(e) = self.transport.send_message(&text) {
                    tracing::warn!(error = %e, "message not delivered");
                    self.dispatch(Event::TransportFailed);
                }
            }
            Effect::SendStop => {
                if let Err(e) = self.transport.send_stop() {
                    tracing::warn!(error = %e, "stop signal not delivered");
                    self.dispatch(Event::TransportFailed);
                }
            }
            // Verdicts only make sense for a fragment in hand.
            Effect::ApplyFragment | Effect::RejectFragment => {}
        }
    }
}
