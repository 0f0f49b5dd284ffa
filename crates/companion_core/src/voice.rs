//! crates/companion_core/src/voice.rs
//!
//! The live-mode voice session. An explicit three-state machine that turns
//! speech signals into effects for whoever owns the microphone and speaker.

use serde::Serialize;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceState {
    #[default]
    Idle,
    Listening,
    Speaking,
}

/// A command for the speech layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceEffect {
    StartListening,
    StopListening,
    Speak(String),
    CancelSpeech,
}

/// A notification from the speech layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceSignal {
    Transcript(String),
    /// Recognition stopped without producing a transcript.
    RecognitionEnded,
    /// `benign` covers silence timeouts and aborted sessions.
    RecognitionFailed { benign: bool },
    SpeechStarted,
    SpeechEnded,
    SpeechFailed,
}

/// What the owner of the session must do after a signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalOutcome {
    Handled,
    /// Submit this text as voice-sourced input.
    Transcript(String),
    /// Recognition failed for a reason worth telling the user about.
    RecognitionError,
}

#[derive(Debug, Clone, Default)]
pub struct VoiceSessionController {
    active: bool,
    state: VoiceState,
    /// The text being read aloud while `Speaking`.
    utterance: Option<String>,
    effects: Vec<VoiceEffect>,
}

impl VoiceSessionController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn state(&self) -> VoiceState {
        self.state
    }

    /// Starts the session, speaking `greeting` first if given.
    pub fn activate(&mut self, greeting: Option<String>) {
        self.active = true;
        match greeting {
            Some(text) => self.speak(text),
            None => self.start_listening(),
        }
    }

    /// Ends the session. Always cancels speech and stops recognition.
    pub fn deactivate(&mut self) {
        self.active = false;
        self.state = VoiceState::Idle;
        self.utterance = None;
        self.effects.push(VoiceEffect::CancelSpeech);
        self.effects.push(VoiceEffect::StopListening);
    }

    /// Reads `text` aloud. Blank text goes straight back to listening.
    pub fn speak(&mut self, text: String) {
        if !self.active || self.state == VoiceState::Speaking {
            return;
        }
        if text.trim().is_empty() {
            self.start_listening();
            return;
        }
        self.stop_listening();
        self.state = VoiceState::Speaking;
        self.utterance = Some(text.clone());
        self.effects.push(VoiceEffect::Speak(text));
    }

    /// Stops the microphone for input that did not come from it.
    pub fn interrupt_listening(&mut self) {
        self.stop_listening();
    }

    /// Reopens the microphone after a transcript that produced no reply.
    pub fn resume_listening(&mut self) {
        self.start_listening();
    }

    /// The effects that bring a newly attached speech layer up to date.
    pub fn replay_effects(&self) -> Vec<VoiceEffect> {
        match (self.state, &self.utterance) {
            (VoiceState::Speaking, Some(text)) => vec![VoiceEffect::Speak(text.clone())],
            (VoiceState::Listening, _) => vec![VoiceEffect::StartListening],
            _ => Vec::new(),
        }
    }

    pub fn on_signal(&mut self, signal: VoiceSignal, generation_in_flight: bool) -> SignalOutcome {
        debug!(?signal, state = ?self.state, "Voice signal");
        match signal {
            VoiceSignal::Transcript(text) => {
                if self.state != VoiceState::Listening {
                    return SignalOutcome::Handled;
                }
                // Recognition already stopped itself; no StopListening needed.
                self.state = VoiceState::Idle;
                if text.trim().is_empty() {
                    SignalOutcome::Handled
                } else {
                    SignalOutcome::Transcript(text)
                }
            }
            VoiceSignal::RecognitionEnded => {
                if self.state == VoiceState::Listening {
                    self.state = VoiceState::Idle;
                }
                if self.state == VoiceState::Idle && !generation_in_flight {
                    self.start_listening();
                }
                SignalOutcome::Handled
            }
            VoiceSignal::RecognitionFailed { benign } => {
                if self.state == VoiceState::Listening {
                    self.state = VoiceState::Idle;
                }
                if benign {
                    SignalOutcome::Handled
                } else {
                    warn!("Speech recognition failed");
                    SignalOutcome::RecognitionError
                }
            }
            VoiceSignal::SpeechStarted => SignalOutcome::Handled,
            VoiceSignal::SpeechEnded | VoiceSignal::SpeechFailed => {
                if self.state == VoiceState::Speaking {
                    self.state = VoiceState::Idle;
                    self.utterance = None;
                    self.start_listening();
                }
                SignalOutcome::Handled
            }
        }
    }

    /// Takes the effects emitted since the last call.
    pub fn drain_effects(&mut self) -> Vec<VoiceEffect> {
        std::mem::take(&mut self.effects)
    }

    fn start_listening(&mut self) {
        if !self.active || self.state != VoiceState::Idle {
            return;
        }
        self.state = VoiceState::Listening;
        self.effects.push(VoiceEffect::StartListening);
    }

    fn stop_listening(&mut self) {
        if self.state == VoiceState::Listening {
            self.state = VoiceState::Idle;
            self.effects.push(VoiceEffect::StopListening);
        }
    }
}
