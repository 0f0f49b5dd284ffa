pub mod controller;
pub mod domain;
pub mod orchestrator;
pub mod parser;
pub mod persona;
pub mod ports;
pub mod session;
pub mod store;
pub mod voice;

pub use controller::{ConfirmationState, ModeTransitionController, Routing, SpeechCapabilities, Tool, Transition};
pub use domain::{
    Gender, Message, PersonaMode, Playlist, ProfileError, Recipe, Sender, SessionBundle, Song,
    StructuredPayload, Task, UserProfile,
};
pub use orchestrator::{GenerationOrchestrator, GenerationOutcome, GenerationRequest, RawGeneration};
pub use persona::GenerationConfig;
pub use ports::{
    BundleStore, GeneratedImage, GenerationService, HistoryTurn, PortError, PortResult, Role,
    SpeechToTextService, TextToSpeechService,
};
pub use session::{ChatSession, InputSource, SessionSnapshot, SubmitOutcome};
pub use store::MessageStore;
pub use voice::{VoiceEffect, VoiceSessionController, VoiceSignal, VoiceState};
