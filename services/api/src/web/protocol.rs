//! services/api/src/web/protocol.rs
//!
//! Defines the wire formats between the browser client and the API server: the
//! REST payloads, and the WebSocket messages that drive live mode.

use chrono::{DateTime, NaiveDate, Utc};
use companion_core::{
    voice::VoiceSignal, ChatSession, ConfirmationState, Gender, Message, PersonaMode, Sender,
    SessionSnapshot, Task, VoiceEffect, VoiceState,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;
use uuid::Uuid;

//=========================================================================================
// REST Request Payloads
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct ProfileRequest {
    pub name: String,
    /// One of "Masculino", "Feminino", "Não-binário", "Prefiro não dizer".
    #[schema(value_type = String)]
    pub gender: Gender,
    pub birth_date: NaiveDate,
}

#[derive(Deserialize, ToSchema)]
pub struct SubmitRequest {
    pub text: String,
}

#[derive(Deserialize, ToSchema)]
pub struct SelectToolRequest {
    /// "diary" or a persona mode identifier.
    pub tool: String,
}

/// Body for diary entries, notes and new tasks.
#[derive(Deserialize, ToSchema)]
pub struct TextRequest {
    pub text: String,
}

//=========================================================================================
// REST Response Payloads
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct MessageView {
    pub id: Uuid,
    pub text: String,
    /// "user" or "assistant".
    pub sender: String,
    pub image_url: Option<String>,
    /// `{ "kind": "recipe" | "playlist", "data": {...} }`
    #[schema(value_type = Option<Object>)]
    pub structured_payload: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl From<&Message> for MessageView {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id,
            text: message.text.clone(),
            sender: match message.sender {
                Sender::User => "user",
                Sender::Assistant => "assistant",
            }
            .to_string(),
            image_url: message.image_url.clone(),
            structured_payload: message
                .structured_payload
                .as_ref()
                .and_then(|payload| serde_json::to_value(payload).ok()),
            created_at: message.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ThreadView {
    pub mode: String,
    pub messages: Vec<MessageView>,
}

impl ThreadView {
    pub fn of(session: &ChatSession, mode: PersonaMode) -> Self {
        Self {
            mode: mode.to_string(),
            messages: session.thread(mode).iter().map(MessageView::from).collect(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ProfileView {
    pub name: String,
    #[schema(value_type = String)]
    pub gender: Gender,
    pub birth_date: NaiveDate,
}

/// The client-facing session state; threads are fetched separately.
#[derive(Serialize, ToSchema)]
pub struct SessionView {
    pub profile: Option<ProfileView>,
    pub mode: String,
    /// "none" or "pending_counselor_exit".
    #[schema(value_type = String)]
    pub confirmation: ConfirmationState,
    pub banner: Option<String>,
    pub generating: bool,
    pub revealing: bool,
    pub tools_menu_open: bool,
    pub diary_open: bool,
    pub anxiety_tool_visible: bool,
    pub breathing_open: bool,
    pub celebrate: bool,
    /// "idle", "listening" or "speaking".
    #[schema(value_type = String)]
    pub voice: VoiceState,
    pub live_available: bool,
    pub revision: u64,
}

impl From<SessionSnapshot> for SessionView {
    fn from(snapshot: SessionSnapshot) -> Self {
        Self {
            profile: snapshot.profile.map(|profile| ProfileView {
                name: profile.name,
                gender: profile.gender,
                birth_date: profile.birth_date,
            }),
            mode: snapshot.mode.to_string(),
            confirmation: snapshot.confirmation,
            banner: snapshot.banner,
            generating: snapshot.generating,
            revealing: snapshot.revealing,
            tools_menu_open: snapshot.tools_menu_open,
            diary_open: snapshot.diary_open,
            anxiety_tool_visible: snapshot.anxiety_tool_visible,
            breathing_open: snapshot.breathing_open,
            celebrate: snapshot.celebrate,
            voice: snapshot.voice,
            live_available: snapshot.live_available,
            revision: snapshot.revision,
        }
    }
}

/// What happened to a submitted message.
#[derive(Serialize, ToSchema, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubmitStatus {
    Ignored,
    Handled,
    Generating,
}

#[derive(Serialize, ToSchema)]
pub struct SubmitResponse {
    pub status: SubmitStatus,
    pub session: SessionView,
    /// The thread the message landed in.
    pub thread: ThreadView,
}

#[derive(Serialize, ToSchema)]
pub struct EditResponse {
    /// The removed user text, to be put back into the input box.
    pub text: Option<String>,
    pub thread: ThreadView,
}

#[derive(Serialize, ToSchema)]
pub struct TaskView {
    pub id: Uuid,
    pub text: String,
    pub completed: bool,
}

impl From<&Task> for TaskView {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id,
            text: task.text.clone(),
            completed: task.completed,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct DiaryView {
    /// Entries keyed by ISO date.
    pub entries: BTreeMap<String, String>,
    pub notes: String,
    pub tasks: Vec<TaskView>,
}

impl DiaryView {
    pub fn of(session: &ChatSession) -> Self {
        Self {
            entries: session.diary_entries().clone(),
            notes: session.notes().to_string(),
            tasks: session.tasks().iter().map(TaskView::from).collect(),
        }
    }
}

//=========================================================================================
// Messages Sent FROM the Client (Browser) TO the Server
//=========================================================================================
// NOTE: Microphone audio is sent as raw Binary frames (mono PCM16), not as part of
// this enum. It is transcribed when recognition ends.
//=========================================================================================

/// Speech signals reported by the browser during live mode.
#[derive(Deserialize, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// A transcript produced by client-side recognition.
    Transcript { text: String },
    /// Recognition stopped. Buffered audio, if any, is transcribed server side.
    RecognitionEnded,
    RecognitionFailed { error: String },
    SpeechStarted,
    SpeechEnded,
    SpeechFailed,
    /// Playback of server-synthesized audio finished.
    AudioEnded,
}

/// Recognition errors that only mean nobody spoke.
const BENIGN_RECOGNITION_ERRORS: [&str; 2] = ["no-speech", "aborted"];

impl ClientMessage {
    /// Translates a client message into a core voice signal. `RecognitionEnded`
    /// is handled by the socket loop because it may carry buffered audio.
    pub fn into_signal(self) -> Option<VoiceSignal> {
        match self {
            ClientMessage::Transcript { text } => Some(VoiceSignal::Transcript(text)),
            ClientMessage::RecognitionEnded => None,
            ClientMessage::RecognitionFailed { error } => Some(VoiceSignal::RecognitionFailed {
                benign: BENIGN_RECOGNITION_ERRORS.contains(&error.as_str()),
            }),
            ClientMessage::SpeechStarted => Some(VoiceSignal::SpeechStarted),
            ClientMessage::SpeechEnded | ClientMessage::AudioEnded => Some(VoiceSignal::SpeechEnded),
            ClientMessage::SpeechFailed => Some(VoiceSignal::SpeechFailed),
        }
    }
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client (Browser)
//=========================================================================================
// NOTE: Synthesized speech is sent as raw Binary frames right after `Speak`.
//=========================================================================================

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    StartListening,
    StopListening,
    /// The companion is about to speak `text`.
    Speak { text: String },
    CancelSpeech,
    /// A thread changed; the client should refetch it.
    ThreadUpdated { mode: String },
    /// A user-visible error, already phrased for display.
    Error { message: String },
}

impl From<VoiceEffect> for ServerMessage {
    fn from(effect: VoiceEffect) -> Self {
        match effect {
            VoiceEffect::StartListening => ServerMessage::StartListening,
            VoiceEffect::StopListening => ServerMessage::StopListening,
            VoiceEffect::Speak(text) => ServerMessage::Speak { text },
            VoiceEffect::CancelSpeech => ServerMessage::CancelSpeech,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_messages_are_tagged_by_type() {
        let parsed: ClientMessage = serde_json::from_str(r#"{"type":"transcript","text":"olá"}"#).unwrap();
        assert_eq!(parsed, ClientMessage::Transcript { text: "olá".into() });
        let parsed: ClientMessage = serde_json::from_str(r#"{"type":"audio_ended"}"#).unwrap();
        assert_eq!(parsed.into_signal(), Some(VoiceSignal::SpeechEnded));
    }

    #[test]
    fn silence_is_a_benign_recognition_error() {
        let silence = ClientMessage::RecognitionFailed { error: "no-speech".into() };
        assert_eq!(silence.into_signal(), Some(VoiceSignal::RecognitionFailed { benign: true }));
        let denied = ClientMessage::RecognitionFailed { error: "not-allowed".into() };
        assert_eq!(denied.into_signal(), Some(VoiceSignal::RecognitionFailed { benign: false }));
    }

    #[test]
    fn server_messages_serialize_with_snake_case_tags() {
        let json = serde_json::to_string(&ServerMessage::from(VoiceEffect::Speak("Olá".into()))).unwrap();
        assert_eq!(json, r#"{"type":"speak","text":"Olá"}"#);
        let json = serde_json::to_string(&ServerMessage::ThreadUpdated { mode: "live".into() }).unwrap();
        assert_eq!(json, r#"{"type":"thread_updated","mode":"live"}"#);
    }
}
