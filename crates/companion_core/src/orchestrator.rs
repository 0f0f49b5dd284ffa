//! crates/companion_core/src/orchestrator.rs
//!
//! The generation orchestrator. Turns conversational content into a provider
//! request, runs it, and converts the result into the assistant message and the
//! side effects the session must apply.
//!
//! The work is split in three steps so the caller can release its session lock
//! while the provider call is outstanding:
//! `prepare` (synchronous, guarded) → `execute` (async) → `resolve` (synchronous).

use crate::domain::{Message, PersonaMode, Sender, StructuredPayload, UserProfile};
use crate::parser::{parse, ParsedResponse};
use crate::persona::{
    config_for, fallback_error_for, instruction_for, shape_for, GenerationConfig, ResponseShape,
    StructuredSchema,
};
use crate::ports::{GeneratedImage, GenerationService, HistoryTurn, PortError, PortResult, Role};
use chrono::NaiveDate;
use std::time::Instant;
use tracing::{error, info, warn};

//=========================================================================================
// Fixed Copy
//=========================================================================================

pub const ARTIST_CAPTION: &str = "Aqui está a tua obra de arte! 🎨✨";
pub const CHEF_CAPTION: &str = "Aqui está uma receita super fofa que criei para ti! 🍳";
pub const DJ_CAPTION: &str = "Tcharam! ✨ A tua playlist personalizada está pronta!";
pub const STRUCTURED_APOLOGY: &str = "Ups! A minha criatividade deu um nó. 😅 Podes tentar de novo, por favor?";
pub const COUNSELOR_APOLOGY: &str = "Peço desculpa, tive uma dificuldade técnica. Podes reformular o que disseste?";
pub const EMPTY_REPLY_FILLER: &str = "Hmm, fiquei sem palavras. 😅 Tenta outra vez?";
pub const CONNECTIVITY_BANNER: &str =
    "Oh não! 🥺 Tive um probleminha. Verifica a tua chave de API e a ligação à internet.";

//=========================================================================================
// Types
//=========================================================================================

/// Identifies one in-flight generation; results carrying any other ticket are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationTicket(u64);

/// Everything the provider call needs, captured at send time.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub ticket: GenerationTicket,
    /// The mode active when the message was sent; the reply lands in its thread.
    pub mode: PersonaMode,
    pub instruction: String,
    pub config: GenerationConfig,
    pub shape: ResponseShape,
    pub history: Vec<HistoryTurn>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RawGeneration {
    Text(String),
    Image(GeneratedImage),
}

/// The assistant message produced for a request plus the side effects it implies.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOutcome {
    pub mode: PersonaMode,
    pub message: Message,
    /// Counselor replies only: whether the breathing exercise should be offered.
    pub anxiety_detected: Option<bool>,
    /// Set only when the provider call itself failed.
    pub banner: Option<&'static str>,
    /// Whether the reply should be revealed with the typing animation.
    pub reveal: bool,
    /// Text to read aloud in live mode.
    pub speak: Option<String>,
}

//=========================================================================================
// Orchestrator
//=========================================================================================

#[derive(Debug, Default)]
pub struct GenerationOrchestrator {
    next_ticket: u64,
    in_flight: Option<GenerationTicket>,
}

impl GenerationOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Builds the request for `text`. Returns `None` while another generation is
    /// in flight. `thread` must not yet contain the new user message.
    pub fn prepare(
        &mut self,
        mode: PersonaMode,
        profile: &UserProfile,
        text: &str,
        thread: &[Message],
        today: NaiveDate,
    ) -> Option<GenerationRequest> {
        if self.in_flight.is_some() {
            warn!(%mode, "Generation already in flight; request rejected");
            return None;
        }

        self.next_ticket += 1;
        let ticket = GenerationTicket(self.next_ticket);
        self.in_flight = Some(ticket);

        Some(GenerationRequest {
            ticket,
            mode,
            instruction: instruction_for(mode, profile, today),
            config: config_for(mode),
            shape: shape_for(mode),
            history: build_history(thread),
            text: text.to_string(),
        })
    }

    /// Calls the provider. Image modes use the user text as the image description.
    pub async fn execute(
        service: &dyn GenerationService,
        request: &GenerationRequest,
    ) -> PortResult<RawGeneration> {
        let start = Instant::now();
        let result = match request.shape {
            ResponseShape::Image => service.generate_image(&request.text).await.map(RawGeneration::Image),
            ResponseShape::PlainText | ResponseShape::Structured(_) => service
                .generate_text(&request.instruction, &request.config, &request.history, &request.text)
                .await
                .map(RawGeneration::Text),
        };
        info!(mode = %request.mode, elapsed = ?start.elapsed(), ok = result.is_ok(), "Generation finished");
        result
    }

    /// Converts the provider result into an outcome and clears the in-flight
    /// flag. Returns `None` when the request is no longer the one in flight.
    pub fn resolve(
        &mut self,
        request: &GenerationRequest,
        result: PortResult<RawGeneration>,
    ) -> Option<GenerationOutcome> {
        if self.in_flight != Some(request.ticket) {
            warn!(mode = %request.mode, "Discarding stale generation result");
            return None;
        }
        self.in_flight = None;

        let outcome = match result {
            Ok(RawGeneration::Image(image)) => Self::image_outcome(request.mode, image),
            Ok(RawGeneration::Text(raw)) => Self::text_outcome(request, raw),
            Err(e) => Self::failure_outcome(request.mode, e),
        };
        Some(outcome)
    }

    /// Forgets the in-flight request, e.g. on logout.
    pub fn abandon(&mut self) {
        self.in_flight = None;
    }

    fn image_outcome(mode: PersonaMode, image: GeneratedImage) -> GenerationOutcome {
        GenerationOutcome {
            mode,
            message: Message::assistant(ARTIST_CAPTION).with_image(image.into_image_url()),
            anxiety_detected: None,
            banner: None,
            reveal: false,
            speak: None,
        }
    }

    fn text_outcome(request: &GenerationRequest, raw: String) -> GenerationOutcome {
        let mode = request.mode;
        let mut anxiety_detected = None;

        let (message, reveal) = match parse(&raw, request.shape) {
            Ok(ParsedResponse::Recipe(recipe)) => (
                Message::assistant(CHEF_CAPTION).with_payload(StructuredPayload::Recipe(recipe)),
                false,
            ),
            Ok(ParsedResponse::Playlist(playlist)) => (
                Message::assistant(DJ_CAPTION).with_payload(StructuredPayload::Playlist(playlist)),
                false,
            ),
            Ok(ParsedResponse::Counselor(reply)) if !reply.response_text.trim().is_empty() => {
                anxiety_detected = Some(reply.anxiety_detected);
                (Message::assistant(reply.response_text), true)
            }
            Ok(ParsedResponse::Counselor(_)) => {
                warn!(%mode, raw = %raw, "Counselor reply had an empty response text");
                anxiety_detected = Some(false);
                (Message::assistant(COUNSELOR_APOLOGY), true)
            }
            Ok(ParsedResponse::Text(text)) => {
                let text = if text.trim().is_empty() {
                    EMPTY_REPLY_FILLER.to_string()
                } else {
                    text
                };
                (Message::assistant(text), true)
            }
            Err(malformed) => {
                warn!(%mode, reason = %malformed.reason, raw = %raw, "Malformed structured reply");
                match request.shape {
                    ResponseShape::Structured(StructuredSchema::Counselor) => {
                        anxiety_detected = Some(false);
                        (Message::assistant(COUNSELOR_APOLOGY), true)
                    }
                    _ => (Message::assistant(STRUCTURED_APOLOGY), false),
                }
            }
        };

        Self::with_voice(mode, message, anxiety_detected, None, reveal)
    }

    fn failure_outcome(mode: PersonaMode, e: PortError) -> GenerationOutcome {
        error!(%mode, error = %e, "Generation service call failed");
        let message = Message::assistant(fallback_error_for(mode));
        Self::with_voice(mode, message, None, Some(CONNECTIVITY_BANNER), false)
    }

    /// Live mode reads replies aloud instead of revealing them.
    fn with_voice(
        mode: PersonaMode,
        message: Message,
        anxiety_detected: Option<bool>,
        banner: Option<&'static str>,
        reveal: bool,
    ) -> GenerationOutcome {
        let live = mode == PersonaMode::Live;
        GenerationOutcome {
            mode,
            speak: live.then(|| message.text.clone()),
            reveal: reveal && !live,
            message,
            anxiety_detected,
            banner,
        }
    }
}

/// Translates a thread into provider turns.
///
/// Messages with a structured payload cannot be replayed as conversation and are
/// skipped, as are assistant messages before the first user message.
pub fn build_history(thread: &[Message]) -> Vec<HistoryTurn> {
    thread
        .iter()
        .skip_while(|message| !message.is_from_user())
        .filter(|message| message.structured_payload.is_none())
        .map(|message| HistoryTurn {
            role: match message.sender {
                Sender::User => Role::User,
                Sender::Assistant => Role::Model,
            },
            text: message.text.clone(),
        })
        .collect()
}
