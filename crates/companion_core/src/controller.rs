//! crates/companion_core/src/controller.rs
//!
//! The mode transition controller. Classifies each outgoing user text as a
//! command or as conversational content, gates mode transitions (including the
//! yes/no confirmation before leaving counselor mode) and decides which thread
//! receives what.

use crate::domain::{Message, PersonaMode, UserProfile};
use crate::persona::greeting_for;
use crate::store::MessageStore;
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;
use tracing::{debug, info};

//=========================================================================================
// Command Vocabulary
//=========================================================================================

static TOOLS_MENU: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"abrir ferramentas|ferramentas|menu").expect("static regex"));

static DIARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"diário|diario|tarefas|fazeres").expect("static regex"));

static MODE_SWITCH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:sofi\s)?modo\s(psic[óo]loga|artista|chef|dj|coding|fofa|conversa|ao vivo)$")
        .expect("static regex")
});

const EXIT_WORDS: [&str; 2] = ["sair", "voltar"];
const LIVE_EXIT_WORDS: [&str; 2] = ["sair", "desligar"];

fn mode_for_name(name: &str) -> Option<PersonaMode> {
    match name {
        "psicóloga" | "psicologa" => Some(PersonaMode::Counselor),
        "artista" => Some(PersonaMode::Artist),
        "chef" => Some(PersonaMode::Chef),
        "dj" => Some(PersonaMode::Dj),
        "coding" => Some(PersonaMode::Coding),
        "fofa" | "conversa" => Some(PersonaMode::Companion),
        "ao vivo" => Some(PersonaMode::Live),
        _ => None,
    }
}

//=========================================================================================
// Fixed Copy
//=========================================================================================

pub const CONFIRMATION_PROMPT: &str =
    "Queres guardar o nosso histórico de conversa para referência futura? Responde com 'sim' ou 'não'.";
pub const CLARIFICATION_REQUEST: &str = "Desculpa, não entendi. Por favor, responde 'sim' ou 'não'. 🙏";

fn history_kept_ack(profile: &UserProfile) -> String {
    format!(
        "Estou de volta, {}! 💖 A nossa conversa do modo psicóloga foi guardada. Do que queres falar agora? 😊",
        profile.name
    )
}

fn fresh_start_ack(profile: &UserProfile) -> String {
    format!(
        "Estou de volta, {}! 💖 A conversa anterior foi eliminada, como pediste. Um novo começo! ✨",
        profile.name
    )
}

fn diary_ack(profile: &UserProfile) -> String {
    format!(
        "Claro, {}! A abrir o teu diário secreto! 📖✨",
        profile.gender.agree("querido", "querida", "querido(a)")
    )
}

//=========================================================================================
// Types
//=========================================================================================

/// Transient yes/no gate owned by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationState {
    #[default]
    None,
    PendingCounselorExit,
}

/// Which speech capabilities are available to live mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpeechCapabilities {
    pub recognition: bool,
    pub synthesis: bool,
}

impl SpeechCapabilities {
    pub fn available(self) -> bool {
        self.recognition && self.synthesis
    }
}

/// An entry of the tools menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Diary,
    Mode(PersonaMode),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationAnswer {
    Keep,
    Discard,
    Unrecognized,
}

/// The single category an outgoing text falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    ConfirmationAnswer(ConfirmationAnswer),
    OpenToolsMenu,
    OpenDiary,
    SwitchMode(PersonaMode),
    ExitLive,
    Content,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The target is already active.
    Unchanged,
    Switched {
        from: PersonaMode,
        to: PersonaMode,
        greeted: bool,
    },
    /// Leaving counselor mode; the switch waits for a yes/no answer.
    ConfirmationRequested,
    /// Live mode needs speech capabilities that are missing.
    CapabilityUnavailable,
}

/// What the controller did with an outgoing text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routing {
    ToolsMenu,
    Diary,
    Transition(Transition),
    ConfirmationResolved { history_kept: bool },
    ClarificationRequested,
    /// Ordinary content for the thread of `mode`; nothing has been appended yet.
    Content { mode: PersonaMode },
}

//=========================================================================================
// Controller
//=========================================================================================

#[derive(Debug, Clone, Default)]
pub struct ModeTransitionController {
    mode: PersonaMode,
    confirmation: ConfirmationState,
}

impl ModeTransitionController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> PersonaMode {
        self.mode
    }

    pub fn confirmation(&self) -> ConfirmationState {
        self.confirmation
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Classifies `text` without side effects. A pending counselor exit takes
    /// every input as its answer, so even "menu" or "diário" is checked against
    /// sim/não before any tool or mode keyword.
    pub fn classify(&self, text: &str) -> InputKind {
        let lowered = text.trim().to_lowercase();

        // While a counselor exit is pending, every input answers the question.
        if self.confirmation == ConfirmationState::PendingCounselorExit {
            let answer = match lowered.as_str() {
                "sim" => ConfirmationAnswer::Keep,
                "não" | "nao" => ConfirmationAnswer::Discard,
                _ => ConfirmationAnswer::Unrecognized,
            };
            return InputKind::ConfirmationAnswer(answer);
        }

        if TOOLS_MENU.is_match(&lowered) {
            return InputKind::OpenToolsMenu;
        }

        // Counselor mode treats every text as therapeutic content.
        if self.mode != PersonaMode::Counselor && DIARY.is_match(&lowered) {
            return InputKind::OpenDiary;
        }

        if let Some(target) = MODE_SWITCH
            .captures(&lowered)
            .and_then(|caps| caps.get(1))
            .and_then(|name| mode_for_name(name.as_str()))
        {
            return InputKind::SwitchMode(target);
        }
        if self.mode != PersonaMode::Companion && EXIT_WORDS.contains(&lowered.as_str()) {
            return InputKind::SwitchMode(PersonaMode::Companion);
        }

        if self.mode == PersonaMode::Live && LIVE_EXIT_WORDS.contains(&lowered.as_str()) {
            return InputKind::ExitLive;
        }

        InputKind::Content
    }

    /// Classifies `text` and applies the resulting command to `store`.
    pub fn route(
        &mut self,
        text: &str,
        store: &mut MessageStore,
        profile: &UserProfile,
        capabilities: SpeechCapabilities,
    ) -> Routing {
        let kind = self.classify(text);
        debug!(?kind, mode = %self.mode, "Classified user input");

        match kind {
            InputKind::ConfirmationAnswer(answer) => self.resolve_confirmation(answer, text, store, profile),
            InputKind::OpenToolsMenu => Routing::ToolsMenu,
            InputKind::OpenDiary => {
                self.open_diary(store, profile);
                Routing::Diary
            }
            InputKind::SwitchMode(target) => {
                if target != self.mode && self.mode == PersonaMode::Counselor {
                    // The request itself belongs to the counselor conversation.
                    store.append(PersonaMode::Counselor, Message::user(text));
                }
                Routing::Transition(self.switch_to(target, store, profile, capabilities))
            }
            InputKind::ExitLive => {
                Routing::Transition(self.switch_to(PersonaMode::Companion, store, profile, capabilities))
            }
            InputKind::Content => Routing::Content { mode: self.mode },
        }
    }

    /// Appends the diary acknowledgement to the companion thread.
    pub fn open_diary(&mut self, store: &mut MessageStore, profile: &UserProfile) {
        store.append(PersonaMode::Companion, Message::assistant(diary_ack(profile)));
    }

    /// Moves to `target`, greeting on first entry. Leaving counselor mode only
    /// requests confirmation.
    pub fn switch_to(
        &mut self,
        target: PersonaMode,
        store: &mut MessageStore,
        profile: &UserProfile,
        capabilities: SpeechCapabilities,
    ) -> Transition {
        if target == self.mode {
            return Transition::Unchanged;
        }

        if self.mode == PersonaMode::Counselor {
            if self.confirmation != ConfirmationState::PendingCounselorExit {
                self.confirmation = ConfirmationState::PendingCounselorExit;
                store.append(PersonaMode::Counselor, Message::assistant(CONFIRMATION_PROMPT));
                info!(requested = %target, "Counselor exit requested, awaiting confirmation");
            }
            return Transition::ConfirmationRequested;
        }

        if target == PersonaMode::Live && !capabilities.available() {
            info!("Live mode requested without speech capabilities");
            return Transition::CapabilityUnavailable;
        }

        let from = self.mode;
        self.mode = target;
        let greeted = store.is_empty(target);
        if greeted {
            store.append(target, Message::assistant(greeting_for(target, profile)));
        }
        info!(%from, to = %target, greeted, "Persona mode switched");
        Transition::Switched { from, to: target, greeted }
    }

    fn resolve_confirmation(
        &mut self,
        answer: ConfirmationAnswer,
        text: &str,
        store: &mut MessageStore,
        profile: &UserProfile,
    ) -> Routing {
        store.append(PersonaMode::Counselor, Message::user(text));

        let history_kept = match answer {
            ConfirmationAnswer::Keep => true,
            ConfirmationAnswer::Discard => false,
            ConfirmationAnswer::Unrecognized => {
                store.append(PersonaMode::Counselor, Message::assistant(CLARIFICATION_REQUEST));
                return Routing::ClarificationRequested;
            }
        };

        if history_kept {
            store.append(PersonaMode::Companion, Message::assistant(history_kept_ack(profile)));
        } else {
            store.clear(PersonaMode::Counselor);
            store.append(PersonaMode::Companion, Message::assistant(fresh_start_ack(profile)));
        }
        self.mode = PersonaMode::Companion;
        self.confirmation = ConfirmationState::None;
        info!(history_kept, "Counselor exit confirmed");
        Routing::ConfirmationResolved { history_kept }
    }
}
