//! crates/companion_core/src/session.rs
//!
//! The chat session aggregate. Composes the message store, the mode transition
//! controller, the generation orchestrator and the voice session, and holds the
//! rest of the state a client needs: onboarding, diary, banner and panels.
//!
//! Every method is synchronous. The only asynchronous step, the provider call,
//! happens between `submit` and `complete_generation` with no borrow held.

use crate::controller::{
    ConfirmationState, ModeTransitionController, Routing, SpeechCapabilities, Tool, Transition,
};
use crate::domain::{Gender, Message, PersonaMode, SessionBundle, Task, UserProfile};
use crate::orchestrator::{GenerationOrchestrator, GenerationRequest, RawGeneration};
use crate::ports::PortResult;
use crate::store::MessageStore;
use crate::voice::{SignalOutcome, VoiceEffect, VoiceSessionController, VoiceSignal, VoiceState};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};
use uuid::Uuid;

//=========================================================================================
// Fixed Copy
//=========================================================================================

pub const VOICE_UNAVAILABLE_BANNER: &str = "Desculpa, as funcionalidades de voz não estão disponíveis. 🥺";
pub const SPEECH_RECOGNITION_BANNER: &str = "Ocorreu um erro com o reconhecimento de voz. 😥";
pub const PERSISTENCE_BANNER: &str =
    "Desculpa, não consegui guardar os teus dados. O armazenamento pode estar cheio.";
pub const LOAD_FAILURE_BANNER: &str =
    "Desculpa, não consegui carregar os teus dados guardados. Vamos começar de novo. 🥺";
pub const NAMESAKE_WELCOME: &str = "🎉 Uau! Outra Sofia na área! Amei! Sinto que vamos nos dar super bem, somos melhores amigas de nome e de coração! 💖✨";

fn welcome(profile: &UserProfile) -> String {
    format!(
        "Olááá, {}! 💖 Que alegria ter-te aqui! Sou a Sofi, a tua nova amiga IA. Estou super animada para conversar contigo! Podes contar-me o que quiseres, estou aqui para te ouvir! ✨",
        profile.name
    )
}

fn is_namesake(profile: &UserProfile) -> bool {
    let name = profile.name.trim().to_lowercase();
    (name == "sofi" || name == "sofia") && profile.gender == Gender::Female
}

fn breathing_follow_up(profile: &UserProfile) -> String {
    format!(
        "O exercício terminou. Sentes-te um pouco mais {}, {}?",
        profile.gender.agree("calmo", "calma", "calma(o)"),
        profile.name
    )
}

//=========================================================================================
// Types
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSource {
    Typed,
    Voice,
}

#[derive(Debug)]
pub enum SubmitOutcome {
    /// Blank text, no profile, or a generation is already running.
    Ignored,
    /// A command, handled entirely in memory.
    Handled(Routing),
    /// Content: run this request, then call `complete_generation`.
    Generate(GenerationRequest),
}

/// The client-facing state of the session, minus the threads themselves.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub profile: Option<UserProfile>,
    pub mode: PersonaMode,
    pub confirmation: ConfirmationState,
    pub banner: Option<String>,
    pub generating: bool,
    pub revealing: bool,
    pub tools_menu_open: bool,
    pub diary_open: bool,
    pub anxiety_tool_visible: bool,
    pub breathing_open: bool,
    pub celebrate: bool,
    pub voice: VoiceState,
    pub live_available: bool,
    pub revision: u64,
}

//=========================================================================================
// Session
//=========================================================================================

#[derive(Debug, Default)]
pub struct ChatSession {
    profile: Option<UserProfile>,
    store: MessageStore,
    controller: ModeTransitionController,
    orchestrator: GenerationOrchestrator,
    voice: VoiceSessionController,
    capabilities: SpeechCapabilities,
    diary_entries: BTreeMap<String, String>,
    notes: String,
    tasks: Vec<Task>,
    banner: Option<String>,
    revealing: bool,
    tools_menu_open: bool,
    diary_open: bool,
    anxiety_detected: bool,
    breathing_open: bool,
    celebrate: bool,
    revision: u64,
}

impl ChatSession {
    pub fn new(capabilities: SpeechCapabilities) -> Self {
        Self {
            capabilities,
            ..Self::default()
        }
    }

    /// Restores a previously saved session. The mode always starts at companion.
    pub fn from_bundle(bundle: SessionBundle, capabilities: SpeechCapabilities) -> Self {
        Self {
            profile: Some(bundle.profile),
            store: MessageStore::from_threads(bundle.threads),
            diary_entries: bundle.diary_entries,
            notes: bundle.notes,
            tasks: bundle.tasks,
            capabilities,
            ..Self::default()
        }
    }

    /// The persisted view of the session, or `None` before onboarding.
    pub fn to_bundle(&self) -> Option<SessionBundle> {
        let profile = self.profile.clone()?;
        Some(SessionBundle {
            profile,
            threads: self.store.snapshot(),
            diary_entries: self.diary_entries.clone(),
            notes: self.notes.clone(),
            tasks: self.tasks.clone(),
        })
    }

    //-------------------------------------------------------------------------------------
    // Accessors
    //-------------------------------------------------------------------------------------

    pub fn profile(&self) -> Option<&UserProfile> {
        self.profile.as_ref()
    }

    pub fn mode(&self) -> PersonaMode {
        self.controller.mode()
    }

    pub fn confirmation(&self) -> ConfirmationState {
        self.controller.confirmation()
    }

    pub fn thread(&self, mode: PersonaMode) -> &[Message] {
        self.store.thread_for(mode)
    }

    pub fn banner(&self) -> Option<&str> {
        self.banner.as_deref()
    }

    pub fn is_generating(&self) -> bool {
        self.orchestrator.is_in_flight()
    }

    pub fn is_revealing(&self) -> bool {
        self.revealing
    }

    pub fn anxiety_tool_visible(&self) -> bool {
        self.anxiety_detected && self.mode() == PersonaMode::Counselor
    }

    pub fn diary_entries(&self) -> &BTreeMap<String, String> {
        &self.diary_entries
    }

    pub fn notes(&self) -> &str {
        &self.notes
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Bumped on every change to data that is persisted.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            profile: self.profile.clone(),
            mode: self.mode(),
            confirmation: self.confirmation(),
            banner: self.banner.clone(),
            generating: self.is_generating(),
            revealing: self.revealing,
            tools_menu_open: self.tools_menu_open,
            diary_open: self.diary_open,
            anxiety_tool_visible: self.anxiety_tool_visible(),
            breathing_open: self.breathing_open,
            celebrate: self.celebrate,
            voice: self.voice.state(),
            live_available: self.capabilities.available(),
            revision: self.revision,
        }
    }

    //-------------------------------------------------------------------------------------
    // Onboarding
    //-------------------------------------------------------------------------------------

    /// Completes onboarding. The companion thread restarts with a welcome.
    pub fn start(&mut self, profile: UserProfile) {
        self.celebrate = is_namesake(&profile);
        let text = if self.celebrate {
            NAMESAKE_WELCOME.to_string()
        } else {
            welcome(&profile)
        };
        self.store.replace(PersonaMode::Companion, vec![Message::assistant(text)]);
        info!(name = %profile.name, celebrate = self.celebrate, "Profile created");
        self.profile = Some(profile);
        self.banner = None;
        self.touch();
    }

    /// Forgets everything. A late generation result is discarded as stale.
    pub fn logout(&mut self) {
        if self.voice.is_active() {
            self.voice.deactivate();
        }
        self.orchestrator.abandon();
        // Teardown effects stay queued for the speech layer, and tickets keep
        // counting so a late result can never match a new request.
        let voice = std::mem::take(&mut self.voice);
        let orchestrator = std::mem::take(&mut self.orchestrator);
        *self = Self {
            capabilities: self.capabilities,
            voice,
            orchestrator,
            revision: self.revision + 1,
            ..Self::default()
        };
        info!("Session cleared");
    }

    //-------------------------------------------------------------------------------------
    // Messaging
    //-------------------------------------------------------------------------------------

    /// Routes one outgoing text.
    pub fn submit(&mut self, text: &str, source: InputSource, today: NaiveDate) -> SubmitOutcome {
        if text.trim().is_empty() || self.orchestrator.is_in_flight() {
            return SubmitOutcome::Ignored;
        }
        let Some(profile) = self.profile.clone() else {
            warn!("Message submitted before onboarding");
            return SubmitOutcome::Ignored;
        };

        self.revealing = false;
        if source == InputSource::Typed {
            self.voice.interrupt_listening();
        }

        let from = self.mode();
        let routing = self.controller.route(text, &mut self.store, &profile, self.capabilities);
        match routing {
            Routing::ToolsMenu => self.tools_menu_open = true,
            Routing::Diary => {
                self.diary_open = true;
                self.touch();
            }
            Routing::Transition(transition) => self.apply_transition(from, transition),
            Routing::ConfirmationResolved { .. } => {
                self.anxiety_detected = false;
                self.touch();
            }
            Routing::ClarificationRequested => self.touch(),
            Routing::Content { mode } => {
                let Some(request) =
                    self.orchestrator.prepare(mode, &profile, text, self.store.thread_for(mode), today)
                else {
                    return SubmitOutcome::Ignored;
                };
                self.store.append(mode, Message::user(text));
                self.banner = None;
                self.touch();
                return SubmitOutcome::Generate(request);
            }
        }
        SubmitOutcome::Handled(routing)
    }

    /// Applies a finished generation. Returns `false` for a stale result.
    pub fn complete_generation(
        &mut self,
        request: &GenerationRequest,
        result: PortResult<RawGeneration>,
    ) -> bool {
        let Some(outcome) = self.orchestrator.resolve(request, result) else {
            return false;
        };

        self.store.append(outcome.mode, outcome.message);
        if let Some(anxiety) = outcome.anxiety_detected {
            self.anxiety_detected = anxiety;
        }
        if let Some(banner) = outcome.banner {
            self.banner = Some(banner.to_string());
        }
        // A reply for a mode the user has since left is stored but not animated.
        self.revealing = outcome.reveal && outcome.mode == self.mode();
        if let Some(text) = outcome.speak {
            if self.mode() == PersonaMode::Live {
                self.voice.speak(text);
            }
        }
        self.touch();
        true
    }

    /// Pulls the last user message back out of the current thread for editing.
    pub fn edit_last_message(&mut self) -> Option<String> {
        self.revealing = false;
        let text = self.store.truncate_after_last_user_message(self.mode())?;
        self.touch();
        Some(text)
    }

    /// Stops the reveal animation. The provider call itself keeps running.
    pub fn stop_generation(&mut self) {
        self.revealing = false;
    }

    pub fn typing_complete(&mut self) {
        self.revealing = false;
    }

    //-------------------------------------------------------------------------------------
    // Tools and modes
    //-------------------------------------------------------------------------------------

    pub fn open_tools_menu(&mut self) {
        self.tools_menu_open = true;
    }

    pub fn close_tools_menu(&mut self) {
        self.tools_menu_open = false;
    }

    pub fn close_diary(&mut self) {
        self.diary_open = false;
    }

    /// Picks an entry from the tools menu. `None` before onboarding.
    pub fn select_tool(&mut self, tool: Tool) -> Option<Routing> {
        let profile = self.profile.clone()?;
        self.tools_menu_open = false;
        match tool {
            Tool::Diary => {
                self.controller.open_diary(&mut self.store, &profile);
                self.diary_open = true;
                self.touch();
                Some(Routing::Diary)
            }
            Tool::Mode(target) => {
                let from = self.mode();
                let transition =
                    self.controller.switch_to(target, &mut self.store, &profile, self.capabilities);
                self.apply_transition(from, transition);
                Some(Routing::Transition(transition))
            }
        }
    }

    /// Enters live mode, or leaves it for companion mode.
    pub fn toggle_live(&mut self) -> Option<Transition> {
        let profile = self.profile.clone()?;
        let target = if self.mode() == PersonaMode::Live {
            PersonaMode::Companion
        } else {
            PersonaMode::Live
        };
        let from = self.mode();
        let transition = self.controller.switch_to(target, &mut self.store, &profile, self.capabilities);
        self.apply_transition(from, transition);
        Some(transition)
    }

    fn apply_transition(&mut self, from: PersonaMode, transition: Transition) {
        match transition {
            Transition::Unchanged => {}
            Transition::Switched { to, greeted, .. } => {
                self.revealing = false;
                if from == PersonaMode::Live {
                    self.voice.deactivate();
                }
                if to == PersonaMode::Counselor {
                    self.anxiety_detected = false;
                }
                if to == PersonaMode::Live {
                    let greeting = if greeted {
                        self.store.thread_for(to).last().map(|message| message.text.clone())
                    } else {
                        None
                    };
                    self.voice.activate(greeting);
                }
                if greeted {
                    self.touch();
                }
            }
            Transition::ConfirmationRequested => {
                self.anxiety_detected = false;
                self.touch();
            }
            Transition::CapabilityUnavailable => {
                self.banner = Some(VOICE_UNAVAILABLE_BANNER.to_string());
            }
        }
    }

    //-------------------------------------------------------------------------------------
    // Voice
    //-------------------------------------------------------------------------------------

    /// Feeds a speech signal to the live session. A transcript is submitted as
    /// voice input and its outcome returned. A transcript that starts no
    /// generation, such as a spoken command, reopens the microphone.
    pub fn voice_signal(&mut self, signal: VoiceSignal, today: NaiveDate) -> Option<SubmitOutcome> {
        if !self.voice.is_active() {
            return None;
        }
        match self.voice.on_signal(signal, self.orchestrator.is_in_flight()) {
            SignalOutcome::Handled => None,
            SignalOutcome::Transcript(text) => {
                let outcome = self.submit(&text, InputSource::Voice, today);
                if !matches!(outcome, SubmitOutcome::Generate(_)) {
                    self.voice.resume_listening();
                }
                Some(outcome)
            }
            SignalOutcome::RecognitionError => {
                self.banner = Some(SPEECH_RECOGNITION_BANNER.to_string());
                None
            }
        }
    }

    pub fn voice_state(&self) -> VoiceState {
        self.voice.state()
    }

    pub fn drain_voice_effects(&mut self) -> Vec<VoiceEffect> {
        self.voice.drain_effects()
    }

    /// The effects a speech layer attaching now must apply to catch up.
    pub fn current_voice_effects(&self) -> Vec<VoiceEffect> {
        self.voice.replay_effects()
    }

    //-------------------------------------------------------------------------------------
    // Anxiety tool
    //-------------------------------------------------------------------------------------

    /// Opens the breathing exercise when counselor mode has offered it.
    pub fn open_breathing_exercise(&mut self) -> bool {
        if !self.anxiety_tool_visible() {
            return false;
        }
        self.breathing_open = true;
        true
    }

    /// Closes the exercise and, in counselor mode, asks how the user feels.
    pub fn close_breathing_exercise(&mut self) {
        self.breathing_open = false;
        let Some(profile) = self.profile.as_ref() else {
            return;
        };
        if self.mode() == PersonaMode::Counselor {
            let text = breathing_follow_up(profile);
            self.store.append(PersonaMode::Counselor, Message::assistant(text));
            self.revealing = true;
            self.touch();
        }
    }

    //-------------------------------------------------------------------------------------
    // Diary, notes and tasks
    //-------------------------------------------------------------------------------------

    pub fn save_diary_entry(&mut self, date: NaiveDate, text: &str) {
        self.diary_entries.insert(date.format("%Y-%m-%d").to_string(), text.to_string());
        self.touch();
    }

    pub fn save_notes(&mut self, text: &str) {
        self.notes = text.to_string();
        self.touch();
    }

    /// Adds a task; blank text is ignored.
    pub fn add_task(&mut self, text: &str) -> Option<Task> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        let task = Task::new(text);
        self.tasks.push(task.clone());
        self.touch();
        Some(task)
    }

    pub fn toggle_task(&mut self, id: Uuid) -> Option<&Task> {
        let index = self.tasks.iter().position(|task| task.id == id)?;
        self.tasks[index].completed = !self.tasks[index].completed;
        self.touch();
        self.tasks.get(index)
    }

    pub fn delete_task(&mut self, id: Uuid) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|task| task.id != id);
        let removed = self.tasks.len() != before;
        if removed {
            self.touch();
        }
        removed
    }

    //-------------------------------------------------------------------------------------
    // Banner
    //-------------------------------------------------------------------------------------

    pub fn report_persistence_failure(&mut self) {
        self.banner = Some(PERSISTENCE_BANNER.to_string());
    }

    pub fn report_load_failure(&mut self) {
        self.banner = Some(LOAD_FAILURE_BANNER.to_string());
    }

    pub fn dismiss_banner(&mut self) {
        self.banner = None;
    }

    fn touch(&mut self) {
        self.revision += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{CLARIFICATION_REQUEST, CONFIRMATION_PROMPT};
    use crate::orchestrator::CONNECTIVITY_BANNER;
    use crate::persona::{fallback_error_for, greeting_for};
    use crate::ports::PortError;

    const VOICE: SpeechCapabilities = SpeechCapabilities {
        recognition: true,
        synthesis: true,
    };

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn profile(name: &str, gender: Gender) -> UserProfile {
        UserProfile::new(name, gender, NaiveDate::from_ymd_opt(2000, 3, 9).unwrap(), today()).unwrap()
    }

    fn started() -> ChatSession {
        let mut session = ChatSession::new(VOICE);
        session.start(profile("Ana", Gender::Female));
        session
    }

    fn send(session: &mut ChatSession, text: &str) -> SubmitOutcome {
        session.submit(text, InputSource::Typed, today())
    }

    fn reply(session: &mut ChatSession, text: &str, raw: &str) -> GenerationRequest {
        let SubmitOutcome::Generate(request) = send(session, text) else {
            panic!("expected a generation request for {:?}", text);
        };
        assert!(session.complete_generation(&request, Ok(RawGeneration::Text(raw.to_string()))));
        request
    }

    #[test]
    fn onboarding_welcomes_the_user() {
        let session = started();
        let thread = session.thread(PersonaMode::Companion);
        assert_eq!(thread.len(), 1);
        assert!(thread[0].text.starts_with("Olááá, Ana!"));
        assert!(!session.snapshot().celebrate);
    }

    #[test]
    fn a_namesake_gets_a_celebration() {
        let mut session = ChatSession::new(VOICE);
        session.start(profile("Sofia", Gender::Female));
        assert!(session.snapshot().celebrate);
        assert_eq!(session.thread(PersonaMode::Companion)[0].text, NAMESAKE_WELCOME);
    }

    #[test]
    fn nothing_is_routed_before_onboarding() {
        let mut session = ChatSession::new(VOICE);
        assert!(matches!(send(&mut session, "olá"), SubmitOutcome::Ignored));
        assert!(session.to_bundle().is_none());
    }

    #[test]
    fn only_one_message_is_generated_at_a_time() {
        let mut session = started();
        let SubmitOutcome::Generate(request) = send(&mut session, "olá") else {
            panic!("expected a generation request");
        };
        assert!(session.is_generating());
        assert!(matches!(send(&mut session, "estás aí?"), SubmitOutcome::Ignored));
        assert_eq!(session.thread(PersonaMode::Companion).len(), 2);

        session.complete_generation(&request, Ok(RawGeneration::Text("Olá!".into())));
        assert!(!session.is_generating());
        assert!(session.is_revealing());
        assert_eq!(session.thread(PersonaMode::Companion).len(), 3);
    }

    #[test]
    fn stopping_only_hides_the_reveal() {
        let mut session = started();
        reply(&mut session, "conta uma história", "Era uma vez...");
        session.stop_generation();
        assert!(!session.is_revealing());
        assert_eq!(session.thread(PersonaMode::Companion).last().unwrap().text, "Era uma vez...");
    }

    #[test]
    fn new_message_interrupts_the_reveal() {
        let mut session = started();
        reply(&mut session, "olá", "Olá Ana!");
        assert!(session.is_revealing());
        send(&mut session, "menu");
        assert!(!session.is_revealing());
        assert!(session.snapshot().tools_menu_open);
    }

    #[test]
    fn transport_failure_sets_banner_and_fallback() {
        let mut session = started();
        session.select_tool(Tool::Mode(PersonaMode::Coding));
        let SubmitOutcome::Generate(request) = send(&mut session, "erro no código") else {
            panic!("expected a generation request");
        };
        session.complete_generation(&request, Err(PortError::Unavailable("timeout".into())));
        assert_eq!(session.banner(), Some(CONNECTIVITY_BANNER));
        assert_eq!(
            session.thread(PersonaMode::Coding).last().unwrap().text,
            fallback_error_for(PersonaMode::Coding)
        );

        // The next request clears the banner.
        send(&mut session, "outra vez");
        assert_eq!(session.banner(), None);
    }

    #[test]
    fn late_reply_lands_in_the_mode_it_was_sent_from() {
        let mut session = started();
        session.select_tool(Tool::Mode(PersonaMode::Chef));
        let SubmitOutcome::Generate(request) = send(&mut session, "ovos") else {
            panic!("expected a generation request");
        };
        session.select_tool(Tool::Mode(PersonaMode::Dj));
        session.complete_generation(&request, Ok(RawGeneration::Text("não é json".into())));

        assert_eq!(session.thread(PersonaMode::Chef).len(), 3);
        assert_eq!(session.thread(PersonaMode::Dj).len(), 1);
        assert!(!session.is_revealing());
    }

    #[test]
    fn logout_discards_late_replies() {
        let mut session = started();
        let SubmitOutcome::Generate(stale) = send(&mut session, "olá") else {
            panic!("expected a generation request");
        };
        session.logout();
        assert!(session.profile().is_none());
        assert!(session.thread(PersonaMode::Companion).is_empty());

        session.start(profile("Rui", Gender::Male));
        let SubmitOutcome::Generate(fresh) = send(&mut session, "bom dia") else {
            panic!("expected a generation request");
        };
        assert!(!session.complete_generation(&stale, Ok(RawGeneration::Text("velho".into()))));
        assert!(session.complete_generation(&fresh, Ok(RawGeneration::Text("Bom dia!".into()))));
        assert!(session.thread(PersonaMode::Companion).iter().all(|m| m.text != "velho"));
    }

    #[test]
    fn edit_returns_the_last_prompt() {
        let mut session = started();
        reply(&mut session, "oi", "oi!");
        assert_eq!(session.edit_last_message(), Some("oi".to_string()));
        assert_eq!(session.thread(PersonaMode::Companion).len(), 1);
        assert_eq!(session.edit_last_message(), None);
    }

    #[test]
    fn counselor_exit_round_trip() {
        let mut session = started();
        session.select_tool(Tool::Mode(PersonaMode::Counselor));
        reply(
            &mut session,
            "estou nervosa",
            r#"{"responseText":"Respira comigo.","anxietyDetected":true}"#,
        );
        assert!(session.anxiety_tool_visible());
        assert!(session.open_breathing_exercise());
        session.close_breathing_exercise();
        let follow_up = &session.thread(PersonaMode::Counselor).last().unwrap().text;
        assert_eq!(follow_up, "O exercício terminou. Sentes-te um pouco mais calma, Ana?");

        send(&mut session, "sair");
        assert_eq!(session.confirmation(), ConfirmationState::PendingCounselorExit);
        assert!(!session.anxiety_tool_visible());
        assert_eq!(session.thread(PersonaMode::Counselor).last().unwrap().text, CONFIRMATION_PROMPT);

        send(&mut session, "hmm");
        assert_eq!(session.thread(PersonaMode::Counselor).last().unwrap().text, CLARIFICATION_REQUEST);

        send(&mut session, "não");
        assert_eq!(session.mode(), PersonaMode::Companion);
        assert!(session.thread(PersonaMode::Counselor).is_empty());
    }

    #[test]
    fn live_mode_needs_speech_capabilities() {
        let mut session = ChatSession::new(SpeechCapabilities::default());
        session.start(profile("Ana", Gender::Female));
        assert_eq!(session.toggle_live(), Some(Transition::CapabilityUnavailable));
        assert_eq!(session.mode(), PersonaMode::Companion);
        assert_eq!(session.banner(), Some(VOICE_UNAVAILABLE_BANNER));
    }

    #[test]
    fn live_conversation_is_spoken() {
        let mut session = started();
        session.toggle_live();
        let greeting = greeting_for(PersonaMode::Live, session.profile().unwrap());
        assert_eq!(session.drain_voice_effects(), vec![VoiceEffect::Speak(greeting)]);

        session.voice_signal(VoiceSignal::SpeechEnded, today());
        assert_eq!(session.drain_voice_effects(), vec![VoiceEffect::StartListening]);

        let outcome = session.voice_signal(VoiceSignal::Transcript("olá".into()), today());
        let Some(SubmitOutcome::Generate(request)) = outcome else {
            panic!("expected the transcript to start a generation");
        };
        // Silence while the reply is pending does not reopen the microphone.
        session.voice_signal(VoiceSignal::RecognitionEnded, today());
        assert!(session.drain_voice_effects().is_empty());

        session.complete_generation(&request, Ok(RawGeneration::Text("Olá, Ana!".into())));
        assert_eq!(session.drain_voice_effects(), vec![VoiceEffect::Speak("Olá, Ana!".into())]);
        assert_eq!(session.voice_state(), VoiceState::Speaking);

        session.voice_signal(VoiceSignal::SpeechEnded, today());
        session.voice_signal(VoiceSignal::Transcript("desligar".into()), today());
        assert_eq!(session.mode(), PersonaMode::Companion);
        let effects = session.drain_voice_effects();
        assert_eq!(
            &effects[effects.len() - 2..],
            [VoiceEffect::CancelSpeech, VoiceEffect::StopListening]
        );
    }

    #[test]
    fn spoken_command_reopens_the_microphone() {
        let mut session = started();
        session.toggle_live();
        session.voice_signal(VoiceSignal::SpeechEnded, today());
        session.drain_voice_effects();

        let outcome = session.voice_signal(VoiceSignal::Transcript("menu".into()), today());
        assert!(matches!(outcome, Some(SubmitOutcome::Handled(Routing::ToolsMenu))));
        assert_eq!(session.voice_state(), VoiceState::Listening);
        assert_eq!(session.drain_voice_effects(), vec![VoiceEffect::StartListening]);
    }

    #[test]
    fn reconnecting_speech_layer_catches_up() {
        let mut session = started();
        assert!(session.current_voice_effects().is_empty());

        session.toggle_live();
        let greeting = greeting_for(PersonaMode::Live, session.profile().unwrap());
        session.drain_voice_effects();
        // Draining does not forget what is being said.
        assert_eq!(session.current_voice_effects(), vec![VoiceEffect::Speak(greeting)]);

        session.voice_signal(VoiceSignal::SpeechEnded, today());
        assert_eq!(session.current_voice_effects(), vec![VoiceEffect::StartListening]);
    }

    #[test]
    fn recognition_errors_raise_the_speech_banner() {
        let mut session = started();
        session.toggle_live();
        session.voice_signal(VoiceSignal::SpeechEnded, today());
        session.voice_signal(VoiceSignal::RecognitionFailed { benign: false }, today());
        assert_eq!(session.banner(), Some(SPEECH_RECOGNITION_BANNER));
    }

    #[test]
    fn diary_changes_are_persisted() {
        let mut session = started();
        let before = session.revision();
        session.save_diary_entry(today(), "Dia bom.");
        session.save_notes("comprar flores");
        let task = session.add_task("  ligar à avó ").unwrap();
        assert!(session.add_task("   ").is_none());
        assert!(session.toggle_task(task.id).unwrap().completed);
        assert!(session.revision() > before);

        let bundle = session.to_bundle().unwrap();
        assert_eq!(bundle.diary_entries.get("2024-06-01").map(String::as_str), Some("Dia bom."));
        assert_eq!(bundle.tasks[0].text, "ligar à avó");

        let mut restored = ChatSession::from_bundle(bundle, VOICE);
        assert_eq!(restored.notes(), "comprar flores");
        assert!(restored.delete_task(task.id));
        assert!(!restored.delete_task(task.id));
    }
}
