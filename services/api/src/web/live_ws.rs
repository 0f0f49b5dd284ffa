//! services/api/src/web/live_ws.rs
//!
//! The WebSocket that carries live mode. Voice effects from the session are
//! forwarded to the browser, synthesized speech follows each `speak` as a Binary
//! frame, and the browser's speech signals (or raw microphone audio) flow back
//! into the session.

use crate::web::{
    chat_task::spawn_generation,
    protocol::{ClientMessage, ServerMessage},
    rest::today,
    state::AppState,
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use companion_core::{SubmitOutcome, VoiceSignal, VoiceState};
use futures::{
    stream::{SplitSink, StreamExt},
    SinkExt,
};
use std::sync::Arc;
use tokio::sync::{broadcast, broadcast::error::RecvError, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

type WsSender = Arc<Mutex<SplitSink<WebSocket, Message>>>;

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn live_ws_handler(ws: WebSocketUpgrade, State(app_state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>) {
    info!("Live socket connected");
    let (sender, mut receiver) = socket.split();
    let ws_sender = Arc::new(Mutex::new(sender));

    let token = app_state.shutdown.child_token();
    let (replay, events) = attach(&app_state).await;
    let forwarder = tokio::spawn(forward_events(
        app_state.clone(),
        replay,
        events,
        ws_sender.clone(),
        token.clone(),
    ));

    // Microphone audio captured since listening started.
    let mut audio_buffer: Vec<u8> = Vec::new();

    loop {
        let incoming = tokio::select! {
            incoming = receiver.next() => incoming,
            _ = token.cancelled() => break,
        };
        match incoming {
            Some(Ok(Message::Text(text))) => {
                handle_text_message(text.as_str(), &app_state, &mut audio_buffer).await;
            }
            Some(Ok(Message::Binary(data))) => {
                if app_state.session.lock().await.voice_state() == VoiceState::Listening {
                    audio_buffer.extend_from_slice(&data);
                }
            }
            Some(Ok(Message::Close(_))) => {
                info!("Client sent close message.");
                break;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!("Live socket error: {}", e);
                break;
            }
            None => {
                info!("Client disconnected.");
                break;
            }
        }
    }

    token.cancel();
    if let Err(e) = forwarder.await {
        error!("Event forwarder panicked: {:?}", e);
    }
    info!("Live socket closed.");
}

async fn handle_text_message(text: &str, app_state: &Arc<AppState>, audio_buffer: &mut Vec<u8>) {
    let client_msg = match serde_json::from_str::<ClientMessage>(text) {
        Ok(client_msg) => client_msg,
        Err(e) => {
            warn!("Failed to deserialize client message: {}", e);
            return;
        }
    };
    debug!(?client_msg, "Client message received");

    let signal = match client_msg.into_signal() {
        Some(signal) => signal,
        None => recognition_signal(app_state, std::mem::take(audio_buffer)).await,
    };
    apply_signal(app_state, signal).await;
}

/// Turns the audio buffered until recognition ended into a voice signal.
async fn recognition_signal(app_state: &AppState, audio: Vec<u8>) -> VoiceSignal {
    if audio.is_empty() {
        return VoiceSignal::RecognitionEnded;
    }
    let Some(sst_adapter) = app_state.sst_adapter.as_ref() else {
        warn!("Audio received but no transcription service is configured");
        return VoiceSignal::RecognitionFailed { benign: false };
    };
    match sst_adapter.transcribe_audio(&audio).await {
        Ok(transcript) if !transcript.trim().is_empty() => {
            info!(%transcript, "Speech transcribed");
            VoiceSignal::Transcript(transcript)
        }
        Ok(_) => VoiceSignal::RecognitionEnded,
        Err(e) => {
            error!("Speech transcription failed: {:?}", e);
            VoiceSignal::RecognitionFailed { benign: false }
        }
    }
}

/// Feeds one signal into the session and announces what changed.
async fn apply_signal(app_state: &Arc<AppState>, signal: VoiceSignal) {
    let mut session = app_state.session.lock().await;
    let banner_before = session.banner().map(str::to_owned);

    match session.voice_signal(signal, today()) {
        Some(SubmitOutcome::Generate(request)) => {
            app_state.publish(ServerMessage::ThreadUpdated {
                mode: request.mode.to_string(),
            });
            spawn_generation(app_state.clone(), request);
        }
        Some(SubmitOutcome::Handled(routing)) => {
            info!(?routing, "Spoken command handled");
            app_state.publish(ServerMessage::ThreadUpdated {
                mode: session.mode().to_string(),
            });
        }
        Some(SubmitOutcome::Ignored) | None => {}
    }

    let banner = session.banner().map(str::to_owned);
    if banner != banner_before {
        if let Some(message) = banner {
            app_state.publish(ServerMessage::Error { message });
        }
    }
    app_state.after_change(&mut session);
}

//=========================================================================================
// Server -> Client
//=========================================================================================

/// Subscribes to session events and returns the voice effects a new socket has
/// missed, such as a greeting spoken before it connected. The lock is held
/// while subscribing so no effect is both replayed and received.
async fn attach(app_state: &AppState) -> (Vec<ServerMessage>, broadcast::Receiver<ServerMessage>) {
    let session = app_state.session.lock().await;
    let events = app_state.events.subscribe();
    let replay = session
        .current_voice_effects()
        .into_iter()
        .map(ServerMessage::from)
        .collect();
    (replay, events)
}

async fn forward_events(
    app_state: Arc<AppState>,
    replay: Vec<ServerMessage>,
    mut events: broadcast::Receiver<ServerMessage>,
    ws_sender: WsSender,
    token: CancellationToken,
) {
    for message in replay {
        if !deliver(&app_state, &ws_sender, message).await {
            token.cancel();
            return;
        }
    }

    loop {
        let message = tokio::select! {
            received = events.recv() => match received {
                Ok(message) => message,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Live socket fell behind, events dropped");
                    continue;
                }
                Err(RecvError::Closed) => break,
            },
            _ = token.cancelled() => break,
        };

        if !deliver(&app_state, &ws_sender, message).await {
            token.cancel();
            break;
        }
    }
}

/// Sends one event, following a `speak` with its audio. Returns `false` once
/// the socket is gone.
async fn deliver(app_state: &Arc<AppState>, ws_sender: &WsSender, message: ServerMessage) -> bool {
    let json = match serde_json::to_string(&message) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize server message: {}", e);
            return true;
        }
    };
    if ws_sender.lock().await.send(Message::Text(json.into())).await.is_err() {
        warn!("Failed to send to the live socket, stopping forwarder");
        return false;
    }

    if let ServerMessage::Speak { text } = message {
        speak(app_state, ws_sender, &text).await;
    }
    true
}

/// Synthesizes `text` and sends the audio, unless speech was cancelled meanwhile.
async fn speak(app_state: &Arc<AppState>, ws_sender: &WsSender, text: &str) {
    let Some(tts_adapter) = app_state.tts_adapter.as_ref() else {
        apply_signal(app_state, VoiceSignal::SpeechFailed).await;
        return;
    };
    match tts_adapter.generate_audio(text).await {
        Ok(audio) => {
            if app_state.session.lock().await.voice_state() != VoiceState::Speaking {
                debug!("Speech cancelled during synthesis, dropping audio");
                return;
            }
            if ws_sender.lock().await.send(Message::Binary(audio.into())).await.is_err() {
                error!("Failed to send synthesized speech.");
            }
        }
        Err(e) => {
            error!("Speech synthesis failed: {:?}", e);
            apply_signal(app_state, VoiceSignal::SpeechFailed).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::web::test_support::{ana, FakeGeneration, MemoryStore};
    use async_trait::async_trait;
    use companion_core::{
        ChatSession, PersonaMode, PortError, PortResult, SpeechCapabilities, SpeechToTextService,
        TextToSpeechService, VoiceEffect,
    };

    struct FakeSpeech {
        transcript: Option<&'static str>,
    }

    #[async_trait]
    impl SpeechToTextService for FakeSpeech {
        async fn transcribe_audio(&self, _audio_data: &[u8]) -> PortResult<String> {
            self.transcript
                .map(str::to_string)
                .ok_or_else(|| PortError::Unavailable("offline".into()))
        }
    }

    #[async_trait]
    impl TextToSpeechService for FakeSpeech {
        async fn generate_audio(&self, _text: &str) -> PortResult<Vec<u8>> {
            Ok(vec![0, 1, 2])
        }
    }

    fn live_state(transcript: Option<&'static str>) -> Arc<AppState> {
        let speech = Arc::new(FakeSpeech { transcript });
        let sst: Arc<dyn SpeechToTextService> = speech.clone();
        let tts: Arc<dyn TextToSpeechService> = speech;
        let sst_adapter = Some(sst);
        let tts_adapter = Some(tts);
        let capabilities = AppState::speech_capabilities(&sst_adapter, &tts_adapter);
        assert_eq!(capabilities, SpeechCapabilities { recognition: true, synthesis: true });

        Arc::new(AppState::new(
            Arc::new(Config::from_lookup(|_| None).unwrap()),
            ChatSession::new(capabilities),
            Arc::new(FakeGeneration::replying("Estou aqui! 😊")),
            Arc::new(MemoryStore::default()),
            sst_adapter,
            tts_adapter,
        ))
    }

    #[tokio::test]
    async fn empty_buffer_just_ends_recognition() {
        let app_state = live_state(Some("olá"));
        assert_eq!(recognition_signal(&app_state, Vec::new()).await, VoiceSignal::RecognitionEnded);
    }

    #[tokio::test]
    async fn buffered_audio_is_transcribed() {
        let app_state = live_state(Some("olá sofi"));
        assert_eq!(
            recognition_signal(&app_state, vec![0; 64]).await,
            VoiceSignal::Transcript("olá sofi".into())
        );
    }

    #[tokio::test]
    async fn transcription_failure_is_not_benign() {
        let app_state = live_state(None);
        assert_eq!(
            recognition_signal(&app_state, vec![0; 64]).await,
            VoiceSignal::RecognitionFailed { benign: false }
        );
    }

    #[tokio::test]
    async fn spoken_transcript_reaches_the_live_thread() {
        let app_state = live_state(Some("olá"));
        let mut events = app_state.events.subscribe();
        {
            let mut session = app_state.session.lock().await;
            session.start(ana());
            session.toggle_live();
            app_state.after_change(&mut session);
        }
        assert_eq!(app_state.session.lock().await.mode(), PersonaMode::Live);

        // Finish the greeting so the session listens again.
        apply_signal(&app_state, VoiceSignal::SpeechEnded).await;
        apply_signal(&app_state, VoiceSignal::Transcript("como estás?".into())).await;

        let mut saw_thread_update = false;
        while let Ok(event) = events.try_recv() {
            if event == (ServerMessage::ThreadUpdated { mode: "live".into() }) {
                saw_thread_update = true;
            }
        }
        assert!(saw_thread_update);
        let session = app_state.session.lock().await;
        assert!(session
            .thread(PersonaMode::Live)
            .iter()
            .any(|message| message.text == "como estás?"));
    }

    #[tokio::test]
    async fn late_socket_hears_the_pending_greeting() {
        let app_state = live_state(Some("olá"));
        {
            let mut session = app_state.session.lock().await;
            session.start(ana());
            session.toggle_live();
            // No socket yet: the greeting's speak goes nowhere.
            app_state.after_change(&mut session);
        }

        let (replay, mut events) = attach(&app_state).await;
        assert!(matches!(replay.as_slice(), [ServerMessage::Speak { .. }]));
        assert!(events.try_recv().is_err());

        apply_signal(&app_state, VoiceSignal::SpeechEnded).await;
        let (replay, _events) = attach(&app_state).await;
        assert_eq!(replay, vec![ServerMessage::from(VoiceEffect::StartListening)]);
    }

    #[tokio::test]
    async fn spoken_command_keeps_the_microphone_open() {
        let app_state = live_state(Some("olá"));
        let mut events = app_state.events.subscribe();
        {
            let mut session = app_state.session.lock().await;
            session.start(ana());
            session.toggle_live();
            app_state.after_change(&mut session);
        }
        apply_signal(&app_state, VoiceSignal::SpeechEnded).await;
        while events.try_recv().is_ok() {}

        apply_signal(&app_state, VoiceSignal::Transcript("menu".into())).await;

        assert_eq!(app_state.session.lock().await.voice_state(), VoiceState::Listening);
        let start_listening = ServerMessage::from(VoiceEffect::StartListening);
        let mut reopened = false;
        while let Ok(event) = events.try_recv() {
            reopened |= event == start_listening;
        }
        assert!(reopened);
    }

    #[tokio::test]
    async fn recognition_error_is_announced() {
        let app_state = live_state(None);
        let mut events = app_state.events.subscribe();
        {
            let mut session = app_state.session.lock().await;
            session.start(ana());
            session.toggle_live();
            app_state.after_change(&mut session);
        }

        apply_signal(&app_state, VoiceSignal::RecognitionFailed { benign: false }).await;

        let mut saw_error = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, ServerMessage::Error { .. }) {
                saw_error = true;
            }
        }
        assert!(saw_error);
    }
}
