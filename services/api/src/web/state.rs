//! services/api/src/web/state.rs
//!
//! Defines the application's shared state. There is exactly one chat session per
//! server; every handler and the live socket work on it through the same lock.

use crate::config::Config;
use crate::web::protocol::ServerMessage;
use companion_core::{
    ports::{BundleStore, GenerationService, SpeechToTextService, TextToSpeechService},
    ChatSession, SpeechCapabilities,
};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Capacity of the live event channel; a lagging socket skips old events.
const EVENT_CAPACITY: usize = 64;

//=========================================================================================
// AppState (Shared Across All Handlers)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub session: Arc<Mutex<ChatSession>>,
    pub generation_adapter: Arc<dyn GenerationService>,
    pub bundle_store: Arc<dyn BundleStore>,
    /// Speech adapters; live mode is unavailable unless both are present.
    pub sst_adapter: Option<Arc<dyn SpeechToTextService>>,
    pub tts_adapter: Option<Arc<dyn TextToSpeechService>>,
    /// Wakes the persistence task after a change.
    pub changes: Arc<Notify>,
    /// Events for connected live-mode sockets.
    pub events: broadcast::Sender<ServerMessage>,
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        session: ChatSession,
        generation_adapter: Arc<dyn GenerationService>,
        bundle_store: Arc<dyn BundleStore>,
        sst_adapter: Option<Arc<dyn SpeechToTextService>>,
        tts_adapter: Option<Arc<dyn TextToSpeechService>>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            config,
            session: Arc::new(Mutex::new(session)),
            generation_adapter,
            bundle_store,
            sst_adapter,
            tts_adapter,
            changes: Arc::new(Notify::new()),
            events,
            shutdown: CancellationToken::new(),
        }
    }

    /// The speech capabilities the configured adapters provide.
    pub fn speech_capabilities(
        sst_adapter: &Option<Arc<dyn SpeechToTextService>>,
        tts_adapter: &Option<Arc<dyn TextToSpeechService>>,
    ) -> SpeechCapabilities {
        SpeechCapabilities {
            recognition: sst_adapter.is_some(),
            synthesis: tts_adapter.is_some(),
        }
    }

    /// Must be called after every mutation, while the session lock is still held.
    /// Forwards pending voice effects to live sockets and schedules a save.
    pub fn after_change(&self, session: &mut ChatSession) {
        for effect in session.drain_voice_effects() {
            // No receivers simply means no live socket is connected.
            let _ = self.events.send(ServerMessage::from(effect));
        }
        self.changes.notify_one();
    }

    pub fn publish(&self, message: ServerMessage) {
        let _ = self.events.send(message);
    }
}

/// Rebuilds the session from the saved bundle. An unreadable bundle starts a
/// fresh session that tells the user their data could not be loaded.
pub async fn restore_session(
    bundle_store: &dyn BundleStore,
    capabilities: SpeechCapabilities,
) -> ChatSession {
    match bundle_store.load().await {
        Ok(Some(bundle)) => ChatSession::from_bundle(bundle, capabilities),
        Ok(None) => {
            info!("No saved session, starting with onboarding");
            ChatSession::new(capabilities)
        }
        Err(e) => {
            warn!("Failed to load the saved session, starting fresh: {:?}", e);
            let mut session = ChatSession::new(capabilities);
            session.report_load_failure();
            session
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web::test_support::{ana, MemoryStore};
    use companion_core::session::LOAD_FAILURE_BANNER;

    #[tokio::test]
    async fn unreadable_bundle_starts_fresh_with_a_banner() {
        let store = MemoryStore::failing();
        let session = restore_session(&store, SpeechCapabilities::default()).await;
        assert!(session.profile().is_none());
        assert_eq!(session.banner(), Some(LOAD_FAILURE_BANNER));
    }

    #[tokio::test]
    async fn saved_bundle_is_restored_quietly() {
        let store = MemoryStore::default();
        let mut previous = ChatSession::new(SpeechCapabilities::default());
        previous.start(ana());
        store.save(&previous.to_bundle().unwrap()).await.unwrap();

        let session = restore_session(&store, SpeechCapabilities::default()).await;
        assert_eq!(session.profile().map(|profile| profile.name.as_str()), Some("Ana"));
        assert_eq!(session.banner(), None);
    }
}
