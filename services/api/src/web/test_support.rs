//! services/api/src/web/test_support.rs
//!
//! In-memory port implementations and an `AppState` builder for the web tests.

use crate::config::Config;
use crate::web::state::AppState;
use async_trait::async_trait;
use chrono::NaiveDate;
use companion_core::{
    BundleStore, ChatSession, GeneratedImage, GenerationConfig, GenerationService, Gender,
    HistoryTurn, PortError, PortResult, SessionBundle, SpeechCapabilities, UserProfile,
};
use std::sync::{Arc, Mutex};

/// Replies with the same text to every request.
pub struct FakeGeneration {
    reply: String,
}

impl FakeGeneration {
    pub fn replying(reply: &str) -> Self {
        Self { reply: reply.to_string() }
    }
}

#[async_trait]
impl GenerationService for FakeGeneration {
    async fn generate_text(
        &self,
        _instruction: &str,
        _config: &GenerationConfig,
        _history: &[HistoryTurn],
        _message: &str,
    ) -> PortResult<String> {
        Ok(self.reply.clone())
    }

    async fn generate_image(&self, _prompt: &str) -> PortResult<GeneratedImage> {
        Ok(GeneratedImage::Url("https://images.test/1.jpg".into()))
    }
}

/// Records every saved bundle.
#[derive(Default)]
pub struct MemoryStore {
    saved: Mutex<Vec<SessionBundle>>,
    cleared: Mutex<usize>,
    failing: bool,
}

impl MemoryStore {
    /// A store whose loads and saves always fail.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Default::default()
        }
    }

    pub fn saved(&self) -> Vec<SessionBundle> {
        self.saved.lock().unwrap().clone()
    }

    pub fn cleared(&self) -> usize {
        *self.cleared.lock().unwrap()
    }
}

#[async_trait]
impl BundleStore for MemoryStore {
    async fn load(&self) -> PortResult<Option<SessionBundle>> {
        if self.failing {
            return Err(PortError::Unavailable("corrupt bundle".into()));
        }
        Ok(self.saved.lock().unwrap().last().cloned())
    }

    async fn save(&self, bundle: &SessionBundle) -> PortResult<()> {
        if self.failing {
            return Err(PortError::Unavailable("disk full".into()));
        }
        self.saved.lock().unwrap().push(bundle.clone());
        Ok(())
    }

    async fn clear(&self) -> PortResult<()> {
        *self.cleared.lock().unwrap() += 1;
        Ok(())
    }
}

pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
}

pub fn ana() -> UserProfile {
    UserProfile::new("Ana", Gender::Female, NaiveDate::from_ymd_opt(2001, 1, 1).unwrap(), today()).unwrap()
}

pub fn app_state(generation: FakeGeneration) -> Arc<AppState> {
    app_state_with_store(generation, Arc::new(MemoryStore::default()))
}

pub fn app_state_with_store(generation: FakeGeneration, store: Arc<MemoryStore>) -> Arc<AppState> {
    let config = Config::from_lookup(|_| None).unwrap();
    Arc::new(AppState::new(
        Arc::new(config),
        ChatSession::new(SpeechCapabilities::default()),
        Arc::new(generation),
        store,
        None,
        None,
    ))
}
