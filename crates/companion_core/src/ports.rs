//! crates/companion_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the companion chat core.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the generation provider, speech services and storage.

use crate::domain::SessionBundle;
use crate::persona::GenerationConfig;
use async_trait::async_trait;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., network, disk).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Generation Types
//=========================================================================================

/// The provider-side speaker of a replayed history turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryTurn {
    pub role: Role,
    pub text: String,
}

/// An image returned by the provider, either inline or by reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneratedImage {
    /// Base64-encoded JPEG bytes.
    Base64(String),
    Url(String),
}

impl GeneratedImage {
    /// The value stored in `Message::image_url`.
    pub fn into_image_url(self) -> String {
        match self {
            GeneratedImage::Base64(data) => format!("data:image/jpeg;base64,{}", data),
            GeneratedImage::Url(url) => url,
        }
    }
}

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Generates a reply for `message` given a persona instruction and prior turns.
    async fn generate_text(
        &self,
        instruction: &str,
        config: &GenerationConfig,
        history: &[HistoryTurn],
        message: &str,
    ) -> PortResult<String>;

    /// Generates an image from a text description.
    async fn generate_image(&self, prompt: &str) -> PortResult<GeneratedImage>;
}

#[async_trait]
pub trait SpeechToTextService: Send + Sync {
    /// Transcribes a slice of audio data into text.
    async fn transcribe_audio(&self, audio_data: &[u8]) -> PortResult<String>;
}

#[async_trait]
pub trait TextToSpeechService: Send + Sync {
    /// Generates audio data from a string of text.
    async fn generate_audio(&self, text: &str) -> PortResult<Vec<u8>>;
}

/// Durable storage for the single local session bundle.
#[async_trait]
pub trait BundleStore: Send + Sync {
    /// Returns `None` when nothing has been saved yet.
    async fn load(&self) -> PortResult<Option<SessionBundle>>;
    async fn save(&self, bundle: &SessionBundle) -> PortResult<()>;
    async fn clear(&self) -> PortResult<()>;
}
