//! services/api/src/adapters/sst.rs
//!
//! This module contains the adapter for OpenAI's Speech-to-Text (Whisper) service.
//! It implements the `SpeechToTextService` port from the `core` crate and backs
//! speech recognition for live mode.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::audio::{AudioInput, CreateTranscriptionRequest},
    Client,
};
use async_trait::async_trait;
use companion_core::ports::{PortError, PortResult, SpeechToTextService};
use hound::{WavSpec, WavWriter};

/// Live mode captures mono 16-bit PCM at this rate.
pub const CAPTURE_SAMPLE_RATE: u32 = 48_000;

/// Recognition language for the companion's Portuguese conversations.
const LANGUAGE: &str = "pt";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `SpeechToTextService` port using the OpenAI Whisper API.
#[derive(Clone)]
pub struct OpenAiSstAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiSstAdapter {
    /// Creates a new `OpenAiSstAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }

    /// Wraps raw little-endian PCM16 samples in a WAV container.
    fn pcm16_to_wav(pcm_data: &[u8], sample_rate: u32) -> Result<Vec<u8>, hound::Error> {
        let mut cursor = std::io::Cursor::new(Vec::new());
        let spec = WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut writer = WavWriter::new(&mut cursor, spec)?;
        for chunk in pcm_data.chunks_exact(2) {
            writer.write_sample(i16::from_le_bytes([chunk[0], chunk[1]]))?;
        }
        writer.finalize()?;
        Ok(cursor.into_inner())
    }
}

//=========================================================================================
// `SpeechToTextService` Trait Implementation
//=========================================================================================

#[async_trait]
impl SpeechToTextService for OpenAiSstAdapter {
    /// Transcribes one utterance of captured PCM audio.
    async fn transcribe_audio(&self, audio_data: &[u8]) -> PortResult<String> {
        if audio_data.len() < 2 {
            return Ok(String::new());
        }

        let wav_data = Self::pcm16_to_wav(audio_data, CAPTURE_SAMPLE_RATE)
            .map_err(|e| PortError::Unexpected(format!("Failed to encode WAV: {}", e)))?;

        let request = CreateTranscriptionRequest {
            file: AudioInput::from_vec_u8("utterance.wav".into(), wav_data),
            model: self.model.clone(),
            language: Some(LANGUAGE.to_string()),
            ..Default::default()
        };

        let response = self
            .client
            .audio()
            .transcription()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unavailable(e.to_string()))?;

        Ok(response.text.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcm_is_wrapped_in_a_mono_wav_header() {
        let pcm: Vec<u8> = [0i16, 1000, -1000, 32767]
            .iter()
            .flat_map(|sample| sample.to_le_bytes())
            .collect();
        let wav = OpenAiSstAdapter::pcm16_to_wav(&pcm, CAPTURE_SAMPLE_RATE).unwrap();

        let reader = hound::WavReader::new(std::io::Cursor::new(wav)).unwrap();
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.spec().sample_rate, CAPTURE_SAMPLE_RATE);
        let samples: Vec<i16> = reader.into_samples::<i16>().map(Result::unwrap).collect();
        assert_eq!(samples, vec![0, 1000, -1000, 32767]);
    }
}
