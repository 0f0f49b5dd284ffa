//! services/api/src/adapters/chat_llm.rs
//!
//! This module contains the adapter for the persona chat model and the image model.
//! It implements the `GenerationService` port from the `core` crate.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        chat::{
            ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
            ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
            CreateChatCompletionRequestArgs,
        },
        images::{CreateImageRequestArgs, Image, ImageModel, ImageResponseFormat, ImageSize},
    },
    Client,
};
use async_trait::async_trait;
use companion_core::{
    persona::GenerationConfig,
    ports::{GeneratedImage, GenerationService, HistoryTurn, PortError, PortResult, Role},
};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `GenerationService` using an OpenAI-compatible API.
#[derive(Clone)]
pub struct OpenAiChatAdapter {
    client: Client<OpenAIConfig>,
    chat_model: String,
    image_model: String,
}

impl OpenAiChatAdapter {
    /// Creates a new `OpenAiChatAdapter`.
    pub fn new(client: Client<OpenAIConfig>, chat_model: String, image_model: String) -> Self {
        Self {
            client,
            chat_model,
            image_model,
        }
    }

    /// Lays out the persona instruction, the replayed turns and the new message.
    fn build_messages(
        instruction: &str,
        history: &[HistoryTurn],
        message: &str,
    ) -> PortResult<Vec<ChatCompletionRequestMessage>> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(instruction)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        );

        for turn in history {
            let entry: ChatCompletionRequestMessage = match turn.role {
                Role::User => ChatCompletionRequestUserMessageArgs::default()
                    .content(turn.text.as_str())
                    .build()
                    .map_err(|e| PortError::Unexpected(e.to_string()))?
                    .into(),
                Role::Model => ChatCompletionRequestAssistantMessageArgs::default()
                    .content(turn.text.as_str())
                    .build()
                    .map_err(|e| PortError::Unexpected(e.to_string()))?
                    .into(),
            };
            messages.push(entry);
        }

        messages.push(
            ChatCompletionRequestUserMessageArgs::default()
                .content(message)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        );
        Ok(messages)
    }

    fn image_model(&self) -> ImageModel {
        match self.image_model.as_str() {
            "dall-e-2" => ImageModel::DallE2,
            "dall-e-3" => ImageModel::DallE3,
            other => ImageModel::Other(other.to_string()),
        }
    }
}

//=========================================================================================
// `GenerationService` Trait Implementation
//=========================================================================================

#[async_trait]
impl GenerationService for OpenAiChatAdapter {
    /// Generates a persona reply. The thinking budget has no counterpart in this API
    /// and is not sent.
    async fn generate_text(
        &self,
        instruction: &str,
        config: &GenerationConfig,
        history: &[HistoryTurn],
        message: &str,
    ) -> PortResult<String> {
        let messages = Self::build_messages(instruction, history, message)?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.chat_model)
            .messages(messages)
            .temperature(config.temperature)
            .top_p(config.top_p)
            .max_completion_tokens(config.max_output_tokens)
            .n(1)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        // Call the API and manually map the error, which respects the orphan rule.
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unavailable(e.to_string()))?;

        // An empty completion is a valid reply; the orchestrator substitutes filler.
        match response.choices.into_iter().next() {
            Some(choice) => Ok(choice.message.content.unwrap_or_default()),
            None => Err(PortError::Unexpected(
                "Chat model returned no choices in its response.".to_string(),
            )),
        }
    }

    /// Generates a single square image for the given description.
    async fn generate_image(&self, prompt: &str) -> PortResult<GeneratedImage> {
        let request = CreateImageRequestArgs::default()
            .prompt(prompt)
            .model(self.image_model())
            .n(1)
            .size(ImageSize::S1024x1024)
            .response_format(ImageResponseFormat::B64Json)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = self
            .client
            .images()
            .generate(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unavailable(e.to_string()))?;

        let image = response.data.into_iter().next().ok_or_else(|| {
            PortError::Unexpected("Image model returned no images in its response.".to_string())
        })?;

        match image.as_ref() {
            Image::B64Json { b64_json, .. } => Ok(GeneratedImage::Base64(b64_json.to_string())),
            Image::Url { url, .. } => Ok(GeneratedImage::Url(url.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_wrap_history_between_instruction_and_prompt() {
        let history = vec![
            HistoryTurn { role: Role::User, text: "olá".into() },
            HistoryTurn { role: Role::Model, text: "olá, Ana!".into() },
        ];
        let messages = OpenAiChatAdapter::build_messages("sê fofa", &history, "tudo bem?").unwrap();
        assert_eq!(messages.len(), 4);
        assert!(matches!(messages[0], ChatCompletionRequestMessage::System(_)));
        assert!(matches!(messages[1], ChatCompletionRequestMessage::User(_)));
        assert!(matches!(messages[2], ChatCompletionRequestMessage::Assistant(_)));
        assert!(matches!(messages[3], ChatCompletionRequestMessage::User(_)));
    }
}
