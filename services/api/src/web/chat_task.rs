//! services/api/src/web/chat_task.rs
//!
//! This module contains the asynchronous "worker" responsible for a single
//! generation: it calls the provider without holding the session lock and then
//! applies the result.

use crate::web::{protocol::ServerMessage, state::AppState};
use companion_core::{GenerationOrchestrator, GenerationRequest};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Runs `request` in the background.
pub fn spawn_generation(app_state: Arc<AppState>, request: GenerationRequest) -> JoinHandle<()> {
    tokio::spawn(async move { generation_process(app_state, request).await })
}

/// Executes one generation and stores its outcome.
pub async fn generation_process(app_state: Arc<AppState>, request: GenerationRequest) {
    info!(mode = %request.mode, "Generation started");
    let result = GenerationOrchestrator::execute(app_state.generation_adapter.as_ref(), &request).await;

    let mut session = app_state.session.lock().await;
    if !session.complete_generation(&request, result) {
        return;
    }
    if let Some(banner) = session.banner() {
        app_state.publish(ServerMessage::Error {
            message: banner.to_string(),
        });
    }
    app_state.publish(ServerMessage::ThreadUpdated {
        mode: request.mode.to_string(),
    });
    app_state.after_change(&mut session);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web::test_support::{ana, app_state, today, FakeGeneration};
    use companion_core::{InputSource, PersonaMode, SubmitOutcome};

    #[tokio::test]
    async fn reply_is_stored_and_announced() {
        let app_state = app_state(FakeGeneration::replying("Olá, Ana! 💖"));
        let mut events = app_state.events.subscribe();

        let request = {
            let mut session = app_state.session.lock().await;
            session.start(ana());
            match session.submit("olá", InputSource::Typed, today()) {
                SubmitOutcome::Generate(request) => request,
                other => panic!("expected a generation request, got {:?}", other),
            }
        };

        spawn_generation(app_state.clone(), request).await.unwrap();

        let session = app_state.session.lock().await;
        assert_eq!(session.thread(PersonaMode::Companion).last().unwrap().text, "Olá, Ana! 💖");
        assert!(!session.is_generating());
        assert_eq!(
            events.recv().await.unwrap(),
            ServerMessage::ThreadUpdated { mode: "companion".into() }
        );
    }
}
