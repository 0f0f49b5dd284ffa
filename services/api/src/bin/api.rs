//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{JsonFileStore, OpenAiChatAdapter, OpenAiSstAdapter, OpenAiTtsAdapter},
    config::Config,
    error::ApiError,
    web::{
        diary::{
            add_task_handler, close_diary_handler, delete_task_handler, get_diary_handler,
            save_entry_handler, save_notes_handler, toggle_task_handler,
        },
        live_ws_handler, persistence_process,
        rest::{
            close_breathing_handler, close_tools_menu_handler, create_profile_handler,
            delete_profile_handler, dismiss_banner_handler, edit_last_message_handler,
            get_session_handler, get_thread_handler, open_breathing_handler,
            open_tools_menu_handler, select_tool_handler, stop_generation_handler,
            submit_message_handler, toggle_live_handler, typing_complete_handler, ApiDoc,
        },
        state::{restore_session, AppState},
    },
};
use async_openai::{config::OpenAIConfig, types::audio::SpeechModel, Client};
use axum::http::{header::CONTENT_TYPE, HeaderValue, Method};
use axum::{
    routing::{delete, get, post, put},
    Router,
};
use companion_core::ports::{GenerationService, SpeechToTextService, TextToSpeechService};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Initialize Service Adapters ---
    let mut openai_config = OpenAIConfig::new().with_api_key(config.require_api_key()?);
    if let Some(base_url) = &config.openai_base_url {
        info!(%base_url, "Using a custom provider endpoint");
        openai_config = openai_config.with_api_base(base_url);
    }
    let openai_client = Client::with_config(openai_config);

    let generation_adapter: Arc<dyn GenerationService> = Arc::new(OpenAiChatAdapter::new(
        openai_client.clone(),
        config.chat_model.clone(),
        config.image_model.clone(),
    ));

    let sst_adapter: Arc<dyn SpeechToTextService> = Arc::new(OpenAiSstAdapter::new(
        openai_client.clone(),
        config.sst_model.clone(),
    ));

    let tts_voice = OpenAiTtsAdapter::parse_voice(&config.tts_voice).ok_or_else(|| {
        ApiError::Internal(format!(
            "Invalid TTS voice specified in config: '{}'",
            config.tts_voice
        ))
    })?;
    let tts_adapter: Arc<dyn TextToSpeechService> = Arc::new(OpenAiTtsAdapter::new(
        openai_client.clone(),
        SpeechModel::Tts1,
        tts_voice,
    ));
    let sst_adapter = Some(sst_adapter);
    let tts_adapter = Some(tts_adapter);

    // --- 3. Restore the Saved Session ---
    let bundle_store = Arc::new(JsonFileStore::new(config.data_path.clone()));
    info!(path = %bundle_store.path().display(), "Loading the session bundle...");
    let capabilities = AppState::speech_capabilities(&sst_adapter, &tts_adapter);
    let session = restore_session(bundle_store.as_ref(), capabilities).await;

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState::new(
        config.clone(),
        session,
        generation_adapter,
        bundle_store,
        sst_adapter,
        tts_adapter,
    ));
    let persistence = tokio::spawn(persistence_process(app_state.clone()));

    // --- 5. Create the Web Router ---
    let allowed_origin = config.allowed_origin.parse::<HeaderValue>().map_err(|e| {
        ApiError::Internal(format!(
            "Invalid ALLOWED_ORIGIN '{}': {}",
            config.allowed_origin, e
        ))
    })?;
    let cors = CorsLayer::new()
        .allow_origin(allowed_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE]);

    let api_router = Router::new()
        .route("/session", get(get_session_handler))
        .route("/profile", post(create_profile_handler).delete(delete_profile_handler))
        .route("/messages", post(submit_message_handler))
        .route("/messages/edit-last", post(edit_last_message_handler))
        .route("/threads/{mode}", get(get_thread_handler))
        .route("/generation/stop", post(stop_generation_handler))
        .route("/generation/typing-complete", post(typing_complete_handler))
        .route("/tools/menu", post(open_tools_menu_handler).delete(close_tools_menu_handler))
        .route("/tools/select", post(select_tool_handler))
        .route("/live/toggle", post(toggle_live_handler))
        .route("/live/ws", get(live_ws_handler))
        .route("/breathing/open", post(open_breathing_handler))
        .route("/breathing/close", post(close_breathing_handler))
        .route("/banner", delete(dismiss_banner_handler))
        .route("/diary", get(get_diary_handler).delete(close_diary_handler))
        .route("/diary/entries/{date}", put(save_entry_handler))
        .route("/diary/notes", put(save_notes_handler))
        .route("/diary/tasks", post(add_task_handler))
        .route("/diary/tasks/{id}/toggle", post(toggle_task_handler))
        .route("/diary/tasks/{id}", delete(delete_task_handler))
        .layer(cors)
        .with_state(app_state.clone());

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(app_state.shutdown.clone()))
        .await?;

    // --- 7. Flush Pending Changes ---
    app_state.shutdown.cancel();
    if let Err(e) = persistence.await {
        error!("Persistence task panicked: {:?}", e);
    }
    info!("Server stopped.");
    Ok(())
}

/// Resolves on Ctrl+C, cancelling `shutdown` so background work can wind down.
async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for the shutdown signal: {}", e);
        shutdown.cancelled().await;
        return;
    }
    info!("Shutdown signal received.");
    shutdown.cancel();
}
