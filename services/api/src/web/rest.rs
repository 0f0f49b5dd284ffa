//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::{
    chat_task::spawn_generation,
    diary,
    protocol::{
        DiaryView, EditResponse, MessageView, ProfileRequest, ProfileView, SelectToolRequest,
        ServerMessage, SessionView, SubmitRequest, SubmitResponse, SubmitStatus, TaskView,
        TextRequest, ThreadView,
    },
    state::AppState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::{Local, NaiveDate};
use companion_core::{ChatSession, InputSource, PersonaMode, SubmitOutcome, Tool, UserProfile};
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::OpenApi;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        get_session_handler,
        create_profile_handler,
        delete_profile_handler,
        submit_message_handler,
        edit_last_message_handler,
        get_thread_handler,
        stop_generation_handler,
        typing_complete_handler,
        open_tools_menu_handler,
        close_tools_menu_handler,
        select_tool_handler,
        toggle_live_handler,
        open_breathing_handler,
        close_breathing_handler,
        dismiss_banner_handler,
        diary::get_diary_handler,
        diary::close_diary_handler,
        diary::save_entry_handler,
        diary::save_notes_handler,
        diary::add_task_handler,
        diary::toggle_task_handler,
        diary::delete_task_handler,
    ),
    components(
        schemas(
            ProfileRequest, SubmitRequest, SelectToolRequest, TextRequest, MessageView,
            ThreadView, ProfileView, SessionView, SubmitStatus, SubmitResponse, EditResponse,
            TaskView, DiaryView
        )
    ),
    tags(
        (name = "Companion API", description = "Chat, persona modes and the private diary of the companion app.")
    )
)]
pub struct ApiDoc;

type HandlerResult<T> = Result<T, (StatusCode, String)>;

/// The user's calendar date, used for ages and diary keys.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn session_view(session: &ChatSession) -> Json<SessionView> {
    Json(SessionView::from(session.snapshot()))
}

fn parse_mode(mode: &str) -> HandlerResult<PersonaMode> {
    mode.parse::<PersonaMode>()
        .map_err(|e| (StatusCode::NOT_FOUND, e))
}

//=========================================================================================
// Session and Profile
//=========================================================================================

/// Get the current session state.
#[utoipa::path(
    get,
    path = "/session",
    responses((status = 200, description = "The session state", body = SessionView))
)]
pub async fn get_session_handler(State(app_state): State<Arc<AppState>>) -> impl IntoResponse {
    let session = app_state.session.lock().await;
    session_view(&session)
}

/// Complete onboarding with a new profile.
#[utoipa::path(
    post,
    path = "/profile",
    request_body = ProfileRequest,
    responses(
        (status = 201, description = "Profile created", body = SessionView),
        (status = 400, description = "Empty name or a birth date in the future"),
        (status = 409, description = "A profile already exists")
    )
)]
pub async fn create_profile_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<ProfileRequest>,
) -> HandlerResult<impl IntoResponse> {
    let profile = UserProfile::new(&payload.name, payload.gender, payload.birth_date, today())
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    let mut session = app_state.session.lock().await;
    if session.profile().is_some() {
        return Err((StatusCode::CONFLICT, "A profile already exists".to_string()));
    }
    session.start(profile);
    app_state.after_change(&mut session);
    Ok((StatusCode::CREATED, session_view(&session)))
}

/// Log out, erasing the profile and every stored conversation.
#[utoipa::path(
    delete,
    path = "/profile",
    responses(
        (status = 204, description = "Everything erased"),
        (status = 500, description = "The stored bundle could not be removed")
    )
)]
pub async fn delete_profile_handler(
    State(app_state): State<Arc<AppState>>,
) -> HandlerResult<impl IntoResponse> {
    let mut session = app_state.session.lock().await;
    session.logout();
    app_state.after_change(&mut session);
    // Cleared under the lock so a pending save cannot resurrect the old bundle.
    app_state.bundle_store.clear().await.map_err(|e| {
        error!("Failed to erase the session bundle: {:?}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to erase stored data".to_string(),
        )
    })?;
    info!("User logged out");
    Ok(StatusCode::NO_CONTENT)
}

//=========================================================================================
// Messages
//=========================================================================================

/// Send a typed message.
///
/// Commands (tool menu, diary, mode switches, confirmation answers) are handled
/// immediately. Ordinary content starts a generation whose reply arrives later;
/// poll the thread or listen on the live socket for `thread_updated`.
#[utoipa::path(
    post,
    path = "/messages",
    request_body = SubmitRequest,
    responses((status = 200, description = "What happened to the message", body = SubmitResponse))
)]
pub async fn submit_message_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<SubmitRequest>,
) -> impl IntoResponse {
    let mut session = app_state.session.lock().await;
    let (status, mode) = match session.submit(&payload.text, InputSource::Typed, today()) {
        SubmitOutcome::Ignored => (SubmitStatus::Ignored, session.mode()),
        SubmitOutcome::Handled(routing) => {
            info!(?routing, "Message handled as a command");
            (SubmitStatus::Handled, session.mode())
        }
        SubmitOutcome::Generate(request) => {
            let mode = request.mode;
            spawn_generation(app_state.clone(), request);
            (SubmitStatus::Generating, mode)
        }
    };
    if status != SubmitStatus::Ignored {
        app_state.publish(ServerMessage::ThreadUpdated { mode: mode.to_string() });
    }
    app_state.after_change(&mut session);

    Json(SubmitResponse {
        status,
        session: SessionView::from(session.snapshot()),
        thread: ThreadView::of(&session, mode),
    })
}

/// Take back the last user message of the current thread for editing.
#[utoipa::path(
    post,
    path = "/messages/edit-last",
    responses((status = 200, description = "The removed text and the remaining thread", body = EditResponse))
)]
pub async fn edit_last_message_handler(State(app_state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut session = app_state.session.lock().await;
    let text = session.edit_last_message();
    app_state.after_change(&mut session);
    let mode = session.mode();
    Json(EditResponse {
        text,
        thread: ThreadView::of(&session, mode),
    })
}

/// Get the messages of one persona thread.
#[utoipa::path(
    get,
    path = "/threads/{mode}",
    params(("mode" = String, Path, description = "companion, counselor, live, artist, chef, dj or coding")),
    responses(
        (status = 200, description = "The thread", body = ThreadView),
        (status = 404, description = "Unknown mode")
    )
)]
pub async fn get_thread_handler(
    State(app_state): State<Arc<AppState>>,
    Path(mode): Path<String>,
) -> HandlerResult<impl IntoResponse> {
    let mode = parse_mode(&mode)?;
    let session = app_state.session.lock().await;
    Ok(Json(ThreadView::of(&session, mode)))
}

/// Stop revealing the reply that is being typed out.
#[utoipa::path(
    post,
    path = "/generation/stop",
    responses((status = 200, description = "The session state", body = SessionView))
)]
pub async fn stop_generation_handler(State(app_state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut session = app_state.session.lock().await;
    session.stop_generation();
    app_state.after_change(&mut session);
    session_view(&session)
}

/// The client finished typing out the latest reply.
#[utoipa::path(
    post,
    path = "/generation/typing-complete",
    responses((status = 200, description = "The session state", body = SessionView))
)]
pub async fn typing_complete_handler(State(app_state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut session = app_state.session.lock().await;
    session.typing_complete();
    app_state.after_change(&mut session);
    session_view(&session)
}

//=========================================================================================
// Tools and Modes
//=========================================================================================

#[utoipa::path(
    post,
    path = "/tools/menu",
    responses((status = 200, description = "The session state", body = SessionView))
)]
pub async fn open_tools_menu_handler(State(app_state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut session = app_state.session.lock().await;
    session.open_tools_menu();
    session_view(&session)
}

#[utoipa::path(
    delete,
    path = "/tools/menu",
    responses((status = 200, description = "The session state", body = SessionView))
)]
pub async fn close_tools_menu_handler(State(app_state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut session = app_state.session.lock().await;
    session.close_tools_menu();
    session_view(&session)
}

/// Pick an entry of the tools menu: the diary or a persona mode.
#[utoipa::path(
    post,
    path = "/tools/select",
    request_body = SelectToolRequest,
    responses(
        (status = 200, description = "The session state", body = SessionView),
        (status = 400, description = "Unknown tool"),
        (status = 409, description = "No profile yet")
    )
)]
pub async fn select_tool_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<SelectToolRequest>,
) -> HandlerResult<impl IntoResponse> {
    let tool = match payload.tool.as_str() {
        "diary" => Tool::Diary,
        other => Tool::Mode(
            other
                .parse::<PersonaMode>()
                .map_err(|e| (StatusCode::BAD_REQUEST, e))?,
        ),
    };

    let mut session = app_state.session.lock().await;
    session
        .select_tool(tool)
        .ok_or_else(|| (StatusCode::CONFLICT, "Complete onboarding first".to_string()))?;
    app_state.publish(ServerMessage::ThreadUpdated {
        mode: session.mode().to_string(),
    });
    app_state.after_change(&mut session);
    Ok(session_view(&session))
}

/// Enter live mode, or leave it for companion mode.
#[utoipa::path(
    post,
    path = "/live/toggle",
    responses(
        (status = 200, description = "The session state", body = SessionView),
        (status = 409, description = "No profile yet")
    )
)]
pub async fn toggle_live_handler(State(app_state): State<Arc<AppState>>) -> HandlerResult<impl IntoResponse> {
    let mut session = app_state.session.lock().await;
    let transition = session
        .toggle_live()
        .ok_or_else(|| (StatusCode::CONFLICT, "Complete onboarding first".to_string()))?;
    info!(?transition, "Live mode toggled");
    app_state.after_change(&mut session);
    Ok(session_view(&session))
}

//=========================================================================================
// Breathing Exercise and Banner
//=========================================================================================

#[utoipa::path(
    post,
    path = "/breathing/open",
    responses(
        (status = 200, description = "The session state", body = SessionView),
        (status = 409, description = "The exercise is not on offer")
    )
)]
pub async fn open_breathing_handler(State(app_state): State<Arc<AppState>>) -> HandlerResult<impl IntoResponse> {
    let mut session = app_state.session.lock().await;
    if !session.open_breathing_exercise() {
        warn!("Breathing exercise requested while not on offer");
        return Err((StatusCode::CONFLICT, "The breathing exercise is not available".to_string()));
    }
    Ok(session_view(&session))
}

#[utoipa::path(
    post,
    path = "/breathing/close",
    responses((status = 200, description = "The session state", body = SessionView))
)]
pub async fn close_breathing_handler(State(app_state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut session = app_state.session.lock().await;
    session.close_breathing_exercise();
    app_state.after_change(&mut session);
    session_view(&session)
}

#[utoipa::path(
    delete,
    path = "/banner",
    responses((status = 200, description = "The session state", body = SessionView))
)]
pub async fn dismiss_banner_handler(State(app_state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut session = app_state.session.lock().await;
    session.dismiss_banner();
    session_view(&session)
}
