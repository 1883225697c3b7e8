//! HTTP API handlers for Bondguard.
//!
//! Two audiences share the router:
//!
//! - the client app: `/session/*` for sign-up, login and profile, `/panic/*`
//!   for the alert flow
//! - the admin console: `/admin/*` for the user directory, SMS recipients and
//!   metrics
//!
//! Every failure is rendered as a single alert body, `{"title", "message"}`,
//! with a matching status code.
//!
//! Logging never includes alert bodies, contact numbers or passwords.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument, warn};

use crate::accounts;
use crate::alert::{
    LocationFix, LocationProvider, PanicDispatch, PanicFlow, PanicRequest, PanicState,
};
use crate::error::{Error, Result};
use crate::linker::AppLinker;
use crate::model::{
    LoginRequest, MetricsQuery, MetricsSnapshot, NewRecipient, PanicTrigger, Period,
    PrimaryNumber, ProfileUpdate, Recipient, RecipientSettings, SignUpRequest, User,
};
use crate::store::Backend;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState<S> {
    pub store: S,
    pub panic: Arc<PanicFlow<AppLinker>>,
}

/// Build the full router over a backend.
pub fn router<S: Backend>(state: AppState<S>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/session/login", post(login::<S>))
        .route("/session/signup", post(sign_up::<S>))
        .route("/session/logout", post(logout::<S>))
        .route(
            "/session",
            get(get_session::<S>)
                .put(update_profile::<S>)
                .delete(delete_account::<S>),
        )
        .route("/panic", get(panic_status::<S>).post(trigger_panic::<S>))
        .route("/panic/cancel", post(cancel_panic::<S>))
        .route("/panic/call", post(call_agent::<S>))
        .route("/admin/users", get(list_users::<S>))
        .route(
            "/admin/users/:id",
            put(update_user::<S>).delete(delete_user::<S>),
        )
        .route(
            "/admin/recipients",
            get(get_recipients::<S>).post(add_recipient::<S>),
        )
        .route("/admin/recipients/primary", put(set_primary::<S>))
        .route("/admin/recipients/:id", delete(remove_recipient::<S>))
        .route("/admin/metrics", get(get_metrics::<S>))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// Alert dialog body returned on every failure.
#[derive(Debug, Serialize)]
pub struct AlertBody {
    pub title: &'static str,
    pub message: String,
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::PermissionDenied => StatusCode::FORBIDDEN,
            Error::LocationUnavailable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::LinkOpenFailed(_) => StatusCode::BAD_GATEWAY,
            Error::InvalidPeriod(_) => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::InvalidCredentials | Error::NoSession => StatusCode::UNAUTHORIZED,
            Error::Database(_) | Error::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (title, message) = self.alert();
        (self.status_code(), Json(AlertBody { title, message })).into_response()
    }
}

/// GET /health - Simple health check endpoint.
pub async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

// ============================================================================
// Session
// ============================================================================

/// POST /session/login - Sign in with the demo credentials.
#[instrument(skip(state, request))]
pub async fn login<S: Backend>(
    State(state): State<AppState<S>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<User>> {
    let user = accounts::login(&request.email, &request.password).inspect_err(|_| {
        warn!("Login rejected");
    })?;

    state.store.set_user(user.clone()).await?;
    info!(user_id = %user.id, "Session started");

    Ok(Json(user))
}

/// POST /session/signup - Register and sign in.
///
/// The new account is added to the directory so the admin console sees it.
#[instrument(skip(state, request))]
pub async fn sign_up<S: Backend>(
    State(state): State<AppState<S>>,
    Json(request): Json<SignUpRequest>,
) -> Result<(StatusCode, Json<User>)> {
    let user = accounts::sign_up(request);

    state.store.insert_user(user.clone()).await?;
    state.store.set_user(user.clone()).await?;
    info!(user_id = %user.id, "Account created");

    Ok((StatusCode::CREATED, Json(user)))
}

/// GET /session - The signed-in user.
#[instrument(skip(state))]
pub async fn get_session<S: Backend>(State(state): State<AppState<S>>) -> Result<Json<User>> {
    state.store.get_user().await?.map(Json).ok_or(Error::NoSession)
}

/// PUT /session - Edit the signed-in user's profile.
///
/// The directory entry is updated too when it exists.
#[instrument(skip(state, update))]
pub async fn update_profile<S: Backend>(
    State(state): State<AppState<S>>,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<User>> {
    let current = state.store.get_user().await?.ok_or(Error::NoSession)?;
    let updated = update.apply(current);

    state.store.set_user(updated.clone()).await?;
    let in_directory = state.store.update_user(updated.clone()).await?;
    info!(user_id = %updated.id, in_directory, "Profile updated");

    Ok(Json(updated))
}

/// POST /session/logout - End the session.
#[instrument(skip(state))]
pub async fn logout<S: Backend>(State(state): State<AppState<S>>) -> Result<StatusCode> {
    state.panic.cancel().await;
    state.store.clear().await?;
    info!("Session ended");
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /session - Delete the signed-in account and end the session.
#[instrument(skip(state))]
pub async fn delete_account<S: Backend>(State(state): State<AppState<S>>) -> Result<StatusCode> {
    let user = state.store.get_user().await?.ok_or(Error::NoSession)?;

    let removed = state.store.delete_user(&user.id).await?;
    state.panic.cancel().await;
    state.store.clear().await?;
    info!(user_id = %user.id, removed, "Account deleted");

    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Panic
// ============================================================================

/// Permission answer and fix reported by the device.
#[derive(Debug, Clone, Copy)]
pub struct ReportedLocation {
    permission_granted: bool,
    fix: Option<LocationFix>,
}

impl From<PanicTrigger> for ReportedLocation {
    fn from(trigger: PanicTrigger) -> Self {
        let fix = match (trigger.latitude, trigger.longitude) {
            (Some(latitude), Some(longitude)) => Some(LocationFix {
                latitude,
                longitude,
                accuracy: trigger.accuracy.unwrap_or_default(),
            }),
            _ => None,
        };

        Self {
            permission_granted: trigger.permission_granted,
            fix,
        }
    }
}

impl LocationProvider for ReportedLocation {
    async fn request_permission(&self) -> bool {
        self.permission_granted
    }

    async fn current_fix(&self) -> Result<LocationFix> {
        self.fix
            .ok_or_else(|| Error::LocationUnavailable("no position reported".to_string()))
    }
}

#[derive(Debug, Serialize)]
pub struct PanicStatus {
    pub state: PanicState,
    pub pending_dial: bool,
}

#[derive(Debug, Serialize)]
pub struct PanicResponse {
    pub state: PanicState,
    #[serde(flatten)]
    pub dispatch: PanicDispatch,
}

/// POST /panic - Send an emergency alert.
///
/// The SMS composer opens right away; the primary agent number is dialed
/// after the configured delay. A log entry is recorded for signed-in users.
#[instrument(skip(state, trigger))]
pub async fn trigger_panic<S: Backend>(
    State(state): State<AppState<S>>,
    Json(trigger): Json<PanicTrigger>,
) -> Result<Json<PanicResponse>> {
    let user = state.store.get_user().await?;
    let dial_number = state.store.get_recipients().await?.primary;
    let location = ReportedLocation::from(trigger);

    let request = PanicRequest {
        user: user.clone(),
        dial_number,
    };
    let dispatch = state.panic.trigger(&location, request).await?;

    if let Some(user) = &user {
        // The alert already went out; a logging failure must not undo that
        if let Err(e) = state
            .store
            .record_panic(user, Some(dispatch.map_link.clone()))
            .await
        {
            warn!(user_id = %user.id, error = %e, "Failed to record panic log");
        }
    }

    Ok(Json(PanicResponse {
        state: state.panic.state().await,
        dispatch,
    }))
}

/// GET /panic - Current flow state.
pub async fn panic_status<S: Backend>(State(state): State<AppState<S>>) -> Json<PanicStatus> {
    Json(PanicStatus {
        state: state.panic.state().await,
        pending_dial: state.panic.has_pending_dial().await,
    })
}

/// POST /panic/cancel - "I'm safe".
#[instrument(skip(state))]
pub async fn cancel_panic<S: Backend>(State(state): State<AppState<S>>) -> Json<PanicStatus> {
    let aborted = state.panic.cancel().await;
    info!(dial_aborted = aborted, "Panic alert canceled");

    Json(PanicStatus {
        state: state.panic.state().await,
        pending_dial: false,
    })
}

/// POST /panic/call - Dial the primary agent number immediately.
#[instrument(skip(state))]
pub async fn call_agent<S: Backend>(State(state): State<AppState<S>>) -> Result<StatusCode> {
    let primary = state.store.get_recipients().await?.primary;

    match state.panic.call_agent_now(&primary).await {
        Ok(()) => Ok(StatusCode::ACCEPTED),
        Err(e) => {
            warn!(error = %e, "Agent call did not open");
            Err(e)
        }
    }
}

// ============================================================================
// Admin
// ============================================================================

/// GET /admin/users - The user directory.
#[instrument(skip(state))]
pub async fn list_users<S: Backend>(State(state): State<AppState<S>>) -> Result<Json<Vec<User>>> {
    let users = state.store.get_all_users().await?;
    info!(user_count = users.len(), "Users listed");
    Ok(Json(users))
}

/// PUT /admin/users/:id - Replace a directory entry.
///
/// The id in the path wins over any id in the body.
#[instrument(skip(state, user))]
pub async fn update_user<S: Backend>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
    Json(mut user): Json<User>,
) -> Result<Json<User>> {
    user.id = id;

    if !state.store.update_user(user.clone()).await? {
        warn!(user_id = %user.id, "Update for unknown user");
        return Err(Error::not_found("user", user.id));
    }

    info!(user_id = %user.id, "User updated");
    Ok(Json(user))
}

/// DELETE /admin/users/:id - Remove a directory entry.
#[instrument(skip(state))]
pub async fn delete_user<S: Backend>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    if !state.store.delete_user(&id).await? {
        warn!(user_id = %id, "Delete for unknown user");
        return Err(Error::not_found("user", id));
    }

    info!(user_id = %id, "User deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /admin/recipients - Primary number and SMS recipient list.
#[instrument(skip(state))]
pub async fn get_recipients<S: Backend>(
    State(state): State<AppState<S>>,
) -> Result<Json<RecipientSettings>> {
    Ok(Json(state.store.get_recipients().await?))
}

/// PUT /admin/recipients/primary - Set the number the panic flow dials.
#[instrument(skip(state, body))]
pub async fn set_primary<S: Backend>(
    State(state): State<AppState<S>>,
    Json(body): Json<PrimaryNumber>,
) -> Result<Json<RecipientSettings>> {
    state.store.update_primary_number(body.phone).await?;
    info!("Primary agent number updated");
    Ok(Json(state.store.get_recipients().await?))
}

/// POST /admin/recipients - Add an SMS recipient.
#[instrument(skip(state, body))]
pub async fn add_recipient<S: Backend>(
    State(state): State<AppState<S>>,
    Json(body): Json<NewRecipient>,
) -> Result<(StatusCode, Json<Recipient>)> {
    let created = state.store.add_recipient(body.name, body.phone).await?;
    info!(recipient_id = %created.id, "Recipient added");
    Ok((StatusCode::CREATED, Json(created)))
}

/// DELETE /admin/recipients/:id - Remove an SMS recipient.
///
/// The primary number is left as it is even if it belonged to this recipient.
#[instrument(skip(state))]
pub async fn remove_recipient<S: Backend>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    if !state.store.remove_recipient(&id).await? {
        warn!(recipient_id = %id, "Remove for unknown recipient");
        return Err(Error::not_found("recipient", id));
    }

    info!(recipient_id = %id, "Recipient removed");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /admin/metrics - Signups, active users, top users and panic logs.
///
/// # Query Parameters
///
/// - `period` (optional): "7d", "30d" or "all" (default: "7d")
#[instrument(skip(state))]
pub async fn get_metrics<S: Backend>(
    State(state): State<AppState<S>>,
    Query(query): Query<MetricsQuery>,
) -> Result<Json<MetricsSnapshot>> {
    let period: Period = query.period.parse().inspect_err(|_| {
        warn!(period = %query.period, "Invalid period");
    })?;

    match state.store.fetch_metrics(period).await {
        Ok(snapshot) => {
            info!(
                period = period.as_str(),
                top_users = snapshot.top_users.len(),
                logs = snapshot.recent_logs.len(),
                "Metrics queried"
            );
            Ok(Json(snapshot))
        }
        Err(e) => {
            warn!(period = period.as_str(), error = %e, "Failed to fetch metrics");
            Err(e)
        }
    }
}
