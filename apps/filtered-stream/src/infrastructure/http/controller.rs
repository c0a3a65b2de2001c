//! HTTP Controller (Driver Adapter)
//!
//! Axum router for the stream simulator. Streaming endpoints validate the
//! request, register the stream, spawn its delivery loop and return a
//! newline-delimited JSON body fed by that loop. Dropping the body (client disconnect) closes the
//! channel, which ends the loop on its next write.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::{OriginalUri, Path, Query, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use chrono::Utc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{ChannelSink, RuleSource};
use crate::application::services::{StreamDispatcher, StreamSession};
use crate::domain::content::{Author, ContentItem};
use crate::domain::streaming::StreamKind;
use crate::infrastructure::store::{InMemoryStore, NewContent};
use crate::infrastructure::usage::{UsageLedger, UsageTotals};

use super::error::ApiError;
use super::request::{RulesRequest, StreamQuery};
use super::response::{
    DataResponse, KilledConnections, RuleError, RulesMeta, RulesResponse, RulesSummary,
    UpdateRulesResponse,
};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Runs delivery loops.
    pub dispatcher: Arc<StreamDispatcher<InMemoryStore>>,
    /// Content, users and rules.
    pub store: Arc<InMemoryStore>,
    /// Delivered-usage totals.
    pub usage: Arc<UsageLedger>,
    /// Parent of every session's cancellation token.
    pub shutdown: CancellationToken,
    /// Lines buffered per connection.
    pub channel_capacity: usize,
}

/// Create the HTTP router with all endpoints.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/2/tweets/search/stream", get(search_stream))
        .route("/2/tweets/sample/stream", get(sample_stream))
        .route("/2/tweets/firehose/stream", get(firehose_stream))
        .route("/2/tweets/firehose/stream/lang/{lang}", get(language_stream))
        .route(
            "/2/tweets/search/stream/rules",
            get(list_rules).post(update_rules),
        )
        .route("/2/tweets", post(create_content))
        .route("/2/users", post(upsert_user))
        .route("/2/usage/tweets", get(usage))
        .route("/2/connections/all", delete(close_all_connections))
        .with_state(state)
}

// =============================================================================
// Authentication
// =============================================================================

/// Subscriber identity from `Authorization: Bearer <token>`.
fn subscriber_id(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .ok_or(ApiError::Unauthorized)
}

// =============================================================================
// Streaming
// =============================================================================

async fn search_stream(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    Query(query): Query<StreamQuery>,
) -> Result<Response, ApiError> {
    let subscriber = subscriber_id(&headers)?;
    open_stream(&state, subscriber, StreamKind::Search, uri.path(), &query)
}

async fn sample_stream(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    Query(query): Query<StreamQuery>,
) -> Result<Response, ApiError> {
    let subscriber = subscriber_id(&headers)?;
    open_stream(&state, subscriber, StreamKind::Sample, uri.path(), &query)
}

async fn firehose_stream(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    Query(query): Query<StreamQuery>,
) -> Result<Response, ApiError> {
    let subscriber = subscriber_id(&headers)?;
    query.require_partition()?;
    open_stream(&state, subscriber, StreamKind::Firehose, uri.path(), &query)
}

async fn language_stream(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    Path(lang): Path<String>,
    headers: HeaderMap,
    Query(query): Query<StreamQuery>,
) -> Result<Response, ApiError> {
    let subscriber = subscriber_id(&headers)?;
    query.require_partition()?;
    let lang = lang.trim().to_lowercase();
    if lang.is_empty() {
        return Err(ApiError::Validation("A language code is required".to_string()));
    }
    open_stream(
        &state,
        subscriber,
        StreamKind::Language(lang),
        uri.path(),
        &query,
    )
}

/// Register a stream, spawn its delivery loop and wrap the output in a
/// streaming body.
///
/// Registration happens before the response exists, so the stream is
/// already closable and its start time already fixed when the client
/// sees the status line.
fn open_stream(
    state: &AppState,
    subscriber: String,
    kind: StreamKind,
    path: &str,
    query: &StreamQuery,
) -> Result<Response, ApiError> {
    let delay = state.dispatcher.config().delay(query.delay_ms());
    let session = StreamSession::new(subscriber, kind, path, delay)
        .with_cancel(state.shutdown.child_token());
    let (sink, rx) = ChannelSink::channel(state.channel_capacity);

    let opened = state.dispatcher.open(session, sink)?;
    let dispatcher = Arc::clone(&state.dispatcher);
    tokio::spawn(async move {
        dispatcher.deliver(opened).await;
    });

    let body = Body::from_stream(ReceiverStream::new(rx).map(Ok::<_, Infallible>));
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response())
}

// =============================================================================
// Rules
// =============================================================================

async fn list_rules(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<RulesResponse>, ApiError> {
    subscriber_id(&headers)?;
    let rules = state.store.active_rules();
    Ok(Json(RulesResponse {
        meta: RulesMeta {
            sent: Utc::now(),
            result_count: rules.len(),
            summary: None,
        },
        data: rules,
    }))
}

async fn update_rules(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<RulesRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<UpdateRulesResponse>), ApiError> {
    subscriber_id(&headers)?;
    let Json(request) = body.map_err(|e| ApiError::InvalidBody(e.body_text()))?;

    let delete_ids = request.delete_ids().to_vec();
    if request.add.is_empty() && delete_ids.is_empty() {
        return Err(ApiError::Validation(
            "Request must include rules to add or rule ids to delete".to_string(),
        ));
    }

    let changes = state.store.update_rules(request.add, &delete_ids);
    let summary = RulesSummary {
        created: changes.created.len(),
        not_created: changes.rejected.len(),
        deleted: changes.deleted.len(),
        not_deleted: changes.not_deleted.len(),
    };
    let errors = changes
        .rejected
        .into_iter()
        .map(|(rule, error)| {
            let api_error = ApiError::from(error);
            RuleError {
                value: rule.value,
                title: api_error.problem().title,
                detail: api_error.to_string(),
            }
        })
        .collect();

    let status = if summary.created > 0 {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    Ok((
        status,
        Json(UpdateRulesResponse {
            meta: RulesMeta {
                sent: Utc::now(),
                result_count: changes.created.len(),
                summary: Some(summary),
            },
            data: changes.created,
            errors,
        }),
    ))
}

// =============================================================================
// Content and Users
// =============================================================================

async fn create_content(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<NewContent>, JsonRejection>,
) -> Result<(StatusCode, Json<DataResponse<ContentItem>>), ApiError> {
    subscriber_id(&headers)?;
    let Json(new) = body.map_err(|e| ApiError::InvalidBody(e.body_text()))?;
    let item = state.store.create_content(new)?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: item })))
}

async fn upsert_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<Author>, JsonRejection>,
) -> Result<(StatusCode, Json<DataResponse<Author>>), ApiError> {
    subscriber_id(&headers)?;
    let Json(author) = body.map_err(|e| ApiError::InvalidBody(e.body_text()))?;
    if author.id.trim().is_empty() || author.username.trim().is_empty() {
        return Err(ApiError::Validation(
            "User id and username are required".to_string(),
        ));
    }
    state.store.upsert_user(author.clone());
    Ok((StatusCode::CREATED, Json(DataResponse { data: author })))
}

// =============================================================================
// Usage and Connections
// =============================================================================

async fn usage(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<DataResponse<UsageTotals>>, ApiError> {
    let subscriber = subscriber_id(&headers)?;
    Ok(Json(DataResponse {
        data: state.usage.totals(&subscriber),
    }))
}

async fn close_all_connections(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<DataResponse<KilledConnections>>, ApiError> {
    let subscriber = subscriber_id(&headers)?;
    let killed = state.dispatcher.registry().close_all(&subscriber);
    Ok(Json(DataResponse {
        data: KilledConnections {
            killed_connections: killed,
        },
    }))
}
