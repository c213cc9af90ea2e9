//! Endpoint handlers.

use crate::error::CometDictError;
use crate::http::AppState;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Form;
use serde::Deserialize;

#[derive(Deserialize)]
pub(crate) struct ClientParams {
    client_id: String,
}

#[derive(Deserialize)]
pub(crate) struct SubscribeParams {
    client_id: String,
    domain: String,
}

#[derive(Deserialize)]
pub(crate) struct MessagesParams {
    client_id: String,
    messages: String,
}

fn error_response(err: &CometDictError) -> Response {
    let status = match err {
        CometDictError::UnknownClient(_) => StatusCode::NOT_IMPLEMENTED,
        CometDictError::BadDomain(_)
        | CometDictError::MalformedMessage(_)
        | CometDictError::Json(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string()).into_response()
}

pub(crate) async fn connect(
    State(state): State<AppState>,
    Query(params): Query<ClientParams>,
) -> Response {
    state.push.connect(&params.client_id);
    StatusCode::OK.into_response()
}

pub(crate) async fn disconnect(
    State(state): State<AppState>,
    Query(params): Query<ClientParams>,
) -> Response {
    state.push.disconnect(&params.client_id);
    StatusCode::OK.into_response()
}

pub(crate) async fn receive(
    State(state): State<AppState>,
    Query(params): Query<ClientParams>,
) -> Response {
    match state.push.receive(&params.client_id).await {
        Ok(Some(payload)) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            payload,
        )
            .into_response(),
        Ok(None) => StatusCode::OK.into_response(),
        Err(err) => error_response(&err),
    }
}

pub(crate) async fn flush(
    State(state): State<AppState>,
    Query(params): Query<ClientParams>,
) -> Response {
    match state.push.flush(&params.client_id) {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => error_response(&err),
    }
}

pub(crate) async fn subscribe(
    State(state): State<AppState>,
    Form(params): Form<SubscribeParams>,
) -> Response {
    match state.store.subscribe(&params.client_id, &params.domain) {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => error_response(&err),
    }
}

pub(crate) async fn messages(
    State(state): State<AppState>,
    Form(params): Form<MessagesParams>,
) -> Response {
    match state.store.messages(&params.client_id, &params.messages) {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => error_response(&err),
    }
}
