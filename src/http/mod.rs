//! HTTP surface: a thin translation from requests to push and store
//! operations.
//!
//! Push endpoints are GETs under the configurable comet prefix, store
//! endpoints are POSTs under the configurable dictionary prefix:
//!
//! | Method | Path | Params |
//! |--------|------|--------|
//! | GET | `{comet}/connect` | `client_id` |
//! | GET | `{comet}/disconnect` | `client_id` |
//! | GET | `{comet}/receive` | `client_id` |
//! | GET | `{comet}/flush` | `client_id` |
//! | POST | `{dict}/subscribe` | `client_id`, `domain` |
//! | POST | `{dict}/messages` | `client_id`, `messages` |
//!
//! A push operation on an unregistered client answers 501, which tells the
//! browser to reconnect. The `receive` response body is the raw JSON that
//! was queued; everything else answers with an empty 200.

pub(crate) mod handlers;

use crate::config::Config;
use crate::push::PushCore;
use crate::store::StoreCore;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub push: Arc<PushCore>,
    pub store: Arc<StoreCore>,
}

/// Build the router for both services under the configured prefixes.
pub fn router(config: &Config, push: Arc<PushCore>, store: Arc<StoreCore>) -> Router {
    let comet = Router::new()
        .route("/connect", get(handlers::connect))
        .route("/disconnect", get(handlers::disconnect))
        .route("/receive", get(handlers::receive))
        .route("/flush", get(handlers::flush));

    let dictionary = Router::new()
        .route("/subscribe", post(handlers::subscribe))
        .route("/messages", post(handlers::messages));

    Router::new()
        .nest(&config.comet_prefix, comet)
        .nest(&config.store_prefix, dictionary)
        .with_state(AppState { push, store })
}
