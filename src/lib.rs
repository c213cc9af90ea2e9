//! comet-dict: a server-side substrate for real-time collaboration among
//! web browser clients.
//!
//! Two tightly-coupled services over plain HTTP:
//!
//! - **push**: a per-client outbound message queue drained by repeated
//!   blocking reads (long-poll), giving the server a one-way
//!   server-to-client delivery path.
//! - **store**: named *domains*, each a durable map from string keys to
//!   JSON-encoded values, replicated by broadcast to the clients subscribed
//!   to the domain, with optimistic-concurrency collision detection and
//!   state replay to new subscribers.
//!
//! The two interact through a narrow boundary: the store hands payloads to
//! the push channel for delivery and asks it whether a client is still
//! present.
//!
//! # Quick start
//!
//! ```no_run
//! # async fn demo() -> anyhow::Result<()> {
//! use comet_dict::{Config, Hooks, Server};
//!
//! let config = Config::new("/var/lib/comet-dict");
//! let server = Server::new(&config, Hooks::new())?;
//! let app = server.router(&config);
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8000").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod hooks;
pub mod http;
pub mod push;
pub mod server;
pub mod store;
pub mod types;

pub use crate::config::Config;
pub use crate::error::{CometDictError, Result};
pub use crate::hooks::Hooks;
pub use crate::push::PushCore;
pub use crate::server::Server;
pub use crate::store::StoreCore;
pub use crate::types::{Command, DomainName, Message};
