//! Protocol types shared across the push channel and the store.

pub mod domain;
pub mod message;

pub use domain::DomainName;
pub use message::{
    Command, Message, EPHEMERAL_PREFIX, KEY_CLIENTS, KEY_SUBSCRIBE, KEY_SYNCED, KEY_UNSUBSCRIBE,
    RESERVED_PREFIX,
};
