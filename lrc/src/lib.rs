//! # lrc
//!
//! Embedded line-relay-chat engine. A [`Server`] hosts one live channel:
//! clients connect over a websocket, open lines with `init`, stream edits
//! with `body`, and seal them with `pub`. The server allocates a monotonic
//! message id per line and relays every frame to all connected clients.
//!
//! The host backend observes new lines through the [`InitEvent`] stream and
//! may later verify that a client was the author of a line via the HMAC
//! nonce handed out on `ack` (see [`generate_nonce`]).

mod nonce;
mod proto;
mod server;

pub use nonce::generate_nonce;
pub use proto::{Frame, InitEvent};
pub use server::{Resolver, Server, ServerBuilder, ServerError};
