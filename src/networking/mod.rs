#![forbid(unsafe_code)]
#![allow(missing_docs)]

//! Networking: WebSocket gossip mesh.

pub mod gossip;
pub mod messages;
pub mod peer;
