//! Shared modules used by both the relay server and the client SDK
//!
//! Configuration types and the wire protocol live here so that neither side
//! depends on the other.

pub mod config;
pub mod protocol;
