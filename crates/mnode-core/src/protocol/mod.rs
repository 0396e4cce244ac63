//! Wire formats shared with the backend daemon.
//!
//! - [`varint`] – the length prefix used by every variable-size field.
//! - [`broadcast`] – the byte layout of a masternode announce + ping.
//! - [`replies`] – the text contracts of `masternodebroadcast` replies.

pub mod broadcast;
pub mod replies;
pub mod varint;
