//! Client side of Rapport: talking to the server, building and resolving
//! share links, keeping the local contact book, and polling the exchange
//! mailbox.
//!
//! The `rapport` binary in `main.rs` is a thin shell over this library.

pub mod book;
pub mod client;
pub mod error;
pub mod events;
pub mod poller;
pub mod profile;
pub mod repository;
pub mod share;

pub use error::{ClientError, Result};

#[cfg(test)]
pub(crate) mod fakes;
