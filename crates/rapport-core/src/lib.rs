//! Core types and algorithms for Rapport fact sharing.
//!
//! This crate has no HTTP or database dependencies. It owns
//! the share payload model, the privacy filter, the token codec, share-link
//! parsing, and the contact merger. The server and client crates build on it.

pub mod alias;
pub mod contact;
pub mod error;
pub mod exchange;
pub mod link;
pub mod merge;
pub mod paths;
pub mod payload;
pub mod privacy;
pub mod profile;
pub mod store;
pub mod token;

pub use error::{Error, Result};
