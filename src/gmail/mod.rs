//! Gmail API module
//!
//! Contains types, query translation, and the client for interacting with the Gmail API.

pub mod client;
pub mod query;
pub mod types;
pub mod utils;

pub use client::{GmailService, ListOptions};
pub use utils::OutgoingEmail;
