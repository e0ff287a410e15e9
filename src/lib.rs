//! WaniKanify - replace learned vocabulary on web pages
//!
//! Downloads the user's WaniKani vocabulary, expands it into a lookup map
//! of English surface forms and rewrites HTML pages so that known words show
//! up in Japanese, each wrapped in a marker that toggles back to English.

pub mod cli;
pub mod config;
pub mod workflow;
pub mod vocab;
pub mod refresh;
pub mod substitute;
pub mod dom;
pub mod api;
pub mod storage;
pub mod ui;
pub mod error;
