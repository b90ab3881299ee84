//! Command-line front end: ingest, one-shot search/ask, and an interactive chat.

pub mod chat;
pub mod cli;
pub mod commands;

/// Short message for the user; falls back to the full error for non-domain failures.
pub fn user_message(err: &anyhow::Error) -> String {
    match err.downcast_ref::<healthres_core::Error>() {
        Some(e) => format!("⚠️  {} ({e})", e.user_message()),
        None => format!("⚠️  {err}"),
    }
}
