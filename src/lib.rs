pub mod anilist;
mod app;
pub mod auth;
pub mod chat;
pub mod client;
pub mod commands;
pub mod error;
pub mod provider;
pub mod redact;
pub mod settings;
pub mod state;
pub mod types;
pub mod validation;

pub fn run() -> std::process::ExitCode {
    app::run()
}
