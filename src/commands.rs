use crate::anilist::{AniListApi, SyncTarget};
use crate::auth::AuthSession;
use crate::chat::ChatApi;
use crate::error::ApiError;
use crate::provider::ResponseProvider;
use crate::types::{AuthResult, CommandResult};
use crate::validation::validate_chat_message;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::sync::Arc;

/// One line typed at the prompt.
#[derive(Debug, Parser)]
#[command(name = "anichat", no_binary_name = true, disable_version_flag = true)]
pub struct CommandLine {
  #[command(subcommand)]
  pub command: Command,
}

#[derive(Debug, Subcommand, PartialEq, Eq)]
pub enum Command {
  /// Sign in with email and password
  Login { email: String, password: String },
  /// Create an account
  Signup {
    email: String,
    username: String,
    password: String,
  },
  /// Sign out and forget the local session
  Logout,
  /// Ask the server who is signed in
  Whoami,
  /// Mint a new access token
  Refresh,
  /// Talk to the assistant
  Chat {
    /// Send the synced anime list along as context
    #[arg(long)]
    with_list: bool,
    /// Answer from the built-in responder without contacting the server
    #[arg(long)]
    local: bool,
    #[arg(required = true, num_args = 1.., trailing_var_arg = true)]
    message: Vec<String>,
  },
  /// Show the chat log
  History,
  /// Delete the chat log
  ClearHistory,
  /// Link an AniList account by API key
  AnilistLink {
    key: String,
    /// Keep the key in the OS keychain across runs
    #[arg(long)]
    permanent: bool,
  },
  /// Unlink the AniList account
  AnilistUnlink,
  /// Show whether an AniList key is held
  AnilistStatus,
  /// Pull an anime list from AniList
  Sync {
    /// Sync a public profile instead of the linked account
    #[arg(long)]
    public: bool,
    #[arg(long)]
    username: Option<String>,
    #[arg(long)]
    user_id: Option<u64>,
  },
  /// Leave the session
  Quit,
}

/// Splits on whitespace, keeping double-quoted runs together.
pub fn split_words(line: &str) -> Vec<String> {
  let mut words = Vec::new();
  let mut current = String::new();
  let mut quoted = false;
  let mut has_word = false;
  for ch in line.chars() {
    match ch {
      '"' => {
        quoted = !quoted;
        has_word = true;
      }
      c if c.is_whitespace() && !quoted => {
        if has_word {
          words.push(std::mem::take(&mut current));
          has_word = false;
        }
      }
      c => {
        current.push(c);
        has_word = true;
      }
    }
  }
  if has_word {
    words.push(current);
  }
  words
}

pub fn parse_line(line: &str) -> Result<Command, clap::Error> {
  CommandLine::try_parse_from(split_words(line)).map(|l| l.command)
}

fn sync_target(public: bool, username: Option<String>, user_id: Option<u64>) -> SyncTarget {
  if public || username.is_some() || user_id.is_some() {
    SyncTarget::PublicProfile { username, user_id }
  } else {
    SyncTarget::LinkedAccount
  }
}

fn api_err<T>(err: &ApiError) -> CommandResult<T> {
  CommandResult::err(err.code(), err.user_message())
}

fn auth_result(result: AuthResult) -> CommandResult<Value> {
  if result.success {
    CommandResult::ok(json!({ "user": result.user }))
  } else {
    CommandResult::err(
      "AUTH",
      result.error.unwrap_or_else(|| "Request failed.".to_string()),
    )
  }
}

fn to_value<T: serde::Serialize>(value: T) -> Value {
  serde_json::to_value(value).unwrap_or(Value::Null)
}

/// Everything a command needs, built once per process.
pub struct AppContext {
  pub session: Arc<AuthSession>,
  pub chat: ChatApi,
  pub anilist: AniListApi,
  pub provider: Arc<dyn ResponseProvider>,
  pub remember_anilist_key: bool,
}

impl AppContext {
  async fn settle<T>(&self, outcome: Result<T, ApiError>) -> CommandResult<Value>
  where
    T: serde::Serialize,
  {
    match outcome {
      Ok(value) => CommandResult::ok(to_value(value)),
      Err(e) => {
        self.session.on_api_error(&e).await;
        api_err(&e)
      }
    }
  }

  async fn local_reply(&self, text: &str) -> CommandResult<Value> {
    if let Err(e) = validate_chat_message(text) {
      return api_err(&ApiError::from(e));
    }
    match self.provider.respond(text, &[]).await {
      Ok(reply) => CommandResult::ok(json!({ "role": "assistant", "content": reply })),
      Err(e) => CommandResult::err("PROVIDER", e.to_string()),
    }
  }

  /// Runs one command; `None` means the user asked to leave.
  pub async fn execute(&self, command: Command) -> Option<CommandResult<Value>> {
    let result = match command {
      Command::Login { email, password } => auth_result(self.session.login(&email, &password).await),
      Command::Signup {
        email,
        username,
        password,
      } => auth_result(self.session.signup(&email, &username, &password).await),
      Command::Logout => {
        self.session.logout().await;
        CommandResult::ok(json!({ "signedOut": true }))
      }
      Command::Whoami => {
        let user = self.session.check_auth().await;
        let anilist = self.anilist.key_status(self.remember_anilist_key).await;
        CommandResult::ok(json!({
          "authenticated": self.session.is_authenticated().await,
          "user": user,
          "anilistKeyPresent": anilist.key_present,
        }))
      }
      Command::Refresh => {
        if self.session.refresh_token().await {
          CommandResult::ok(json!({ "refreshed": true }))
        } else {
          api_err(&ApiError::SessionExpired)
        }
      }
      Command::Chat {
        with_list,
        local,
        message,
      } => {
        let text = message.join(" ");
        if local {
          return Some(self.local_reply(&text).await);
        }
        let outcome = self.chat.send(&text, with_list).await;
        self.settle(outcome).await
      }
      Command::History => {
        let outcome = self.chat.history().await;
        self.settle(outcome).await
      }
      Command::ClearHistory => {
        let outcome = self.chat.clear_history().await;
        self.settle(outcome.map(|_| json!({ "cleared": true }))).await
      }
      Command::AnilistLink { key, permanent } => {
        let outcome = self
          .anilist
          .save_key(&key, permanent || self.remember_anilist_key)
          .await;
        self.settle(outcome.map(|_| json!({ "linked": true }))).await
      }
      Command::AnilistUnlink => {
        let outcome = self.anilist.delete_key().await;
        self.settle(outcome.map(|_| json!({ "linked": false }))).await
      }
      Command::AnilistStatus => {
        CommandResult::ok(to_value(self.anilist.key_status(self.remember_anilist_key).await))
      }
      Command::Sync {
        public,
        username,
        user_id,
      } => {
        let outcome = self
          .anilist
          .sync(&sync_target(public, username, user_id))
          .await;
        self.settle(outcome).await
      }
      Command::Quit => return None,
    };
    Some(result)
  }
}
