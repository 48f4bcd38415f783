use crate::anilist::AniListApi;
use crate::auth::AuthSession;
use crate::chat::ChatApi;
use crate::client::ApiClient;
use crate::commands::{parse_line, AppContext, Command};
use crate::provider::PlaceholderProvider;
use crate::redact::redact_secrets;
use crate::settings::SettingsStore;
use crate::state::{SecretManager, TokenStore, KEYRING_USER_ANILIST_KEY};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const PROMPT: &str = "anichat> ";

fn init_logging(fallback_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn build_context(settings: &SettingsStore) -> Result<AppContext, crate::error::ApiError> {
    let api = Arc::new(ApiClient::new(settings.api_base_url(), TokenStore::new())?);
    let session = Arc::new(
        AuthSession::new(api.clone()).with_settle_delay(settings.post_auth_settle()),
    );
    Ok(AppContext {
        session,
        chat: ChatApi::new(api.clone()),
        anilist: AniListApi::new(api, SecretManager::new(KEYRING_USER_ANILIST_KEY)),
        provider: Arc::new(PlaceholderProvider),
        remember_anilist_key: settings.remember_anilist_key(),
    })
}

async fn print_line(stdout: &mut tokio::io::Stdout, text: &str) {
    let _ = stdout.write_all(text.as_bytes()).await;
    let _ = stdout.write_all(b"\n").await;
    let _ = stdout.flush().await;
}

async fn repl(ctx: AppContext) -> ExitCode {
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let user = ctx.session.check_auth().await;
    match &user {
        Some(u) => print_line(&mut stdout, &format!("Signed in as {} <{}>", u.username, u.email)).await,
        None => print_line(&mut stdout, "Not signed in. Type `help` for commands.").await,
    }
    if ctx.anilist.restore_key(ctx.remember_anilist_key).await {
        print_line(&mut stdout, "AniList key restored from secure storage.").await;
    }

    loop {
        let _ = stdout.write_all(PROMPT.as_bytes()).await;
        let _ = stdout.flush().await;

        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!(error = %e, "could not read input");
                ctx.session.close();
                return ExitCode::FAILURE;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let command = match parse_line(&line) {
            Ok(command) => command,
            Err(e) => {
                print_line(&mut stdout, e.render().to_string().trim_end()).await;
                continue;
            }
        };
        if command == Command::Quit {
            break;
        }

        if let Some(result) = ctx.execute(command).await {
            let text = serde_json::to_string_pretty(&result).unwrap_or_default();
            print_line(&mut stdout, &redact_secrets(&text)).await;
        }
    }

    ctx.session.close();
    info!("bye");
    ExitCode::SUCCESS
}

pub fn run() -> ExitCode {
    let settings_path = SettingsStore::default_path();
    let settings = match SettingsStore::load(&settings_path) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("anichat: {e}");
            return ExitCode::FAILURE;
        }
    };
    init_logging(&settings.log_filter());
    info!(api = %settings.api_base_url(), "starting");

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "could not start async runtime");
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(async {
        let ctx = match build_context(&settings) {
            Ok(ctx) => ctx,
            Err(e) => {
                error!(error = %e, "could not build http client");
                return ExitCode::FAILURE;
            }
        };
        repl(ctx).await
    })
}
