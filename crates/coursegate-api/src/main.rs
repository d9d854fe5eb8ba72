//! coursegate server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`), layers
//! `COURSEGATE_*` environment variables on top, opens the SQLite store and
//! serves the JSON API over HTTP.
//!
//! # Issuing a session token
//!
//! ```
//! cargo run -p coursegate-api --bin coursegate -- --issue-token learner@example.com
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::Parser;
use coursegate_api::{AppState, ServerConfig, gateway::HttpPaymentGateway, session};
use coursegate_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(author, version, about = "Coursegate learning API server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Create a session for this email, print its bearer token and exit.
  #[arg(long, value_name = "EMAIL")]
  issue_token: Option<String>,

  /// User id for `--issue-token`; a new one is generated if omitted.
  #[arg(long, requires = "issue_token")]
  user_id: Option<Uuid>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Load configuration.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config.clone()).required(false))
    .add_source(
      config::Environment::with_prefix("COURSEGATE")
        .prefix_separator("_")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("admin_emails")
        .try_parsing(true),
    )
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  // Expand `~` in store path.
  let store_path = expand_tilde(&server_cfg.store_path);

  // Open SQLite store.
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  // Helper mode: issue a token and exit.
  if let Some(email) = cli.issue_token {
    let user_id = cli.user_id.unwrap_or_else(Uuid::new_v4);
    let ttl = chrono::Duration::hours(i64::from(server_cfg.session_ttl_hours));
    let token = session::issue_session(&store, user_id, email, ttl)
      .await
      .context("failed to issue session")?;
    println!("user_id: {user_id}");
    println!("token:   {token}");
    return Ok(());
  }

  let gateway = HttpPaymentGateway::new(server_cfg.payment.link_endpoint.clone())
    .context("failed to build payment gateway client")?;

  if server_cfg.admin_emails.is_empty() {
    tracing::warn!("no admin_emails configured; admin endpoints are unreachable");
  }

  let state = AppState::new(store, gateway, server_cfg.clone());
  let app = coursegate_api::router(state);
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!(
    policy = ?server_cfg.purchase_policy,
    "Listening on http://{address}"
  );
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
