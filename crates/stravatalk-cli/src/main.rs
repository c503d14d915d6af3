use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use stravatalk_core::agents::initialize_agents;
use stravatalk_core::chat::Role;
use stravatalk_core::controller::handle_query;
use stravatalk_core::llm::{LlmConfig, OpenAiExchange};
use stravatalk_core::render::render_history;
use stravatalk_core::session::SessionState;
use stravatalk_core::store::ActivityStore;
use stravatalk_core::strava::{load_tokens, save_tokens, StravaClient};
use stravatalk_core::surface::ChatSurface;
use stravatalk_core::util::{default_charts_dir, default_db_path, default_tokens_path, env_flag};
use stravatalk_core::visualization::PlotSpec;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(version, about = "StravaTalk — chat with your Strava activity data")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override the activities database path
    #[arg(long)]
    db_path: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Interactive chat session
    Chat {
        /// Surface raw diagnostic payloads alongside answers
        #[arg(long, default_value_t = false)]
        debug: bool,
    },
    /// Ask a single question and exit
    Ask {
        query: String,
        #[arg(long, default_value_t = false)]
        debug: bool,
    },
    /// Fetch activities from the Strava API into the local database
    Sync,
    /// Authorize against the Strava API and cache tokens
    Auth,
    /// Import activities from a CSV export
    Ingest {
        #[arg(long)]
        path: PathBuf,
    },
    /// Print the database schema the SQL agent sees
    Schema,
    /// Environment doctor checks
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    install_tracing();
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let db_path = match cli.db_path {
        Some(path) => path,
        None => default_db_path()?,
    };

    match cli.command {
        Commands::Chat { debug } => cmd_chat(&db_path, debug).await,
        Commands::Ask { query, debug } => cmd_ask(&db_path, &query, debug).await,
        Commands::Sync => cmd_sync(&db_path).await,
        Commands::Auth => cmd_auth().await,
        Commands::Ingest { path } => cmd_ingest(&db_path, &path),
        Commands::Schema => cmd_schema(&db_path),
        Commands::Doctor => cmd_doctor(&db_path),
    }
}

fn install_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).init();
}

/// Terminal rendering of the chat: assistant text to stdout, status lines
/// on an indicatif spinner while the pipeline runs, charts saved as
/// Vega-Lite specs under the app data dir.
struct TerminalSurface {
    spinner: Option<ProgressBar>,
    charts_dir: PathBuf,
}

impl TerminalSurface {
    fn new(charts_dir: PathBuf) -> Self {
        Self {
            spinner: None,
            charts_dir,
        }
    }

    fn println(&self, line: &str) {
        match &self.spinner {
            Some(spinner) => spinner.println(line),
            None => println!("{line}"),
        }
    }
}

impl ChatSurface for TerminalSurface {
    fn show_markdown(&mut self, role: Role, text: &str) {
        match role {
            // The user's line is already on screen from the prompt.
            Role::User => {}
            Role::Assistant => println!("\nAssistant:\n{text}"),
        }
    }

    fn show_warning(&mut self, text: &str) {
        self.println(&format!("warning: {text}"));
    }

    fn show_error(&mut self, text: &str) {
        self.println(&format!("error: {text}"));
    }

    fn show_chart(&mut self, plot: &PlotSpec) -> Result<()> {
        let file = self
            .charts_dir
            .join(format!("{}.vl.json", uuid::Uuid::new_v4()));
        std::fs::write(&file, serde_json::to_vec_pretty(&plot.spec)?)?;
        println!("chart saved to {} (vega-lite)", file.display());
        Ok(())
    }

    fn show_sql(&mut self, sql: &str) {
        for line in sql.lines() {
            self.println(&format!("    {line}"));
        }
    }

    fn status_begin(&mut self, label: &str) {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner} {msg}").unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.enable_steady_tick(Duration::from_millis(120));
        spinner.set_message(label.to_string());
        self.spinner = Some(spinner);
    }

    fn status_note(&mut self, line: &str) {
        self.println(line);
    }

    fn status_end(&mut self, ok: bool, label: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
        let prefix = if ok { "ok" } else { "failed" };
        println!("[{prefix}] {label}");
    }

    fn show_debug(&mut self, label: &str, payload: &serde_json::Value) {
        let rendered =
            serde_json::to_string_pretty(payload).unwrap_or_else(|_| payload.to_string());
        self.println(&format!("[debug] {label}: {rendered}"));
    }
}

fn build_session(db_path: &Path, debug: bool) -> Result<(ActivityStore, SessionState)> {
    let store = ActivityStore::new(db_path)?;
    let exchange = Arc::new(OpenAiExchange::new(LlmConfig::from_env()?));
    let state = SessionState::new(initialize_agents(exchange))
        .with_debug(debug || env_flag("STRAVATALK_DEBUG"));
    Ok((store, state))
}

async fn cmd_chat(db_path: &Path, debug: bool) -> Result<()> {
    let (store, mut state) = build_session(db_path, debug)?;
    let mut surface = TerminalSurface::new(default_charts_dir()?);

    render_history(&state, &mut surface);
    println!("\nType /exit to quit.");

    loop {
        print!("\nYou: ");
        std::io::stdout().flush()?;
        let mut line = String::new();
        if std::io::stdin().read_line(&mut line)? == 0 {
            break;
        }
        let query = line.trim();
        if matches!(query.to_lowercase().as_str(), "/exit" | "/quit" | "exit" | "quit") {
            break;
        }
        handle_query(&mut state, &store, &mut surface, query).await;
    }
    Ok(())
}

async fn cmd_ask(db_path: &Path, query: &str, debug: bool) -> Result<()> {
    let (store, mut state) = build_session(db_path, debug)?;
    let mut surface = TerminalSurface::new(default_charts_dir()?);
    handle_query(&mut state, &store, &mut surface, query).await;
    Ok(())
}

async fn cmd_sync(db_path: &Path) -> Result<()> {
    let store = ActivityStore::new(db_path)?;
    let client = StravaClient::from_env()?;
    let tokens_path = default_tokens_path()?;
    let mut tokens = load_tokens(&tokens_path)?;

    // Access tokens are short-lived; refresh first and keep the new pair.
    match client.refresh(&tokens.refresh_token).await {
        Ok(fresh) => {
            save_tokens(&tokens_path, &fresh)?;
            tokens = fresh;
        }
        Err(e) => tracing::warn!(error = %e, "token refresh failed, trying cached access token"),
    }

    let activities = client.fetch_activities(&tokens.access_token).await?;
    let count = store.upsert_activities(&activities)?;
    println!(
        "Synced {count} activities ({} total in {})",
        store.activity_count()?,
        db_path.display()
    );
    Ok(())
}

async fn cmd_auth() -> Result<()> {
    let client = StravaClient::from_env()?;
    println!(
        "Please visit this URL to authorize the application:\n{}",
        client.authorization_url("http://localhost")
    );
    print!("Enter the authorization code: ");
    std::io::stdout().flush()?;
    let mut code = String::new();
    std::io::stdin().read_line(&mut code)?;

    let tokens = client.exchange_code(code.trim()).await?;
    let tokens_path = default_tokens_path()?;
    save_tokens(&tokens_path, &tokens)?;
    println!("Tokens saved to {}", tokens_path.display());
    Ok(())
}

fn cmd_ingest(db_path: &Path, csv_path: &Path) -> Result<()> {
    let store = ActivityStore::new(db_path)?;
    let imported = store
        .import_csv(csv_path)
        .with_context(|| format!("Failed to import {}", csv_path.display()))?;
    println!(
        "Imported {imported} activities ({} total)",
        store.activity_count()?
    );
    Ok(())
}

fn cmd_schema(db_path: &Path) -> Result<()> {
    let store = ActivityStore::new(db_path)?;
    for table in store.table_definitions()? {
        println!("{}", table.describe());
    }
    Ok(())
}

fn cmd_doctor(db_path: &Path) -> Result<()> {
    println!("StravaTalk doctor:");
    for var in ["OPENAI_API_KEY", "STRAVA_CLIENT_ID", "STRAVA_CLIENT_SECRET"] {
        let status = if std::env::var(var).is_ok() { "set" } else { "missing" };
        println!(" - {var}: {status}");
    }
    println!(
        " - model: {}",
        std::env::var("STRAVATALK_MODEL").unwrap_or_else(|_| "gpt-4o-mini (default)".into())
    );
    match ActivityStore::new(db_path) {
        Ok(store) => println!(
            " - database: {} ({} activities)",
            db_path.display(),
            store.activity_count().unwrap_or(0)
        ),
        Err(e) => println!(" - database: unavailable ({e})"),
    }
    Ok(())
}
