use anyhow::Result;
use directories::ProjectDirs;
use std::{env, fs, path::PathBuf};

pub fn app_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("com", "StravaTalk", "StravaTalk")
        .ok_or_else(|| anyhow::anyhow!("ProjectDirs unavailable"))
}

/// Location of the activities database. STRAVATALK_DB_PATH overrides the
/// per-user data dir.
pub fn default_db_path() -> Result<PathBuf> {
    if let Ok(custom) = env::var("STRAVATALK_DB_PATH") {
        return Ok(PathBuf::from(custom));
    }
    let pd = app_dirs()?;
    fs::create_dir_all(pd.data_dir())?;
    Ok(pd.data_dir().join("strava.duckdb"))
}

/// Where OAuth tokens are cached between sessions.
pub fn default_tokens_path() -> Result<PathBuf> {
    let pd = app_dirs()?;
    fs::create_dir_all(pd.data_dir())?;
    Ok(pd.data_dir().join("strava_tokens.json"))
}

/// Directory where the CLI saves chart specs produced during a chat.
pub fn default_charts_dir() -> Result<PathBuf> {
    let pd = app_dirs()?;
    let dir = pd.data_dir().join("charts");
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

pub fn env_flag(name: &str) -> bool {
    env::var(name)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}
