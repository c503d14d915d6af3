use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

pub const TOKEN_URL: &str = "https://www.strava.com/oauth/token";
pub const ACTIVITIES_URL: &str = "https://www.strava.com/api/v3/athlete/activities";

const PER_PAGE: usize = 30;

/// One synced activity, the subset of the Strava payload the store keeps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub distance: f64,
    #[serde(default)]
    pub moving_time: i64,
    #[serde(default)]
    pub elapsed_time: i64,
    #[serde(default)]
    pub total_elevation_gain: f64,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub start_date: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StravaTokens {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub expires_at: Option<i64>,
}

pub fn load_tokens(path: &Path) -> Result<StravaTokens> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("No cached Strava tokens at {}; run `auth` first", path.display()))?;
    Ok(serde_json::from_slice(&bytes)?)
}

pub fn save_tokens(path: &Path, tokens: &StravaTokens) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_vec_pretty(tokens)?)?;
    Ok(())
}

/// Strava OAuth + activities client.
pub struct StravaClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
}

impl StravaClient {
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            client_id,
            client_secret,
        }
    }

    pub fn from_env() -> Result<Self> {
        let client_id =
            std::env::var("STRAVA_CLIENT_ID").context("STRAVA_CLIENT_ID is not set")?;
        let client_secret =
            std::env::var("STRAVA_CLIENT_SECRET").context("STRAVA_CLIENT_SECRET is not set")?;
        Ok(Self::new(client_id, client_secret))
    }

    /// URL the user visits to authorize read access to their activities.
    pub fn authorization_url(&self, redirect_uri: &str) -> String {
        format!(
            "https://www.strava.com/oauth/authorize?client_id={}&response_type=code\
             &redirect_uri={}&approval_prompt=force&scope=activity:read",
            self.client_id, redirect_uri
        )
    }

    pub async fn exchange_code(&self, authorization_code: &str) -> Result<StravaTokens> {
        self.token_request(&[
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("code", authorization_code),
            ("grant_type", "authorization_code"),
        ])
        .await
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<StravaTokens> {
        self.token_request(&[
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ])
        .await
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<StravaTokens> {
        let resp = self
            .http
            .post(TOKEN_URL)
            .form(form)
            .send()
            .await
            .context("Strava token request failed")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Strava token request rejected ({status}): {body}");
        }
        Ok(resp.json().await?)
    }

    /// Fetch all activities, page by page, until Strava returns an empty page.
    pub async fn fetch_activities(&self, access_token: &str) -> Result<Vec<Activity>> {
        let mut all = Vec::new();
        let mut page = 1usize;
        loop {
            let resp = self
                .http
                .get(ACTIVITIES_URL)
                .bearer_auth(access_token)
                .query(&[("page", page.to_string()), ("per_page", PER_PAGE.to_string())])
                .send()
                .await
                .context("Strava activities request failed")?;
            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                anyhow::bail!("Strava activities request rejected ({status}): {body}");
            }
            let batch: Vec<Activity> = resp.json().await?;
            if batch.is_empty() {
                break;
            }
            info!(page, count = batch.len(), "fetched activities page");
            all.extend(batch);
            page += 1;
        }
        Ok(all)
    }
}
