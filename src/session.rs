//! Session continuity across runs: stored cookies and the one-time manual
//! verification gate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::utils::error::{AppError, Result};

/// Words that suggest the storefront is challenging the session.
pub const CHALLENGE_INDICATORS: [&str; 8] = [
    "robot",
    "captcha",
    "verify",
    "human",
    "bot",
    "suspicious",
    "blocked",
    "access denied",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default = "default_path")]
    pub path: String,
    /// Seconds since the epoch; `None` for session cookies.
    #[serde(default)]
    pub expires: Option<f64>,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
}

fn default_path() -> String {
    "/".to_string()
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// `Ok(None)` when nothing has been stored yet.
    async fn load(&self) -> Result<Option<Vec<StoredCookie>>>;
    async fn save(&self, cookies: &[StoredCookie]) -> Result<()>;
}

/// Cookies as a JSON array in a single file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SessionStore for JsonFileStore {
    async fn load(&self) -> Result<Option<Vec<StoredCookie>>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let cookies: Vec<StoredCookie> = serde_json::from_str(&raw)?;
        Ok(Some(cookies))
    }

    async fn save(&self, cookies: &[StoredCookie]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(cookies)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}

/// Result of scanning the landing page for challenge indicators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeAssessment {
    pub indicators: Vec<&'static str>,
}

impl ChallengeAssessment {
    pub fn detected(&self) -> bool {
        !self.indicators.is_empty()
    }
}

pub fn assess_challenge(page_text: &str, title: &str) -> ChallengeAssessment {
    let text = page_text.to_lowercase();
    let title = title.to_lowercase();
    ChallengeAssessment {
        indicators: CHALLENGE_INDICATORS
            .iter()
            .copied()
            .filter(|indicator| text.contains(indicator) || title.contains(indicator))
            .collect(),
    }
}

/// Blocks until a human confirms the session is usable.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VerificationGate: Send + Sync {
    async fn acknowledge(&self, assessment: &ChallengeAssessment) -> Result<()>;
}

/// Prompts on stdout and waits for ENTER on stdin.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinGate;

#[async_trait]
impl VerificationGate for StdinGate {
    async fn acknowledge(&self, assessment: &ChallengeAssessment) -> Result<()> {
        let prompt = if assessment.detected() {
            warn!("Possible verification challenge: {}", assessment.indicators.join(", "));
            "Complete any verification in the browser window, then press ENTER once the page loads normally: "
        } else {
            println!("If you see any bot detection or verification prompts, complete them now.");
            "Press ENTER to continue with scraping: "
        };

        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            print!("{}", prompt);
            std::io::stdout().flush()?;
            let mut line = String::new();
            std::io::stdin().read_line(&mut line)?;
            Ok(())
        })
        .await
        .map_err(|e| AppError::Internal(format!("verification prompt task failed: {}", e)))??;

        info!("Verification acknowledged");
        Ok(())
    }
}

/// Skips the gate entirely (`--skip-verification`, replay runs).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopGate;

#[async_trait]
impl VerificationGate for NoopGate {
    async fn acknowledge(&self, assessment: &ChallengeAssessment) -> Result<()> {
        if assessment.detected() {
            warn!(
                "Skipping verification although indicators were found: {}",
                assessment.indicators.join(", ")
            );
        }
        Ok(())
    }
}
