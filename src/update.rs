// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Firmware update checks against published releases.

use anyhow::Result;
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde::Deserialize;
use std::cmp::Ordering;
use std::error::Error as StdError;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::UpdateCheckError;

/// Upper bound on how much of an error body is kept.
const MAX_ERROR_BODY: usize = 200;

/// A published release.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub browser_download_url: String,
}

/// Where release metadata comes from.
pub trait ReleaseSource: Send + Sync {
    fn latest_release(
        &self,
        repo: &str,
    ) -> impl Future<Output = Result<Release, UpdateCheckError>> + Send;
}

/// Result of comparing the device firmware with the latest release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateCheck {
    UpToDate { current: String },
    UpdateAvailable { version: String, url: String },
    /// Newer release exists but carries no downloadable asset.
    UpdateAvailableNoAsset { version: String },
    CheckFailed(UpdateCheckError),
}

/// Release lookup through the GitHub REST API.
#[derive(Debug, Clone)]
pub struct GitHubReleases {
    client: Client,
    api_base: String,
}

impl GitHubReleases {
    pub fn new(api_base: &str, user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }
}

impl ReleaseSource for GitHubReleases {
    async fn latest_release(&self, repo: &str) -> Result<Release, UpdateCheckError> {
        let repo = validate_repo(repo)?;
        let url = format!("{}/repos/{}/releases/latest", self.api_base, repo);
        debug!("Fetching {}", url);

        let response = self
            .client
            .get(&url)
            .header(ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| classify_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let cut = (0..=MAX_ERROR_BODY)
                    .rev()
                    .find(|i| body.is_char_boundary(*i))
                    .unwrap_or(0);
                body.truncate(cut);
            }
            return Err(UpdateCheckError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<Release>()
            .await
            .map_err(|e| UpdateCheckError::InvalidResponse(e.to_string()))
    }
}

/// Compares device firmware with the latest release of one repository.
pub struct UpdateChecker<S> {
    source: S,
    repo: String,
}

impl<S: ReleaseSource> UpdateChecker<S> {
    pub fn new(source: S, repo: impl Into<String>) -> Self {
        Self {
            source,
            repo: repo.into(),
        }
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    /// Look up the latest release and compare it with `current`.
    pub async fn check_for_update(&self, current: &str) -> UpdateCheck {
        info!("Checking {} for firmware newer than {}", self.repo, current);
        match self.source.latest_release(&self.repo).await {
            Ok(release) => evaluate(&release, current),
            Err(e) => {
                warn!("Update check failed: {}", e);
                UpdateCheck::CheckFailed(e)
            }
        }
    }
}

/// Decide what a release means for a device running `current`.
pub fn evaluate(release: &Release, current: &str) -> UpdateCheck {
    let latest = normalize_version(&release.tag_name);
    let current = normalize_version(current);

    if compare_versions(&latest, &current) != Ordering::Greater {
        return UpdateCheck::UpToDate { current };
    }

    match pick_asset(&release.assets) {
        Some(asset) => UpdateCheck::UpdateAvailable {
            version: latest,
            url: asset.browser_download_url.clone(),
        },
        None => UpdateCheck::UpdateAvailableNoAsset { version: latest },
    }
}

/// Prefer a `.bin` firmware image, else the first asset.
fn pick_asset(assets: &[ReleaseAsset]) -> Option<&ReleaseAsset> {
    assets
        .iter()
        .find(|a| a.name.to_lowercase().ends_with(".bin"))
        .or_else(|| assets.first())
}

/// Trim, drop NUL bytes and strip one leading `v`.
pub fn normalize_version(raw: &str) -> String {
    let cleaned = raw.replace('\0', "");
    let trimmed = cleaned.trim();
    trimmed
        .strip_prefix(['v', 'V'])
        .unwrap_or(trimmed)
        .to_string()
}

/// Dotted numeric version; missing trailing parts count as zero.
#[derive(Debug, Clone)]
pub struct FirmwareVersion(Vec<u64>);

impl FirmwareVersion {
    pub fn parse(raw: &str) -> Self {
        let normalized = normalize_version(raw);
        if normalized.is_empty() {
            return Self(Vec::new());
        }
        Self(normalized.split('.').map(leading_number).collect())
    }

    fn component(&self, index: usize) -> u64 {
        self.0.get(index).copied().unwrap_or(0)
    }
}

impl PartialEq for FirmwareVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FirmwareVersion {}

impl PartialOrd for FirmwareVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FirmwareVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.0.len().max(other.0.len());
        (0..len)
            .map(|i| self.component(i).cmp(&other.component(i)))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }
}

pub fn compare_versions(a: &str, b: &str) -> Ordering {
    FirmwareVersion::parse(a).cmp(&FirmwareVersion::parse(b))
}

fn leading_number(part: &str) -> u64 {
    let digits: String = part.trim().chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(0)
}

fn validate_repo(repo: &str) -> Result<&str, UpdateCheckError> {
    let repo = repo.trim();
    let mut parts = repo.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(owner), Some(name), None)
            if !owner.is_empty()
                && !name.is_empty()
                && !repo.contains(char::is_whitespace) =>
        {
            Ok(repo)
        }
        _ => Err(UpdateCheckError::InvalidRepo(repo.to_string())),
    }
}

fn classify_error(err: &reqwest::Error) -> UpdateCheckError {
    if err.is_timeout() {
        return UpdateCheckError::TimedOut;
    }
    if err.is_connect() {
        let chain = error_chain(err).to_lowercase();
        if chain.contains("network is unreachable") || chain.contains("no route to host") {
            return UpdateCheckError::NoInternet;
        }
        return UpdateCheckError::HostUnreachable;
    }
    if err.is_decode() {
        return UpdateCheckError::InvalidResponse(err.to_string());
    }
    UpdateCheckError::Network(err.to_string())
}

fn error_chain(err: &dyn StdError) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        text.push_str(": ");
        text.push_str(&inner.to_string());
        source = inner.source();
    }
    text
}
