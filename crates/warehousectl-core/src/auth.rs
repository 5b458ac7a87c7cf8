//! Credentials for the management API
//!
//! [`default_credential`] mirrors the platform SDK's default chain for the two
//! sources an operator workstation actually has: a service principal secret
//! (config or `AZURE_*` environment variables) and the Azure CLI login.
//! Tokens are cached until shortly before they expire.
//!
//! [`probe_cli`] checks whether the Azure CLI is installed and signed in, so a
//! missing login can be reported with a useful shortcut instead of a 401.

use crate::config::{ClientSecretCredentials, Config, CredentialKind};
use crate::error::{CoreError, Result};
use crate::runner::CommandRunner;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Local, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Tokens this close to expiry are refreshed
const REFRESH_MARGIN_SECS: i64 = 300;

pub const AZURE_CLI_INSTALL_URL: &str = "https://aka.ms/installazurecli";

/// A bearer token and its expiry
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub expires_on: DateTime<Utc>,
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"[redacted]")
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

impl AccessToken {
    fn is_fresh(&self) -> bool {
        self.expires_on - Utc::now() > ChronoDuration::seconds(REFRESH_MARGIN_SECS)
    }
}

/// Source of bearer tokens for management API calls
#[async_trait]
pub trait TokenCredential: Send + Sync {
    async fn get_token(&self) -> Result<AccessToken>;

    /// Short name used in logs and error messages
    fn name(&self) -> &'static str;
}

/// A fixed token, for tests and for `WAREHOUSECTL_ACCESS_TOKEN`
pub struct StaticTokenCredential {
    token: String,
}

impl StaticTokenCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenCredential for StaticTokenCredential {
    async fn get_token(&self) -> Result<AccessToken> {
        Ok(AccessToken {
            token: self.token.clone(),
            expires_on: Utc::now() + ChronoDuration::hours(1),
        })
    }

    fn name(&self) -> &'static str {
        "static token"
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Deserialize)]
struct TokenErrorResponse {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: String,
}

/// Service principal client-credentials flow against the identity platform
pub struct ClientSecretCredential {
    http: reqwest::Client,
    authority: String,
    scope: String,
    credentials: ClientSecretCredentials,
}

impl ClientSecretCredential {
    pub fn new(
        http: reqwest::Client,
        authority: &str,
        management_endpoint: &str,
        credentials: ClientSecretCredentials,
    ) -> Self {
        Self {
            http,
            authority: authority.trim_end_matches('/').to_string(),
            scope: scope_for(management_endpoint),
            credentials,
        }
    }
}

#[async_trait]
impl TokenCredential for ClientSecretCredential {
    async fn get_token(&self) -> Result<AccessToken> {
        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority, self.credentials.tenant_id
        );
        debug!("Requesting token for client {}", self.credentials.client_id);

        let body = serde_urlencoded::to_string([
            ("grant_type", "client_credentials"),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("scope", self.scope.as_str()),
        ])
        .map_err(|e| CoreError::Auth(format!("Failed to encode token request: {}", e)))?;

        let response = self
            .http
            .post(&url)
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            let detail = serde_json::from_str::<TokenErrorResponse>(&text)
                .map(|e| format!("{}: {}", e.error, e.error_description))
                .unwrap_or(text);
            return Err(CoreError::Auth(format!(
                "Token request failed ({}): {}",
                status.as_u16(),
                detail
            )));
        }

        let token: TokenResponse = serde_json::from_str(&text)?;
        Ok(AccessToken {
            token: token.access_token,
            expires_on: Utc::now() + ChronoDuration::seconds(token.expires_in),
        })
    }

    fn name(&self) -> &'static str {
        "client secret"
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CliTokenResponse {
    access_token: String,
    #[serde(default)]
    expires_on: Option<String>,
    /// Unix timestamp, emitted by newer CLI versions
    #[serde(default, rename = "expires_on")]
    expires_on_unix: Option<i64>,
}

/// Token from `az account get-access-token`
pub struct AzureCliCredential {
    runner: Arc<dyn CommandRunner>,
    az: String,
    resource: String,
}

impl AzureCliCredential {
    pub fn new(runner: Arc<dyn CommandRunner>, az: &str, management_endpoint: &str) -> Self {
        Self {
            runner,
            az: az.to_string(),
            resource: format!("{}/", management_endpoint.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl TokenCredential for AzureCliCredential {
    async fn get_token(&self) -> Result<AccessToken> {
        let args: Vec<String> = [
            "account",
            "get-access-token",
            "--resource",
            &self.resource,
            "--output",
            "json",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let output = self.runner.run(&self.az, &args).await.map_err(|e| {
            CoreError::Auth(format!(
                "Azure CLI could not be started ({}). Install it from {}",
                e, AZURE_CLI_INSTALL_URL
            ))
        })?;
        if !output.success() {
            return Err(CoreError::Auth(format!(
                "Azure CLI did not return a token: {}. Run 'az login'.",
                output.failure_message()
            )));
        }

        let parsed: CliTokenResponse = serde_json::from_str(output.stdout.trim())?;
        let expires_on = parsed
            .expires_on_unix
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
            .or_else(|| parsed.expires_on.as_deref().and_then(parse_cli_local_time))
            .unwrap_or_else(|| Utc::now() + ChronoDuration::seconds(REFRESH_MARGIN_SECS + 60));

        Ok(AccessToken {
            token: parsed.access_token,
            expires_on,
        })
    }

    fn name(&self) -> &'static str {
        "azure cli"
    }
}

/// `expiresOn` from the CLI is local wall-clock time without an offset
fn parse_cli_local_time(raw: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f").ok()?;
    Local
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Tries each credential in order and returns the first token
pub struct ChainedCredential {
    sources: Vec<Box<dyn TokenCredential>>,
}

impl ChainedCredential {
    pub fn new(sources: Vec<Box<dyn TokenCredential>>) -> Self {
        Self { sources }
    }
}

#[async_trait]
impl TokenCredential for ChainedCredential {
    async fn get_token(&self) -> Result<AccessToken> {
        let mut failures = Vec::new();
        for source in &self.sources {
            match source.get_token().await {
                Ok(token) => {
                    debug!("Token acquired via {}", source.name());
                    return Ok(token);
                }
                Err(e) => {
                    debug!("{} credential unavailable: {}", source.name(), e);
                    failures.push(format!("{}: {}", source.name(), e));
                }
            }
        }
        Err(CoreError::Auth(if failures.is_empty() {
            "no credential sources configured".to_string()
        } else {
            failures.join("; ")
        }))
    }

    fn name(&self) -> &'static str {
        "default chain"
    }
}

/// Caches the wrapped credential's token until it nears expiry
pub struct CachedCredential<C> {
    inner: C,
    cached: Mutex<Option<AccessToken>>,
}

impl<C: TokenCredential> CachedCredential<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            cached: Mutex::new(None),
        }
    }
}

#[async_trait]
impl<C: TokenCredential> TokenCredential for CachedCredential<C> {
    async fn get_token(&self) -> Result<AccessToken> {
        // Held across the fetch so concurrent callers share one refresh
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref()
            && token.is_fresh()
        {
            return Ok(token.clone());
        }
        let token = self.inner.get_token().await?;
        *cached = Some(token.clone());
        Ok(token)
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}

/// Build the credential selected by `config.credential.kind`
pub fn default_credential(
    config: &Config,
    http: reqwest::Client,
    runner: Arc<dyn CommandRunner>,
) -> Result<Arc<dyn TokenCredential>> {
    let management = &config.endpoints.management;
    let client_secret = config.credential.resolve_client_secret()?;
    let cli = || -> Box<dyn TokenCredential> {
        Box::new(AzureCliCredential::new(
            runner.clone(),
            &config.tools.az,
            management,
        ))
    };

    let sources: Vec<Box<dyn TokenCredential>> = match config.credential.kind {
        CredentialKind::Cli => vec![cli()],
        CredentialKind::ClientSecret => {
            let creds = client_secret.ok_or_else(|| {
                CoreError::Auth(
                    "credential.kind is client-secret but tenant_id, client_id or client_secret is missing"
                        .to_string(),
                )
            })?;
            vec![Box::new(ClientSecretCredential::new(
                http,
                &config.endpoints.authority,
                management,
                creds,
            ))]
        }
        CredentialKind::Default => {
            let mut sources: Vec<Box<dyn TokenCredential>> = Vec::new();
            if let Some(creds) = client_secret {
                info!("Using service principal {} for authentication", creds.client_id);
                sources.push(Box::new(ClientSecretCredential::new(
                    http,
                    &config.endpoints.authority,
                    management,
                    creds,
                )));
            }
            sources.push(cli());
            sources
        }
    };

    Ok(Arc::new(CachedCredential::new(ChainedCredential::new(
        sources,
    ))))
}

fn scope_for(management_endpoint: &str) -> String {
    format!("{}/.default", management_endpoint.trim_end_matches('/'))
}

/// Outcome of probing the Azure CLI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStatus {
    Ready {
        user: Option<String>,
        tenant: Option<String>,
    },
    NotLoggedIn {
        detail: String,
    },
    CliMissing {
        detail: String,
    },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountShow {
    #[serde(default)]
    tenant_id: Option<String>,
    #[serde(default)]
    user: Option<AccountUser>,
}

#[derive(Deserialize)]
struct AccountUser {
    #[serde(default)]
    name: Option<String>,
}

/// Check that `az` is installed and has an active login
pub async fn probe_cli(runner: &dyn CommandRunner, az: &str) -> AuthStatus {
    match runner.run(az, &["--version".to_string()]).await {
        Err(e) => {
            warn!("Azure CLI not available: {}", e);
            return AuthStatus::CliMissing {
                detail: e.to_string(),
            };
        }
        Ok(out) if !out.success() => {
            return AuthStatus::CliMissing {
                detail: out.failure_message(),
            };
        }
        Ok(_) => {}
    }

    let args = vec![
        "account".to_string(),
        "show".to_string(),
        "--output".to_string(),
        "json".to_string(),
    ];
    match runner.run(az, &args).await {
        Ok(out) if out.success() => {
            let account = serde_json::from_str::<AccountShow>(out.stdout.trim()).ok();
            AuthStatus::Ready {
                user: account
                    .as_ref()
                    .and_then(|a| a.user.as_ref())
                    .and_then(|u| u.name.clone()),
                tenant: account.and_then(|a| a.tenant_id),
            }
        }
        Ok(out) => AuthStatus::NotLoggedIn {
            detail: out.failure_message(),
        },
        Err(e) => AuthStatus::NotLoggedIn {
            detail: e.to_string(),
        },
    }
}
