//! Building the management client and the session from configuration

use crate::error::{CliError, Result as CliResult};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use warehousectl_core::api::arm::USER_AGENT;
use warehousectl_core::auth::{
    AuthStatus, StaticTokenCredential, TokenCredential, default_credential, probe_cli,
};
use warehousectl_core::config::CredentialKind;
use warehousectl_core::{
    ArmClient, CommandRunner, Config, CoreError, OperatorHooks, ProcessRunner, Session,
    SessionSettings,
};

/// Pre-acquired bearer token that bypasses every other credential source
pub const ACCESS_TOKEN_ENV: &str = "WAREHOUSECTL_ACCESS_TOKEN";

#[derive(Clone)]
pub struct ConnectionManager {
    pub config: Config,
    pub config_path: Option<PathBuf>,
}

impl ConnectionManager {
    pub fn with_config_path(config: Config, config_path: Option<PathBuf>) -> Self {
        Self {
            config,
            config_path,
        }
    }

    /// Path the configuration is read from and saved to
    pub fn config_file(&self) -> CliResult<PathBuf> {
        match &self.config_path {
            Some(path) => Ok(path.clone()),
            None => Ok(Config::config_path()?),
        }
    }

    pub fn save_config(&self) -> CliResult<()> {
        self.config.save_to_path(&self.config_file()?)?;
        Ok(())
    }

    pub fn runner(&self) -> Arc<dyn CommandRunner> {
        Arc::new(ProcessRunner)
    }

    pub fn settings(&self) -> SessionSettings {
        SessionSettings::from(&self.config)
    }

    /// Resolve the token source.
    ///
    /// An explicit `--config-file` ignores `WAREHOUSECTL_ACCESS_TOKEN` so the
    /// file alone decides how to authenticate.
    fn credential(
        &self,
        http: reqwest::Client,
        runner: Arc<dyn CommandRunner>,
    ) -> CliResult<Arc<dyn TokenCredential>> {
        if self.config_path.is_none()
            && let Ok(token) = std::env::var(ACCESS_TOKEN_ENV)
        {
            info!("Using access token from {}", ACCESS_TOKEN_ENV);
            return Ok(Arc::new(StaticTokenCredential::new(token)));
        }
        debug!("Credential kind: {}", self.config.credential.kind);
        Ok(default_credential(&self.config, http, runner)?)
    }

    pub fn create_client(&self, runner: Arc<dyn CommandRunner>) -> CliResult<ArmClient> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| CliError::ConnectionError {
                message: e.to_string(),
            })?;
        let credential = self.credential(http.clone(), runner)?;

        debug!(
            "Creating management client for {}",
            self.config.endpoints.management
        );
        Ok(ArmClient::builder()
            .base_url(&self.config.endpoints.management)
            .credential(credential)
            .http_client(http)
            .operation_timeout(self.config.operation_timeout())
            .build()?)
    }

    /// Load subscriptions and build a session.
    ///
    /// Authentication failures are checked against the Azure CLI so a missing
    /// install or login is reported as such rather than as a bare 401.
    pub async fn open_session(
        &self,
        hooks: Arc<dyn OperatorHooks>,
        settings: SessionSettings,
    ) -> CliResult<Session> {
        let runner = self.runner();
        let client = self.create_client(runner.clone())?;

        match Session::activate(Arc::new(client), hooks, runner.clone(), settings).await {
            Ok(session) => Ok(session),
            Err(e) if matches!(e, CoreError::Auth(_)) || e.is_unauthorized() => {
                Err(self.explain_auth_failure(runner.as_ref(), e).await)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn explain_auth_failure(&self, runner: &dyn CommandRunner, err: CoreError) -> CliError {
        if self.config.credential.kind == CredentialKind::ClientSecret {
            return err.into();
        }
        match probe_cli(runner, &self.config.tools.az).await {
            AuthStatus::CliMissing { detail } => CliError::CliMissing { detail },
            AuthStatus::NotLoggedIn { detail } => CliError::NotLoggedIn { detail },
            AuthStatus::Ready { .. } => err.into(),
        }
    }
}
