//! Azure Resource Manager implementation of [`ManagementApi`]
//!
//! Plain REST over reqwest. List calls follow `nextLink` paging; pause, resume
//! and SKU updates are long-running operations polled through the
//! `Azure-AsyncOperation` or `Location` header until they reach a terminal state.

use super::{DatabaseRecord, DatabaseRef, ManagementApi, ServerRecord, ServiceObjective};
use crate::auth::TokenCredential;
use crate::error::{CoreError, Result};
use crate::model::{PerformanceLevel, Subscription};
use crate::progress::{OperationState, ProgressCallback, ProgressEvent, emit};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, LOCATION, RETRY_AFTER};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};
use url::Url;

const SUBSCRIPTIONS_API_VERSION: &str = "2022-12-01";
const SQL_API_VERSION: &str = "2021-11-01";
/// Service objectives are only exposed by the classic API version
const SERVICE_OBJECTIVES_API_VERSION: &str = "2014-04-01";

const AZURE_ASYNC_OPERATION: &str = "azure-asyncoperation";

/// User agent string for warehousectl HTTP requests
pub const USER_AGENT: &str = concat!("warehousectl/", env!("CARGO_PKG_VERSION"));

/// Client for the Azure Resource Manager REST API
#[derive(Clone)]
pub struct ArmClient {
    http: reqwest::Client,
    base_url: Url,
    credential: Arc<dyn TokenCredential>,
    operation_timeout: Duration,
    poll_interval: Duration,
}

/// Builder for [`ArmClient`]
pub struct ArmClientBuilder {
    http: Option<reqwest::Client>,
    base_url: String,
    credential: Option<Arc<dyn TokenCredential>>,
    operation_timeout: Duration,
    poll_interval: Duration,
}

impl Default for ArmClientBuilder {
    fn default() -> Self {
        Self {
            http: None,
            base_url: "https://management.azure.com".to_string(),
            credential: None,
            operation_timeout: Duration::from_secs(1800),
            poll_interval: Duration::from_secs(10),
        }
    }
}

impl ArmClientBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn credential(mut self, credential: Arc<dyn TokenCredential>) -> Self {
        self.credential = Some(credential);
        self
    }

    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    /// Maximum time to wait for a long-running operation
    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Delay between polls when the service sends no `Retry-After`
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn build(self) -> Result<ArmClient> {
        let credential = self
            .credential
            .ok_or_else(|| CoreError::Validation("ArmClient requires a credential".to_string()))?;
        let base_url = Url::parse(&self.base_url).map_err(|e| {
            CoreError::Validation(format!("Invalid management endpoint '{}': {}", self.base_url, e))
        })?;
        let http = match self.http {
            Some(http) => http,
            None => reqwest::Client::builder().user_agent(USER_AGENT).build()?,
        };
        Ok(ArmClient {
            http,
            base_url,
            credential,
            operation_timeout: self.operation_timeout,
            poll_interval: self.poll_interval,
        })
    }
}

#[derive(Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
    #[serde(rename = "nextLink", default)]
    next_link: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubscriptionWire {
    subscription_id: Option<String>,
    display_name: Option<String>,
}

#[derive(Deserialize)]
struct ServerWire {
    id: Option<String>,
    name: Option<String>,
    location: Option<String>,
}

#[derive(Deserialize)]
struct SkuWire {
    name: Option<String>,
    tier: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatabasePropertiesWire {
    status: Option<String>,
    current_service_objective_name: Option<String>,
}

#[derive(Deserialize)]
struct DatabaseWire {
    name: Option<String>,
    location: Option<String>,
    sku: Option<SkuWire>,
    properties: Option<DatabasePropertiesWire>,
}

impl DatabaseWire {
    fn into_record(self) -> Option<DatabaseRecord> {
        let name = self.name?;
        let (sku_name, sku_tier) = match self.sku {
            Some(sku) => (sku.name, sku.tier),
            None => (None, None),
        };
        let (status, objective) = match self.properties {
            Some(p) => (p.status, p.current_service_objective_name),
            None => (None, None),
        };
        Some(DatabaseRecord {
            name,
            sku_name: objective.or(sku_name),
            sku_tier,
            status,
            location: self.location,
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceObjectivePropertiesWire {
    service_objective_name: Option<String>,
    enabled: Option<bool>,
}

#[derive(Deserialize)]
struct ServiceObjectiveWire {
    name: Option<String>,
    properties: Option<ServiceObjectivePropertiesWire>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorBody>,
}

#[derive(Deserialize)]
struct ErrorBody {
    code: Option<String>,
    message: Option<String>,
}

#[derive(Deserialize)]
struct OperationStatusWire {
    #[serde(default)]
    status: String,
    error: Option<ErrorBody>,
}

/// How a 202 response says it should be polled
enum PollTarget {
    AsyncOperation(Url),
    Location(Url),
}

impl ArmClient {
    pub fn builder() -> ArmClientBuilder {
        ArmClientBuilder::default()
    }

    fn url(&self, segments: &[&str], api_version: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                CoreError::Validation(format!("Invalid management endpoint '{}'", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        url.query_pairs_mut().append_pair("api-version", api_version);
        Ok(url)
    }

    fn database_url(&self, db: &DatabaseRef, suffix: Option<&str>) -> Result<Url> {
        let mut segments = vec![
            "subscriptions",
            db.subscription_id.as_str(),
            "resourceGroups",
            db.resource_group.as_str(),
            "providers",
            "Microsoft.Sql",
            "servers",
            db.server.as_str(),
            "databases",
            db.name.as_str(),
        ];
        if let Some(suffix) = suffix {
            segments.push(suffix);
        }
        self.url(&segments, SQL_API_VERSION)
    }

    async fn request(&self, method: Method, url: Url) -> Result<RequestBuilder> {
        let token = self.credential.get_token().await?;
        trace!("{} {}", method, url);
        Ok(self.http.request(method, url).bearer_auth(token.token))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(api_error(response).await)
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let response = self.send(self.request(Method::GET, url).await?).await?;
        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn get_paged<T: DeserializeOwned>(&self, url: Url) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut next = Some(url);
        while let Some(url) = next {
            let page: Page<T> = self.get_json(url).await?;
            items.extend(page.value);
            next = match page.next_link {
                Some(link) if !link.is_empty() => Some(Url::parse(&link).map_err(|e| {
                    CoreError::Validation(format!("Invalid nextLink '{}': {}", link, e))
                })?),
                _ => None,
            };
        }
        Ok(items)
    }

    /// Send a mutating request and wait for the long-running operation behind it
    async fn run_operation(
        &self,
        label: &str,
        request: RequestBuilder,
        on_progress: Option<ProgressCallback>,
    ) -> Result<()> {
        let response = self.send(request).await?;
        emit(
            &on_progress,
            ProgressEvent::Started {
                operation: label.to_string(),
            },
        );

        if response.status() != StatusCode::ACCEPTED {
            debug!("{} completed synchronously ({})", label, response.status());
            emit(
                &on_progress,
                ProgressEvent::Completed {
                    operation: label.to_string(),
                },
            );
            return Ok(());
        }

        let Some(target) = poll_target(response.headers()) else {
            warn!("{} accepted without a polling header, assuming done", label);
            emit(
                &on_progress,
                ProgressEvent::Completed {
                    operation: label.to_string(),
                },
            );
            return Ok(());
        };
        let mut delay = retry_after(response.headers()).unwrap_or(self.poll_interval);

        let start = Instant::now();
        loop {
            let elapsed = start.elapsed();
            if elapsed > self.operation_timeout {
                emit(
                    &on_progress,
                    ProgressEvent::Failed {
                        operation: label.to_string(),
                        error: "timed out".to_string(),
                    },
                );
                return Err(CoreError::OperationTimeout(self.operation_timeout));
            }

            tokio::time::sleep(delay).await;

            let (state, status_text, error) = match &target {
                PollTarget::AsyncOperation(url) => {
                    let response = self
                        .send(self.request(Method::GET, url.clone()).await?)
                        .await?;
                    delay = retry_after(response.headers()).unwrap_or(self.poll_interval);
                    let body: OperationStatusWire = serde_json::from_str(&response.text().await?)?;
                    let error = body.error.and_then(|e| e.message.or(e.code));
                    (OperationState::from_status(&body.status), body.status, error)
                }
                PollTarget::Location(url) => {
                    let response = self
                        .send(self.request(Method::GET, url.clone()).await?)
                        .await?;
                    delay = retry_after(response.headers()).unwrap_or(self.poll_interval);
                    if response.status() == StatusCode::ACCEPTED {
                        (OperationState::Running, "InProgress".to_string(), None)
                    } else {
                        (OperationState::Succeeded, "Succeeded".to_string(), None)
                    }
                }
            };

            emit(
                &on_progress,
                ProgressEvent::Polling {
                    operation: label.to_string(),
                    status: status_text.clone(),
                    elapsed: start.elapsed(),
                },
            );

            match state {
                OperationState::Running => continue,
                OperationState::Succeeded => {
                    info!("{} succeeded after {:?}", label, start.elapsed());
                    emit(
                        &on_progress,
                        ProgressEvent::Completed {
                            operation: label.to_string(),
                        },
                    );
                    return Ok(());
                }
                OperationState::Failed | OperationState::Canceled => {
                    let error = error
                        .unwrap_or_else(|| format!("Operation finished with status {}", status_text));
                    emit(
                        &on_progress,
                        ProgressEvent::Failed {
                            operation: label.to_string(),
                            error: error.clone(),
                        },
                    );
                    return Err(CoreError::OperationFailed(error));
                }
            }
        }
    }
}

fn poll_target(headers: &HeaderMap) -> Option<PollTarget> {
    let parse = |name| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Url::parse(v).ok())
    };
    parse(AZURE_ASYNC_OPERATION)
        .map(PollTarget::AsyncOperation)
        .or_else(|| parse(LOCATION.as_str()).map(PollTarget::Location))
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|secs| Duration::from_secs(secs.min(60)))
}

async fn api_error(response: Response) -> CoreError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    let body = serde_json::from_str::<ErrorEnvelope>(&text)
        .ok()
        .and_then(|e| e.error);
    let (code, message) = match body {
        Some(ErrorBody { code, message }) => (code, message),
        None => (None, None),
    };
    let message = message.unwrap_or_else(|| {
        if text.trim().is_empty() {
            format!("HTTP {}", status.as_u16())
        } else {
            format!("HTTP {}: {}", status.as_u16(), text.trim())
        }
    });
    debug!("Management API error {}: {:?} {}", status, code, message);
    CoreError::Api {
        status: status.as_u16(),
        code,
        message,
    }
}

#[async_trait]
impl ManagementApi for ArmClient {
    async fn list_subscriptions(&self) -> Result<Vec<Subscription>> {
        let url = self.url(&["subscriptions"], SUBSCRIPTIONS_API_VERSION)?;
        let subs: Vec<SubscriptionWire> = self.get_paged(url).await?;
        Ok(subs
            .into_iter()
            .filter_map(|s| match (s.subscription_id, s.display_name) {
                (Some(id), Some(display_name)) => Some(Subscription { id, display_name }),
                _ => None,
            })
            .collect())
    }

    async fn list_servers(&self, subscription_id: &str) -> Result<Vec<ServerRecord>> {
        let url = self.url(
            &[
                "subscriptions",
                subscription_id,
                "providers",
                "Microsoft.Sql",
                "servers",
            ],
            SQL_API_VERSION,
        )?;
        let servers: Vec<ServerWire> = self.get_paged(url).await?;
        Ok(servers
            .into_iter()
            .filter_map(|s| {
                Some(ServerRecord {
                    name: s.name?,
                    id: s.id,
                    location: s.location,
                })
            })
            .collect())
    }

    async fn list_databases(
        &self,
        subscription_id: &str,
        resource_group: &str,
        server: &str,
    ) -> Result<Vec<DatabaseRecord>> {
        let url = self.url(
            &[
                "subscriptions",
                subscription_id,
                "resourceGroups",
                resource_group,
                "providers",
                "Microsoft.Sql",
                "servers",
                server,
                "databases",
            ],
            SQL_API_VERSION,
        )?;
        let dbs: Vec<DatabaseWire> = self.get_paged(url).await?;
        Ok(dbs.into_iter().filter_map(DatabaseWire::into_record).collect())
    }

    async fn pause(&self, db: &DatabaseRef, on_progress: Option<ProgressCallback>) -> Result<()> {
        info!("Pausing {}/{}", db.server, db.name);
        let request = self
            .request(Method::POST, self.database_url(db, Some("pause"))?)
            .await?;
        self.run_operation(&format!("pause {}", db.name), request, on_progress)
            .await
    }

    async fn resume(
        &self,
        db: &DatabaseRef,
        on_progress: Option<ProgressCallback>,
    ) -> Result<()> {
        info!("Resuming {}/{}", db.server, db.name);
        let request = self
            .request(Method::POST, self.database_url(db, Some("resume"))?)
            .await?;
        self.run_operation(&format!("resume {}", db.name), request, on_progress)
            .await
    }

    async fn update_sku(
        &self,
        db: &DatabaseRef,
        level: &PerformanceLevel,
        on_progress: Option<ProgressCallback>,
    ) -> Result<()> {
        info!("Scaling {}/{} to {}", db.server, db.name, level);
        let request = self
            .request(Method::PATCH, self.database_url(db, None)?)
            .await?
            .json(&json!({
                "sku": { "name": level.name(), "tier": super::WAREHOUSE_TIER }
            }));
        self.run_operation(
            &format!("scale {} to {}", db.name, level),
            request,
            on_progress,
        )
        .await
    }

    async fn list_service_objectives(
        &self,
        subscription_id: &str,
        resource_group: &str,
        server: &str,
    ) -> Result<Vec<ServiceObjective>> {
        let url = self.url(
            &[
                "subscriptions",
                subscription_id,
                "resourceGroups",
                resource_group,
                "providers",
                "Microsoft.Sql",
                "servers",
                server,
                "serviceObjectives",
            ],
            SERVICE_OBJECTIVES_API_VERSION,
        )?;
        let objectives: Vec<ServiceObjectiveWire> = self.get_paged(url).await?;
        Ok(objectives
            .into_iter()
            .filter_map(|o| {
                let props = o.properties;
                let name = props
                    .as_ref()
                    .and_then(|p| p.service_objective_name.clone())
                    .or(o.name)?;
                Some(ServiceObjective {
                    name,
                    enabled: props.and_then(|p| p.enabled).unwrap_or(true),
                })
            })
            .collect())
    }
}
