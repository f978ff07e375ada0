//! Elastic Beanstalk HTTP client.
//!
//! Unique responsibility: carry `BeanstalkApi` calls to a JSON control-plane
//! gateway over HTTP.
//!
//! Wire format:
//! - POST <{api_url}/{Action}> (e.g. `/DescribeEnvironments`)
//! - Header: Authorization: Bearer <token>
//! - Body and response: JSON with Beanstalk `PascalCase` field names
//!
//! Transient HTTP failures are retried with capped exponential backoff.
//! Describe actions retry on any transient failure. Mutating actions retry only
//! when the gateway cannot have processed the request (connection refused,
//! 429, 503), so a write that timed out after committing is never sent twice.
//! All configuration is loaded from environment variables.

use std::{env, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::debug;

use crate::beanstalk_api::{
    ApiError, ApplicationVersion, BeanstalkApi, CreateApplicationVersionRequest,
    EnvironmentDescription, EnvironmentHealth, EnvironmentResources, OptionSetting,
    UpdateEnvironmentRequest,
};
use crate::beanstalk_config::{ConfigError, must_env, parse_u32_env, parse_u64_env};

/// Configuration for the Beanstalk HTTP client.
#[derive(Clone, Debug)]
pub struct BeanstalkClientConfig {
    /// API key for authentication.
    /// Env: `BEANSTALK_API_KEY` (required)
    pub api_key: String,

    /// Base URL of the control-plane gateway.
    /// Env: `BEANSTALK_API_URL` (required)
    pub api_url: String,

    /// HTTP request timeout in milliseconds.
    /// Env: `BEANSTALK_HTTP_TIMEOUT_MS` (default: 30000)
    pub timeout_ms: u64,

    /// Maximum number of retry attempts.
    /// Env: `BEANSTALK_HTTP_RETRY_MAX` (default: 3)
    pub retry_max: u32,

    /// Backoff time between retries in milliseconds.
    /// Env: `BEANSTALK_HTTP_RETRY_BACKOFF_MS` (default: 500)
    pub retry_backoff_ms: u64,

    /// User agent for HTTP requests.
    /// Env: `BEANSTALK_USER_AGENT` (default: "halldyll-beanstalk/1.0")
    pub user_agent: String,
}

impl BeanstalkClientConfig {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            api_key: must_env("BEANSTALK_API_KEY")?,
            api_url: must_env("BEANSTALK_API_URL")?,
            timeout_ms: parse_u64_env("BEANSTALK_HTTP_TIMEOUT_MS", 30_000)?,
            retry_max: parse_u32_env("BEANSTALK_HTTP_RETRY_MAX", 3)?,
            retry_backoff_ms: parse_u64_env("BEANSTALK_HTTP_RETRY_BACKOFF_MS", 500)?,
            user_agent: env::var("BEANSTALK_USER_AGENT")
                .unwrap_or_else(|_| "halldyll-beanstalk/1.0".to_string()),
        })
    }

    /// Build the URL of one API action.
    #[inline]
    fn action_url(&self, action: &str) -> String {
        format!("{}/{}", self.api_url.trim_end_matches('/'), action)
    }
}

/// HTTP client implementing `BeanstalkApi`.
pub struct BeanstalkHttpClient {
    cfg: BeanstalkClientConfig,
    http: reqwest::Client,
}

impl BeanstalkHttpClient {
    /// Create a new client from the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(cfg: BeanstalkClientConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .user_agent(cfg.user_agent.clone())
            .build()?;

        Ok(Self { cfg, http })
    }

    /// Get a reference to the current configuration.
    #[must_use]
    pub const fn config(&self) -> &BeanstalkClientConfig {
        &self.cfg
    }

    /// Call an action and decode its JSON response.
    async fn call<Req, Resp>(
        &self,
        action: &'static str,
        policy: RetryPolicy,
        input: &Req,
    ) -> Result<Resp, ApiError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let body = self.post_with_retry(action, policy, input).await?;
        decode(action, &body)
    }

    /// Call an action whose response carries no data.
    async fn call_unit<Req>(
        &self,
        action: &'static str,
        policy: RetryPolicy,
        input: &Req,
    ) -> Result<(), ApiError>
    where
        Req: Serialize + Sync,
    {
        self.post_with_retry(action, policy, input).await.map(|_| ())
    }

    /// POST an action with retry logic, returning the raw body on success.
    async fn post_with_retry<Req>(
        &self,
        action: &'static str,
        policy: RetryPolicy,
        input: &Req,
    ) -> Result<String, ApiError>
    where
        Req: Serialize + Sync,
    {
        let url = self.cfg.action_url(action);
        let mut attempt: u32 = 0;
        let mut backoff = Duration::from_millis(self.cfg.retry_backoff_ms);

        loop {
            attempt = attempt.saturating_add(1);
            debug!(action, attempt, "calling beanstalk api");

            let send_res = self
                .http
                .post(&url)
                .bearer_auth(&self.cfg.api_key)
                .json(input)
                .send()
                .await;

            match send_res {
                Ok(resp) => {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();

                    if status.is_success() {
                        return Ok(body);
                    }

                    if attempt <= self.cfg.retry_max && policy.retries_status(status) {
                        tokio::time::sleep(backoff).await;
                        backoff = next_backoff(backoff);
                        continue;
                    }

                    return Err(ApiError::Api { status, body });
                }
                Err(e) => {
                    if attempt <= self.cfg.retry_max && policy.retries_transport(&e) {
                        tokio::time::sleep(backoff).await;
                        backoff = next_backoff(backoff);
                        continue;
                    }

                    return Err(ApiError::Http(e));
                }
            }
        }
    }
}

#[async_trait]
impl BeanstalkApi for BeanstalkHttpClient {
    async fn describe_environments(
        &self,
        application_name: &str,
        include_deleted: bool,
    ) -> Result<Vec<EnvironmentDescription>, ApiError> {
        let input = DescribeEnvironmentsInput {
            application_name,
            include_deleted,
        };
        let out: DescribeEnvironmentsOutput = self
            .call("DescribeEnvironments", RetryPolicy::Idempotent, &input)
            .await?;
        Ok(out.environments)
    }

    async fn describe_configuration_settings(
        &self,
        application_name: &str,
        environment_name: &str,
    ) -> Result<Vec<OptionSetting>, ApiError> {
        let input = EnvironmentNameInput {
            application_name,
            environment_name,
        };
        let out: DescribeConfigurationSettingsOutput = self
            .call("DescribeConfigurationSettings", RetryPolicy::Idempotent, &input)
            .await?;

        out.configuration_settings
            .into_iter()
            .next()
            .map(|c| c.option_settings)
            .ok_or(ApiError::EmptyResponse("ConfigurationSettings"))
    }

    async fn update_environment(&self, request: UpdateEnvironmentRequest) -> Result<(), ApiError> {
        self.call_unit("UpdateEnvironment", RetryPolicy::Mutation, &request)
            .await
    }

    async fn describe_environment_health(
        &self,
        environment_id: &str,
    ) -> Result<EnvironmentHealth, ApiError> {
        let input = EnvironmentHealthInput {
            environment_id,
            attribute_names: &["All"],
        };
        self.call("DescribeEnvironmentHealth", RetryPolicy::Idempotent, &input)
            .await
    }

    async fn describe_environment_resources(
        &self,
        environment_id: &str,
    ) -> Result<EnvironmentResources, ApiError> {
        let input = EnvironmentIdInput { environment_id };
        let out: DescribeEnvironmentResourcesOutput = self
            .call("DescribeEnvironmentResources", RetryPolicy::Idempotent, &input)
            .await?;
        Ok(out.environment_resources)
    }

    async fn restart_app_server(&self, environment_id: &str) -> Result<(), ApiError> {
        self.call_unit(
            "RestartAppServer",
            RetryPolicy::Mutation,
            &EnvironmentIdInput { environment_id },
        )
        .await
    }

    async fn terminate_environment(&self, environment_id: &str) -> Result<(), ApiError> {
        self.call_unit(
            "TerminateEnvironment",
            RetryPolicy::Mutation,
            &EnvironmentIdInput { environment_id },
        )
        .await
    }

    async fn create_application_version(
        &self,
        request: CreateApplicationVersionRequest,
    ) -> Result<ApplicationVersion, ApiError> {
        let out: CreateApplicationVersionOutput = self
            .call("CreateApplicationVersion", RetryPolicy::Mutation, &request)
            .await?;
        out.application_version
            .ok_or(ApiError::EmptyResponse("ApplicationVersion"))
    }

    async fn describe_application_versions(
        &self,
        application_name: &str,
    ) -> Result<Vec<ApplicationVersion>, ApiError> {
        let input = ApplicationNameInput { application_name };
        let out: DescribeApplicationVersionsOutput = self
            .call("DescribeApplicationVersions", RetryPolicy::Idempotent, &input)
            .await?;
        Ok(out.application_versions)
    }

    async fn delete_application_version(
        &self,
        application_name: &str,
        version_label: &str,
        delete_source_bundle: bool,
    ) -> Result<(), ApiError> {
        let input = DeleteApplicationVersionInput {
            application_name,
            version_label,
            delete_source_bundle,
        };
        self.call_unit("DeleteApplicationVersion", RetryPolicy::Mutation, &input)
            .await
    }
}

// ============================================================================
// Wire types (internal)
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeEnvironmentsInput<'a> {
    application_name: &'a str,
    include_deleted: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct EnvironmentNameInput<'a> {
    application_name: &'a str,
    environment_name: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct EnvironmentIdInput<'a> {
    environment_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct EnvironmentHealthInput<'a> {
    environment_id: &'a str,
    attribute_names: &'a [&'a str],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ApplicationNameInput<'a> {
    application_name: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct DeleteApplicationVersionInput<'a> {
    application_name: &'a str,
    version_label: &'a str,
    delete_source_bundle: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeEnvironmentsOutput {
    #[serde(default)]
    environments: Vec<EnvironmentDescription>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ConfigurationSettings {
    #[serde(default)]
    option_settings: Vec<OptionSetting>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeConfigurationSettingsOutput {
    #[serde(default)]
    configuration_settings: Vec<ConfigurationSettings>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeEnvironmentResourcesOutput {
    #[serde(default)]
    environment_resources: EnvironmentResources,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreateApplicationVersionOutput {
    #[serde(default)]
    application_version: Option<ApplicationVersion>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeApplicationVersionsOutput {
    #[serde(default)]
    application_versions: Vec<ApplicationVersion>,
}

// ============================================================================
// Helper functions
// ============================================================================

/// Which failures of one action may be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetryPolicy {
    /// Read-only action: every transient failure is retried.
    Idempotent,
    /// Mutating action: retried only when the request was not processed.
    Mutation,
}

impl RetryPolicy {
    const fn retries_status(self, status: reqwest::StatusCode) -> bool {
        match self {
            Self::Idempotent => matches!(
                status.as_u16(),
                408 | 409 | 425 | 429 | 500 | 502 | 503 | 504
            ),
            Self::Mutation => matches!(status.as_u16(), 429 | 503),
        }
    }

    fn retries_transport(self, e: &reqwest::Error) -> bool {
        self.retries_failure(e.is_connect(), e.is_timeout() || e.is_request())
    }

    /// `connect`: the connection was never established.
    /// `in_flight`: the request may have reached the server.
    const fn retries_failure(self, connect: bool, in_flight: bool) -> bool {
        match self {
            Self::Idempotent => connect || in_flight,
            Self::Mutation => connect,
        }
    }
}

fn decode<Resp: DeserializeOwned>(action: &'static str, body: &str) -> Result<Resp, ApiError> {
    serde_json::from_str(body).map_err(|source| ApiError::Json { action, source })
}

#[inline]
fn next_backoff(current: Duration) -> Duration {
    let next = current.saturating_mul(2);
    next.min(Duration::from_secs(10))
}
