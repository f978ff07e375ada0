//! Elastic Beanstalk control-plane surface.
//!
//! Unique responsibility: describe the remote calls the environment controller
//! and the release manager depend on, together with the payloads they exchange.
//!
//! Implementations:
//! - `BeanstalkHttpClient` (beanstalk_client.rs) for a JSON control-plane gateway.
//! - In-memory fakes in tests.
//!
//! Field names serialize in `PascalCase`, the way the Beanstalk API spells them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::beanstalk_config::ConfigError;

/// Option namespace holding the application's environment variables.
pub const ENVIRONMENT_VARIABLES_NAMESPACE: &str = "aws:elasticbeanstalk:application:environment";

/// Option namespace holding the auto scaling group bounds.
pub const AUTOSCALING_NAMESPACE: &str = "aws:autoscaling:asg";

/// Option name of the lower auto scaling bound.
pub const MIN_SIZE_OPTION: &str = "MinSize";

/// Option name of the upper auto scaling bound.
pub const MAX_SIZE_OPTION: &str = "MaxSize";

/// Remote resource client for Elastic Beanstalk.
///
/// Every call is a single remote round-trip. Implementations must not retry
/// on behalf of the caller beyond transport-level transient failures, and must
/// never re-send a mutation that may already have been processed.
#[async_trait]
pub trait BeanstalkApi: Send + Sync {
    /// List the environments of an application.
    async fn describe_environments(
        &self,
        application_name: &str,
        include_deleted: bool,
    ) -> Result<Vec<EnvironmentDescription>, ApiError>;

    /// Get the option settings of one environment.
    async fn describe_configuration_settings(
        &self,
        application_name: &str,
        environment_name: &str,
    ) -> Result<Vec<OptionSetting>, ApiError>;

    /// Update options and/or the deployed version of an environment.
    async fn update_environment(&self, request: UpdateEnvironmentRequest) -> Result<(), ApiError>;

    /// Get the enhanced health report of an environment.
    async fn describe_environment_health(
        &self,
        environment_id: &str,
    ) -> Result<EnvironmentHealth, ApiError>;

    /// List the AWS resources backing an environment.
    async fn describe_environment_resources(
        &self,
        environment_id: &str,
    ) -> Result<EnvironmentResources, ApiError>;

    /// Restart the application servers of an environment.
    async fn restart_app_server(&self, environment_id: &str) -> Result<(), ApiError>;

    /// Terminate an environment.
    async fn terminate_environment(&self, environment_id: &str) -> Result<(), ApiError>;

    /// Register a new application version pointing at a source bundle.
    async fn create_application_version(
        &self,
        request: CreateApplicationVersionRequest,
    ) -> Result<ApplicationVersion, ApiError>;

    /// List the versions of an application.
    async fn describe_application_versions(
        &self,
        application_name: &str,
    ) -> Result<Vec<ApplicationVersion>, ApiError>;

    /// Delete an application version, optionally with its stored source bundle.
    async fn delete_application_version(
        &self,
        application_name: &str,
        version_label: &str,
        delete_source_bundle: bool,
    ) -> Result<(), ApiError>;
}

// ============================================================================
// Environment payloads
// ============================================================================

/// Description of one environment as returned by `describe_environments`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EnvironmentDescription {
    /// Environment name.
    pub environment_name: String,
    /// Environment ID.
    pub environment_id: String,
    /// Owning application.
    pub application_name: String,
    /// Raw platform status ("Ready", "Updating", ...).
    pub status: String,
    /// Health color ("Green", "Yellow", ...).
    #[serde(default)]
    pub health: Option<String>,
    /// Currently deployed version label.
    #[serde(default)]
    pub version_label: Option<String>,
    /// Public CNAME.
    #[serde(default, rename = "CNAME")]
    pub cname: Option<String>,
}

/// One configuration option of an environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OptionSetting {
    /// Option namespace.
    pub namespace: String,
    /// Option name.
    pub option_name: String,
    /// Option value, when set.
    #[serde(default)]
    pub value: Option<String>,
}

/// Option to set in an `update_environment` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OptionUpdate {
    /// Option namespace.
    pub namespace: String,
    /// Option name.
    pub option_name: String,
    /// New value.
    pub value: String,
}

/// Option to remove in an `update_environment` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OptionRemoval {
    /// Option namespace.
    pub namespace: String,
    /// Option name.
    pub option_name: String,
}

/// Input of `update_environment`.
///
/// An environment is addressed either by application + environment name or by
/// environment ID.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpdateEnvironmentRequest {
    /// Application name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_name: Option<String>,
    /// Environment name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment_name: Option<String>,
    /// Environment ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment_id: Option<String>,
    /// Options to set.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub option_settings: Vec<OptionUpdate>,
    /// Options to remove.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options_to_remove: Vec<OptionRemoval>,
    /// Version label to deploy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_label: Option<String>,
}

impl UpdateEnvironmentRequest {
    /// Request addressing an environment by application and environment name.
    #[must_use]
    pub fn by_name(application_name: &str, environment_name: &str) -> Self {
        Self {
            application_name: Some(application_name.to_string()),
            environment_name: Some(environment_name.to_string()),
            ..Self::default()
        }
    }

    /// Request addressing an environment by ID.
    #[must_use]
    pub fn by_id(environment_id: &str) -> Self {
        Self {
            environment_id: Some(environment_id.to_string()),
            ..Self::default()
        }
    }
}

/// Enhanced health report of an environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EnvironmentHealth {
    /// Environment name.
    #[serde(default)]
    pub environment_name: Option<String>,
    /// Health status ("Ok", "Warning", "Degraded", ...).
    #[serde(default)]
    pub health_status: Option<String>,
    /// Environment status.
    #[serde(default)]
    pub status: Option<String>,
    /// Health color.
    #[serde(default)]
    pub color: Option<String>,
    /// Human-readable causes of a degraded health.
    #[serde(default)]
    pub causes: Vec<String>,
    /// When the report was produced.
    #[serde(default)]
    pub refreshed_at: Option<DateTime<Utc>>,
}

/// AWS resources backing an environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EnvironmentResources {
    /// Environment name.
    #[serde(default)]
    pub environment_name: Option<String>,
    /// EC2 instance IDs.
    #[serde(default)]
    pub instances: Vec<String>,
    /// Load balancer names.
    #[serde(default)]
    pub load_balancers: Vec<String>,
    /// Auto scaling group names.
    #[serde(default)]
    pub auto_scaling_groups: Vec<String>,
}

// ============================================================================
// Application version payloads
// ============================================================================

/// Location of an uploaded source bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SourceBundle {
    /// Bucket holding the artifact.
    pub s3_bucket: String,
    /// Key of the artifact inside the bucket.
    pub s3_key: String,
}

/// Input of `create_application_version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateApplicationVersionRequest {
    /// Application name.
    pub application_name: String,
    /// Label of the new version.
    pub version_label: String,
    /// Free-form description.
    pub description: String,
    /// Artifact location.
    pub source_bundle: SourceBundle,
    /// Ask the platform to pre-process (validate) the bundle.
    pub process: bool,
}

/// One application version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ApplicationVersion {
    /// Owning application.
    pub application_name: String,
    /// Version label.
    pub version_label: String,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
    /// Artifact location.
    #[serde(default)]
    pub source_bundle: Option<SourceBundle>,
    /// Processing status ("Processed", "Processing", ...).
    #[serde(default)]
    pub status: Option<String>,
    /// Creation date.
    #[serde(default)]
    pub date_created: Option<DateTime<Utc>>,
    /// Last update date.
    pub date_updated: DateTime<Utc>,
}

// ============================================================================
// Error type
// ============================================================================

/// Error type for remote resource client operations.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Client configuration error.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// HTTP client error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    /// Response body could not be decoded.
    #[error("json error in {action} response: {source}")]
    Json {
        /// API action whose response failed to decode.
        action: &'static str,
        /// Decoder error.
        #[source]
        source: serde_json::Error,
    },
    /// API error response.
    #[error("beanstalk api error: status={status}, body={body}")]
    Api {
        /// HTTP status code.
        status: reqwest::StatusCode,
        /// Response body.
        body: String,
    },
    /// Response did not contain the expected element.
    #[error("empty response from server: missing {0}")]
    EmptyResponse(&'static str),
}
