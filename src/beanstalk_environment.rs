//! Beanstalk environment controller.
//!
//! High-level operations on one environment, each following the same pattern:
//! diff against the current state, skip or mutate, then optionally wait for the
//! platform to converge.
//!
//! This module provides:
//! - `EnvironmentController`: cached view of one environment + its operations
//! - `EnvironmentUpdate`: mutations that can be applied before a synchronized wait
//!
//! The controller keeps a lazily fetched snapshot (description + option settings).
//! Every mutation drops it, so the next read observes fresh remote state, while
//! reads inside one operation all observe the same snapshot.

use std::{collections::HashMap, fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{Instrument as _, info, info_span};

use crate::beanstalk_api::{
    AUTOSCALING_NAMESPACE, ApiError, BeanstalkApi, ENVIRONMENT_VARIABLES_NAMESPACE,
    EnvironmentDescription, EnvironmentHealth, EnvironmentResources, MAX_SIZE_OPTION,
    MIN_SIZE_OPTION, OptionSetting, UpdateEnvironmentRequest,
};
use crate::beanstalk_diff::{
    DesiredChange, Scale, ScaleRange, compute_mutation, needs_update, option_values,
    scale_updates,
};
use crate::beanstalk_waiter::{
    BackoffSchedule, Converged, StatusSource, WaitError, classify_environment_status,
    wait_until_stable,
};

/// Address of one managed environment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnvironmentIdentity {
    application_name: String,
    environment_name: String,
}

impl EnvironmentIdentity {
    /// Create an identity.
    #[must_use]
    pub fn new(application_name: impl Into<String>, environment_name: impl Into<String>) -> Self {
        Self {
            application_name: application_name.into(),
            environment_name: environment_name.into(),
        }
    }

    /// Application name.
    #[must_use]
    pub fn application_name(&self) -> &str {
        &self.application_name
    }

    /// Environment name.
    #[must_use]
    pub fn environment_name(&self) -> &str {
        &self.environment_name
    }
}

impl fmt::Display for EnvironmentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.application_name, self.environment_name)
    }
}

/// Cached remote state, filled on demand.
#[derive(Debug, Default)]
struct ResourceSnapshot {
    description: Option<EnvironmentDescription>,
    option_settings: Option<Vec<OptionSetting>>,
}

impl ResourceSnapshot {
    fn invalidate(&mut self) {
        self.description = None;
        self.option_settings = None;
    }
}

/// A mutation applied by `synchronize_update` before waiting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvironmentUpdate {
    /// Set/remove environment variables.
    Variables(DesiredChange),
    /// Change the instance count bounds.
    Scale(Scale),
    /// Deploy a version label.
    Deploy(String),
    /// Restart the application servers.
    Restart,
}

/// Controller for one Beanstalk environment.
pub struct EnvironmentController<C> {
    identity: EnvironmentIdentity,
    client: Arc<C>,
    snapshot: ResourceSnapshot,
    sync_timeout: Duration,
    backoff: BackoffSchedule,
}

impl<C: BeanstalkApi> EnvironmentController<C> {
    /// Create a controller with the default timeout (600s) and poll schedule (30s..120s).
    #[must_use]
    pub fn new(identity: EnvironmentIdentity, client: Arc<C>) -> Self {
        Self {
            identity,
            client,
            snapshot: ResourceSnapshot::default(),
            sync_timeout: Duration::from_secs(600),
            backoff: BackoffSchedule::default(),
        }
    }

    /// Seed the snapshot with a description obtained from a listing.
    #[must_use]
    pub fn with_description(mut self, description: EnvironmentDescription) -> Self {
        self.snapshot.description = Some(description);
        self
    }

    /// Set the default timeout used by `synchronize_update`.
    #[must_use]
    pub const fn with_sync_timeout(mut self, timeout: Duration) -> Self {
        self.sync_timeout = timeout;
        self
    }

    /// Set the poll schedule used while waiting.
    #[must_use]
    pub const fn with_backoff(mut self, backoff: BackoffSchedule) -> Self {
        self.backoff = backoff;
        self
    }

    /// Environment address.
    #[must_use]
    pub const fn identity(&self) -> &EnvironmentIdentity {
        &self.identity
    }

    /// Default synchronize timeout.
    #[must_use]
    pub const fn sync_timeout(&self) -> Duration {
        self.sync_timeout
    }

    /// Drop the cached snapshot; the next read fetches fresh state.
    pub fn refresh(&mut self) {
        self.snapshot.invalidate();
    }

    // ------------------------------------------------------------------------
    // Snapshot reads
    // ------------------------------------------------------------------------

    async fn description(&mut self) -> Result<&EnvironmentDescription, EnvironmentError> {
        if self.snapshot.description.is_none() {
            let found = self
                .client
                .describe_environments(self.identity.application_name(), false)
                .await?
                .into_iter()
                .find(|e| e.environment_name == self.identity.environment_name);
            self.snapshot.description = found;
        }

        self.snapshot
            .description
            .as_ref()
            .ok_or_else(|| EnvironmentError::EnvironmentNotFound {
                application: self.identity.application_name.clone(),
                environment: self.identity.environment_name.clone(),
            })
    }

    async fn option_settings(&mut self) -> Result<&[OptionSetting], EnvironmentError> {
        if self.snapshot.option_settings.is_none() {
            let settings = self
                .client
                .describe_configuration_settings(
                    self.identity.application_name(),
                    self.identity.environment_name(),
                )
                .await?;
            self.snapshot.option_settings = Some(settings);
        }

        Ok(self.snapshot.option_settings.as_deref().unwrap_or_default())
    }

    /// Raw platform status ("Ready", "Updating", ...).
    ///
    /// # Errors
    ///
    /// Returns an error if the environment cannot be described.
    pub async fn status(&mut self) -> Result<String, EnvironmentError> {
        Ok(self.description().await?.status.clone())
    }

    /// Environment ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the environment cannot be described.
    pub async fn environment_id(&mut self) -> Result<String, EnvironmentError> {
        Ok(self.description().await?.environment_id.clone())
    }

    /// Currently deployed version label.
    ///
    /// # Errors
    ///
    /// Returns an error if the environment cannot be described.
    pub async fn version_label(&mut self) -> Result<Option<String>, EnvironmentError> {
        Ok(self.description().await?.version_label.clone())
    }

    /// Current environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be described.
    pub async fn environment_variables(
        &mut self,
    ) -> Result<HashMap<String, String>, EnvironmentError> {
        let settings = self.option_settings().await?;
        Ok(option_values(settings, ENVIRONMENT_VARIABLES_NAMESPACE))
    }

    /// Current instance count bounds.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be described, or if
    /// `MinSize`/`MaxSize` are missing or not integers.
    pub async fn scale(&mut self) -> Result<ScaleRange, EnvironmentError> {
        let settings = self.option_settings().await?;
        let bounds = option_values(settings, AUTOSCALING_NAMESPACE);

        Ok(ScaleRange::new(
            parse_bound(&bounds, MIN_SIZE_OPTION)?,
            parse_bound(&bounds, MAX_SIZE_OPTION)?,
        ))
    }

    // ------------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------------

    /// Set and/or remove environment variables.
    ///
    /// Returns `false` without any remote write when every key already matches.
    ///
    /// # Errors
    ///
    /// Returns an error if reading the configuration or the update call fails.
    pub async fn set_environment_variables(
        &mut self,
        desired: &DesiredChange,
    ) -> Result<bool, EnvironmentError> {
        let current = self.environment_variables().await?;

        if !needs_update(&current, desired) {
            info!(environment = %self.identity, "environment variables look identical; skip");
            return Ok(false);
        }

        let mutation = compute_mutation(&current, desired);
        info!(
            environment = %self.identity,
            updates = mutation.updates.len(),
            removals = mutation.removals.len(),
            "updating environment variables"
        );

        let (option_settings, options_to_remove) =
            mutation.into_option_changes(ENVIRONMENT_VARIABLES_NAMESPACE);
        let request = UpdateEnvironmentRequest {
            option_settings,
            options_to_remove,
            ..self.request_by_name()
        };
        self.client.update_environment(request).await?;

        self.refresh();
        Ok(true)
    }

    /// Set the instance count bounds. An integer pins min and max.
    ///
    /// Returns `false` without any remote write when the scale already matches.
    ///
    /// # Errors
    ///
    /// Returns `InvalidScale` when min > max, or an error if reading the
    /// configuration or the update call fails.
    pub async fn set_scale(&mut self, desired: impl Into<Scale>) -> Result<bool, EnvironmentError> {
        let desired = desired.into().normalize();
        if !desired.is_valid() {
            return Err(EnvironmentError::InvalidScale(desired));
        }

        let current = self.scale().await?;
        let Some(option_settings) = scale_updates(current, desired) else {
            info!(environment = %self.identity, scale = %current, "new scale is identical to current scale; skip");
            return Ok(false);
        };

        info!(environment = %self.identity, from = %current, to = %desired, "scaling");

        let request = UpdateEnvironmentRequest {
            option_settings,
            ..self.request_by_name()
        };
        self.client.update_environment(request).await?;

        self.refresh();
        Ok(true)
    }

    /// Deploy a version label. Always issues the update, even for the current label.
    ///
    /// # Errors
    ///
    /// Returns an error if the environment cannot be described or the update fails.
    pub async fn deploy(&mut self, version_label: &str) -> Result<(), EnvironmentError> {
        let environment_id = self.environment_id().await?;
        info!(environment = %self.identity, version_label, "deploying");

        let request = UpdateEnvironmentRequest {
            version_label: Some(version_label.to_string()),
            ..UpdateEnvironmentRequest::by_id(&environment_id)
        };
        self.client.update_environment(request).await?;

        self.refresh();
        Ok(())
    }

    /// Restart the application servers.
    ///
    /// # Errors
    ///
    /// Returns an error if the environment cannot be described or the call fails.
    pub async fn restart(&mut self) -> Result<(), EnvironmentError> {
        let environment_id = self.environment_id().await?;
        info!(environment = %self.identity, "restarting");

        self.client.restart_app_server(&environment_id).await?;

        self.refresh();
        Ok(())
    }

    /// Terminate the environment. Irreversible; does not wait.
    ///
    /// # Errors
    ///
    /// Returns an error if the environment cannot be described or the call fails.
    pub async fn destroy(&mut self) -> Result<(), EnvironmentError> {
        let environment_id = self.environment_id().await?;
        info!(environment = %self.identity, "terminating");

        self.client.terminate_environment(&environment_id).await?;

        self.refresh();
        Ok(())
    }

    /// Apply a single update.
    ///
    /// # Errors
    ///
    /// Propagates the error of the underlying operation.
    pub async fn apply(&mut self, update: EnvironmentUpdate) -> Result<(), EnvironmentError> {
        match update {
            EnvironmentUpdate::Variables(desired) => {
                self.set_environment_variables(&desired).await?;
            }
            EnvironmentUpdate::Scale(scale) => {
                self.set_scale(scale).await?;
            }
            EnvironmentUpdate::Deploy(label) => self.deploy(&label).await?,
            EnvironmentUpdate::Restart => self.restart().await?,
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Convergence
    // ------------------------------------------------------------------------

    /// Apply `updates` in order, then wait until the environment is Ready.
    ///
    /// `timeout` defaults to the controller's sync timeout.
    ///
    /// # Errors
    ///
    /// - any error raised while applying an update,
    /// - `FatalStatus` when an unexpected status is observed,
    /// - `TimedOut` when the environment is not Ready in time.
    pub async fn synchronize_update<I>(
        &mut self,
        timeout: Option<Duration>,
        updates: I,
    ) -> Result<Converged, EnvironmentError>
    where
        I: IntoIterator<Item = EnvironmentUpdate> + Send,
        I::IntoIter: Send,
    {
        let timeout = timeout.unwrap_or(self.sync_timeout);
        info!(environment = %self.identity, timeout_secs = timeout.as_secs(), "synchronizing update started");

        for update in updates {
            self.apply(update).await?;
        }

        self.wait_until_ready(timeout).await
    }

    /// Wait until the environment is Ready.
    ///
    /// # Errors
    ///
    /// `FatalStatus`, `TimedOut`, or any error raised while fetching the status.
    pub async fn wait_until_ready(&mut self, timeout: Duration) -> Result<Converged, EnvironmentError> {
        let environment = self.identity.to_string();
        let span = info_span!("synchronize", environment = %environment);
        let backoff = self.backoff;

        wait_until_stable(self, classify_environment_status, timeout, backoff)
            .instrument(span)
            .await
            .map_err(|err| match err {
                WaitError::Fatal { status } => EnvironmentError::FatalStatus {
                    environment,
                    status,
                },
                WaitError::TimedOut {
                    elapsed,
                    last_status,
                } => EnvironmentError::TimedOut {
                    environment,
                    elapsed,
                    last_status,
                },
                WaitError::Fetch(source) => source,
            })
    }

    // ------------------------------------------------------------------------
    // Diagnostics and guards
    // ------------------------------------------------------------------------

    /// Download the health report. Never cached.
    ///
    /// # Errors
    ///
    /// Returns an error if the environment cannot be described or the call fails.
    pub async fn health(&mut self) -> Result<EnvironmentHealth, EnvironmentError> {
        let environment_id = self.environment_id().await?;
        info!(environment = %self.identity, "downloading health data");
        Ok(self.client.describe_environment_health(&environment_id).await?)
    }

    /// Download the backing resources. Never cached.
    ///
    /// # Errors
    ///
    /// Returns an error if the environment cannot be described or the call fails.
    pub async fn resources(&mut self) -> Result<EnvironmentResources, EnvironmentError> {
        let environment_id = self.environment_id().await?;
        info!(environment = %self.identity, "downloading resources");
        Ok(self
            .client
            .describe_environment_resources(&environment_id)
            .await?)
    }

    /// Fail unless the deployed version label is `expected_label`.
    ///
    /// # Errors
    ///
    /// Returns `VersionMismatch` on a different (or missing) label.
    pub async fn ensure_version(&mut self, expected_label: &str) -> Result<(), EnvironmentError> {
        let actual = self.version_label().await?;
        if actual.as_deref() == Some(expected_label) {
            return Ok(());
        }

        Err(EnvironmentError::VersionMismatch {
            expected: expected_label.to_string(),
            actual,
        })
    }

    fn request_by_name(&self) -> UpdateEnvironmentRequest {
        UpdateEnvironmentRequest::by_name(
            self.identity.application_name(),
            self.identity.environment_name(),
        )
    }
}

#[async_trait]
impl<C: BeanstalkApi> StatusSource for EnvironmentController<C> {
    type Error = EnvironmentError;

    async fn fetch_status(&mut self) -> Result<String, EnvironmentError> {
        self.refresh();
        self.status().await
    }
}

impl<C> fmt::Debug for EnvironmentController<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvironmentController")
            .field("identity", &self.identity)
            .field("cached", &self.snapshot.description.is_some())
            .field("sync_timeout", &self.sync_timeout)
            .finish_non_exhaustive()
    }
}

fn parse_bound(bounds: &HashMap<String, String>, option: &'static str) -> Result<u32, EnvironmentError> {
    let raw = bounds.get(option).ok_or(EnvironmentError::MissingOption {
        namespace: AUTOSCALING_NAMESPACE,
        option,
    })?;

    raw.trim()
        .parse::<u32>()
        .map_err(|_| EnvironmentError::InvalidOption {
            namespace: AUTOSCALING_NAMESPACE,
            option,
            value: raw.clone(),
        })
}

// ============================================================================
// Error type
// ============================================================================

/// Error type for environment controller operations.
#[derive(Debug, Error)]
pub enum EnvironmentError {
    /// Remote call failure, propagated as-is.
    #[error(transparent)]
    Api(#[from] ApiError),
    /// The environment is not listed by the platform.
    #[error("environment not found: {application}/{environment}")]
    EnvironmentNotFound {
        /// Application name.
        application: String,
        /// Environment name.
        environment: String,
    },
    /// A required option is absent from the configuration.
    #[error("missing option {namespace}:{option}")]
    MissingOption {
        /// Option namespace.
        namespace: &'static str,
        /// Option name.
        option: &'static str,
    },
    /// An option holds an unparsable value.
    #[error("invalid option {namespace}:{option}={value:?}")]
    InvalidOption {
        /// Option namespace.
        namespace: &'static str,
        /// Option name.
        option: &'static str,
        /// Raw value.
        value: String,
    },
    /// Requested scale has min > max.
    #[error("invalid scale {0}: min is greater than max")]
    InvalidScale(ScaleRange),
    /// The environment reported a status outside the known set.
    #[error("unexpected status on {environment}: {status}")]
    FatalStatus {
        /// Environment address.
        environment: String,
        /// The offending raw status.
        status: String,
    },
    /// The environment did not become Ready in time.
    #[error("timeout exceeded on {environment} after {elapsed:?} (last status: {last_status})")]
    TimedOut {
        /// Environment address.
        environment: String,
        /// Time waited.
        elapsed: Duration,
        /// Last observed status.
        last_status: String,
    },
    /// The deployed version is not the expected one.
    #[error("unexpected version label: expected={expected}, actual={actual:?}")]
    VersionMismatch {
        /// Expected label.
        expected: String,
        /// Deployed label.
        actual: Option<String>,
    },
}
