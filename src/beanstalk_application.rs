//! Beanstalk application facade.
//!
//! Entry point tying one application's configuration to a shared API client:
//! - `environments()`: controllers for every live environment
//! - `environment(name)`: controller for a named environment
//! - `releases()` / `cleanup_versions()`: version publishing and retention

use std::sync::Arc;

use tracing::info;

use crate::beanstalk_api::{ApiError, BeanstalkApi};
use crate::beanstalk_config::BeanstalkConfig;
use crate::beanstalk_environment::{EnvironmentController, EnvironmentIdentity};
use crate::beanstalk_release::ReleaseManager;

/// One Elastic Beanstalk application.
pub struct BeanstalkApplication<C> {
    cfg: BeanstalkConfig,
    client: Arc<C>,
}

impl<C: BeanstalkApi> BeanstalkApplication<C> {
    /// Create the facade from a configuration and a client.
    #[must_use]
    pub const fn new(cfg: BeanstalkConfig, client: Arc<C>) -> Self {
        Self { cfg, client }
    }

    /// Get a reference to the current configuration.
    #[must_use]
    pub const fn config(&self) -> &BeanstalkConfig {
        &self.cfg
    }

    /// Controllers for every non-deleted environment.
    ///
    /// Each controller starts with the description from the listing, so reading
    /// its status does not issue another call.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote call fails.
    pub async fn environments(&self) -> Result<Vec<EnvironmentController<C>>, ApiError> {
        let descriptions = self
            .client
            .describe_environments(&self.cfg.application_name, false)
            .await?;

        Ok(descriptions
            .into_iter()
            .map(|description| {
                let name = description.environment_name.clone();
                self.environment(name).with_description(description)
            })
            .collect())
    }

    /// Controller for a named environment. Nothing is fetched until first read.
    #[must_use]
    pub fn environment(&self, environment_name: impl Into<String>) -> EnvironmentController<C> {
        let identity = EnvironmentIdentity::new(self.cfg.application_name.clone(), environment_name);
        EnvironmentController::new(identity, Arc::clone(&self.client))
            .with_sync_timeout(self.cfg.sync_timeout())
            .with_backoff(self.cfg.backoff())
    }

    /// Release manager for this application.
    #[must_use]
    pub fn releases(&self) -> ReleaseManager<C> {
        ReleaseManager::new(self.cfg.application_name.clone(), Arc::clone(&self.client))
    }

    /// Delete versions beyond the configured `keep_versions`.
    ///
    /// # Errors
    ///
    /// Returns an error if listing or deleting versions fails.
    pub async fn cleanup_versions(&self) -> Result<usize, ApiError> {
        let deleted = self.releases().prune(self.cfg.keep_versions).await?;
        info!(
            application = %self.cfg.application_name,
            deleted,
            kept = self.cfg.keep_versions,
            "cleaned up application versions"
        );
        Ok(deleted)
    }
}
