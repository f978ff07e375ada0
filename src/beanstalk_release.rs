//! Release management.
//!
//! Unique responsibility: register new application versions and prune old ones.
//!
//! Retention keeps the `keep_count` most recently updated versions; everything
//! older is deleted together with its stored source bundle.

use std::sync::Arc;

use tracing::info;

use crate::beanstalk_api::{
    ApiError, ApplicationVersion, BeanstalkApi, CreateApplicationVersionRequest, SourceBundle,
};

/// Release manager for one application.
pub struct ReleaseManager<C> {
    application_name: String,
    client: Arc<C>,
}

impl<C: BeanstalkApi> ReleaseManager<C> {
    /// Create a release manager for `application_name`.
    #[must_use]
    pub fn new(application_name: impl Into<String>, client: Arc<C>) -> Self {
        Self {
            application_name: application_name.into(),
            client,
        }
    }

    /// Application name.
    #[must_use]
    pub fn application_name(&self) -> &str {
        &self.application_name
    }

    /// Register an uploaded artifact as a new version labelled `label`.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote call fails.
    pub async fn publish(
        &self,
        source_bundle: SourceBundle,
        label: &str,
    ) -> Result<ApplicationVersion, ApiError> {
        info!(
            application = %self.application_name,
            label,
            bucket = %source_bundle.s3_bucket,
            key = %source_bundle.s3_key,
            "creating application version"
        );

        self.client
            .create_application_version(CreateApplicationVersionRequest {
                application_name: self.application_name.clone(),
                version_label: label.to_string(),
                description: label.to_string(),
                source_bundle,
                process: true,
            })
            .await
    }

    /// All versions, most recently updated first.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote call fails.
    pub async fn application_versions(&self) -> Result<Vec<ApplicationVersion>, ApiError> {
        let mut versions = self
            .client
            .describe_application_versions(&self.application_name)
            .await?;
        versions.sort_by(|a, b| b.date_updated.cmp(&a.date_updated));
        Ok(versions)
    }

    /// Delete every version beyond the `keep_count` most recent ones.
    ///
    /// Returns the number of deleted versions.
    ///
    /// # Errors
    ///
    /// Returns an error if listing or any deletion fails. Versions deleted
    /// before the failure stay deleted.
    pub async fn prune(&self, keep_count: usize) -> Result<usize, ApiError> {
        let versions = self.application_versions().await?;
        let Some(old_versions) = versions.get(keep_count..) else {
            return Ok(0);
        };

        for version in old_versions {
            info!(
                application = %self.application_name,
                label = %version.version_label,
                "deleting application version"
            );
            self.client
                .delete_application_version(&self.application_name, &version.version_label, true)
                .await?;
        }

        Ok(old_versions.len())
    }
}
