//! In-memory Beanstalk used by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::StatusCode;
use halldyll_beanstalk::beanstalk_api::{
    ApiError, ApplicationVersion, BeanstalkApi, CreateApplicationVersionRequest,
    EnvironmentDescription, EnvironmentHealth, EnvironmentResources, OptionSetting,
    UpdateEnvironmentRequest,
};

/// One recorded remote call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    DescribeEnvironments,
    DescribeConfigurationSettings,
    UpdateEnvironment(UpdateEnvironmentRequest),
    DescribeHealth(String),
    DescribeResources(String),
    Restart(String),
    Terminate(String),
    CreateVersion(CreateApplicationVersionRequest),
    DescribeVersions,
    DeleteVersion { label: String, delete_source_bundle: bool },
}

#[derive(Debug, Default)]
pub struct FakeState {
    pub environments: Vec<EnvironmentDescription>,
    pub option_settings: Vec<OptionSetting>,
    /// Statuses returned by successive `describe_environments` calls. An `Err`
    /// entry makes that call fail with the given HTTP status.
    pub status_script: VecDeque<Result<String, StatusCode>>,
    /// When set, every `update_environment` call fails with this status.
    pub update_failure: Option<StatusCode>,
    pub versions: Vec<ApplicationVersion>,
    pub calls: Vec<Call>,
}

#[derive(Debug, Default)]
pub struct FakeBeanstalk {
    state: Mutex<FakeState>,
}

impl FakeBeanstalk {
    /// A fake holding one Ready environment `shop/shop-prod` running `v1`.
    pub fn with_environment() -> Self {
        let fake = Self::default();
        fake.state().environments.push(EnvironmentDescription {
            environment_name: "shop-prod".to_string(),
            environment_id: "e-prod".to_string(),
            application_name: "shop".to_string(),
            status: "Ready".to_string(),
            health: Some("Green".to_string()),
            version_label: Some("v1".to_string()),
            cname: None,
        });
        fake
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn set_option(&self, namespace: &str, name: &str, value: &str) {
        self.state().option_settings.push(OptionSetting {
            namespace: namespace.to_string(),
            option_name: name.to_string(),
            value: Some(value.to_string()),
        });
    }

    pub fn script_statuses(&self, statuses: &[&str]) {
        self.state()
            .status_script
            .extend(statuses.iter().map(|s| Ok((*s).to_string())));
    }

    pub fn script_failure(&self, status: StatusCode) {
        self.state().status_script.push_back(Err(status));
    }

    pub fn fail_updates(&self, status: StatusCode) {
        self.state().update_failure = Some(status);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.state().calls.iter().filter(|c| pred(c)).count()
    }

    pub fn updates(&self) -> Vec<UpdateEnvironmentRequest> {
        self.state()
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::UpdateEnvironment(r) => Some(r.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn add_version(&self, label: &str, updated_day: u32) {
        self.state().versions.push(ApplicationVersion {
            application_name: "shop".to_string(),
            version_label: label.to_string(),
            description: None,
            source_bundle: None,
            status: Some("Processed".to_string()),
            date_created: None,
            date_updated: day(updated_day),
        });
    }
}

pub fn day(d: u32) -> DateTime<Utc> {
    match Utc.with_ymd_and_hms(2024, 1, d, 12, 0, 0).single() {
        Some(t) => t,
        None => panic!("invalid test date: day {d}"),
    }
}

fn api_error(status: StatusCode, body: &str) -> ApiError {
    ApiError::Api {
        status,
        body: body.to_string(),
    }
}

#[async_trait]
impl BeanstalkApi for FakeBeanstalk {
    async fn describe_environments(
        &self,
        application_name: &str,
        _include_deleted: bool,
    ) -> Result<Vec<EnvironmentDescription>, ApiError> {
        let mut state = self.state();
        state.calls.push(Call::DescribeEnvironments);

        match state.status_script.pop_front() {
            Some(Ok(status)) => {
                for env in &mut state.environments {
                    env.status.clone_from(&status);
                }
            }
            Some(Err(code)) => return Err(api_error(code, "scripted failure")),
            None => {}
        }

        Ok(state
            .environments
            .iter()
            .filter(|e| e.application_name == application_name)
            .cloned()
            .collect())
    }

    async fn describe_configuration_settings(
        &self,
        _application_name: &str,
        _environment_name: &str,
    ) -> Result<Vec<OptionSetting>, ApiError> {
        let mut state = self.state();
        state.calls.push(Call::DescribeConfigurationSettings);
        Ok(state.option_settings.clone())
    }

    async fn update_environment(&self, request: UpdateEnvironmentRequest) -> Result<(), ApiError> {
        let mut state = self.state();
        state.calls.push(Call::UpdateEnvironment(request.clone()));
        if let Some(code) = state.update_failure {
            return Err(api_error(code, "update rejected"));
        }

        for update in &request.option_settings {
            state
                .option_settings
                .retain(|s| !(s.namespace == update.namespace && s.option_name == update.option_name));
            state.option_settings.push(OptionSetting {
                namespace: update.namespace.clone(),
                option_name: update.option_name.clone(),
                value: Some(update.value.clone()),
            });
        }
        for removal in &request.options_to_remove {
            state
                .option_settings
                .retain(|s| !(s.namespace == removal.namespace && s.option_name == removal.option_name));
        }
        if let Some(label) = &request.version_label {
            for env in &mut state.environments {
                env.version_label = Some(label.clone());
            }
        }
        Ok(())
    }

    async fn describe_environment_health(
        &self,
        environment_id: &str,
    ) -> Result<EnvironmentHealth, ApiError> {
        self.state()
            .calls
            .push(Call::DescribeHealth(environment_id.to_string()));
        Ok(EnvironmentHealth {
            health_status: Some("Ok".to_string()),
            ..EnvironmentHealth::default()
        })
    }

    async fn describe_environment_resources(
        &self,
        environment_id: &str,
    ) -> Result<EnvironmentResources, ApiError> {
        self.state()
            .calls
            .push(Call::DescribeResources(environment_id.to_string()));
        Ok(EnvironmentResources {
            instances: vec!["i-1".to_string(), "i-2".to_string()],
            ..EnvironmentResources::default()
        })
    }

    async fn restart_app_server(&self, environment_id: &str) -> Result<(), ApiError> {
        self.state().calls.push(Call::Restart(environment_id.to_string()));
        Ok(())
    }

    async fn terminate_environment(&self, environment_id: &str) -> Result<(), ApiError> {
        let mut state = self.state();
        state.calls.push(Call::Terminate(environment_id.to_string()));
        if !state.environments.iter().any(|e| e.environment_id == environment_id) {
            return Err(api_error(StatusCode::NOT_FOUND, "no such environment"));
        }
        for env in &mut state.environments {
            if env.environment_id == environment_id {
                env.status = "Terminating".to_string();
            }
        }
        Ok(())
    }

    async fn create_application_version(
        &self,
        request: CreateApplicationVersionRequest,
    ) -> Result<ApplicationVersion, ApiError> {
        let mut state = self.state();
        state.calls.push(Call::CreateVersion(request.clone()));
        let version = ApplicationVersion {
            application_name: request.application_name,
            version_label: request.version_label,
            description: Some(request.description),
            source_bundle: Some(request.source_bundle),
            status: Some("Processing".to_string()),
            date_created: Some(day(28)),
            date_updated: day(28),
        };
        state.versions.push(version.clone());
        Ok(version)
    }

    async fn describe_application_versions(
        &self,
        _application_name: &str,
    ) -> Result<Vec<ApplicationVersion>, ApiError> {
        let mut state = self.state();
        state.calls.push(Call::DescribeVersions);
        Ok(state.versions.clone())
    }

    async fn delete_application_version(
        &self,
        _application_name: &str,
        version_label: &str,
        delete_source_bundle: bool,
    ) -> Result<(), ApiError> {
        let mut state = self.state();
        state.calls.push(Call::DeleteVersion {
            label: version_label.to_string(),
            delete_source_bundle,
        });
        state.versions.retain(|v| v.version_label != version_label);
        Ok(())
    }
}
