mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{Call, FakeBeanstalk};
use reqwest::StatusCode;
use halldyll_beanstalk::beanstalk_api::{
    AUTOSCALING_NAMESPACE, ENVIRONMENT_VARIABLES_NAMESPACE, MAX_SIZE_OPTION, MIN_SIZE_OPTION,
};
use halldyll_beanstalk::{
    ApiError, DesiredChange, EnvironmentController, EnvironmentError, EnvironmentIdentity, EnvironmentUpdate,
    ScaleRange,
};

fn controller(fake: &Arc<FakeBeanstalk>) -> EnvironmentController<FakeBeanstalk> {
    EnvironmentController::new(
        EnvironmentIdentity::new("shop", "shop-prod"),
        Arc::clone(fake),
    )
}

fn fake_with_vars() -> Arc<FakeBeanstalk> {
    let fake = FakeBeanstalk::with_environment();
    fake.set_option(ENVIRONMENT_VARIABLES_NAMESPACE, "A", "1");
    fake.set_option(ENVIRONMENT_VARIABLES_NAMESPACE, "B", "2");
    fake.set_option(AUTOSCALING_NAMESPACE, MIN_SIZE_OPTION, "2");
    fake.set_option(AUTOSCALING_NAMESPACE, MAX_SIZE_OPTION, "4");
    Arc::new(fake)
}

#[tokio::test]
async fn identical_variables_issue_no_write() {
    let fake = fake_with_vars();
    let mut env = controller(&fake);

    let desired = DesiredChange::new().set("A", 1).set("B", "2").remove("C");
    let changed = env.set_environment_variables(&desired).await;

    assert!(matches!(changed, Ok(false)));
    assert!(fake.updates().is_empty());

    // The snapshot is still cached: a second skip does not re-describe.
    let again = env.set_environment_variables(&desired).await;
    assert!(matches!(again, Ok(false)));
    assert_eq!(fake.count(|c| *c == Call::DescribeConfigurationSettings), 1);
}

#[tokio::test]
async fn removing_a_variable_sends_only_the_removal() {
    let fake = fake_with_vars();
    let mut env = controller(&fake);

    let desired = DesiredChange::new().set("A", "1").remove("B");
    let changed = env.set_environment_variables(&desired).await;
    assert!(matches!(changed, Ok(true)));

    let updates = fake.updates();
    assert_eq!(updates.len(), 1);
    let request = &updates[0];
    assert_eq!(request.application_name.as_deref(), Some("shop"));
    assert_eq!(request.environment_name.as_deref(), Some("shop-prod"));
    assert!(request.option_settings.is_empty());
    assert_eq!(request.options_to_remove.len(), 1);
    assert_eq!(request.options_to_remove[0].option_name, "B");
    assert_eq!(
        request.options_to_remove[0].namespace,
        ENVIRONMENT_VARIABLES_NAMESPACE
    );
}

#[tokio::test]
async fn mutation_invalidates_the_snapshot() {
    let fake = fake_with_vars();
    let mut env = controller(&fake);

    let first = env
        .set_environment_variables(&DesiredChange::new().set("A", "10"))
        .await;
    assert!(matches!(first, Ok(true)));

    let vars = env.environment_variables().await.unwrap_or_default();
    assert_eq!(vars.get("A").map(String::as_str), Some("10"));
    assert_eq!(fake.count(|c| *c == Call::DescribeConfigurationSettings), 2);

    // Re-applying the same change is now a no-op.
    let second = env
        .set_environment_variables(&DesiredChange::new().set("A", "10"))
        .await;
    assert!(matches!(second, Ok(false)));
    assert_eq!(fake.updates().len(), 1);
}

#[tokio::test]
async fn integer_scale_pins_both_bounds() {
    let fake = fake_with_vars();
    let mut env = controller(&fake);

    let changed = env.set_scale(3).await;
    assert!(matches!(changed, Ok(true)));

    let updates = fake.updates();
    assert_eq!(updates.len(), 1);
    let values: Vec<(&str, &str)> = updates[0]
        .option_settings
        .iter()
        .map(|o| (o.option_name.as_str(), o.value.as_str()))
        .collect();
    assert_eq!(values, vec![(MIN_SIZE_OPTION, "3"), (MAX_SIZE_OPTION, "3")]);

    assert!(matches!(env.scale().await, Ok(range) if range == ScaleRange::fixed(3)));
}

#[tokio::test]
async fn identical_scale_is_skipped() {
    let fake = fake_with_vars();
    let mut env = controller(&fake);

    assert!(matches!(env.set_scale((2, 4)).await, Ok(false)));
    assert!(matches!(env.set_scale(ScaleRange::new(2, 4)).await, Ok(false)));
    assert!(fake.updates().is_empty());
}

#[tokio::test]
async fn inverted_scale_is_rejected_before_any_call() {
    let fake = fake_with_vars();
    let mut env = controller(&fake);

    let result = env.set_scale((5, 1)).await;
    assert!(matches!(result, Err(EnvironmentError::InvalidScale(_))));
    assert!(fake.calls().is_empty());
}

#[tokio::test]
async fn missing_scale_option_is_reported() {
    let fake = Arc::new(FakeBeanstalk::with_environment());
    fake.set_option(AUTOSCALING_NAMESPACE, MIN_SIZE_OPTION, "1");
    let mut env = controller(&fake);

    let result = env.scale().await;
    assert!(matches!(
        result,
        Err(EnvironmentError::MissingOption { option, .. }) if option == MAX_SIZE_OPTION
    ));
}

#[tokio::test]
async fn deploy_is_unconditional() {
    let fake = fake_with_vars();
    let mut env = controller(&fake);

    assert!(env.deploy("v1").await.is_ok());
    assert!(env.deploy("v1").await.is_ok());

    let updates = fake.updates();
    assert_eq!(updates.len(), 2);
    assert!(updates.iter().all(|r| {
        r.environment_id.as_deref() == Some("e-prod") && r.version_label.as_deref() == Some("v1")
    }));
}

#[tokio::test]
async fn ensure_version_detects_a_concurrent_deploy() {
    let fake = fake_with_vars();
    let mut env = controller(&fake);

    assert!(env.ensure_version("v1").await.is_ok());

    assert!(env.deploy("v2").await.is_ok());
    let result = env.ensure_version("v1").await;
    match result {
        Err(EnvironmentError::VersionMismatch { expected, actual }) => {
            assert_eq!(expected, "v1");
            assert_eq!(actual.as_deref(), Some("v2"));
        }
        other => panic!("expected version mismatch, got {other:?}"),
    }
}

#[tokio::test]
async fn unknown_environment_is_reported() {
    let fake = Arc::new(FakeBeanstalk::default());
    let mut env = controller(&fake);

    assert!(matches!(
        env.status().await,
        Err(EnvironmentError::EnvironmentNotFound { .. })
    ));
}

#[tokio::test]
async fn health_and_resources_are_never_cached() {
    let fake = fake_with_vars();
    let mut env = controller(&fake);

    for _ in 0..2 {
        assert!(env.health().await.is_ok());
        let resources = env.resources().await;
        assert!(matches!(resources, Ok(r) if r.instances.len() == 2));
    }

    assert_eq!(fake.count(|c| matches!(c, Call::DescribeHealth(_))), 2);
    assert_eq!(fake.count(|c| matches!(c, Call::DescribeResources(_))), 2);
    // The environment ID itself comes from the cached description.
    assert_eq!(fake.count(|c| *c == Call::DescribeEnvironments), 1);
}

#[tokio::test]
async fn restart_and_destroy_address_the_environment_id() {
    let fake = fake_with_vars();
    let mut env = controller(&fake);

    assert!(env.restart().await.is_ok());
    assert!(env.destroy().await.is_ok());

    assert!(fake.calls().contains(&Call::Restart("e-prod".to_string())));
    assert!(fake.calls().contains(&Call::Terminate("e-prod".to_string())));
    assert!(matches!(env.status().await, Ok(s) if s == "Terminating"));
}

#[tokio::test(start_paused = true)]
async fn synchronize_update_applies_then_waits_for_ready() {
    let fake = fake_with_vars();
    let mut env = controller(&fake);
    // The first describe resolves the environment ID for the deploy, the next
    // three are status polls.
    fake.script_statuses(&["Ready", "Updating", "Updating", "Ready"]);

    let start = tokio::time::Instant::now();
    let outcome = env
        .synchronize_update(
            Some(Duration::from_secs(600)),
            [
                EnvironmentUpdate::Variables(DesiredChange::new().set("A", "1").set("NEW", "x")),
                EnvironmentUpdate::Scale(3.into()),
                EnvironmentUpdate::Deploy("v2".to_string()),
            ],
        )
        .await;

    let converged = match outcome {
        Ok(c) => c,
        Err(e) => panic!("expected convergence, got {e}"),
    };
    assert_eq!(converged.polls, 3);
    assert_eq!(start.elapsed(), Duration::from_secs(90));
    assert_eq!(fake.updates().len(), 3);
    assert!(env.ensure_version("v2").await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn unexpected_status_is_fatal() {
    let fake = fake_with_vars();
    let mut env = controller(&fake);
    fake.script_statuses(&["Updating", "Terminated", "Ready"]);

    let result = env.wait_until_ready(Duration::from_secs(600)).await;

    match result {
        Err(EnvironmentError::FatalStatus {
            environment,
            status,
        }) => {
            assert_eq!(environment, "shop/shop-prod");
            assert_eq!(status, "Terminated");
        }
        other => panic!("expected fatal status, got {other:?}"),
    }
    assert_eq!(fake.count(|c| *c == Call::DescribeEnvironments), 2);
}

#[tokio::test(start_paused = true)]
async fn never_ready_times_out() {
    let fake = fake_with_vars();
    let mut env = controller(&fake);
    fake.script_statuses(&["Updating"; 10]);

    let result = env
        .synchronize_update(Some(Duration::from_secs(60)), Vec::<EnvironmentUpdate>::new())
        .await;

    match result {
        Err(EnvironmentError::TimedOut {
            elapsed,
            last_status,
            ..
        }) => {
            assert_eq!(elapsed, Duration::from_secs(90));
            assert_eq!(last_status, "Updating");
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert_eq!(fake.count(|c| *c == Call::DescribeEnvironments), 3);
}

#[tokio::test(start_paused = true)]
async fn status_fetch_failure_aborts_the_wait() {
    let fake = fake_with_vars();
    let mut env = controller(&fake);
    fake.script_failure(StatusCode::SERVICE_UNAVAILABLE);
    fake.script_statuses(&["Ready"]);

    let start = tokio::time::Instant::now();
    let result = env.wait_until_ready(Duration::from_secs(600)).await;

    assert!(matches!(
        result,
        Err(EnvironmentError::Api(ApiError::Api { status, .. }))
            if status == StatusCode::SERVICE_UNAVAILABLE
    ));
    assert_eq!(fake.count(|c| *c == Call::DescribeEnvironments), 1);
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn failure_after_a_transitional_poll_is_not_retried() {
    let fake = fake_with_vars();
    let mut env = controller(&fake);
    fake.script_statuses(&["Updating"]);
    fake.script_failure(StatusCode::BAD_GATEWAY);
    fake.script_statuses(&["Ready"]);

    let start = tokio::time::Instant::now();
    let result = env.wait_until_ready(Duration::from_secs(600)).await;

    assert!(matches!(result, Err(EnvironmentError::Api(_))));
    assert_eq!(fake.count(|c| *c == Call::DescribeEnvironments), 2);
    assert_eq!(start.elapsed(), Duration::from_secs(30));
}

#[tokio::test]
async fn rejected_update_is_propagated() {
    let fake = fake_with_vars();
    let mut env = controller(&fake);
    fake.fail_updates(StatusCode::BAD_REQUEST);

    let result = env
        .set_environment_variables(&DesiredChange::new().set("A", "10"))
        .await;

    assert!(matches!(
        result,
        Err(EnvironmentError::Api(ApiError::Api { status, .. })) if status == StatusCode::BAD_REQUEST
    ));
    assert_eq!(fake.updates().len(), 1);
}
