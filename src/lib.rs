//! Halldyll Beanstalk - Elastic Beanstalk environment management library.
//!
//! A library for driving Elastic Beanstalk environments with:
//! - **Idempotent configuration**: environment variables and scaling are diffed
//!   against the live configuration; nothing is written when already in place
//! - **Deployments**: deploy a version label, restart, terminate
//! - **Convergence waiting**: poll the environment status with capped exponential
//!   backoff until it is Ready, failing fast on unexpected statuses
//! - **Release management**: publish application versions, prune old ones
//!
//! ## Quick Start
//!
//! All configuration is loaded from environment variables. Create a `.env` file:
//!
//! ```text
//! BEANSTALK_API_KEY=your_api_key_here
//! BEANSTALK_API_URL=https://beanstalk-gateway.internal
//! BEANSTALK_APPLICATION=my-app
//! ```
//!
//! Then drive an environment:
//!
//! ```ignore
//! use std::sync::Arc;
//! use halldyll_beanstalk::{
//!     BeanstalkApplication, BeanstalkClientConfig, BeanstalkConfig, BeanstalkHttpClient,
//!     DesiredChange, EnvironmentUpdate,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Arc::new(BeanstalkHttpClient::new(BeanstalkClientConfig::from_env()?)?);
//!     let app = BeanstalkApplication::new(BeanstalkConfig::from_env()?, client);
//!
//!     let mut env = app.environment("my-app-prod");
//!     env.synchronize_update(None, [
//!         EnvironmentUpdate::Variables(DesiredChange::new().set("RAILS_ENV", "production")),
//!         EnvironmentUpdate::Scale(3.into()),
//!         EnvironmentUpdate::Deploy("v42".to_string()),
//!     ]).await?;
//!     env.ensure_version("v42").await?;
//!
//!     Ok(())
//! }
//! ```

// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy for strict discipline
#![deny(clippy::all)]                 // All standard Clippy lints
#![deny(clippy::pedantic)]            // Very strict Clippy lints
#![deny(clippy::nursery)]             // Experimental lints
#![deny(clippy::unwrap_used)]         // unwrap() is forbidden
#![deny(clippy::expect_used)]         // expect() is forbidden
#![deny(clippy::panic)]               // panic!() is forbidden
#![deny(clippy::print_stdout)]        // println!() is forbidden in production
#![deny(clippy::todo)]                // TODO is forbidden
#![deny(clippy::unimplemented)]       // unimplemented!() is forbidden
#![deny(clippy::missing_const_for_fn)] // Force const when possible
#![deny(clippy::unwrap_in_result)]    // unwrap() in Result is forbidden
#![deny(clippy::module_inception)]    // Module with same name as crate is forbidden
#![deny(clippy::redundant_clone)]     // Useless clones are forbidden
#![deny(clippy::shadow_unrelated)]    // Shadowing unrelated variables is forbidden
#![deny(clippy::too_many_arguments)]  // Limit function arguments
#![deny(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Modules
// ============================================================================

/// Remote control-plane surface.
///
/// Use this module to implement or mock the Beanstalk API.
pub mod beanstalk_api;

/// HTTP implementation of the control-plane surface.
pub mod beanstalk_client;

/// Application-level configuration loaded from the environment.
pub mod beanstalk_config;

/// Idempotent configuration diffing.
///
/// Use this module to decide whether a change must be written at all.
pub mod beanstalk_diff;

/// Status polling with exponential backoff and deadline.
pub mod beanstalk_waiter;

/// Per-environment controller.
///
/// Use this module to update, deploy, and wait for one environment.
pub mod beanstalk_environment;

/// Application version publishing and retention.
pub mod beanstalk_release;

/// Application facade.
///
/// Use this module for environment listing and version cleanup.
pub mod beanstalk_application;

// ============================================================================
// Re-exports for convenience
// ============================================================================

pub use beanstalk_api::{ApiError, BeanstalkApi, SourceBundle};
pub use beanstalk_application::BeanstalkApplication;
pub use beanstalk_client::{BeanstalkClientConfig, BeanstalkHttpClient};
pub use beanstalk_config::{BeanstalkConfig, ConfigError};
pub use beanstalk_diff::{DesiredChange, Mutation, Scale, ScaleRange};
pub use beanstalk_environment::{
    EnvironmentController, EnvironmentError, EnvironmentIdentity, EnvironmentUpdate,
};
pub use beanstalk_release::ReleaseManager;
pub use beanstalk_waiter::{BackoffSchedule, Converged, PollState, WaitError};
