//! Combine environment provisioner
//!
//! Brings a fresh Debian-family host (usually a container image build) to
//! the state the Combine application expects: OS packages, application
//! checkout, staged configuration, Python runtime dependencies, auxiliary
//! tools, a bootstrapped MySQL schema and service account, and a client
//! credentials file.
//!
//! ## Execution model
//!
//! A [`ProvisionPlan`] is an ordered list of [`ProvisionStep`]s built from a
//! validated [`ProvisionConfig`]. The [`Provisioner`] runs the steps one at
//! a time and stops at the first failure; later steps are never started and
//! nothing is rolled back. Every run yields a [`ProvisionReport`].
//!
//! ## Idempotence
//!
//! Steps are safe to re-run. Package installs and tool installs lean on the
//! underlying installers or on probe commands, file staging only rewrites
//! changed content, and the database bootstrap uses guarded statements.

pub mod command;
pub mod config;
pub mod download;
mod error;
pub mod fakes;
pub mod pipeline;
pub mod plan;
pub mod step;
pub mod steps;
pub mod telemetry;

pub use command::{CommandExecutor, CommandOutput, CommandSpec, SystemExecutor};
pub use config::{BuildParams, ProvisionConfig, ToolConfig, ToolSource};
pub use error::{ConfigError, ProvisionError, StepError};
pub use pipeline::{ProvisionReport, Provisioner, StepReport, StepStatus};
pub use plan::ProvisionPlan;
pub use step::{names, ProvisionStep, StepContext, StepOutcome};
pub use telemetry::init_tracing;

/// Version of the provisioner.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
