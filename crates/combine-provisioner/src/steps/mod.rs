//! Provisioning steps, one module per operation.

pub mod artifacts;
pub mod checkout;
pub mod credentials;
pub mod database;
pub mod packages;
pub mod runtime;
pub mod tools;

pub use artifacts::{StageArtifactsStep, StagedFile};
pub use checkout::ApplicationCheckoutStep;
pub use credentials::CredentialsFileStep;
pub use database::{DatabaseBootstrapStep, DatabaseTarget};
pub use packages::SystemPackagesStep;
pub use runtime::RuntimeDependenciesStep;
pub use tools::NamedToolStep;
