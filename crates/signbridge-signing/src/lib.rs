//! Signbridge Signing - Remote code-signing orchestration for build pipelines
//!
//! This crate drives an external signing module (the SignPath PowerShell
//! module by default) to:
//! - submit a signing request and wait for the signed artifact
//! - submit a signing request and return its id
//! - download the signed artifact of an earlier request
//!
//! Artifacts move through [`TemporaryFile`]s that are removed on release, on
//! drop, or at process teardown through the [`CleanupRegistry`].

pub mod cleanup;
pub mod command;
pub mod error;
pub mod executor;
pub mod facade;
pub mod model;
pub mod output;
pub mod temp;

pub use cleanup::{CleanupGuard, CleanupRegistry};
pub use command::{BackendCommand, CommandBuilder, Substitution};
pub use error::{Result, SigningError};
pub use executor::{ExecutionResult, ProcessExecutor, SigningBackend};
pub use facade::{
    PowerShellSigningFacade, PowerShellSigningFacadeFactory, SigningFacade, SigningFacadeFactory,
};
pub use model::{
    ApiConfiguration, Credentials, RepositoryMetadata, SigningRequest, SigningRequestId,
    SigningRequestOrigin,
};
pub use temp::TemporaryFile;
