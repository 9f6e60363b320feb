pub mod cache;
pub mod client;
pub mod credential;
pub mod endpoints;
pub mod error;
pub mod refresh;
pub mod types;
pub mod validator;

pub use cache::CookieCache;
pub use client::{BatchConfig, EngagementClient, StatResult};
pub use credential::{CredentialArtifact, CredentialStore};
pub use endpoints::StatEndpoint;
pub use error::{CredentialError, EngagementError};
pub use refresh::{RefreshConfig, RefreshCoordinator, RefreshOutcome, RefreshSignal, SignalError};
pub use types::StatPayload;
pub use validator::{CredentialValidator, ValidationOutcome};
