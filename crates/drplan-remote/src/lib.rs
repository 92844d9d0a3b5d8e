//! drplan-remote — client seam for the remote recovery service.
//!
//! The remote service is the source of truth for job outcomes and server
//! inventory; everything in this system's own store is a cache of it.
//! Components receive an explicit [`ServiceFactory`] (never a process-wide
//! singleton) so tests and multi-account operation can swap scoped
//! credentials per account.

pub mod credentials;
pub mod error;
pub mod mock;
pub mod retry;
pub mod service;

pub use credentials::{CredentialSource, ScopedCredentials, StaticCredentialSource};
pub use error::{RemoteError, RemoteResult};
pub use retry::{with_backoff, RetryPolicy};
pub use service::{ActiveJob, JobStatus, RecoveryService, ReplicationState, ServiceFactory, SourceServer};
