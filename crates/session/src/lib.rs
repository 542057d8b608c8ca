//! Session lifecycle and identity arbitration for the OpsConsole shell.
//!
//! Answers "who (if anyone) is signed in, and is that still true" for two
//! mutually exclusive operator classes, under slow or failing remote
//! validation, push-based revocation, and absolute session expiry.
//!
//! # Modules
//!
//! - [`store`] — durable, class-namespaced credential persistence and the
//!   active-class tie-break
//! - [`validator`] — bounded remote check that a stored credential still maps
//!   to a live subject
//! - [`revocation`] — long-lived push feed reporting out-of-band revocation
//! - [`coordinator`] — the single-writer state machine every other surface
//!   consults

pub mod coordinator;
pub mod revocation;
pub mod store;
pub mod validator;

pub use coordinator::{InvalidationReason, LifecycleCoordinator, SessionState};
pub use revocation::{
    InProcessRevocationFeed, NatsRevocationFeed, RevocationFeed, RevocationSignal,
    SubscriptionHandle,
};
pub use store::{CredentialMedium, CredentialStore, FileMedium, MemoryMedium};
pub use validator::{HttpSessionValidator, SessionValidator, ValidationError};
