//! Provisioning Module
//!
//! The Wi-Fi setup flow: a pure transition function over [`Phase`] plus the
//! async runtime that feeds it platform facts and carries out its effects.

pub mod phase;
pub mod retry;
pub mod runtime;
pub mod transition;

pub use phase::{CredentialProgress, Facts, Fault, Input, Phase};
pub use retry::RetryPolicy;
pub use runtime::{inbound_input, Provisioner, ProvisionerSettings};
pub use transition::{transition, Effect, Limits, Machine, Transition};
