//! mdsub Authorization
//!
//! Authorization gate between path resolution and commit.
//!
//! # Components
//!
//! - [`Identity`]: caller, token fingerprint and declared expiry
//! - [`PolicyEngine`]: external access-check / resource-creation service
//! - [`AuthzCache`]: allow-decision cache with clock-checked expiry
//! - [`AuthorizationGate`]: all-or-nothing authorization over a set of paths
//! - [`Clock`]: injectable time source ([`SystemClock`], [`ManualClock`])

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod cache;
mod clock;
mod error;
mod gate;
mod identity;
mod policy;

pub use cache::{AuthzCache, CacheStats};
pub use clock::{add_duration, Clock, ManualClock, SystemClock};
pub use error::{AuthzError, AuthzResult, PolicyError};
pub use gate::{AuthorizationGate, GateConfig, ResourceOutcome};
pub use identity::Identity;
pub use policy::{Decision, PolicyEngine, ResourceCreation, RoleSet};
