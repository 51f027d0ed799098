//! Zero-Trust / CJIS Access Gateway
//!
//! Per-request access decisions over token, IP, geography, device
//! fingerprint, role, mTLS, and role-specific MFA requirements, with
//! session lifecycle and federated CJIS query logging.

pub mod cjis;
pub mod gateway;
pub mod roles;
pub mod session;

pub use cjis::CjisQueryLog;
pub use gateway::ZeroTrustGateway;
pub use roles::{default_roles, resource_matches};
pub use session::SessionRegistry;
