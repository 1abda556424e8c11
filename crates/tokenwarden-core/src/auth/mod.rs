//! Credential lifecycle: freshness policy, persistence, silent renewal,
//! background monitoring and the session façade tying them together.

pub mod monitor;
pub mod notify;
pub mod policy;
pub mod renewal;
pub mod session;
pub mod store;

pub use monitor::{check_once, Monitor, MonitorState, TickOutcome};
pub use notify::{RefreshCallback, RefreshNotifier};
pub use policy::{remaining, Freshness, Thresholds};
pub use renewal::Renewer;
pub use session::{AuthOptions, Session, TokenStatus};
pub use store::CredentialStore;
