pub mod access;
pub mod asset_binder;
pub mod event_parser;
pub mod lifecycle;
pub mod signature;

pub use access::{decide, derive_role, AccessDecision, DenyReason};
pub use asset_binder::AssetBinder;
pub use event_parser::{parse_event, EventKind, ProviderEvent};
pub use lifecycle::BroadcastLifecycle;
pub use signature::{SignatureVerifier, SHARED_SECRET_HEADERS};
