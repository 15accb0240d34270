pub mod remote;
pub mod stub;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use remote::{DetectionLink, RemoteBackend, RemoteSettings, WsLink};
pub use stub::{DetectionScript, ScriptedBackend};

#[cfg(feature = "backend-tract")]
pub use tract::TractBackend;
