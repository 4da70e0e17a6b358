//! TvLink Core - unified TV remote-control protocol layer
//!
//! This crate provides:
//! - Domain types (remote keys, connection configs, TV state, events)
//! - A transport primitive with connect timeout and bounded reconnect
//! - A request correlator for id-matched replies
//! - The [`TvController`] trait with Samsung, LG WebOS and Android bridge adapters
//! - An adapter factory and a per-TV-type configuration store

/// Name the TV shows when asking to allow this remote
pub const DEFAULT_APP_NAME: &str = "Home Dashboard Remote";
pub const APP_VERSION_STRING: &str = "0.1.0";

pub mod adapters;
pub mod controller;
pub mod correlator;
pub mod error;
pub mod factory;
pub mod store;
pub mod transport;
pub mod types;

// Re-export common types
pub use controller::TvController;
pub use correlator::Correlator;
pub use error::{RemoteError, Result};
pub use factory::{create_controller, create_from_store, AdapterContext};
pub use store::{ConfigStore, FileStore, MemoryStore};
pub use transport::{Connector, Transport, TransportEvent, TransportOptions};
pub use types::{
    AndroidConfig, AppInfo, ConnectionConfig, ConnectionState, InputSource, LgConfig, RemoteKey,
    SamsungConfig, TvEvent, TvKind, TvState, TvStatePatch,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants_defined() {
        assert!(!DEFAULT_APP_NAME.is_empty());
        assert!(APP_VERSION_STRING.starts_with("0.1"));
    }
}
