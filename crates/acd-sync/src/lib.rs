//! Live project sync: one scoped socket session at a time, heartbeat probing,
//! fixed-delay reconnection and REST reconciliation, projected into an
//! observable `ProjectState`.

pub mod api;
pub mod client;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod heartbeat;
mod session;
pub mod store;
pub mod transport;

#[cfg(test)]
mod testing;

pub use api::{fetch_reconciliation, AgentStatusReport, ProjectApi, ProjectDetail, RestProjectApi};
pub use client::SyncClient;
pub use config::{ReconnectPolicy, SyncConfig};
pub use endpoint::{project_api_url, project_ws_url};
pub use error::{ApiError, EndpointError, SyncError, TransportError};
pub use store::StateStore;
pub use transport::{CloseInfo, Connector, Transport, TransportEvent, WsConnector};
