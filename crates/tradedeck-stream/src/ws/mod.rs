/*
[INPUT]:  Stream lists, subscriptions and the Binance stream endpoint
[OUTPUT]: Routed market events delivered to callbacks over one socket
[POS]:    WebSocket layer - session lifecycle, routing and fan-out
[UPDATE]: When adding components or changing connection logic
*/

pub mod backoff;
pub mod client;
pub mod connection;
pub mod message;
pub mod registry;
pub mod router;
pub mod stats;
pub mod transport;

pub use backoff::{Backoff, BackoffConfig, ReconnectStep};
pub use client::MarketStreamClient;
pub use connection::{ConnectionSession, ConnectionState, build_session_url};
pub use message::{Frame, StreamMessage};
pub use registry::{Callback, DispatchReport, SubscriptionRegistry};
pub use router::{Route, resolve, route_text};
pub use stats::{StreamStats, StreamStatsSnapshot};
pub use transport::{Connection, Connector, TungsteniteConnector};
