/*
[INPUT]:  Crate modules and public type definitions
[OUTPUT]: Public market stream crate surface
[POS]:    Crate root - module wiring
[UPDATE]: When public modules or exports change
*/

pub mod config;
pub mod error;
pub mod stream_id;
pub mod types;
pub mod ws;

pub use config::StreamConfig;
pub use error::{Result, StreamError};
pub use stream_id::{FeedKind, StreamId};

// Re-export all types
pub use types::*;

// Re-export commonly used types from ws
pub use ws::{
    BackoffConfig,
    ConnectionState,
    Connection,
    Connector,
    MarketStreamClient,
    StreamMessage,
    StreamStatsSnapshot,
    TungsteniteConnector,
};
