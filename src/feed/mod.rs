//! Market-data feed
//!
//! Trade ticks from a Polygon-style WebSocket feed, decoded and validated at
//! ingress and handed to a [`TickPublisher`](crate::bus::TickPublisher).

mod decode;
mod polygon;
mod state;
mod types;

pub use decode::decode_frame;
pub use polygon::{dispatch_frame, AuthStatus, FeedError, PolygonFeed};
pub use state::{Backoff, ConnectionState, ConnectionTracker, ReconnectPolicy};
pub use types::{ControlMessage, EventKind, FeedEvent, RawEvent, Tick, TickError};
