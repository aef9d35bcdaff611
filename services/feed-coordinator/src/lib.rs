//! Feed Coordinator Service
//!
//! Keeps a fleet of stateless nodes synchronized with one upstream market-data
//! feed: every live instrument is subscribed to exactly once across the fleet,
//! and a dead upstream connection on any node is detected and repaired without
//! manual intervention. Coordination happens through a shared store (atomic
//! set/hash operations plus pub/sub) rather than locks or consensus; the
//! design tolerates brief duplicate work and relies on idempotent
//! re-subscription.

pub mod catalog;
pub mod config;
pub mod coordination;
pub mod feed;
pub mod listener;
pub mod liveness;
pub mod models;
pub mod queries;
pub mod registry;
pub mod subscription;
pub mod sync;

pub use config::AppConfig;
pub use coordination::{CoordinationStore, MemoryStore, RedisStore, StoreReply};
pub use feed::{FeedClient, FeedHandle, WsConnector};
pub use listener::Listener;
pub use liveness::LivenessMonitor;
pub use models::{EntityClass, Instrument, NodeId};
pub use queries::{PriceScope, PricedInstrumentQuery};
pub use registry::{InstrumentRegistry, MemoryRegistry, PgRegistry};
pub use subscription::{ClaimOutcome, SubscriptionCoordinator};
pub use sync::SyncEngine;
