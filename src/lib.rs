//! Channel Event Logging (CEL) engine for telephony platforms
//!
//! This crate observes channel lifecycle messages published by the channel,
//! bridge, and parking subsystems, infers semantic call events from them,
//! filters the events against operator policy, and fans normalized records
//! out to pluggable logging backends.
//!
//! # Architecture
//!
//! Producers publish tagged [`CelMessage`] values on the engine's topics.
//! A forwarder task per topic feeds one aggregation queue; a single router
//! task dispatches each message to its translator, and translators report
//! through a central gate that applies configuration filtering before
//! invoking every registered backend.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cel_engine::{CelConfig, CelEngine, CelEventSet, CelMessage, CelRecord, ChannelSnapshot};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = CelConfig {
//!         enabled: true,
//!         tracked_events: CelEventSet::ALL,
//!         ..Default::default()
//!     };
//!     let engine = CelEngine::init(config);
//!     engine
//!         .backend_register(
//!             "printer",
//!             Arc::new(|record: &CelRecord| {
//!                 println!("{} on {}", record.event_type, record.channel_name);
//!             }),
//!         )
//!         .unwrap();
//!
//!     let channel = Arc::new(ChannelSnapshot::new("uuid-1", "SIP/1000-00000001"));
//!     engine
//!         .channel_topic()
//!         .publish(CelMessage::SnapshotUpdate {
//!             old: None,
//!             new: Some(channel),
//!         });
//!
//!     engine.term().await;
//! }
//! ```

pub mod backend;
pub mod cli;
pub mod config;
pub mod constants;
pub mod dialstatus;
pub mod engine;
pub mod error;
pub mod event;
pub mod linkedid;
pub mod message;
pub mod record;
pub mod snapshot;
pub mod topic;

pub use backend::{BackendCallback, BackendRegistry};
pub use config::{CelConfig, ConfigStore};
pub use dialstatus::DialStatusStore;
pub use engine::CelEngine;
pub use error::{CelError, CelResult};
pub use event::{type_name, CelEventSet, CelEventType, CEL_EVENT_TYPES};
pub use linkedid::{LinkedIdTracker, UnrefOutcome};
pub use message::{
    AttendedTransferDest, AttendedTransferEvent, BlindTransferEvent, BridgeSnapshot, CelMessage,
    DialEvent, ParkedCallKind, ParkingEvent, TransferResult, TransferSide,
};
pub use record::{CelRecord, EventTime, FabricatedChannel};
pub use snapshot::{AmaFlags, ChannelSnapshot, ChannelState, TECH_PROPERTY_INTERNAL};
pub use topic::Topic;
