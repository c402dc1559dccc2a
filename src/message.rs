//! Upstream messages routed through the CEL pipeline.
//!
//! Producers publish these tagged variants on their topics; the router
//! dispatches each variant to exactly one translator. Channel snapshots
//! travel behind `Arc` so a message clone never copies the snapshot.

use crate::event::CelEventType;
use crate::snapshot::ChannelSnapshot;
use serde_json::Value;
use std::sync::Arc;

/// Immutable view of a bridge at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BridgeSnapshot {
    /// Unique identifier of the bridge
    pub id: String,
    /// Names of the channels currently in the bridge
    pub channel_names: Vec<String>,
}

impl BridgeSnapshot {
    /// Create a bridge snapshot with the given id and no members.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            channel_names: Vec::new(),
        }
    }

    /// Names of every member except `channel`, comma-joined. This feeds
    /// the peer field of bridge records.
    pub fn peers_of(&self, channel: &str) -> String {
        self.channel_names
            .iter()
            .filter(|name| name.as_str() != channel)
            .cloned()
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Sub-kind of a parking lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParkedCallKind {
    /// Call entered the parking lot
    Parked,
    /// Parking timer expired
    Timeout,
    /// Parker hung up before retrieval
    GiveUp,
    /// Call was retrieved from the lot
    Unparked,
    /// Parking attempt failed
    Failed,
    /// Call was swapped with another parked call
    Swap,
}

impl ParkedCallKind {
    /// Fixed reason string reported in PARK_END extras, `None` for the
    /// non-terminal `Parked` kind.
    pub fn reason(self) -> Option<&'static str> {
        match self {
            ParkedCallKind::Parked => None,
            ParkedCallKind::Timeout => Some("ParkedCallTimeOut"),
            ParkedCallKind::GiveUp => Some("ParkedCallGiveUp"),
            ParkedCallKind::Unparked => Some("ParkedCallUnparked"),
            ParkedCallKind::Failed => Some("ParkedCallFailed"),
            ParkedCallKind::Swap => Some("ParkedCallSwap"),
        }
    }
}

/// Parking lifecycle notification.
#[derive(Debug, Clone)]
pub struct ParkingEvent {
    /// The channel sitting in the lot
    pub parkee: Arc<ChannelSnapshot>,
    /// Dial string to reach the parker
    pub parker_dial_string: String,
    /// Name of the parking lot
    pub parking_lot: String,
    /// Lifecycle sub-kind
    pub kind: ParkedCallKind,
}

/// Outcome notification of an outbound dial attempt.
#[derive(Debug, Clone)]
pub struct DialEvent {
    /// The dialing channel; absent on malformed publications
    pub caller: Option<Arc<ChannelSnapshot>>,
    /// Forward destination when the dial was forwarded, empty otherwise
    pub forwarded_to: String,
    /// Final dial status (`ANSWER`, `BUSY`, ...), empty while in progress
    pub dial_status: String,
}

/// Result of a blind transfer attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferResult {
    /// Transfer completed
    Success,
    /// Transfer failed in the dialplan
    Fail,
    /// Destination was invalid
    Invalid,
    /// Transfer was not permitted
    NotPermitted,
}

/// Blind transfer notification.
#[derive(Debug, Clone)]
pub struct BlindTransferEvent {
    /// Outcome of the attempt
    pub result: TransferResult,
    /// The transferring channel
    pub transferer: Arc<ChannelSnapshot>,
    /// Bridge the transferer was in, when known
    pub bridge: Option<BridgeSnapshot>,
    /// Destination extension
    pub exten: String,
    /// Destination context
    pub context: String,
}

/// One side of an attended transfer.
#[derive(Debug, Clone, Default)]
pub struct TransferSide {
    /// Bridge on this side, when any
    pub bridge: Option<BridgeSnapshot>,
    /// Channel on this side, when any
    pub channel: Option<Arc<ChannelSnapshot>>,
}

/// Destination resolved by an attended transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttendedTransferDest {
    /// Transfer failed; nothing is reported
    Fail,
    /// Two bridges merged into one
    BridgeMerge,
    /// Both sides linked by a local channel pair
    Link,
    /// Transferer stayed, three-way call
    Threeway,
    /// Transferee was handed to a dialplan application
    App(String),
}

/// Attended transfer notification.
#[derive(Debug, Clone)]
pub struct AttendedTransferEvent {
    /// Resolved destination
    pub dest: AttendedTransferDest,
    /// Side facing the transferee
    pub to_transferee: TransferSide,
    /// Side facing the transfer target
    pub to_transfer_target: TransferSide,
}

/// Message routed from the upstream topics into the translators.
#[derive(Debug, Clone)]
pub enum CelMessage {
    /// Channel snapshot delta: `None` old means creation, `None` new means
    /// destruction
    SnapshotUpdate {
        /// Prior snapshot, absent for a new channel
        old: Option<Arc<ChannelSnapshot>>,
        /// Current snapshot, absent once the channel is destroyed
        new: Option<Arc<ChannelSnapshot>>,
    },
    /// Channel joined a bridge
    BridgeEnter {
        /// The bridge being joined
        bridge: BridgeSnapshot,
        /// The joining channel
        channel: Arc<ChannelSnapshot>,
    },
    /// Channel left a bridge
    BridgeExit {
        /// The bridge being left
        bridge: BridgeSnapshot,
        /// The leaving channel
        channel: Arc<ChannelSnapshot>,
    },
    /// Parking lifecycle notification
    Parking(ParkingEvent),
    /// Dial attempt outcome
    Dial(DialEvent),
    /// Blind transfer notification
    BlindTransfer(BlindTransferEvent),
    /// Attended transfer notification
    AttendedTransfer(AttendedTransferEvent),
    /// Directed or group call pickup
    Pickup {
        /// The channel whose call was picked up
        target: Arc<ChannelSnapshot>,
        /// The channel doing the pickup
        picker: Arc<ChannelSnapshot>,
    },
    /// Local channel pair optimized away
    LocalOptimize {
        /// First leg of the local pair
        channel_one: Arc<ChannelSnapshot>,
        /// Second leg of the local pair
        channel_two: Arc<ChannelSnapshot>,
    },
    /// Generic carrier published through the public API
    Generic {
        /// Subject channel
        channel: Arc<ChannelSnapshot>,
        /// Claimed event kind
        kind: CelEventType,
        /// Publisher-supplied details blob
        details: Value,
    },
}
