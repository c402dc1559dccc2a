//! Event record construction and fabrication.
//!
//! A [`CelRecord`] is the normalized payload handed to every backend. It is
//! built once per emission from a channel snapshot plus optional extras and
//! is self-contained: no reference to caller-owned storage survives
//! construction.

use crate::event::CelEventType;
use crate::snapshot::{AmaFlags, ChannelSnapshot};
use chrono::{Local, LocalResult, TimeZone};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::error;

/// Event timestamp with microsecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EventTime {
    /// Seconds since the Unix epoch
    pub sec: u64,
    /// Microsecond remainder
    pub usec: u32,
}

impl EventTime {
    /// Capture the current time.
    pub fn now() -> Self {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            sec: elapsed.as_secs(),
            usec: elapsed.subsec_micros(),
        }
    }

    /// Render this timestamp using a strftime-style date format, or as
    /// numeric `sec.usec` when the format string is empty.
    pub fn format(&self, date_format: &str) -> String {
        if date_format.is_empty() {
            return format!("{}.{:06}", self.sec, self.usec);
        }
        match Local.timestamp_opt(self.sec as i64, self.usec * 1000) {
            LocalResult::Single(when) | LocalResult::Ambiguous(when, _) => when
                .format(date_format)
                .to_string(),
            LocalResult::None => format!("{}.{:06}", self.sec, self.usec),
        }
    }
}

/// Normalized CEL event record delivered to backends.
///
/// Every string field is owned and defaults to empty when the source
/// snapshot had nothing to offer; numeric fields default to zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CelRecord {
    /// Kind of event this record describes
    pub event_type: CelEventType,
    /// Name carried by USER_DEFINED events, empty otherwise
    pub user_defined_name: String,
    /// Time the record was built
    pub event_time: EventTime,
    /// Caller ID name
    pub caller_id_name: String,
    /// Caller ID number
    pub caller_id_number: String,
    /// Automatic Number Identification
    pub caller_ani: String,
    /// Redirecting number
    pub caller_rdnis: String,
    /// Dialed number
    pub caller_dnid: String,
    /// Dialplan extension
    pub exten: String,
    /// Dialplan context
    pub context: String,
    /// Channel name
    pub channel_name: String,
    /// Dialplan application at emission time
    pub app_name: String,
    /// Application argument string
    pub app_data: String,
    /// AMA flags for billing
    pub ama_flags: AmaFlags,
    /// Billing account code
    pub account_code: String,
    /// Account code of the bridged peer
    pub peer_account: String,
    /// Unique identifier of the subject channel
    pub unique_id: String,
    /// Linked call identifier
    pub linked_id: String,
    /// Free-form user field
    pub user_field: String,
    /// Extras serialized to a compact JSON string, empty when absent
    pub extra: String,
    /// Peer channel name(s), empty when not applicable
    pub peer: String,
}

impl CelRecord {
    /// Build a record from a snapshot; event time is captured here.
    pub fn new(
        snapshot: &ChannelSnapshot,
        event_type: CelEventType,
        user_defined_name: Option<&str>,
        extras: Option<&Value>,
        peer: &str,
    ) -> Self {
        let extra = match extras {
            Some(value) => serde_json::to_string(value).unwrap_or_else(|err| {
                error!("Failed to serialize extras for {}: {}", event_type, err);
                String::new()
            }),
            None => String::new(),
        };

        Self {
            event_type,
            user_defined_name: user_defined_name
                .unwrap_or_default()
                .to_string(),
            event_time: EventTime::now(),
            caller_id_name: snapshot
                .caller_id_name
                .clone(),
            caller_id_number: snapshot
                .caller_id_number
                .clone(),
            caller_ani: snapshot
                .caller_ani
                .clone(),
            caller_rdnis: snapshot
                .caller_rdnis
                .clone(),
            caller_dnid: snapshot
                .caller_dnid
                .clone(),
            exten: snapshot
                .exten
                .clone(),
            context: snapshot
                .context
                .clone(),
            channel_name: snapshot
                .name
                .clone(),
            app_name: snapshot
                .app_name
                .clone(),
            app_data: snapshot
                .app_data
                .clone(),
            ama_flags: snapshot.ama_flags,
            account_code: snapshot
                .account_code
                .clone(),
            peer_account: snapshot
                .peer_account
                .clone(),
            unique_id: snapshot
                .unique_id
                .clone(),
            linked_id: snapshot
                .linked_id
                .clone(),
            user_field: snapshot
                .user_field
                .clone(),
            extra,
            peer: peer.to_string(),
        }
    }

    /// Typed key/value bag seen by backends that want a wire form rather
    /// than the struct itself.
    pub fn to_wire(&self) -> Value {
        json!({
            "event_type": self.event_type.id(),
            "event_time_sec": self.event_time.sec,
            "event_time_usec": self.event_time.usec,
            "user_event_name": self.user_defined_name,
            "cid_name": self.caller_id_name,
            "cid_num": self.caller_id_number,
            "cid_ani": self.caller_ani,
            "cid_rdnis": self.caller_rdnis,
            "cid_dnid": self.caller_dnid,
            "exten": self.exten,
            "context": self.context,
            "channel_name": self.channel_name,
            "app_name": self.app_name,
            "app_data": self.app_data,
            "ama_flags": self.ama_flags.code(),
            "account_code": self.account_code,
            "peer_account": self.peer_account,
            "unique_id": self.unique_id,
            "linked_id": self.linked_id,
            "user_field": self.user_field,
            "extra": self.extra,
            "peer": self.peer,
        })
    }
}

/// Lightweight channel-like object synthesized from an event record.
///
/// Backends that replay records into channel-shaped consumers use this
/// instead of a live channel. The application name and data are owned by
/// the fabricated object itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FabricatedChannel {
    /// Channel name from the record
    pub name: String,
    /// Unique identifier from the record
    pub unique_id: String,
    /// Linked call identifier from the record
    pub linked_id: String,
    /// Caller ID name
    pub caller_id_name: String,
    /// Caller ID number
    pub caller_id_number: String,
    /// Automatic Number Identification
    pub caller_ani: String,
    /// Redirecting number
    pub caller_rdnis: String,
    /// Dialed number
    pub caller_dnid: String,
    /// Dialplan context
    pub context: String,
    /// Dialplan extension
    pub exten: String,
    /// Application name, owned by this object
    pub app_name: String,
    /// Application data, owned by this object
    pub app_data: String,
    /// Billing account code
    pub account_code: String,
    /// Peer account code
    pub peer_account: String,
    /// Free-form user field
    pub user_field: String,
    /// AMA flags
    pub ama_flags: AmaFlags,
    /// Record time rendered with the configured date format
    pub event_time: String,
}

impl FabricatedChannel {
    /// Synthesize a channel-like object from a record.
    ///
    /// `date_format` follows the configuration's `dateformat` semantics:
    /// empty means numeric `sec.usec`.
    pub fn from_record(record: &CelRecord, date_format: &str) -> Self {
        Self {
            name: record
                .channel_name
                .clone(),
            unique_id: record
                .unique_id
                .clone(),
            linked_id: record
                .linked_id
                .clone(),
            caller_id_name: record
                .caller_id_name
                .clone(),
            caller_id_number: record
                .caller_id_number
                .clone(),
            caller_ani: record
                .caller_ani
                .clone(),
            caller_rdnis: record
                .caller_rdnis
                .clone(),
            caller_dnid: record
                .caller_dnid
                .clone(),
            context: record
                .context
                .clone(),
            exten: record
                .exten
                .clone(),
            app_name: record
                .app_name
                .clone(),
            app_data: record
                .app_data
                .clone(),
            account_code: record
                .account_code
                .clone(),
            // TODO: peer_account is filled from account_code, matching the
            // long-standing fabrication behavior. Review whether it should
            // read record.peer_account instead.
            peer_account: record
                .account_code
                .clone(),
            user_field: record
                .user_field
                .clone(),
            ama_flags: record.ama_flags,
            event_time: record
                .event_time
                .format(date_format),
        }
    }
}
