//! Channel snapshot data consumed by the CEL pipeline.
//!
//! Snapshots are immutable point-in-time views of a channel published by the
//! channel subsystem. The engine borrows them behind `Arc` and never owns
//! the underlying channel.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Channel state ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ChannelState {
    /// On hook
    #[default]
    Down,
    /// Reserved, not yet dialing
    Reserved,
    /// Off hook
    OffHook,
    /// Digits being dialed
    Dialing,
    /// Remote end is ringing
    Ring,
    /// Local end is ringing
    Ringing,
    /// Call is up
    Up,
    /// Busy signal
    Busy,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChannelState::Down => "Down",
            ChannelState::Reserved => "Rsrvd",
            ChannelState::OffHook => "OffHook",
            ChannelState::Dialing => "Dialing",
            ChannelState::Ring => "Ring",
            ChannelState::Ringing => "Ringing",
            ChannelState::Up => "Up",
            ChannelState::Busy => "Busy",
        };
        write!(f, "{}", name)
    }
}

/// Automatic Message Accounting flags attached to a channel for billing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u32)]
pub enum AmaFlags {
    /// No AMA flag set
    #[default]
    None = 0,
    /// Omit the record from billing
    Omit = 1,
    /// Bill the record
    Billing = 2,
    /// Keep the record for documentation only
    Documentation = 3,
}

impl AmaFlags {
    /// Numeric wire code of this flag
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Billing-system name of this flag
    pub fn name(self) -> &'static str {
        match self {
            AmaFlags::None => "None",
            AmaFlags::Omit => "OMIT",
            AmaFlags::Billing => "BILLING",
            AmaFlags::Documentation => "DOCUMENTATION",
        }
    }

    /// Look up a flag from its numeric wire code
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(AmaFlags::None),
            1 => Some(AmaFlags::Omit),
            2 => Some(AmaFlags::Billing),
            3 => Some(AmaFlags::Documentation),
            _ => None,
        }
    }
}

impl fmt::Display for AmaFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for AmaFlags {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s
            .to_uppercase()
            .as_str()
        {
            "NONE" => Ok(AmaFlags::None),
            "OMIT" => Ok(AmaFlags::Omit),
            "BILLING" => Ok(AmaFlags::Billing),
            "DOCUMENTATION" => Ok(AmaFlags::Documentation),
            _ => Err(()),
        }
    }
}

/// Technology property bit marking channels that exist only as plumbing
/// between other channels. The pipeline ignores these entirely.
pub const TECH_PROPERTY_INTERNAL: u32 = 1 << 0;

/// Immutable view of a channel at a point in time.
///
/// Field semantics follow the channel subsystem's snapshot cache; the CEL
/// engine only reads them. `dead` is the terminal flag raised by the hangup
/// path before the snapshot is finally withdrawn from the cache.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChannelSnapshot {
    /// Unique identifier of this channel
    pub unique_id: String,
    /// Identifier shared by every channel of the same logical call
    pub linked_id: String,
    /// Channel name, e.g. `SIP/1000-00000001`
    pub name: String,
    /// Current channel state
    pub state: ChannelState,
    /// Terminal flag raised once the channel has been hung up
    pub dead: bool,
    /// Caller ID name
    pub caller_id_name: String,
    /// Caller ID number
    pub caller_id_number: String,
    /// Automatic Number Identification
    pub caller_ani: String,
    /// Redirecting Directory Number Information Service
    pub caller_rdnis: String,
    /// Dialed Number Identification Service
    pub caller_dnid: String,
    /// Dialplan context
    pub context: String,
    /// Dialplan extension
    pub exten: String,
    /// Currently executing dialplan application, empty when none
    pub app_name: String,
    /// Argument string of the current application
    pub app_data: String,
    /// Billing account code
    pub account_code: String,
    /// Account code of the bridged peer
    pub peer_account: String,
    /// Free-form user field
    pub user_field: String,
    /// AMA flags for billing
    pub ama_flags: AmaFlags,
    /// Hangup cause code, zero while the channel is alive
    pub hangup_cause: u32,
    /// Name of the party that caused the hangup, empty when unknown
    pub hangup_source: String,
    /// Channel technology property bits
    pub tech_properties: u32,
}

impl ChannelSnapshot {
    /// Create a snapshot with the given identity; remaining fields default.
    pub fn new(unique_id: impl Into<String>, name: impl Into<String>) -> Self {
        let unique_id = unique_id.into();
        Self {
            linked_id: unique_id.clone(),
            unique_id,
            name: name.into(),
            ..Default::default()
        }
    }

    /// Check whether this channel carries the internal technology property.
    pub fn is_internal(&self) -> bool {
        self.tech_properties & TECH_PROPERTY_INTERNAL != 0
    }
}
