//! CEL event kinds and the tracked-event bitset

use serde::{Deserialize, Serialize};
use std::fmt;

/// CEL event kinds.
///
/// Discriminants are dense small integers carried as-is in the record wire
/// form; they also index the [`CelEventSet`] bitset. Index 0 is the `ALL`
/// sentinel used by configuration, never emitted as a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum CelEventType {
    /// Sentinel matching every event kind (configuration only)
    All = 0,
    /// Channel was created
    ChannelStart = 1,
    /// Channel was destroyed
    ChannelEnd = 2,
    /// Channel reached the up state
    Answer = 3,
    /// Channel was hung up
    Hangup = 4,
    /// Channel entered a dialplan application
    AppStart = 5,
    /// Channel left a dialplan application
    AppEnd = 6,
    /// Channel was parked
    ParkStart = 7,
    /// Channel left the parking lot
    ParkEnd = 8,
    /// User-defined event published into the pipeline
    UserDefined = 9,
    /// Channel entered a bridge
    BridgeEnter = 10,
    /// Channel left a bridge
    BridgeExit = 11,
    /// Blind transfer completed
    BlindTransfer = 12,
    /// Attended transfer completed
    AttendedTransfer = 13,
    /// Call pickup occurred
    Pickup = 14,
    /// Dial was forwarded
    Forward = 15,
    /// Last channel of a linked call ended
    LinkedidEnd = 16,
    /// Local channel pair was optimized away
    LocalOptimize = 17,
}

/// Every emittable event kind, in discriminant order. Excludes the `All`
/// sentinel.
pub const CEL_EVENT_TYPES: [CelEventType; 17] = [
    CelEventType::ChannelStart,
    CelEventType::ChannelEnd,
    CelEventType::Answer,
    CelEventType::Hangup,
    CelEventType::AppStart,
    CelEventType::AppEnd,
    CelEventType::ParkStart,
    CelEventType::ParkEnd,
    CelEventType::UserDefined,
    CelEventType::BridgeEnter,
    CelEventType::BridgeExit,
    CelEventType::BlindTransfer,
    CelEventType::AttendedTransfer,
    CelEventType::Pickup,
    CelEventType::Forward,
    CelEventType::LinkedidEnd,
    CelEventType::LocalOptimize,
];

impl CelEventType {
    /// Wire name of this event kind.
    pub fn name(self) -> &'static str {
        match self {
            CelEventType::All => "ALL",
            CelEventType::ChannelStart => "CHANNEL_START",
            CelEventType::ChannelEnd => "CHANNEL_END",
            CelEventType::Answer => "ANSWER",
            CelEventType::Hangup => "HANGUP",
            CelEventType::AppStart => "APP_START",
            CelEventType::AppEnd => "APP_END",
            CelEventType::ParkStart => "PARK_START",
            CelEventType::ParkEnd => "PARK_END",
            CelEventType::UserDefined => "USER_DEFINED",
            CelEventType::BridgeEnter => "BRIDGE_ENTER",
            CelEventType::BridgeExit => "BRIDGE_EXIT",
            CelEventType::BlindTransfer => "BLINDTRANSFER",
            CelEventType::AttendedTransfer => "ATTENDEDTRANSFER",
            CelEventType::Pickup => "PICKUP",
            CelEventType::Forward => "FORWARD",
            CelEventType::LinkedidEnd => "LINKEDID_END",
            CelEventType::LocalOptimize => "LOCAL_OPTIMIZE",
        }
    }

    /// Parse an event kind from its wire name.
    ///
    /// Matching is case-sensitive except for the literal `ALL`, which is
    /// accepted in any case. Returns `None` for unrecognized names.
    pub fn from_name(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case("ALL") {
            return Some(CelEventType::All);
        }
        match name {
            "CHANNEL_START" => Some(CelEventType::ChannelStart),
            "CHANNEL_END" => Some(CelEventType::ChannelEnd),
            "ANSWER" => Some(CelEventType::Answer),
            "HANGUP" => Some(CelEventType::Hangup),
            "APP_START" => Some(CelEventType::AppStart),
            "APP_END" => Some(CelEventType::AppEnd),
            "PARK_START" => Some(CelEventType::ParkStart),
            "PARK_END" => Some(CelEventType::ParkEnd),
            "USER_DEFINED" => Some(CelEventType::UserDefined),
            "BRIDGE_ENTER" => Some(CelEventType::BridgeEnter),
            "BRIDGE_EXIT" => Some(CelEventType::BridgeExit),
            "BLINDTRANSFER" => Some(CelEventType::BlindTransfer),
            "ATTENDEDTRANSFER" => Some(CelEventType::AttendedTransfer),
            "PICKUP" => Some(CelEventType::Pickup),
            "FORWARD" => Some(CelEventType::Forward),
            "LINKEDID_END" => Some(CelEventType::LinkedidEnd),
            "LOCAL_OPTIMIZE" => Some(CelEventType::LocalOptimize),
            _ => None,
        }
    }

    /// Numeric wire id of this event kind.
    pub fn id(self) -> u32 {
        self as u32
    }

    /// Look up an event kind from its numeric wire id.
    pub fn from_id(id: u32) -> Option<Self> {
        match id {
            0 => Some(CelEventType::All),
            1 => Some(CelEventType::ChannelStart),
            2 => Some(CelEventType::ChannelEnd),
            3 => Some(CelEventType::Answer),
            4 => Some(CelEventType::Hangup),
            5 => Some(CelEventType::AppStart),
            6 => Some(CelEventType::AppEnd),
            7 => Some(CelEventType::ParkStart),
            8 => Some(CelEventType::ParkEnd),
            9 => Some(CelEventType::UserDefined),
            10 => Some(CelEventType::BridgeEnter),
            11 => Some(CelEventType::BridgeExit),
            12 => Some(CelEventType::BlindTransfer),
            13 => Some(CelEventType::AttendedTransfer),
            14 => Some(CelEventType::Pickup),
            15 => Some(CelEventType::Forward),
            16 => Some(CelEventType::LinkedidEnd),
            17 => Some(CelEventType::LocalOptimize),
            _ => None,
        }
    }
}

impl fmt::Display for CelEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Name of the event kind with the given numeric id, `"Unknown"` when the
/// id maps to no kind.
pub fn type_name(id: u32) -> &'static str {
    CelEventType::from_id(id)
        .map(CelEventType::name)
        .unwrap_or("Unknown")
}

/// Set of tracked event kinds, one bit per [`CelEventType`] discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CelEventSet(u64);

impl CelEventSet {
    /// Empty set
    pub const EMPTY: CelEventSet = CelEventSet(0);

    /// Set with every bit raised, the expansion of the literal `ALL`
    pub const ALL: CelEventSet = CelEventSet(u64::MAX);

    /// Add an event kind to the set
    pub fn insert(&mut self, event: CelEventType) {
        self.0 |= 1 << event.id();
    }

    /// Check whether an event kind is in the set
    pub fn contains(&self, event: CelEventType) -> bool {
        self.0 & (1 << event.id()) != 0
    }

    /// Check whether no event kind is tracked
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Iterate the emittable event kinds present in the set, in
    /// discriminant order. The `All` sentinel bit is not yielded.
    pub fn iter(&self) -> impl Iterator<Item = CelEventType> + '_ {
        CEL_EVENT_TYPES
            .iter()
            .copied()
            .filter(|event| self.contains(*event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_round_trip() {
        for event in CEL_EVENT_TYPES {
            assert_eq!(CelEventType::from_name(event.name()), Some(event));
        }
        assert_eq!(CelEventType::from_name("ALL"), Some(CelEventType::All));
    }

    #[test]
    fn test_id_round_trip() {
        for event in CEL_EVENT_TYPES {
            assert_eq!(CelEventType::from_id(event.id()), Some(event));
        }
        assert_eq!(CelEventType::from_id(0), Some(CelEventType::All));
        assert_eq!(CelEventType::from_id(18), None);
    }

    #[test]
    fn test_from_name_case_sensitive() {
        assert_eq!(
            CelEventType::from_name("CHANNEL_START"),
            Some(CelEventType::ChannelStart)
        );
        assert_eq!(CelEventType::from_name("channel_start"), None);
        assert_eq!(CelEventType::from_name("Channel_Start"), None);
    }

    #[test]
    fn test_from_name_all_any_case() {
        assert_eq!(CelEventType::from_name("ALL"), Some(CelEventType::All));
        assert_eq!(CelEventType::from_name("all"), Some(CelEventType::All));
        assert_eq!(CelEventType::from_name("All"), Some(CelEventType::All));
    }

    #[test]
    fn test_from_name_unknown() {
        assert_eq!(CelEventType::from_name("CHAN_START"), None);
        assert_eq!(CelEventType::from_name(""), None);
    }

    #[test]
    fn test_type_name_unknown_id() {
        assert_eq!(type_name(4), "HANGUP");
        assert_eq!(type_name(99), "Unknown");
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(CelEventType::ChannelStart.to_string(), "CHANNEL_START");
        assert_eq!(CelEventType::BlindTransfer.to_string(), "BLINDTRANSFER");
        assert_eq!(
            CelEventType::AttendedTransfer.to_string(),
            "ATTENDEDTRANSFER"
        );
        assert_eq!(CelEventType::LinkedidEnd.to_string(), "LINKEDID_END");
    }

    #[test]
    fn test_event_set_insert_contains() {
        let mut set = CelEventSet::EMPTY;
        assert!(set.is_empty());
        assert!(!set.contains(CelEventType::Hangup));

        set.insert(CelEventType::Hangup);
        set.insert(CelEventType::Answer);
        assert!(set.contains(CelEventType::Hangup));
        assert!(set.contains(CelEventType::Answer));
        assert!(!set.contains(CelEventType::Pickup));
        assert!(!set.is_empty());
    }

    #[test]
    fn test_event_set_all() {
        let set = CelEventSet::ALL;
        for event in CEL_EVENT_TYPES {
            assert!(set.contains(event));
        }
    }

    #[test]
    fn test_event_set_iter_order() {
        let mut set = CelEventSet::EMPTY;
        set.insert(CelEventType::LinkedidEnd);
        set.insert(CelEventType::ChannelStart);
        set.insert(CelEventType::Hangup);

        let listed: Vec<CelEventType> = set
            .iter()
            .collect();
        assert_eq!(
            listed,
            vec![
                CelEventType::ChannelStart,
                CelEventType::Hangup,
                CelEventType::LinkedidEnd,
            ]
        );
    }
}
