//! Engine constants and topic names

/// Buffered capacity of each upstream topic before slow subscribers lag
pub const TOPIC_CAPACITY: usize = 1024;

/// Topic carrying channel snapshot updates and dial outcomes
pub const CHANNEL_TOPIC: &str = "channel:all";

/// Topic carrying bridge, transfer, pickup, and local-optimize messages
pub const BRIDGE_TOPIC: &str = "bridge:all";

/// Topic carrying parking lifecycle messages
pub const PARKING_TOPIC: &str = "parking";

/// Topic owned by the engine itself, fed by the publish API
pub const CEL_TOPIC: &str = "cel";

/// CLI usage line for the status command
pub const SHOW_STATUS_USAGE: &str = "Usage: cel show status";

/// Exit code for successful CLI invocations
pub const CLI_EXIT_SUCCESS: i32 = 0;

/// Exit code for CLI usage errors
pub const CLI_EXIT_USAGE: i32 = 2;
