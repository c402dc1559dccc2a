//! CEL configuration and the atomically swappable config store.
//!
//! The external file format is key=value under a `[general]` section.
//! Sections named `manager` and `radius` belong to sibling subsystems and
//! are skipped. A parse or validation failure leaves the previously applied
//! configuration in place.

use crate::error::{CelError, CelResult};
use crate::event::{CelEventSet, CelEventType};
use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, warn};

/// Section holding the engine's own options
const GENERAL_SECTION: &str = "general";

/// Sections reserved for sibling subsystems, skipped without warning
const RESERVED_SECTIONS: [&str; 2] = ["manager", "radius"];

/// Immutable CEL configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CelConfig {
    /// Master switch; when off, every emission is dropped
    pub enabled: bool,
    /// strftime-style date format for fabricated event times, empty means
    /// numeric `sec.usec`
    pub date_format: String,
    /// Event kinds that reach backends
    pub tracked_events: CelEventSet,
    /// Dialplan applications (lower-cased) whose APP_START/APP_END are kept
    pub tracked_apps: HashSet<String>,
}

impl CelConfig {
    /// Check whether an event kind is tracked.
    pub fn tracks(&self, event: CelEventType) -> bool {
        self.tracked_events
            .contains(event)
    }

    /// Check whether a dialplan application is tracked. Comparison is
    /// case-insensitive; an empty tracked set matches nothing.
    pub fn tracks_app(&self, name: &str) -> bool {
        self.tracked_apps
            .contains(&name.to_ascii_lowercase())
    }

    /// Validate cross-field invariants.
    ///
    /// Tracking applications without tracking either APP_START or APP_END
    /// would stage app names that can never be emitted, so it is rejected.
    pub fn validate(&self) -> CelResult<()> {
        if !self
            .tracked_apps
            .is_empty()
            && !self.tracks(CelEventType::AppStart)
            && !self.tracks(CelEventType::AppEnd)
        {
            return Err(CelError::config_rejected(
                "apps are listed but neither APP_START nor APP_END is in events",
            ));
        }
        Ok(())
    }

    /// Parse the key=value configuration file format.
    ///
    /// Unknown event names fail the whole parse; unknown keys and unknown
    /// sections are ignored with a log line.
    pub fn from_config_text(source: &str) -> CelResult<Self> {
        let mut config = CelConfig::default();
        let mut section = String::new();

        for (index, raw_line) in source
            .lines()
            .enumerate()
        {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }

            if let Some(name) = line
                .strip_prefix('[')
                .and_then(|rest| rest.strip_suffix(']'))
            {
                section = name
                    .trim()
                    .to_ascii_lowercase();
                continue;
            }

            if section != GENERAL_SECTION {
                if RESERVED_SECTIONS.contains(&section.as_str()) {
                    debug!("Skipping reserved section [{}]", section);
                } else {
                    debug!("Ignoring option in unknown section [{}]", section);
                }
                continue;
            }

            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| {
                    CelError::config_rejected(format!(
                        "line {}: expected key=value, got '{}'",
                        index + 1,
                        line
                    ))
                })?;
            let key = key
                .trim()
                .to_ascii_lowercase();
            let value = value.trim();

            match key.as_str() {
                "enable" => {
                    config.enabled = parse_bool(value).ok_or_else(|| {
                        CelError::config_rejected(format!("invalid boolean '{}' for enable", value))
                    })?;
                }
                "dateformat" => {
                    config.date_format = value.to_string();
                }
                "events" => {
                    config.tracked_events = parse_events(value)?;
                }
                "apps" => {
                    config.tracked_apps = value
                        .split(',')
                        .map(|app| {
                            app.trim()
                                .to_ascii_lowercase()
                        })
                        .filter(|app| !app.is_empty())
                        .collect();
                }
                other => {
                    warn!("Ignoring unknown CEL option '{}'", other);
                }
            }
        }

        Ok(config)
    }
}

/// Parse a configuration boolean.
fn parse_bool(value: &str) -> Option<bool> {
    match value
        .to_ascii_lowercase()
        .as_str()
    {
        "yes" | "true" | "on" | "1" => Some(true),
        "no" | "false" | "off" | "0" => Some(false),
        _ => None,
    }
}

/// Parse the comma-separated `events` option. Names are case-sensitive
/// except the literal `ALL`, which raises every bit.
fn parse_events(value: &str) -> CelResult<CelEventSet> {
    let mut set = CelEventSet::EMPTY;
    for item in value.split(',') {
        let name = item.trim();
        if name.is_empty() {
            continue;
        }
        match CelEventType::from_name(name) {
            Some(CelEventType::All) => set = CelEventSet::ALL,
            Some(event) => set.insert(event),
            None => return Err(CelError::unknown_event(name)),
        }
    }
    Ok(set)
}

/// Holder of the current configuration.
///
/// Readers grab an `Arc` to the immutable config and drop the lock before
/// using it; writers validate and swap the whole object. No reader ever
/// observes a half-applied configuration.
#[derive(Debug)]
pub struct ConfigStore {
    current: RwLock<Arc<CelConfig>>,
}

impl ConfigStore {
    /// Create a store holding the given configuration.
    pub fn new(config: CelConfig) -> Self {
        Self {
            current: RwLock::new(Arc::new(config)),
        }
    }

    /// Snapshot of the current configuration.
    pub fn current(&self) -> Arc<CelConfig> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Validate and apply a new configuration.
    pub fn set(&self, config: CelConfig) -> CelResult<()> {
        config.validate()?;
        let mut current = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *current = Arc::new(config);
        debug!("CEL configuration applied");
        Ok(())
    }

    /// Parse, validate, and apply configuration text. On any error the
    /// previously applied configuration is retained.
    pub fn load(&self, source: &str) -> CelResult<()> {
        let config = CelConfig::from_config_text(source)?;
        self.set(config)
    }

    /// Check the master switch of the current configuration.
    pub fn is_enabled(&self) -> bool {
        self.current()
            .enabled
    }

    /// Check whether an event kind is tracked by the current configuration.
    pub fn tracks(&self, event: CelEventType) -> bool {
        self.current()
            .tracks(event)
    }

    /// Check whether an application is tracked by the current configuration.
    pub fn tracks_app(&self, name: &str) -> bool {
        self.current()
            .tracks_app(name)
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new(CelConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CelConfig::default();
        assert!(!config.enabled);
        assert!(config
            .date_format
            .is_empty());
        assert!(config
            .tracked_events
            .is_empty());
        assert!(config
            .tracked_apps
            .is_empty());
    }

    #[test]
    fn test_parse_full_file() {
        let source = "\
; CEL engine configuration
[general]
enable = yes
dateformat = %F %T
events = CHANNEL_START, HANGUP ,CHANNEL_END
apps = Dial, Queue
";
        let config = CelConfig::from_config_text(source).unwrap();
        assert!(config.enabled);
        assert_eq!(config.date_format, "%F %T");
        assert!(config.tracks(CelEventType::ChannelStart));
        assert!(config.tracks(CelEventType::Hangup));
        assert!(config.tracks(CelEventType::ChannelEnd));
        assert!(!config.tracks(CelEventType::Answer));
        assert!(config.tracks_app("dial"));
        assert!(config.tracks_app("DIAL"));
        assert!(config.tracks_app("Queue"));
        assert!(!config.tracks_app("park"));
    }

    #[test]
    fn test_parse_events_all() {
        let source = "[general]\nenable=yes\nevents=ALL\n";
        let config = CelConfig::from_config_text(source).unwrap();
        assert_eq!(config.tracked_events, CelEventSet::ALL);

        let source = "[general]\nevents=all\n";
        let config = CelConfig::from_config_text(source).unwrap();
        assert_eq!(config.tracked_events, CelEventSet::ALL);
    }

    #[test]
    fn test_parse_unknown_event_fails() {
        let source = "[general]\nevents=CHANNEL_START,CHAN_BORK\n";
        let err = CelConfig::from_config_text(source).unwrap_err();
        assert!(matches!(err, CelError::UnknownEventName { name } if name == "CHAN_BORK"));

        // ALL does not excuse unknown names later in the list.
        let source = "[general]\nevents=ALL,CHAN_BORK\n";
        assert!(CelConfig::from_config_text(source).is_err());
    }

    #[test]
    fn test_parse_event_names_case_sensitive() {
        let source = "[general]\nevents=hangup\n";
        assert!(CelConfig::from_config_text(source).is_err());
    }

    #[test]
    fn test_reserved_sections_skipped() {
        let source = "\
[manager]
enable = yes
[radius]
events = ALL
[general]
enable = no
";
        let config = CelConfig::from_config_text(source).unwrap();
        assert!(!config.enabled);
        assert!(config
            .tracked_events
            .is_empty());
    }

    #[test]
    fn test_malformed_line_rejected() {
        let source = "[general]\nenable\n";
        assert!(CelConfig::from_config_text(source).is_err());
    }

    #[test]
    fn test_invalid_bool_rejected() {
        let source = "[general]\nenable=maybe\n";
        assert!(CelConfig::from_config_text(source).is_err());
    }

    #[test]
    fn test_apps_without_app_events_rejected() {
        let mut config = CelConfig {
            enabled: true,
            ..Default::default()
        };
        config
            .tracked_events
            .insert(CelEventType::Hangup);
        config
            .tracked_apps
            .insert("dial".to_string());
        assert!(config
            .validate()
            .is_err());

        config
            .tracked_events
            .insert(CelEventType::AppStart);
        assert!(config
            .validate()
            .is_ok());
    }

    #[test]
    fn test_store_load_keeps_prior_on_error() {
        let store = ConfigStore::default();
        store
            .load("[general]\nenable=yes\nevents=HANGUP\n")
            .unwrap();
        assert!(store.is_enabled());
        assert!(store.tracks(CelEventType::Hangup));

        // Invalid app/event combination must not disturb the applied config.
        let err = store
            .load("[general]\nenable=no\nevents=ANSWER\napps=dial\n")
            .unwrap_err();
        assert!(err.is_config_error());
        assert!(store.is_enabled());
        assert!(store.tracks(CelEventType::Hangup));
        assert!(!store.tracks(CelEventType::Answer));
    }

    #[test]
    fn test_store_swap_is_whole_object() {
        let store = ConfigStore::default();
        let before = store.current();
        store
            .load("[general]\nenable=yes\nevents=ALL\n")
            .unwrap();
        let after = store.current();

        assert!(!before.enabled);
        assert!(after.enabled);
        // The old snapshot is still intact for readers that grabbed it.
        assert!(!before.tracks(CelEventType::Hangup));
    }
}
