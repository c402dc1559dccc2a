//! Status command for operator CLIs.
//!
//! The hosting platform owns the actual console; this module renders the
//! `cel show status` output from the engine's read APIs and reports CLI
//! exit codes.

use crate::constants::{CLI_EXIT_SUCCESS, CLI_EXIT_USAGE, SHOW_STATUS_USAGE};
use crate::engine::CelEngine;

/// Render the `cel show status` report.
///
/// Lists the enabled state, every tracked event name, every tracked
/// application, and every registered backend.
pub fn show_status(engine: &CelEngine) -> String {
    let config = engine.config();
    let mut out = String::new();

    out.push_str(&format!(
        "CEL Logging: {}\n",
        if config.enabled { "Enabled" } else { "Disabled" }
    ));

    for event in config
        .tracked_events
        .iter()
    {
        out.push_str(&format!("CEL Tracking Event: {}\n", event));
    }

    let mut apps: Vec<&String> = config
        .tracked_apps
        .iter()
        .collect();
    apps.sort();
    for app in apps {
        out.push_str(&format!("CEL Tracking Application: {}\n", app));
    }

    let mut backends = engine.backend_names();
    backends.sort();
    for backend in backends {
        out.push_str(&format!("CEL Event Subscriber: {}\n", backend));
    }

    out
}

/// Execute a `cel` CLI invocation.
///
/// `args` are the tokens after the `cel` command word. Returns the exit
/// code and the text to print; anything but exactly `show status` is a
/// usage error.
pub fn exec(engine: &CelEngine, args: &[&str]) -> (i32, String) {
    match args {
        ["show", "status"] => (CLI_EXIT_SUCCESS, show_status(engine)),
        _ => (CLI_EXIT_USAGE, format!("{}\n", SHOW_STATUS_USAGE)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CelConfig;
    use crate::event::{CelEventSet, CelEventType};
    use std::sync::Arc;

    fn engine_with_tracking() -> CelEngine {
        let mut config = CelConfig {
            enabled: true,
            ..Default::default()
        };
        config
            .tracked_events
            .insert(CelEventType::ChannelStart);
        config
            .tracked_events
            .insert(CelEventType::AppStart);
        config
            .tracked_apps
            .insert("dial".to_string());
        CelEngine::init(config)
    }

    #[tokio::test]
    async fn test_show_status_lists_everything() {
        let engine = engine_with_tracking();
        engine
            .backend_register("csv", Arc::new(|_| {}))
            .unwrap();

        let report = show_status(&engine);
        assert!(report.contains("CEL Logging: Enabled"));
        assert!(report.contains("CEL Tracking Event: CHANNEL_START"));
        assert!(report.contains("CEL Tracking Event: APP_START"));
        assert!(report.contains("CEL Tracking Application: dial"));
        assert!(report.contains("CEL Event Subscriber: csv"));

        engine
            .term()
            .await;
    }

    #[tokio::test]
    async fn test_show_status_disabled() {
        let engine = CelEngine::init(CelConfig::default());
        let report = show_status(&engine);
        assert!(report.starts_with("CEL Logging: Disabled\n"));

        engine
            .term()
            .await;
    }

    #[tokio::test]
    async fn test_exec_exit_codes() {
        let engine = engine_with_tracking();

        let (code, _) = exec(&engine, &["show", "status"]);
        assert_eq!(code, CLI_EXIT_SUCCESS);

        let (code, output) = exec(&engine, &["show", "status", "extra"]);
        assert_eq!(code, CLI_EXIT_USAGE);
        assert!(output.contains("Usage: cel show status"));

        let (code, _) = exec(&engine, &["show"]);
        assert_eq!(code, CLI_EXIT_USAGE);

        engine
            .term()
            .await;
    }

    #[tokio::test]
    async fn test_events_all_listing() {
        let config = CelConfig {
            enabled: true,
            tracked_events: CelEventSet::ALL,
            ..Default::default()
        };
        let engine = CelEngine::init(config);

        let report = show_status(&engine);
        for event in crate::event::CEL_EVENT_TYPES {
            assert!(report.contains(&format!("CEL Tracking Event: {}\n", event)));
        }

        engine
            .term()
            .await;
    }
}
