//! The CEL engine: message routing, translators, and lifecycle.
//!
//! One forwarder task per upstream topic feeds a single aggregation queue;
//! one router task drains the queue and hands each message to exactly one
//! translator. Translators decide whether a CEL event fires and call the
//! central report-event gate, which filters against configuration, builds
//! the record, and fans it out to the backend registry.

use crate::backend::{BackendCallback, BackendRegistry};
use crate::config::{CelConfig, ConfigStore};
use crate::constants::{BRIDGE_TOPIC, CEL_TOPIC, CHANNEL_TOPIC, PARKING_TOPIC};
use crate::dialstatus::DialStatusStore;
use crate::error::CelResult;
use crate::event::CelEventType;
use crate::linkedid::{LinkedIdTracker, UnrefOutcome};
use crate::message::{
    AttendedTransferDest, AttendedTransferEvent, BlindTransferEvent, BridgeSnapshot, CelMessage,
    DialEvent, ParkingEvent, TransferResult,
};
use crate::record::CelRecord;
use crate::snapshot::{ChannelSnapshot, ChannelState};
use crate::topic::{spawn_forwarder, Topic};
use futures_util::future::join_all;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Translator invoked on every channel snapshot diff.
type SnapshotMonitor = fn(&EngineCore, Option<&ChannelSnapshot>, Option<&ChannelSnapshot>);

/// Snapshot diff translators, invoked in array order on every diff.
/// The order is a pipeline invariant: APP_END must precede HANGUP and
/// CHANNEL_END, and linked-id retirement must only run once the earlier
/// monitors have reported everything that names the outgoing snapshot.
const SNAPSHOT_MONITORS: [SnapshotMonitor; 3] = [
    EngineCore::check_app_change,
    EngineCore::check_state_change,
    EngineCore::check_linked_id_change,
];

/// Shared state behind the engine handle: configuration, backends, and
/// the two staging stores.
pub(crate) struct EngineCore {
    config: ConfigStore,
    backends: BackendRegistry,
    linked_ids: LinkedIdTracker,
    dial_statuses: DialStatusStore,
}

impl EngineCore {
    fn new(config: CelConfig) -> Self {
        Self {
            config: ConfigStore::new(config),
            backends: BackendRegistry::new(),
            linked_ids: LinkedIdTracker::new(),
            dial_statuses: DialStatusStore::new(),
        }
    }

    /// Route one aggregated message to its translator.
    fn dispatch(&self, message: CelMessage) {
        match message {
            CelMessage::SnapshotUpdate { old, new } => {
                self.handle_snapshot_update(old.as_deref(), new.as_deref())
            }
            CelMessage::BridgeEnter { bridge, channel } => {
                self.handle_bridge(CelEventType::BridgeEnter, &bridge, &channel)
            }
            CelMessage::BridgeExit { bridge, channel } => {
                self.handle_bridge(CelEventType::BridgeExit, &bridge, &channel)
            }
            CelMessage::Parking(event) => self.handle_parking(&event),
            CelMessage::Dial(event) => self.handle_dial(&event),
            CelMessage::BlindTransfer(event) => self.handle_blind_transfer(&event),
            CelMessage::AttendedTransfer(event) => self.handle_attended_transfer(&event),
            CelMessage::Pickup { target, picker } => self.handle_pickup(&target, &picker),
            CelMessage::LocalOptimize {
                channel_one,
                channel_two,
            } => self.handle_local_optimize(&channel_one, &channel_two),
            CelMessage::Generic {
                channel,
                kind,
                details,
            } => self.handle_generic(&channel, kind, &details),
        }
    }

    /// Run the snapshot monitors over a channel diff. Updates touching an
    /// internal channel are dropped before any monitor runs.
    fn handle_snapshot_update(
        &self,
        old: Option<&ChannelSnapshot>,
        new: Option<&ChannelSnapshot>,
    ) {
        if old.is_some_and(ChannelSnapshot::is_internal)
            || new.is_some_and(ChannelSnapshot::is_internal)
        {
            return;
        }
        for monitor in SNAPSHOT_MONITORS {
            monitor(self, old, new);
        }
    }

    /// Emit APP_END/APP_START when the executing application changed.
    fn check_app_change(&self, old: Option<&ChannelSnapshot>, new: Option<&ChannelSnapshot>) {
        if let (Some(old), Some(new)) = (old, new) {
            if old.app_name == new.app_name {
                return;
            }
        }
        if let Some(old) = old {
            if !old
                .app_name
                .is_empty()
            {
                self.report_event(old, CelEventType::AppEnd, None, None, "");
            }
        }
        if let Some(new) = new {
            if !new
                .app_name
                .is_empty()
            {
                self.report_event(new, CelEventType::AppStart, None, None, "");
            }
        }
    }

    /// Emit lifecycle events for a state transition: CHANNEL_START,
    /// CHANNEL_END, HANGUP with the staged dial status, or ANSWER.
    fn check_state_change(&self, old: Option<&ChannelSnapshot>, new: Option<&ChannelSnapshot>) {
        let Some(new) = new else {
            if let Some(old) = old {
                self.report_event(old, CelEventType::ChannelEnd, None, None, "");
                self.check_retire_linked_id(old);
            }
            return;
        };
        let Some(old) = old else {
            // The linked-id reference for a starting channel is taken by
            // the report gate itself, so it happens even when
            // CHANNEL_START is filtered out.
            self.report_event(new, CelEventType::ChannelStart, None, None, "");
            return;
        };

        if !old.dead && new.dead {
            let dial_status = self
                .dial_statuses
                .drain(&new.unique_id)
                .unwrap_or_default();
            let extras = json!({
                "hangupcause": new.hangup_cause,
                "hangupsource": new.hangup_source,
                "dialstatus": dial_status,
            });
            self.report_event(new, CelEventType::Hangup, None, Some(&extras), "");
        } else if old.state != new.state && new.state == ChannelState::Up {
            self.report_event(new, CelEventType::Answer, None, None, "");
        }
    }

    /// Re-home the channel when its linked id changed: reference the new
    /// id, then retire the old one if this was its last holder.
    fn check_linked_id_change(&self, old: Option<&ChannelSnapshot>, new: Option<&ChannelSnapshot>) {
        let (Some(old), Some(new)) = (old, new) else {
            return;
        };
        if old.linked_id == new.linked_id {
            return;
        }
        let config = self
            .config
            .current();
        if config.enabled && config.tracks(CelEventType::LinkedidEnd) {
            self.linked_ids
                .ref_id(&new.linked_id);
        }
        self.check_retire_linked_id(old);
    }

    /// Drop one reference on the snapshot's linked id and emit
    /// LINKEDID_END when the id retires. No-op unless LINKEDID_END is
    /// tracked by an enabled configuration.
    fn check_retire_linked_id(&self, snapshot: &ChannelSnapshot) {
        let config = self
            .config
            .current();
        if snapshot
            .linked_id
            .is_empty()
            || !config.enabled
            || !config.tracks(CelEventType::LinkedidEnd)
        {
            return;
        }
        match self
            .linked_ids
            .unref(&snapshot.linked_id)
        {
            UnrefOutcome::Retired => {
                self.report_event(snapshot, CelEventType::LinkedidEnd, None, None, "");
            }
            UnrefOutcome::Alive => {}
            UnrefOutcome::Missing => {
                error!(
                    "Could not find linked id {} to unref when channel {} ended",
                    snapshot.linked_id, snapshot.name
                );
            }
        }
    }

    /// Emit BRIDGE_ENTER/BRIDGE_EXIT with the bridge id and the other
    /// members as the record's peer field.
    fn handle_bridge(
        &self,
        event: CelEventType,
        bridge: &BridgeSnapshot,
        channel: &ChannelSnapshot,
    ) {
        if channel.is_internal() {
            return;
        }
        let extras = json!({ "bridge_id": bridge.id });
        let peer = bridge.peers_of(&channel.name);
        self.report_event(channel, event, None, Some(&extras), &peer);
    }

    /// Emit PARK_START on entry and PARK_END with a fixed reason string on
    /// any terminal parking sub-kind.
    fn handle_parking(&self, event: &ParkingEvent) {
        if event
            .parkee
            .is_internal()
        {
            return;
        }
        match event
            .kind
            .reason()
        {
            None => {
                let extras = json!({
                    "parker_dial_string": event.parker_dial_string,
                    "parking_lot": event.parking_lot,
                });
                self.report_event(
                    &event.parkee,
                    CelEventType::ParkStart,
                    None,
                    Some(&extras),
                    "",
                );
            }
            Some(reason) => {
                let extras = json!({ "reason": reason });
                self.report_event(&event.parkee, CelEventType::ParkEnd, None, Some(&extras), "");
            }
        }
    }

    /// Emit FORWARD for forwarded dials and stage the final dial status
    /// for the caller's eventual HANGUP.
    fn handle_dial(&self, event: &DialEvent) {
        let Some(caller) = &event.caller else {
            return;
        };
        if caller.is_internal() {
            return;
        }
        if !event
            .forwarded_to
            .is_empty()
        {
            let extras = json!({ "forward": event.forwarded_to });
            self.report_event(caller, CelEventType::Forward, None, Some(&extras), "");
        }
        if event
            .dial_status
            .is_empty()
        {
            return;
        }
        self.dial_statuses
            .store(&caller.unique_id, &event.dial_status);
    }

    /// Emit BLINDTRANSFER for successful transfers that name a
    /// destination. A publication without a bridge snapshot cannot name
    /// the bridge, so it is dropped rather than reported half-empty.
    fn handle_blind_transfer(&self, event: &BlindTransferEvent) {
        if event.result != TransferResult::Success {
            return;
        }
        if event
            .exten
            .is_empty()
            || event
                .context
                .is_empty()
        {
            return;
        }
        let Some(bridge) = &event.bridge else {
            return;
        };
        if event
            .transferer
            .is_internal()
        {
            return;
        }
        let extras = json!({
            "extension": event.exten,
            "context": event.context,
            "bridge_id": bridge.id,
        });
        self.report_event(
            &event.transferer,
            CelEventType::BlindTransfer,
            None,
            Some(&extras),
            "",
        );
    }

    /// Emit ATTENDEDTRANSFER, ordering the sides so the reported bridge is
    /// the one that exists. The transferee side is primary; sides swap
    /// when it has no bridge.
    fn handle_attended_transfer(&self, event: &AttendedTransferEvent) {
        let (mut side_one, mut side_two) = (&event.to_transferee, &event.to_transfer_target);
        if side_one
            .bridge
            .is_none()
        {
            (side_one, side_two) = (side_two, side_one);
        }
        let Some(channel_one) = &side_one.channel else {
            return;
        };

        let bridge_one_id = side_one
            .bridge
            .as_ref()
            .map(|bridge| bridge.id.as_str());
        let channel_two_name = side_two
            .channel
            .as_ref()
            .map(|channel| channel.name.as_str())
            .unwrap_or_default();

        let extras = match &event.dest {
            AttendedTransferDest::Fail => return,
            AttendedTransferDest::BridgeMerge
            | AttendedTransferDest::Link
            | AttendedTransferDest::Threeway => {
                let bridge_two_id = side_two
                    .bridge
                    .as_ref()
                    .map(|bridge| bridge.id.as_str());
                json!({
                    "bridge1_id": bridge_one_id,
                    "channel2_name": channel_two_name,
                    "bridge2_id": bridge_two_id,
                })
            }
            AttendedTransferDest::App(app) => json!({
                "bridge1_id": bridge_one_id,
                "channel2_name": channel_two_name,
                "app": app,
            }),
        };
        self.report_event(
            channel_one,
            CelEventType::AttendedTransfer,
            None,
            Some(&extras),
            "",
        );
    }

    /// Emit PICKUP on the picked-up target, naming the picking channel.
    fn handle_pickup(&self, target: &ChannelSnapshot, picker: &ChannelSnapshot) {
        let extras = json!({ "pickup_channel": picker.name });
        self.report_event(target, CelEventType::Pickup, None, Some(&extras), "");
    }

    /// Emit LOCAL_OPTIMIZE on the first leg, naming the second.
    fn handle_local_optimize(
        &self,
        channel_one: &ChannelSnapshot,
        channel_two: &ChannelSnapshot,
    ) {
        let extras = json!({ "local_two": channel_two.name });
        self.report_event(
            channel_one,
            CelEventType::LocalOptimize,
            None,
            Some(&extras),
            "",
        );
    }

    /// Translate a generic carrier published through the public API. Only
    /// USER_DEFINED is meaningful here; anything else is a publisher bug.
    fn handle_generic(&self, channel: &ChannelSnapshot, kind: CelEventType, details: &Value) {
        match kind {
            CelEventType::UserDefined => {
                let name = details
                    .get("event")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                let extra = details
                    .get("extra")
                    .filter(|value| !value.is_null());
                self.report_event(channel, CelEventType::UserDefined, Some(name), extra, "");
            }
            other => {
                error!("Unhandled generic CEL event kind {}", other);
            }
        }
    }

    /// Central gate between translators and backends.
    ///
    /// Consults the configuration, takes the CHANNEL_START linked-id
    /// reference, filters by event kind and application, then builds the
    /// record once and fans it out. The record lives exactly as long as
    /// the fan-out.
    fn report_event(
        &self,
        snapshot: &ChannelSnapshot,
        event: CelEventType,
        user_defined_name: Option<&str>,
        extras: Option<&Value>,
        peer: &str,
    ) {
        let config = self
            .config
            .current();
        if !config.enabled {
            return;
        }
        // A starting channel references its linked id whenever retirement
        // is tracked, regardless of whether CHANNEL_START itself is.
        if event == CelEventType::ChannelStart && config.tracks(CelEventType::LinkedidEnd) {
            self.linked_ids
                .ref_id(&snapshot.linked_id);
        }
        if !config.tracks(event) {
            return;
        }
        if matches!(event, CelEventType::AppStart | CelEventType::AppEnd)
            && !config.tracks_app(&snapshot.app_name)
        {
            return;
        }

        let record = CelRecord::new(snapshot, event, user_defined_name, extras, peer);
        self.backends
            .for_each(&record);
    }
}

/// Spawn the router task draining the aggregation queue.
fn spawn_router(
    core: Arc<EngineCore>,
    mut queue: mpsc::UnboundedReceiver<CelMessage>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = queue
            .recv()
            .await
        {
            core.dispatch(message);
        }
        debug!("CEL router stopped");
    })
}

/// Handle to a running CEL engine.
///
/// Created by [`CelEngine::init`] inside a Tokio runtime. Producers
/// publish to the engine's topics; [`CelEngine::term`] tears the pipeline
/// down and guarantees no backend callback is in flight on return.
pub struct CelEngine {
    core: Arc<EngineCore>,
    channel_topic: Topic<CelMessage>,
    bridge_topic: Topic<CelMessage>,
    parking_topic: Topic<CelMessage>,
    cel_topic: Topic<CelMessage>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl CelEngine {
    /// Start an engine with the given configuration.
    ///
    /// Must be called from within a Tokio runtime: the forwarders and the
    /// router are spawned here.
    pub fn init(config: CelConfig) -> Self {
        let core = Arc::new(EngineCore::new(config));
        let (aggregation, queue) = mpsc::unbounded_channel();
        let (shutdown, _) = watch::channel(false);

        let channel_topic = Topic::new(CHANNEL_TOPIC);
        let bridge_topic = Topic::new(BRIDGE_TOPIC);
        let parking_topic = Topic::new(PARKING_TOPIC);
        let cel_topic = Topic::new(CEL_TOPIC);

        let mut tasks = Vec::new();
        for topic in [&channel_topic, &bridge_topic, &parking_topic, &cel_topic] {
            tasks.push(spawn_forwarder(
                topic,
                aggregation.clone(),
                shutdown.subscribe(),
            ));
        }
        // The forwarders hold the only senders; once they stop, the router
        // drains what is queued and stops too.
        drop(aggregation);
        tasks.push(spawn_router(core.clone(), queue));

        debug!("CEL engine initialized");
        Self {
            core,
            channel_topic,
            bridge_topic,
            parking_topic,
            cel_topic,
            shutdown,
            tasks: Mutex::new(tasks),
        }
    }

    /// Tear the pipeline down.
    ///
    /// Stops and joins every forwarder and the router, so no translator or
    /// backend callback is in flight when this returns. Messages published
    /// afterwards find no subscribers and are dropped.
    pub async fn term(self) {
        debug!("CEL engine terminating");
        let _ = self
            .shutdown
            .send(true);
        let tasks: Vec<JoinHandle<()>> = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for result in join_all(tasks).await {
            if let Err(join_error) = result {
                error!("CEL task ended abnormally: {}", join_error);
            }
        }
        self.core
            .dial_statuses
            .clear();
        debug!("CEL engine terminated");
    }

    /// Parse, validate, and apply configuration text; the prior
    /// configuration survives any error.
    pub fn reload(&self, source: &str) -> CelResult<()> {
        self.core
            .config
            .load(source)
    }

    /// Snapshot of the current configuration.
    pub fn config(&self) -> Arc<CelConfig> {
        self.core
            .config
            .current()
    }

    /// Validate and apply a configuration object.
    pub fn set_config(&self, config: CelConfig) -> CelResult<()> {
        self.core
            .config
            .set(config)
    }

    /// Check the master switch.
    pub fn is_enabled(&self) -> bool {
        self.core
            .config
            .is_enabled()
    }

    /// Register a backend under a name; duplicates replace.
    pub fn backend_register(&self, name: &str, callback: BackendCallback) -> CelResult<()> {
        self.core
            .backends
            .register(name, callback)
    }

    /// Remove a backend by name.
    pub fn backend_unregister(&self, name: &str) -> CelResult<()> {
        self.core
            .backends
            .unregister(name)
    }

    /// Names of all registered backends.
    pub fn backend_names(&self) -> Vec<String> {
        self.core
            .backends
            .names()
    }

    /// Topic carrying channel snapshot updates and dial outcomes.
    pub fn channel_topic(&self) -> &Topic<CelMessage> {
        &self.channel_topic
    }

    /// Topic carrying bridge, transfer, pickup, and local-optimize
    /// messages.
    pub fn bridge_topic(&self) -> &Topic<CelMessage> {
        &self.bridge_topic
    }

    /// Topic carrying parking lifecycle messages.
    pub fn parking_topic(&self) -> &Topic<CelMessage> {
        &self.parking_topic
    }

    /// Publish a generic CEL event into the pipeline.
    ///
    /// The carrier goes through the engine's own topic and the same
    /// aggregation path as every upstream message, so central ordering and
    /// filtering apply. Publishers never reach backends directly.
    pub fn publish_event(
        &self,
        channel: Arc<ChannelSnapshot>,
        kind: CelEventType,
        details: Value,
    ) {
        self.cel_topic
            .publish(CelMessage::Generic {
                channel,
                kind,
                details,
            });
    }

    /// Publish a USER_DEFINED event with a name and optional extra blob.
    pub fn publish_user_event(
        &self,
        channel: Arc<ChannelSnapshot>,
        event_name: &str,
        extra: Option<&Value>,
    ) {
        let mut details = json!({ "event": event_name });
        if let Some(extra) = extra {
            details["extra"] = extra.clone();
        }
        self.publish_event(channel, CelEventType::UserDefined, details);
    }
}

impl Drop for CelEngine {
    fn drop(&mut self) {
        let tasks = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !tasks.is_empty() {
            debug!(
                "CEL engine dropped without term(), {} tasks left detached",
                tasks.len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::CelEventSet;
    use std::sync::Mutex as StdMutex;

    fn all_events_config() -> CelConfig {
        CelConfig {
            enabled: true,
            tracked_events: CelEventSet::ALL,
            ..Default::default()
        }
    }

    struct Sink {
        records: Arc<StdMutex<Vec<CelRecord>>>,
    }

    impl Sink {
        fn attach(core: &EngineCore) -> Self {
            let records: Arc<StdMutex<Vec<CelRecord>>> = Arc::new(StdMutex::new(Vec::new()));
            let captured = records.clone();
            core.backends
                .register(
                    "sink",
                    Arc::new(move |record: &CelRecord| {
                        captured
                            .lock()
                            .unwrap()
                            .push(record.clone());
                    }),
                )
                .unwrap();
            Self { records }
        }

        fn kinds(&self) -> Vec<CelEventType> {
            self.records
                .lock()
                .unwrap()
                .iter()
                .map(|record| record.event_type)
                .collect()
        }

        fn records(&self) -> Vec<CelRecord> {
            self.records
                .lock()
                .unwrap()
                .clone()
        }
    }

    fn snapshot(unique_id: &str, linked_id: &str) -> Arc<ChannelSnapshot> {
        let mut channel = ChannelSnapshot::new(unique_id, format!("SIP/{}-0001", unique_id));
        channel.linked_id = linked_id.to_string();
        Arc::new(channel)
    }

    #[test]
    fn test_channel_start_and_end() {
        let core = EngineCore::new(all_events_config());
        let sink = Sink::attach(&core);
        let channel = snapshot("c1", "L1");

        core.dispatch(CelMessage::SnapshotUpdate {
            old: None,
            new: Some(channel.clone()),
        });
        core.dispatch(CelMessage::SnapshotUpdate {
            old: Some(channel),
            new: None,
        });

        assert_eq!(
            sink.kinds(),
            vec![
                CelEventType::ChannelStart,
                CelEventType::ChannelEnd,
                CelEventType::LinkedidEnd,
            ]
        );
    }

    #[test]
    fn test_internal_channel_dropped() {
        let core = EngineCore::new(all_events_config());
        let sink = Sink::attach(&core);
        let mut channel = ChannelSnapshot::new("c1", "Surrogate/c1");
        channel.tech_properties |= crate::snapshot::TECH_PROPERTY_INTERNAL;

        core.dispatch(CelMessage::SnapshotUpdate {
            old: None,
            new: Some(Arc::new(channel)),
        });
        assert!(sink
            .kinds()
            .is_empty());
    }

    #[test]
    fn test_answer_on_transition_to_up() {
        let core = EngineCore::new(all_events_config());
        let sink = Sink::attach(&core);
        let ringing = snapshot("c1", "L1");
        let mut up = (*ringing).clone();
        up.state = ChannelState::Up;

        let mut ringing_state = (*ringing).clone();
        ringing_state.state = ChannelState::Ringing;

        core.dispatch(CelMessage::SnapshotUpdate {
            old: Some(Arc::new(ringing_state)),
            new: Some(Arc::new(up)),
        });
        assert_eq!(sink.kinds(), vec![CelEventType::Answer]);
    }

    #[test]
    fn test_hangup_attaches_staged_dial_status() {
        let core = EngineCore::new(all_events_config());
        let sink = Sink::attach(&core);
        let alive = snapshot("c1", "L1");

        core.dispatch(CelMessage::Dial(DialEvent {
            caller: Some(alive.clone()),
            forwarded_to: String::new(),
            dial_status: "ANSWER".to_string(),
        }));

        let mut dead = (*alive).clone();
        dead.dead = true;
        dead.hangup_cause = 16;
        dead.hangup_source = "SIP/1000".to_string();
        core.dispatch(CelMessage::SnapshotUpdate {
            old: Some(alive),
            new: Some(Arc::new(dead)),
        });

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].event_type, CelEventType::Hangup);
        let extras: Value = serde_json::from_str(&records[0].extra).unwrap();
        assert_eq!(extras["hangupcause"], 16);
        assert_eq!(extras["hangupsource"], "SIP/1000");
        assert_eq!(extras["dialstatus"], "ANSWER");

        // The staged status was drained with the hangup.
        assert!(core
            .dial_statuses
            .is_empty());
    }

    #[test]
    fn test_hangup_without_staged_dial_status() {
        let core = EngineCore::new(all_events_config());
        let sink = Sink::attach(&core);
        let alive = snapshot("c1", "L1");
        let mut dead = (*alive).clone();
        dead.dead = true;

        core.dispatch(CelMessage::SnapshotUpdate {
            old: Some(alive),
            new: Some(Arc::new(dead)),
        });

        let records = sink.records();
        let extras: Value = serde_json::from_str(&records[0].extra).unwrap();
        assert_eq!(extras["dialstatus"], "");
    }

    #[test]
    fn test_app_change_end_precedes_start() {
        let core = EngineCore::new(all_events_config());
        let sink = Sink::attach(&core);

        let mut playing = (*snapshot("c1", "L1")).clone();
        playing.app_name = "Playback".to_string();
        let mut dialing = playing.clone();
        dialing.app_name = "Dial".to_string();

        core.dispatch(CelMessage::SnapshotUpdate {
            old: Some(Arc::new(playing.clone())),
            new: Some(Arc::new(dialing)),
        });

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].event_type, CelEventType::AppEnd);
        assert_eq!(records[0].app_name, "Playback");
        assert_eq!(records[1].event_type, CelEventType::AppStart);
        assert_eq!(records[1].app_name, "Dial");
    }

    #[test]
    fn test_app_filter_drops_untracked_apps() {
        let mut config = all_events_config();
        config
            .tracked_apps
            .insert("dial".to_string());
        let core = EngineCore::new(config);
        let sink = Sink::attach(&core);

        let mut playing = (*snapshot("c1", "L1")).clone();
        playing.app_name = "Playback".to_string();
        let mut dialing = playing.clone();
        dialing.app_name = "Dial".to_string();

        core.dispatch(CelMessage::SnapshotUpdate {
            old: Some(Arc::new(playing)),
            new: Some(Arc::new(dialing)),
        });

        // Only the tracked app's APP_START survives the gate.
        assert_eq!(sink.kinds(), vec![CelEventType::AppStart]);
    }

    #[test]
    fn test_linked_id_change_refs_new_and_retires_old() {
        let core = EngineCore::new(all_events_config());
        let sink = Sink::attach(&core);
        let original = snapshot("c1", "L1");

        core.dispatch(CelMessage::SnapshotUpdate {
            old: None,
            new: Some(original.clone()),
        });

        let mut rehomed = (*original).clone();
        rehomed.linked_id = "L2".to_string();
        core.dispatch(CelMessage::SnapshotUpdate {
            old: Some(original),
            new: Some(Arc::new(rehomed)),
        });

        // L1 retired when its only holder moved to L2.
        assert_eq!(
            sink.kinds(),
            vec![CelEventType::ChannelStart, CelEventType::LinkedidEnd]
        );
        assert_eq!(
            core.linked_ids
                .count("L2"),
            Some(1)
        );
        assert_eq!(
            core.linked_ids
                .count("L1"),
            None
        );
    }

    #[test]
    fn test_disabled_config_drops_everything() {
        let mut config = all_events_config();
        config.enabled = false;
        let core = EngineCore::new(config);
        let sink = Sink::attach(&core);

        core.dispatch(CelMessage::SnapshotUpdate {
            old: None,
            new: Some(snapshot("c1", "L1")),
        });
        assert!(sink
            .kinds()
            .is_empty());
        assert!(core
            .linked_ids
            .is_empty());
    }

    #[test]
    fn test_untracked_channel_start_still_refs_linked_id() {
        let mut config = CelConfig {
            enabled: true,
            ..Default::default()
        };
        config
            .tracked_events
            .insert(CelEventType::LinkedidEnd);
        let core = EngineCore::new(config);
        let sink = Sink::attach(&core);
        let channel = snapshot("c1", "L1");

        core.dispatch(CelMessage::SnapshotUpdate {
            old: None,
            new: Some(channel.clone()),
        });
        // CHANNEL_START is untracked but the reference was taken.
        assert!(sink
            .kinds()
            .is_empty());
        assert_eq!(
            core.linked_ids
                .count("L1"),
            Some(1)
        );

        core.dispatch(CelMessage::SnapshotUpdate {
            old: Some(channel),
            new: None,
        });
        assert_eq!(sink.kinds(), vec![CelEventType::LinkedidEnd]);
    }

    #[test]
    fn test_linked_id_untracked_means_no_tracking() {
        let mut config = CelConfig {
            enabled: true,
            ..Default::default()
        };
        config
            .tracked_events
            .insert(CelEventType::ChannelStart);
        config
            .tracked_events
            .insert(CelEventType::ChannelEnd);
        let core = EngineCore::new(config);
        let sink = Sink::attach(&core);
        let channel = snapshot("c1", "L1");

        core.dispatch(CelMessage::SnapshotUpdate {
            old: None,
            new: Some(channel.clone()),
        });
        core.dispatch(CelMessage::SnapshotUpdate {
            old: Some(channel),
            new: None,
        });

        assert_eq!(
            sink.kinds(),
            vec![CelEventType::ChannelStart, CelEventType::ChannelEnd]
        );
        assert!(core
            .linked_ids
            .is_empty());
    }

    #[test]
    fn test_bridge_enter_names_peers() {
        let core = EngineCore::new(all_events_config());
        let sink = Sink::attach(&core);
        let channel = snapshot("c1", "L1");
        let bridge = BridgeSnapshot {
            id: "b1".to_string(),
            channel_names: vec![
                channel
                    .name
                    .clone(),
                "SIP/2000-0002".to_string(),
            ],
        };

        core.dispatch(CelMessage::BridgeEnter {
            bridge,
            channel,
        });

        let records = sink.records();
        assert_eq!(records[0].event_type, CelEventType::BridgeEnter);
        assert_eq!(records[0].peer, "SIP/2000-0002");
        let extras: Value = serde_json::from_str(&records[0].extra).unwrap();
        assert_eq!(extras["bridge_id"], "b1");
    }

    #[test]
    fn test_dial_forward_reported_without_staging() {
        let core = EngineCore::new(all_events_config());
        let sink = Sink::attach(&core);
        let caller = snapshot("c1", "L1");

        core.dispatch(CelMessage::Dial(DialEvent {
            caller: Some(caller),
            forwarded_to: "200".to_string(),
            dial_status: String::new(),
        }));

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].event_type, CelEventType::Forward);
        let extras: Value = serde_json::from_str(&records[0].extra).unwrap();
        assert_eq!(extras["forward"], "200");
        assert!(core
            .dial_statuses
            .is_empty());
    }

    #[test]
    fn test_dial_without_caller_dropped() {
        let core = EngineCore::new(all_events_config());
        let sink = Sink::attach(&core);

        core.dispatch(CelMessage::Dial(DialEvent {
            caller: None,
            forwarded_to: "200".to_string(),
            dial_status: "ANSWER".to_string(),
        }));
        assert!(sink
            .kinds()
            .is_empty());
        assert!(core
            .dial_statuses
            .is_empty());
    }

    #[test]
    fn test_blind_transfer_requires_success_and_destination() {
        let core = EngineCore::new(all_events_config());
        let sink = Sink::attach(&core);
        let transferer = snapshot("c1", "L1");

        core.dispatch(CelMessage::BlindTransfer(BlindTransferEvent {
            result: TransferResult::Fail,
            transferer: transferer.clone(),
            bridge: Some(BridgeSnapshot::new("b1")),
            exten: "500".to_string(),
            context: "default".to_string(),
        }));
        core.dispatch(CelMessage::BlindTransfer(BlindTransferEvent {
            result: TransferResult::Success,
            transferer: transferer.clone(),
            bridge: Some(BridgeSnapshot::new("b1")),
            exten: String::new(),
            context: "default".to_string(),
        }));
        core.dispatch(CelMessage::BlindTransfer(BlindTransferEvent {
            result: TransferResult::Success,
            transferer,
            bridge: None,
            exten: "500".to_string(),
            context: "default".to_string(),
        }));

        assert!(sink
            .kinds()
            .is_empty());
    }

    #[test]
    fn test_attended_transfer_swaps_sides_for_missing_bridge() {
        let core = EngineCore::new(all_events_config());
        let sink = Sink::attach(&core);
        let transferee = snapshot("c_tr", "L1");
        let target = snapshot("c_t", "L2");

        core.dispatch(CelMessage::AttendedTransfer(AttendedTransferEvent {
            dest: AttendedTransferDest::BridgeMerge,
            to_transferee: crate::message::TransferSide {
                bridge: None,
                channel: Some(transferee.clone()),
            },
            to_transfer_target: crate::message::TransferSide {
                bridge: Some(BridgeSnapshot::new("b_t")),
                channel: Some(target.clone()),
            },
        }));

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].channel_name, target.name);
        let extras: Value = serde_json::from_str(&records[0].extra).unwrap();
        assert_eq!(extras["bridge1_id"], "b_t");
        assert_eq!(extras["channel2_name"], transferee.name);
        assert!(extras["bridge2_id"].is_null());
    }

    #[test]
    fn test_attended_transfer_to_app() {
        let core = EngineCore::new(all_events_config());
        let sink = Sink::attach(&core);
        let transferee = snapshot("c_tr", "L1");

        core.dispatch(CelMessage::AttendedTransfer(AttendedTransferEvent {
            dest: AttendedTransferDest::App("VoiceMail".to_string()),
            to_transferee: crate::message::TransferSide {
                bridge: Some(BridgeSnapshot::new("b1")),
                channel: Some(transferee.clone()),
            },
            to_transfer_target: crate::message::TransferSide::default(),
        }));

        let records = sink.records();
        assert_eq!(records[0].channel_name, transferee.name);
        let extras: Value = serde_json::from_str(&records[0].extra).unwrap();
        assert_eq!(extras["bridge1_id"], "b1");
        assert_eq!(extras["app"], "VoiceMail");
        assert_eq!(extras["channel2_name"], "");
    }

    #[test]
    fn test_attended_transfer_fail_dropped() {
        let core = EngineCore::new(all_events_config());
        let sink = Sink::attach(&core);

        core.dispatch(CelMessage::AttendedTransfer(AttendedTransferEvent {
            dest: AttendedTransferDest::Fail,
            to_transferee: crate::message::TransferSide {
                bridge: Some(BridgeSnapshot::new("b1")),
                channel: Some(snapshot("c1", "L1")),
            },
            to_transfer_target: crate::message::TransferSide::default(),
        }));
        assert!(sink
            .kinds()
            .is_empty());
    }

    #[test]
    fn test_pickup_names_picker() {
        let core = EngineCore::new(all_events_config());
        let sink = Sink::attach(&core);
        let target = snapshot("c_t", "L1");
        let picker = snapshot("c_p", "L2");

        core.dispatch(CelMessage::Pickup {
            target: target.clone(),
            picker: picker.clone(),
        });

        let records = sink.records();
        assert_eq!(records[0].event_type, CelEventType::Pickup);
        assert_eq!(records[0].channel_name, target.name);
        let extras: Value = serde_json::from_str(&records[0].extra).unwrap();
        assert_eq!(extras["pickup_channel"], picker.name.as_str());
    }

    #[test]
    fn test_local_optimize_names_second_leg() {
        let core = EngineCore::new(all_events_config());
        let sink = Sink::attach(&core);
        let one = snapshot("c1", "L1");
        let two = snapshot("c2", "L1");

        core.dispatch(CelMessage::LocalOptimize {
            channel_one: one.clone(),
            channel_two: two.clone(),
        });

        let records = sink.records();
        assert_eq!(records[0].event_type, CelEventType::LocalOptimize);
        assert_eq!(records[0].channel_name, one.name);
        let extras: Value = serde_json::from_str(&records[0].extra).unwrap();
        assert_eq!(extras["local_two"], two.name.as_str());
    }

    #[test]
    fn test_generic_user_defined() {
        let core = EngineCore::new(all_events_config());
        let sink = Sink::attach(&core);

        core.dispatch(CelMessage::Generic {
            channel: snapshot("c1", "L1"),
            kind: CelEventType::UserDefined,
            details: json!({ "event": "MY_EVENT", "extra": { "detail": "x" } }),
        });

        let records = sink.records();
        assert_eq!(records[0].event_type, CelEventType::UserDefined);
        assert_eq!(records[0].user_defined_name, "MY_EVENT");
        let extras: Value = serde_json::from_str(&records[0].extra).unwrap();
        assert_eq!(extras["detail"], "x");
    }

    #[test]
    fn test_generic_other_kind_dropped() {
        let core = EngineCore::new(all_events_config());
        let sink = Sink::attach(&core);

        core.dispatch(CelMessage::Generic {
            channel: snapshot("c1", "L1"),
            kind: CelEventType::Hangup,
            details: json!({}),
        });
        assert!(sink
            .kinds()
            .is_empty());
    }
}
