// THEORY:
// The `EventEmitter` is the policy layer between the detection pipeline and
// the outbound network sink. Detection itself runs every frame; the emitter
// decides which frames are worth telling anyone about.
//
// Two independent message streams, each with its own gate:
// 1.  **Zone detections**: sent only when something is inside a zone, rate
//     limited to one message per configured interval, and suppressed
//     entirely during the startup warmup window. Thermal sensors and the
//     background model both need time to settle; anything "detected" in the
//     first seconds after launch is noise.
// 2.  **System status**: a heartbeat on its own fixed interval regardless of
//     detection state. The status code is derived purely from per-camera
//     last-frame ages: any bound camera silent past the staleness window
//     turns the whole system NOT OK.
//
// Transport is a collaborator's concern. The emitter produces message
// values and hands them to an `EventSink`; OSC, UDP framing and addressing
// live outside the core.

use std::time::Duration;

use log::debug;
use serde::{Deserialize, Serialize};

/// Emission policy knobs, injected per tick with the rest of the config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmitterConfig {
    /// Master switch for zone-detection messages.
    pub send_enabled: bool,
    /// Minimum spacing between zone-detection messages.
    pub zone_interval: Duration,
    /// Startup grace period; no zone messages before this has elapsed.
    pub warmup: Duration,
    /// Spacing of status heartbeats.
    pub status_interval: Duration,
    /// A bound camera silent for longer than this flags NOT OK.
    pub stale_after: Duration,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            send_enabled: false,
            zone_interval: Duration::from_millis(500),
            warmup: Duration::from_secs(7),
            status_interval: Duration::from_millis(500),
            stale_after: Duration::from_secs(4),
        }
    }
}

/// System health reported by the status heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemStatus {
    WarmingUp,
    Ok,
    NotOk,
}

impl SystemStatus {
    /// Wire code: 0 = warming up, 1 = ok, 2 = not ok.
    pub fn code(self) -> i32 {
        match self {
            SystemStatus::WarmingUp => 0,
            SystemStatus::Ok => 1,
            SystemStatus::NotOk => 2,
        }
    }
}

/// Outbound detection message: which zone fired and how many blobs were in
/// frame when it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneEvent {
    pub zone: i32,
    pub blob_count: usize,
}

/// Outbound heartbeat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusEvent {
    pub status: SystemStatus,
}

/// Receiver of emitted messages; the network transport implements this.
pub trait EventSink {
    fn zone_detected(&mut self, event: &ZoneEvent);
    fn status(&mut self, event: &StatusEvent);
}

/// Per-stream timestamp gate: an emission is suppressed while
/// `now - last_sent < interval`.
#[derive(Debug, Default)]
struct EmissionGate {
    last_sent: Option<Duration>,
}

impl EmissionGate {
    fn ready(&self, now: Duration, interval: Duration) -> bool {
        match self.last_sent {
            Some(last) => now.saturating_sub(last) >= interval,
            None => true,
        }
    }

    fn mark(&mut self, now: Duration) {
        self.last_sent = Some(now);
    }
}

/// Rate-limited, time-gated decision layer for outbound messages.
/// All `now` values are durations since pipeline start.
#[derive(Debug, Default)]
pub struct EventEmitter {
    zone_gate: EmissionGate,
    status_gate: EmissionGate,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decides whether this frame's detection result goes out. Returns the
    /// message when all gates pass: a zone is active, sending is enabled,
    /// warmup has elapsed and the zone interval has passed.
    pub fn maybe_emit_zone(
        &mut self,
        active_zone: i32,
        blob_count: usize,
        now: Duration,
        config: &EmitterConfig,
    ) -> Option<ZoneEvent> {
        if active_zone == -1 || !config.send_enabled {
            return None;
        }
        if now < config.warmup {
            debug!("suppressing zone event during warmup ({:?} elapsed)", now);
            return None;
        }
        if !self.zone_gate.ready(now, config.zone_interval) {
            return None;
        }

        self.zone_gate.mark(now);
        Some(ZoneEvent {
            zone: active_zone,
            blob_count,
        })
    }

    /// Decides whether a status heartbeat goes out this tick.
    /// `camera_ages` holds, for every bound camera, the elapsed time since
    /// its last frame; unbound slots are omitted by the caller.
    pub fn maybe_emit_status(
        &mut self,
        camera_ages: &[Duration],
        now: Duration,
        config: &EmitterConfig,
    ) -> Option<StatusEvent> {
        if !self.status_gate.ready(now, config.status_interval) {
            return None;
        }
        self.status_gate.mark(now);

        let status = if now < config.warmup {
            SystemStatus::WarmingUp
        } else if camera_ages.iter().any(|&age| age > config.stale_after) {
            SystemStatus::NotOk
        } else {
            SystemStatus::Ok
        };

        Some(StatusEvent { status })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EmitterConfig {
        EmitterConfig {
            send_enabled: true,
            zone_interval: Duration::from_millis(500),
            warmup: Duration::from_secs(7),
            status_interval: Duration::from_millis(500),
            stale_after: Duration::from_secs(4),
        }
    }

    #[test]
    fn warmup_suppresses_all_zone_events() {
        let mut emitter = EventEmitter::new();
        let config = config();

        assert!(emitter
            .maybe_emit_zone(0, 3, Duration::from_secs(2), &config)
            .is_none());
        assert!(emitter
            .maybe_emit_zone(0, 3, Duration::from_secs(8), &config)
            .is_some());
    }

    #[test]
    fn zone_interval_rate_limits_emissions() {
        let mut emitter = EventEmitter::new();
        let config = config();

        assert!(emitter
            .maybe_emit_zone(1, 1, Duration::from_secs(10), &config)
            .is_some());
        // 200 ms later: inside the interval, suppressed.
        assert!(emitter
            .maybe_emit_zone(1, 1, Duration::from_millis(10_200), &config)
            .is_none());
        // 500 ms later: gate reopens.
        assert!(emitter
            .maybe_emit_zone(1, 1, Duration::from_millis(10_500), &config)
            .is_some());
    }

    #[test]
    fn no_active_zone_or_disabled_sending_emits_nothing() {
        let mut emitter = EventEmitter::new();
        let mut config = config();

        assert!(emitter
            .maybe_emit_zone(-1, 0, Duration::from_secs(10), &config)
            .is_none());

        config.send_enabled = false;
        assert!(emitter
            .maybe_emit_zone(0, 1, Duration::from_secs(10), &config)
            .is_none());
    }

    #[test]
    fn status_reports_warmup_then_ok_then_stale() {
        let mut emitter = EventEmitter::new();
        let config = config();

        let early = emitter
            .maybe_emit_status(&[Duration::from_secs(1)], Duration::from_secs(2), &config)
            .expect("first status should emit");
        assert_eq!(early.status, SystemStatus::WarmingUp);

        let ok = emitter
            .maybe_emit_status(&[Duration::from_secs(1)], Duration::from_secs(10), &config)
            .expect("status past interval should emit");
        assert_eq!(ok.status, SystemStatus::Ok);

        let stale = emitter
            .maybe_emit_status(&[Duration::from_secs(6)], Duration::from_secs(11), &config)
            .expect("status past interval should emit");
        assert_eq!(stale.status, SystemStatus::NotOk);
    }

    #[test]
    fn status_heartbeat_respects_its_own_interval() {
        let mut emitter = EventEmitter::new();
        let config = config();

        assert!(emitter
            .maybe_emit_status(&[], Duration::from_secs(10), &config)
            .is_some());
        assert!(emitter
            .maybe_emit_status(&[], Duration::from_millis(10_100), &config)
            .is_none());
        assert!(emitter
            .maybe_emit_status(&[], Duration::from_millis(10_600), &config)
            .is_some());
    }

    #[test]
    fn status_codes_match_the_wire_contract() {
        assert_eq!(SystemStatus::WarmingUp.code(), 0);
        assert_eq!(SystemStatus::Ok.code(), 1);
        assert_eq!(SystemStatus::NotOk.code(), 2);
    }
}
