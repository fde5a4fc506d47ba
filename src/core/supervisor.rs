//! Connection supervisor: arbitrates between the live channel and the poller
//!
//! Pure state machine. Drivers feed it `SupervisorEvent`s translated from
//! socket callbacks and timers, and execute the `Command`s it returns in order.
//! Every connection attempt gets a generation number; notifications carrying
//! an older generation are stale and ignored, which makes a double close or a
//! late open harmless.

use std::time::Duration;

use super::events::{InboundEvent, TableId};
use super::parser::parse_frame;
use super::status::ChannelStatus;
use tracing::{debug, info, warn};

pub type Generation = u64;

/// Something that happened to the channel
#[derive(Debug, Clone, PartialEq)]
pub enum SupervisorEvent {
    /// Page asks for the live channel
    Connect,
    /// Reconnect timer fired
    ReconnectDue,
    /// Transport threw while being constructed
    ConstructionFailed { generation: Generation, error: String },
    Opened { generation: Generation },
    Frame { generation: Generation, text: String },
    TransportError { generation: Generation, error: String },
    Closed { generation: Generation, code: Option<u16>, reason: String },
    /// Page teardown
    Shutdown,
}

/// Side effect the driver must perform
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    OpenLive { generation: Generation, table_id: TableId },
    CloseLive { generation: Generation },
    StartPoller,
    StopPoller,
    ScheduleReconnect { delay: Duration },
    CancelReconnect,
    Deliver(InboundEvent),
    StatusChanged(ChannelStatus),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Live {
    Idle,
    Opening(Generation),
    Open(Generation),
}

impl Live {
    fn generation(self) -> Option<Generation> {
        match self {
            Live::Idle => None,
            Live::Opening(g) | Live::Open(g) => Some(g),
        }
    }
}

/// Reconnect limits
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

pub struct Supervisor {
    table_id: Option<TableId>,
    policy: RetryPolicy,
    status: ChannelStatus,
    live: Live,
    next_generation: Generation,
    /// Reconnects scheduled so far; never reset for the lifetime of the session
    retries: u32,
    poller_running: bool,
    reconnect_pending: bool,
    /// Set once the live channel is given up for the rest of the session
    permanent_fallback: bool,
    shut_down: bool,
}

impl Supervisor {
    pub fn new(table_id: Option<TableId>, policy: RetryPolicy) -> Self {
        Self {
            table_id,
            policy,
            status: ChannelStatus::Connecting,
            live: Live::Idle,
            next_generation: 0,
            retries: 0,
            poller_running: false,
            reconnect_pending: false,
            permanent_fallback: false,
            shut_down: false,
        }
    }

    pub fn status(&self) -> ChannelStatus {
        self.status
    }

    pub fn table_id(&self) -> Option<TableId> {
        self.table_id
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn is_live_open(&self) -> bool {
        matches!(self.live, Live::Open(_))
    }

    pub fn is_poller_running(&self) -> bool {
        self.poller_running
    }

    pub fn is_reconnect_pending(&self) -> bool {
        self.reconnect_pending
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Apply one event and return the commands to execute, in order
    pub fn handle(&mut self, event: SupervisorEvent) -> Vec<Command> {
        let mut out = Vec::new();
        if self.shut_down {
            debug!(?event, "Ignoring event after shutdown");
            return out;
        }

        match event {
            SupervisorEvent::Connect => self.open(&mut out),
            SupervisorEvent::ReconnectDue => {
                self.reconnect_pending = false;
                self.open(&mut out);
            }
            SupervisorEvent::ConstructionFailed { generation, error } => {
                if !self.is_current(generation) {
                    return out;
                }
                warn!(generation, error = %error, "Live channel construction failed, falling back to polling");
                self.live = Live::Idle;
                self.permanent_fallback = true;
                self.start_poller(&mut out);
                self.set_status(ChannelStatus::Polling, &mut out);
            }
            SupervisorEvent::Opened { generation } => {
                if self.live != Live::Opening(generation) {
                    debug!(generation, "Ignoring stale open");
                    return out;
                }
                info!(generation, "Live channel connected");
                self.live = Live::Open(generation);
                self.set_status(ChannelStatus::Connected, &mut out);
                if self.poller_running {
                    self.poller_running = false;
                    out.push(Command::StopPoller);
                }
            }
            SupervisorEvent::Frame { generation, text } => {
                if self.live != Live::Open(generation) {
                    debug!(generation, "Ignoring frame from stale connection");
                    return out;
                }
                if let Some(event) = parse_frame(&text) {
                    debug!(kind = event.kind(), "Live event received");
                    out.push(Command::Deliver(event));
                }
            }
            SupervisorEvent::TransportError { generation, error } => {
                if !self.is_current(generation) {
                    return out;
                }
                warn!(generation, error = %error, "Live channel error");
                self.set_status(ChannelStatus::Error, &mut out);
                // The close notification that follows performs the fallback
                out.push(Command::CloseLive { generation });
            }
            SupervisorEvent::Closed { generation, code, reason } => {
                if !self.is_current(generation) {
                    debug!(generation, "Ignoring close of stale connection");
                    return out;
                }
                warn!(generation, ?code, reason = %reason, "Live channel closed");
                self.live = Live::Idle;
                self.set_status(ChannelStatus::Disconnected, &mut out);
                self.start_poller(&mut out);

                if self.retries < self.policy.max_attempts {
                    self.retries += 1;
                    self.reconnect_pending = true;
                    info!(attempt = self.retries, max = self.policy.max_attempts, "Scheduling reconnect");
                    out.push(Command::ScheduleReconnect { delay: self.policy.delay });
                } else {
                    info!("Reconnect attempts exhausted, staying in polling mode");
                    self.permanent_fallback = true;
                    self.set_status(ChannelStatus::Polling, &mut out);
                }
            }
            SupervisorEvent::Shutdown => {
                info!("Shutting down live channel");
                self.shut_down = true;
                if let Some(generation) = self.live.generation() {
                    out.push(Command::CloseLive { generation });
                }
                self.live = Live::Idle;
                if self.poller_running {
                    self.poller_running = false;
                    out.push(Command::StopPoller);
                }
                if self.reconnect_pending {
                    self.reconnect_pending = false;
                    out.push(Command::CancelReconnect);
                }
            }
        }
        out
    }

    fn is_current(&self, generation: Generation) -> bool {
        self.live.generation() == Some(generation)
    }

    fn open(&mut self, out: &mut Vec<Command>) {
        let Some(table_id) = self.table_id else {
            warn!("Cannot connect live channel: table id is not set");
            return;
        };
        if self.permanent_fallback {
            debug!("Live channel abandoned, staying in polling mode");
            return;
        }
        if self.live != Live::Idle {
            debug!(live = ?self.live, "Live channel already active");
            return;
        }
        let generation = self.next_generation;
        self.next_generation += 1;
        self.live = Live::Opening(generation);
        self.set_status(ChannelStatus::Connecting, out);
        out.push(Command::OpenLive { generation, table_id });
    }

    fn start_poller(&mut self, out: &mut Vec<Command>) {
        if self.poller_running {
            return;
        }
        self.poller_running = true;
        out.push(Command::StartPoller);
    }

    fn set_status(&mut self, status: ChannelStatus, out: &mut Vec<Command>) {
        if self.status != status {
            self.status = status;
            out.push(Command::StatusChanged(status));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn supervisor() -> Supervisor {
        Supervisor::new(Some(3), RetryPolicy::default())
    }

    fn open_generation(cmds: &[Command]) -> Generation {
        cmds.iter()
            .find_map(|c| match c {
                Command::OpenLive { generation, .. } => Some(*generation),
                _ => None,
            })
            .expect("expected OpenLive")
    }

    fn closed(generation: Generation) -> SupervisorEvent {
        SupervisorEvent::Closed { generation, code: Some(1006), reason: String::new() }
    }

    fn count(cmds: &[Command], pred: impl Fn(&Command) -> bool) -> usize {
        cmds.iter().filter(|c| pred(c)).count()
    }

    #[test]
    fn test_connect_requires_table() {
        let mut sup = Supervisor::new(None, RetryPolicy::default());
        assert!(sup.handle(SupervisorEvent::Connect).is_empty());
    }

    #[test]
    fn test_open_stops_running_poller() {
        let mut sup = supervisor();
        let g0 = open_generation(&sup.handle(SupervisorEvent::Connect));
        let cmds = sup.handle(closed(g0));
        assert!(cmds.contains(&Command::StartPoller));
        assert!(sup.is_poller_running());

        let g1 = open_generation(&sup.handle(SupervisorEvent::ReconnectDue));
        let cmds = sup.handle(SupervisorEvent::Opened { generation: g1 });
        assert_eq!(sup.status(), ChannelStatus::Connected);
        assert!(cmds.contains(&Command::StopPoller));
        assert!(!sup.is_poller_running());
        assert!(sup.is_live_open());
    }

    #[test]
    fn test_four_closes_schedule_three_reconnects() {
        let mut sup = supervisor();
        let mut all = Vec::new();
        let mut generation = open_generation(&sup.handle(SupervisorEvent::Connect));

        for round in 0..4 {
            let cmds = sup.handle(closed(generation));
            all.extend(cmds.clone());
            if round < 3 {
                assert!(cmds.contains(&Command::ScheduleReconnect { delay: Duration::from_secs(5) }));
                generation = open_generation(&sup.handle(SupervisorEvent::ReconnectDue));
            } else {
                assert!(!cmds.iter().any(|c| matches!(c, Command::ScheduleReconnect { .. })));
            }
        }

        assert_eq!(count(&all, |c| matches!(c, Command::ScheduleReconnect { .. })), 3);
        assert_eq!(count(&all, |c| *c == Command::StartPoller), 1);
        assert_eq!(sup.status(), ChannelStatus::Polling);
        assert_eq!(sup.retries(), 3);
        assert!(!sup.is_reconnect_pending());

        // Permanent: a later connect request does not reopen the live channel
        assert!(sup.handle(SupervisorEvent::Connect).is_empty());
        assert_eq!(sup.status(), ChannelStatus::Polling);
    }

    #[test]
    fn test_retries_not_reset_by_successful_open() {
        let mut sup = supervisor();
        let mut generation = open_generation(&sup.handle(SupervisorEvent::Connect));
        for _ in 0..3 {
            sup.handle(SupervisorEvent::Opened { generation });
            sup.handle(closed(generation));
            generation = open_generation(&sup.handle(SupervisorEvent::ReconnectDue));
        }
        sup.handle(SupervisorEvent::Opened { generation });
        let cmds = sup.handle(closed(generation));
        assert!(!cmds.iter().any(|c| matches!(c, Command::ScheduleReconnect { .. })));
        assert_eq!(sup.status(), ChannelStatus::Polling);
        assert!(sup.is_poller_running());
    }

    #[test]
    fn test_double_close_is_noop() {
        let mut sup = supervisor();
        let g = open_generation(&sup.handle(SupervisorEvent::Connect));
        sup.handle(SupervisorEvent::Opened { generation: g });
        assert!(!sup.handle(closed(g)).is_empty());
        assert!(sup.handle(closed(g)).is_empty());
        assert_eq!(sup.retries(), 1);
    }

    #[test]
    fn test_error_then_close_falls_back_once() {
        let mut sup = supervisor();
        let g = open_generation(&sup.handle(SupervisorEvent::Connect));
        let cmds = sup.handle(SupervisorEvent::TransportError { generation: g, error: "reset".into() });
        assert_eq!(sup.status(), ChannelStatus::Error);
        assert!(cmds.contains(&Command::CloseLive { generation: g }));
        assert!(!cmds.contains(&Command::StartPoller));

        let cmds = sup.handle(closed(g));
        assert_eq!(count(&cmds, |c| *c == Command::StartPoller), 1);
        assert_eq!(count(&cmds, |c| matches!(c, Command::ScheduleReconnect { .. })), 1);
        assert_eq!(sup.status(), ChannelStatus::Disconnected);
    }

    #[test]
    fn test_malformed_frame_keeps_channel_open() {
        let mut sup = supervisor();
        let g = open_generation(&sup.handle(SupervisorEvent::Connect));
        sup.handle(SupervisorEvent::Opened { generation: g });

        for text in ["garbage", "{}", r#"{"type":"nope"}"#] {
            let cmds = sup.handle(SupervisorEvent::Frame { generation: g, text: text.into() });
            assert!(cmds.is_empty());
        }
        assert!(sup.is_live_open());
        assert_eq!(sup.status(), ChannelStatus::Connected);

        let cmds = sup.handle(SupervisorEvent::Frame {
            generation: g,
            text: r#"{"type":"system_message","message":"hi"}"#.into(),
        });
        assert!(matches!(cmds.as_slice(), [Command::Deliver(InboundEvent::SystemMessage(_))]));
    }

    #[test]
    fn test_stale_generation_ignored() {
        let mut sup = supervisor();
        let g0 = open_generation(&sup.handle(SupervisorEvent::Connect));
        sup.handle(closed(g0));
        let g1 = open_generation(&sup.handle(SupervisorEvent::ReconnectDue));
        assert_ne!(g0, g1);

        assert!(sup.handle(SupervisorEvent::Opened { generation: g0 }).is_empty());
        assert!(sup
            .handle(SupervisorEvent::Frame { generation: g0, text: "{}".into() })
            .is_empty());
        assert!(!sup.is_live_open());
    }

    #[test]
    fn test_construction_failure_polls_without_retry() {
        let mut sup = supervisor();
        let g = open_generation(&sup.handle(SupervisorEvent::Connect));
        let cmds = sup.handle(SupervisorEvent::ConstructionFailed { generation: g, error: "bad url".into() });
        assert!(cmds.contains(&Command::StartPoller));
        assert!(!cmds.iter().any(|c| matches!(c, Command::ScheduleReconnect { .. })));
        assert_eq!(sup.status(), ChannelStatus::Polling);
    }

    #[test]
    fn test_shutdown_tears_everything_down() {
        let mut sup = supervisor();
        let g = open_generation(&sup.handle(SupervisorEvent::Connect));
        sup.handle(closed(g));
        let cmds = sup.handle(SupervisorEvent::Shutdown);
        assert_eq!(cmds, vec![Command::StopPoller, Command::CancelReconnect]);

        assert!(sup.handle(SupervisorEvent::ReconnectDue).is_empty());
        assert!(sup.handle(SupervisorEvent::Shutdown).is_empty());
        assert!(sup.is_shut_down());
    }

    #[test]
    fn test_shutdown_closes_open_channel() {
        let mut sup = supervisor();
        let g = open_generation(&sup.handle(SupervisorEvent::Connect));
        sup.handle(SupervisorEvent::Opened { generation: g });
        assert_eq!(sup.handle(SupervisorEvent::Shutdown), vec![Command::CloseLive { generation: g }]);
        assert!(sup.handle(closed(g)).is_empty());
    }

    #[test]
    fn test_live_and_poller_never_both_active() {
        let mut sup = supervisor();
        let mut generation = open_generation(&sup.handle(SupervisorEvent::Connect));
        sup.handle(SupervisorEvent::Opened { generation });
        for _ in 0..3 {
            assert!(!(sup.is_live_open() && sup.is_poller_running()));
            sup.handle(closed(generation));
            assert!(!(sup.is_live_open() && sup.is_poller_running()));
            generation = open_generation(&sup.handle(SupervisorEvent::ReconnectDue));
            sup.handle(SupervisorEvent::Opened { generation });
            assert!(!(sup.is_live_open() && sup.is_poller_running()));
        }
    }
}
