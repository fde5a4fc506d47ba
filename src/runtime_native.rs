//! Native driver for the live-update channel
//!
//! One tokio task owns the supervisor and the sink. The WebSocket attempt,
//! the fallback poller, presence refresh and the reconnect timer run as
//! separate tasks that only report back over channels, so every supervisor
//! transition happens on the driver task.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, sleep, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::core::{
    dispatch, ChannelStatus, ChatMessage, Command, Endpoints, EventSink, Generation, InboundEvent,
    MessagesQuery, OnlineTable, PollCursor, Presence, RetryPolicy, SeenMessages, Supervisor,
    SupervisorEvent,
};
use crate::error::Result;
use crate::http::ChatApi;
use crate::websocket_native::{run_attempt, Connector, LiveLink};

/// How long shutdown waits for the close handshake before aborting
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Results of background HTTP work
enum Notice {
    History(Vec<ChatMessage>),
    Polled(Vec<ChatMessage>),
    Presence(Vec<OnlineTable>),
    RefreshPresence,
}

/// Handle to a running live-update channel
pub struct LiveChannel {
    state: Arc<Mutex<ChannelStatus>>,
    events: UnboundedSender<SupervisorEvent>,
    notices: UnboundedSender<Notice>,
    task: JoinHandle<()>,
}

impl LiveChannel {
    /// Start the driver: history load, presence refresh and the live connection
    pub fn spawn<A, C, S>(config: &ClientConfig, api: Arc<A>, connector: C, sink: S) -> Result<Self>
    where
        A: ChatApi,
        C: Connector,
        S: EventSink + Send + 'static,
    {
        let endpoints = Endpoints::new(&config.base_url)?;
        let state = Arc::new(Mutex::new(ChannelStatus::Connecting));
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (notices_tx, notices_rx) = mpsc::unbounded_channel();

        let policy = RetryPolicy {
            max_attempts: config.max_reconnect_attempts,
            delay: config.reconnect_delay,
        };
        let driver = Driver {
            config: config.clone(),
            endpoints,
            api,
            connector: Arc::new(connector),
            sink,
            supervisor: Supervisor::new(config.table_id, policy),
            state: state.clone(),
            events_tx: events_tx.clone(),
            notices_tx: notices_tx.clone(),
            live: None,
            poller: None,
            reconnect: None,
            background: Vec::new(),
            seen: SeenMessages::default(),
        };
        let task = tokio::spawn(driver.run(events_rx, notices_rx));

        Ok(Self {
            state,
            events: events_tx,
            notices: notices_tx,
            task,
        })
    }

    /// Get the current channel status
    pub fn status(&self) -> ChannelStatus {
        *self.state.lock()
    }

    /// Fetch the online tables now instead of waiting for the next refresh
    pub fn refresh_presence(&self) {
        let _ = self.notices.send(Notice::RefreshPresence);
    }

    /// Close the live channel, cancel the poller and timers, and wait for the driver
    pub async fn shutdown(self) {
        let _ = self.events.send(SupervisorEvent::Shutdown);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Live channel driver ended abnormally");
        }
    }
}

struct LiveTask {
    generation: Generation,
    close_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

struct Driver<A, C, S> {
    config: ClientConfig,
    endpoints: Endpoints,
    api: Arc<A>,
    connector: Arc<C>,
    sink: S,
    supervisor: Supervisor,
    state: Arc<Mutex<ChannelStatus>>,
    events_tx: UnboundedSender<SupervisorEvent>,
    notices_tx: UnboundedSender<Notice>,
    live: Option<LiveTask>,
    poller: Option<JoinHandle<()>>,
    reconnect: Option<JoinHandle<()>>,
    /// History load and presence refresh
    background: Vec<JoinHandle<()>>,
    seen: SeenMessages,
}

impl<A, C, S> Driver<A, C, S>
where
    A: ChatApi,
    C: Connector,
    S: EventSink + Send + 'static,
{
    async fn run(
        mut self,
        mut events_rx: UnboundedReceiver<SupervisorEvent>,
        mut notices_rx: UnboundedReceiver<Notice>,
    ) {
        self.start_background();
        self.apply(SupervisorEvent::Connect);

        loop {
            tokio::select! {
                Some(event) = events_rx.recv() => {
                    let shutdown = matches!(event, SupervisorEvent::Shutdown);
                    self.apply(event);
                    if shutdown {
                        break;
                    }
                }
                Some(notice) = notices_rx.recv() => self.on_notice(notice),
                else => break,
            }
        }

        self.finish().await;
    }

    fn apply(&mut self, event: SupervisorEvent) {
        for command in self.supervisor.handle(event) {
            self.execute(command);
        }
    }

    fn execute(&mut self, command: Command) {
        match command {
            Command::OpenLive { generation, table_id } => match self.endpoints.live_url(table_id) {
                Ok(url) => self.open_live(generation, url.to_string()),
                Err(e) => self.apply(SupervisorEvent::ConstructionFailed {
                    generation,
                    error: e.to_string(),
                }),
            },
            Command::CloseLive { generation } => {
                if let Some(live) = self.live.as_mut().filter(|l| l.generation == generation) {
                    if let Some(close_tx) = live.close_tx.take() {
                        let _ = close_tx.send(());
                    }
                }
            }
            Command::StartPoller => self.start_poller(),
            Command::StopPoller => {
                if let Some(poller) = self.poller.take() {
                    poller.abort();
                    info!("Polling stopped");
                }
            }
            Command::ScheduleReconnect { delay } => {
                if let Some(timer) = self.reconnect.take() {
                    timer.abort();
                }
                let events = self.events_tx.clone();
                self.reconnect = Some(tokio::spawn(async move {
                    sleep(delay).await;
                    let _ = events.send(SupervisorEvent::ReconnectDue);
                }));
            }
            Command::CancelReconnect => {
                if let Some(timer) = self.reconnect.take() {
                    timer.abort();
                }
            }
            Command::Deliver(event) => self.deliver(&event),
            Command::StatusChanged(status) => {
                *self.state.lock() = status;
                self.sink.status_changed(status);
            }
        }
    }

    fn open_live(&mut self, generation: Generation, url: String) {
        let (close_tx, close_rx) = oneshot::channel();
        let link = LiveLink::new(generation, self.events_tx.clone());
        let connector = self.connector.clone();
        let handle = tokio::spawn(async move {
            run_attempt(connector.as_ref(), url, link, close_rx).await;
        });
        if let Some(previous) = self.live.replace(LiveTask {
            generation,
            close_tx: Some(close_tx),
            handle,
        }) {
            previous.handle.abort();
        }
    }

    fn start_poller(&mut self) {
        if self.poller.is_some() {
            return;
        }
        info!(interval = ?self.config.poll_interval, "Starting message polling as live channel fallback");

        let api = self.api.clone();
        let notices = self.notices_tx.clone();
        let period = self.config.poll_interval;
        let mut cursor = PollCursor::new(self.config.table_id, self.config.poll_limit);

        self.poller = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match api.fetch_messages(cursor.query()).await {
                    Ok(batch) => {
                        let fresh = cursor.accept(batch);
                        if !fresh.is_empty() && notices.send(Notice::Polled(fresh)).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "Polling error"),
                }
            }
        }));
    }

    fn start_background(&mut self) {
        let api = self.api.clone();
        let notices = self.notices_tx.clone();
        let query = MessagesQuery {
            limit: self.config.history_limit,
            table_id: self.config.table_id,
            after_id: None,
        };
        self.background.push(tokio::spawn(async move {
            match api.fetch_messages(query).await {
                Ok(messages) => {
                    let _ = notices.send(Notice::History(messages));
                }
                Err(e) => warn!(error = %e, "Failed to load recent messages"),
            }
        }));

        let api = self.api.clone();
        let notices = self.notices_tx.clone();
        let period = self.config.presence_interval;
        self.background.push(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !fetch_presence(api.as_ref(), &notices).await {
                    break;
                }
            }
        }));
    }

    fn on_notice(&mut self, notice: Notice) {
        match notice {
            Notice::History(messages) => {
                let count = messages.len();
                for msg in messages {
                    self.deliver(&InboundEvent::ChatMessage(msg));
                }
                self.sink.history_loaded(count);
            }
            Notice::Polled(messages) => {
                debug!(count = messages.len(), "Delivering polled messages");
                for msg in messages {
                    self.deliver(&InboundEvent::ChatMessage(msg));
                }
            }
            Notice::Presence(tables) => {
                let presence = Presence::new(self.config.table_id, tables);
                self.sink.presence_changed(&presence);
            }
            Notice::RefreshPresence => {
                let api = self.api.clone();
                let notices = self.notices_tx.clone();
                tokio::spawn(async move {
                    fetch_presence(api.as_ref(), &notices).await;
                });
            }
        }
    }

    fn deliver(&mut self, event: &InboundEvent) {
        if let InboundEvent::ChatMessage(msg) = event {
            if !self.seen.first_sighting(msg) {
                debug!(id = msg.id, "Skipping message already shown");
                return;
            }
        }
        dispatch(event, self.config.table_id, &mut self.sink);
    }

    async fn finish(mut self) {
        for task in self.background.drain(..) {
            task.abort();
        }
        if let Some(live) = self.live.take() {
            let mut handle = live.handle;
            if tokio::time::timeout(CLOSE_GRACE, &mut handle).await.is_err() {
                warn!("Live channel did not close in time, aborting");
                handle.abort();
            }
        }
        info!("Live channel driver stopped");
    }
}

/// Fetch presence once; false when the driver is gone
async fn fetch_presence<A: ChatApi + ?Sized>(api: &A, notices: &UnboundedSender<Notice>) -> bool {
    match api.online_tables().await {
        Ok(tables) => notices.send(Notice::Presence(tables)).is_ok(),
        Err(e) => {
            warn!(error = %e, "Failed to load online tables");
            true
        }
    }
}
