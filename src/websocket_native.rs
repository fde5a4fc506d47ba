//! Native live channel transport
//!
//! Uses tokio-tungstenite; every connection attempt reports to the driver
//! through a `LiveLink` and ends with exactly one close notification.

use crate::core::{Generation, SupervisorEvent};
use tokio::sync::{mpsc::UnboundedSender, oneshot};
use tracing::{debug, error, info, warn};

/// How a connection attempt ended
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: Option<u16>,
    pub reason: String,
}

/// Reporting handle for one connection attempt
pub struct LiveLink {
    pub generation: Generation,
    events: UnboundedSender<SupervisorEvent>,
}

impl LiveLink {
    pub fn new(generation: Generation, events: UnboundedSender<SupervisorEvent>) -> Self {
        Self { generation, events }
    }

    pub fn opened(&self) {
        self.report(SupervisorEvent::Opened { generation: self.generation });
    }

    pub fn frame(&self, text: String) {
        self.report(SupervisorEvent::Frame { generation: self.generation, text });
    }

    pub fn error(&self, error: impl ToString) {
        self.report(SupervisorEvent::TransportError {
            generation: self.generation,
            error: error.to_string(),
        });
    }

    fn closed(&self, info: CloseInfo) {
        self.report(SupervisorEvent::Closed {
            generation: self.generation,
            code: info.code,
            reason: info.reason,
        });
    }

    fn report(&self, event: SupervisorEvent) {
        if self.events.send(event).is_err() {
            debug!(generation = self.generation, "Driver gone, dropping live event");
        }
    }
}

/// Opens live connections; faked in driver tests
#[async_trait::async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Run one connection attempt until it ends, reporting through `link`
    ///
    /// `close_rx` fires when the driver asks for a local close.
    async fn run(&self, url: &str, link: &LiveLink, close_rx: oneshot::Receiver<()>) -> CloseInfo;
}

/// Run a connection attempt and always finish with its close notification
pub async fn run_attempt<C: Connector + ?Sized>(
    connector: &C,
    url: String,
    link: LiveLink,
    close_rx: oneshot::Receiver<()>,
) {
    let info = connector.run(&url, &link, close_rx).await;
    link.closed(info);
}

/// WebSocket connector backed by tokio-tungstenite
#[derive(Clone, Copy, Debug, Default)]
pub struct TungsteniteConnector;

#[async_trait::async_trait]
impl Connector for TungsteniteConnector {
    async fn run(&self, url: &str, link: &LiveLink, mut close_rx: oneshot::Receiver<()>) -> CloseInfo {
        use futures_util::{SinkExt, StreamExt};
        use tokio_tungstenite::{connect_async, tungstenite::Message};

        info!(url, generation = link.generation, "Connecting to WebSocket");

        let ws_stream = match connect_async(url).await {
            Ok((stream, _)) => {
                info!("WebSocket connected");
                link.opened();
                stream
            }
            Err(e) => {
                error!(error = %e, "Failed to connect");
                link.error(&e);
                return CloseInfo { code: Some(1006), reason: e.to_string() };
            }
        };

        let (mut write, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                _ = &mut close_rx => {
                    debug!("Closing WebSocket on request");
                    if let Err(e) = write.send(Message::Close(None)).await {
                        warn!(error = %e, "Failed to send close frame");
                    }
                    return CloseInfo { code: Some(1000), reason: "closed by client".into() };
                }
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => link.frame(text.to_string()),
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                        Ok(text) => link.frame(text),
                        Err(e) => warn!(error = %e, "Dropping non-UTF-8 binary frame"),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        warn!(?frame, "WebSocket closed by server");
                        return frame
                            .map(|f| CloseInfo { code: Some(f.code.into()), reason: f.reason.to_string() })
                            .unwrap_or(CloseInfo { code: Some(1005), reason: String::new() });
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "WebSocket error");
                        link.error(&e);
                        return CloseInfo { code: Some(1006), reason: e.to_string() };
                    }
                    None => {
                        warn!("WebSocket stream ended");
                        return CloseInfo { code: Some(1006), reason: "stream ended".into() };
                    }
                    _ => {}
                }
            }
        }
    }
}
