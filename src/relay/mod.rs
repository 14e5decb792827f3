//! Device-side relay hub connection
//!
//! One websocket per device. The client joins on every (re)connect, hands
//! inbound frames to the device loop and sends outbound frames while the link
//! is up. Frames sent while it is down are dropped: the hub has no replay
//! and neither do we.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use crate::protocol::{DeviceIdentity, HubFrame, Join};
use crate::{Error, Result};

/// Websocket path on the hub
pub const HUB_PATH: &str = "/hub";

const EVENT_BUFFER: usize = 256;

/// What the device loop sees of the hub
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubEvent {
    /// Link established and `join` sent
    Connected,
    /// Link lost; a reconnect is scheduled
    Disconnected,
    Frame(HubFrame),
}

/// Reconnecting hub client
#[derive(Debug, Clone)]
pub struct HubClient {
    url: Url,
    join: Join,
    reconnect_delay: Duration,
}

/// Running client: send frames in, receive events out
#[derive(Debug)]
pub struct HubHandle {
    outbound: mpsc::UnboundedSender<HubFrame>,
    events: mpsc::Receiver<HubEvent>,
    task: JoinHandle<()>,
}

impl HubClient {
    /// Client for the hub at `hub_url` (http, https, ws or wss)
    ///
    /// # Errors
    ///
    /// Returns [`Error::Hub`] if the URL cannot be turned into a websocket URL
    pub fn new(hub_url: &str, identity: &DeviceIdentity, reconnect_delay: Duration) -> Result<Self> {
        Ok(Self {
            url: websocket_url(hub_url)?,
            join: Join::from(identity),
            reconnect_delay,
        })
    }

    #[must_use]
    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    /// Start the connection task
    #[must_use]
    pub fn spawn(self) -> HubHandle {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events) = mpsc::channel(EVENT_BUFFER);
        let task = tokio::spawn(self.run(outbound_rx, events_tx));
        HubHandle {
            outbound,
            events,
            task,
        }
    }

    async fn run(
        self,
        mut outbound: mpsc::UnboundedReceiver<HubFrame>,
        events: mpsc::Sender<HubEvent>,
    ) {
        loop {
            match self.session(&mut outbound, &events).await {
                Ok(Session::Closed) => {
                    tracing::debug!("hub client closed");
                    return;
                }
                Ok(Session::Lost) => {
                    tracing::warn!(url = %self.url, "disconnected from hub");
                    if events.send(HubEvent::Disconnected).await.is_err() {
                        return;
                    }
                }
                Err(e) => tracing::warn!(url = %self.url, error = %e, "hub connection failed"),
            }

            let backoff = tokio::time::sleep(self.reconnect_delay);
            tokio::pin!(backoff);
            loop {
                tokio::select! {
                    () = &mut backoff => break,
                    frame = outbound.recv() => match frame {
                        Some(frame) => tracing::warn!(event = frame.event(), "hub offline, frame dropped"),
                        None => return,
                    },
                }
            }
        }
    }

    async fn session(
        &self,
        outbound: &mut mpsc::UnboundedReceiver<HubFrame>,
        events: &mpsc::Sender<HubEvent>,
    ) -> Result<Session> {
        let (stream, _response) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| Error::Hub(format!("connect failed: {e}")))?;
        let (mut sink, mut stream) = stream.split();

        let join = HubFrame::Join(self.join.clone()).to_text()?;
        sink.send(Message::text(join))
            .await
            .map_err(|e| Error::Hub(format!("join failed: {e}")))?;
        tracing::info!(url = %self.url, name = %self.join.name, "joined hub");
        if events.send(HubEvent::Connected).await.is_err() {
            return Ok(Session::Closed);
        }

        loop {
            tokio::select! {
                frame = outbound.recv() => {
                    let Some(frame) = frame else {
                        let _ = sink.close().await;
                        return Ok(Session::Closed);
                    };
                    tracing::trace!(event = frame.event(), "sending");
                    if let Err(e) = sink.send(Message::text(frame.to_text()?)).await {
                        tracing::warn!(event = frame.event(), error = %e, "send failed, frame dropped");
                        return Ok(Session::Lost);
                    }
                }
                message = stream.next() => match message {
                    Some(Ok(Message::Text(text))) => match HubFrame::from_text(&text) {
                        Ok(frame) => {
                            if events.send(HubEvent::Frame(frame)).await.is_err() {
                                return Ok(Session::Closed);
                            }
                        }
                        Err(e) => tracing::debug!(error = %e, "ignoring unknown hub frame"),
                    },
                    Some(Ok(Message::Close(_))) | None => return Ok(Session::Lost),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "hub read error");
                        return Ok(Session::Lost);
                    }
                },
            }
        }
    }
}

enum Session {
    /// Device loop went away
    Closed,
    /// Link dropped, reconnect
    Lost,
}

impl HubHandle {
    /// Queue a frame for the hub
    pub fn send(&self, frame: HubFrame) {
        if self.outbound.send(frame).is_err() {
            tracing::warn!("hub client stopped, frame dropped");
        }
    }

    /// Sender for use from other tasks
    #[must_use]
    pub fn sender(&self) -> mpsc::UnboundedSender<HubFrame> {
        self.outbound.clone()
    }

    /// Next hub event, `None` once the client task has ended
    pub async fn recv(&mut self) -> Option<HubEvent> {
        self.events.recv().await
    }

    pub fn abort(&self) {
        self.task.abort();
    }
}

impl Drop for HubHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Websocket URL of the hub endpoint
///
/// # Errors
///
/// Returns [`Error::Hub`] for an unparseable URL or an unsupported scheme
pub fn websocket_url(hub_url: &str) -> Result<Url> {
    let mut url = Url::parse(hub_url).map_err(|e| Error::Hub(format!("invalid hub URL '{hub_url}': {e}")))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(Error::Hub(format!("unsupported hub URL scheme '{other}'"))),
    };
    url.set_scheme(scheme)
        .map_err(|()| Error::Hub(format!("cannot use scheme {scheme} for '{hub_url}'")))?;
    if url.path() == "/" || url.path().is_empty() {
        url.set_path(HUB_PATH);
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::DeviceRole;

    #[test]
    fn http_urls_become_hub_websockets() {
        assert_eq!(
            websocket_url("http://10.0.0.2:3000").unwrap().as_str(),
            "ws://10.0.0.2:3000/hub"
        );
        assert_eq!(
            websocket_url("https://booth.example.com/").unwrap().as_str(),
            "wss://booth.example.com/hub"
        );
        assert_eq!(
            websocket_url("ws://localhost:3000/custom").unwrap().as_str(),
            "ws://localhost:3000/custom"
        );
    }

    #[test]
    fn other_schemes_are_rejected() {
        assert!(websocket_url("ftp://hub").is_err());
        assert!(websocket_url("not a url").is_err());
    }

    #[tokio::test]
    async fn unreachable_hub_drops_frames_and_retries() {
        let client = HubClient::new(
            "http://127.0.0.1:1",
            &DeviceIdentity::for_role(DeviceRole::Print),
            Duration::from_millis(10),
        )
        .unwrap();
        let handle = client.spawn();
        handle.send(HubFrame::Command("status".to_string()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.task.is_finished());
    }
}
