use crate::core::errors::ExchangeError;
use crate::core::kernel::codec::WsCodec;
use crate::core::kernel::signer::{unix_now_millis, unix_now_secs, Signer};
use crate::core::types::{ChannelKind, ConnectionState, Control, Envelope, Frame};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, Instant, Sleep};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// Producer side of the shared inbound queue
pub type InboundSender = mpsc::Sender<Result<Envelope, ExchangeError>>;

/// Consumer side of the shared inbound queue
pub type InboundReceiver = mpsc::Receiver<Result<Envelope, ExchangeError>>;

const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// How many reconnects a connection attempts before giving up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    /// Reconnect until stopped
    #[default]
    Forever,
    /// Give up after this many consecutive failed attempts and report it to the consumer
    Bounded(u32),
}

/// What a producer does when the inbound queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backpressure {
    /// Suspend the producing connection until the consumer catches up
    #[default]
    Block,
    /// Drop the incoming message and log it
    DropNewest,
}

/// WebSocket connection configuration
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Transport connect timeout
    pub connect_timeout: Duration,
    /// Delay between heartbeat pings
    pub ping_interval: Duration,
    /// How long to wait for a pong before treating the socket as dead.
    /// `None` leaves liveness to transport errors only.
    pub pong_timeout: Option<Duration>,
    /// First reconnect delay, restored on every Ready transition
    pub backoff_floor: Duration,
    /// Upper bound for the doubled reconnect delay
    pub backoff_cap: Duration,
    pub retry_policy: RetryPolicy,
    /// Capacity of the outbound command buffer
    pub outbound_buffer: usize,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            ping_interval: Duration::from_secs(15),
            pong_timeout: Some(Duration::from_secs(10)),
            backoff_floor: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(10),
            retry_policy: RetryPolicy::Forever,
            outbound_buffer: 64,
        }
    }
}

/// Reconnect delay state: doubled after each failure, reset on success
#[derive(Debug, Clone)]
pub struct Backoff {
    floor: Duration,
    cap: Duration,
    current: Duration,
    attempts: u32,
    policy: RetryPolicy,
}

impl Backoff {
    pub fn new(floor: Duration, cap: Duration, policy: RetryPolicy) -> Self {
        let floor = floor.min(cap);
        Self {
            floor,
            cap,
            current: floor,
            attempts: 0,
            policy,
        }
    }

    pub fn from_config(config: &WsConfig) -> Self {
        Self::new(config.backoff_floor, config.backoff_cap, config.retry_policy)
    }

    /// Delay to sleep before the next attempt, `None` once the retry budget is spent
    pub fn next_delay(&mut self) -> Option<Duration> {
        if let RetryPolicy::Bounded(max_attempts) = self.policy {
            if self.attempts >= max_attempts {
                return None;
            }
        }

        self.attempts = self.attempts.saturating_add(1);
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.cap);
        Some(delay)
    }

    pub fn reset(&mut self) {
        self.current = self.floor;
        self.attempts = 0;
    }

    pub const fn current_delay(&self) -> Duration {
        self.current
    }

    pub const fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// Observable status of one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    /// Incremented on every successful transport connect
    pub epoch: u64,
    /// Whether `authenticate` went out on the current socket
    pub auth_sent: bool,
}

impl ConnectionStatus {
    /// Whether subscriptions may be written on the current socket
    pub fn accepts_outbound(&self, kind: ChannelKind) -> bool {
        match kind {
            ChannelKind::Public => self.state == ConnectionState::Ready,
            ChannelKind::Private => {
                self.auth_sent
                    && matches!(
                        self.state,
                        ConnectionState::AwaitingHandshake | ConnectionState::Ready
                    )
            }
        }
    }
}

/// An envelope waiting to be written, bound to the socket it was accepted for
struct Outbound {
    envelope: Envelope,
    epoch: u64,
    ack: oneshot::Sender<Result<(), ExchangeError>>,
}

/// One streaming channel: connect, handshake, heartbeat, decode, forward, reconnect.
///
/// The receive loop runs on its own tokio task once [`StreamConnection::start`]
/// is called. Decoded envelopes go into the shared inbound queue; `pong`
/// frames stay inside the connection.
pub struct StreamConnection<C: WsCodec> {
    kind: ChannelKind,
    url: String,
    exchange_name: String,
    config: WsConfig,
    backpressure: Backpressure,
    codec: Arc<C>,
    signer: Option<Arc<dyn Signer>>,
    inbound: Option<InboundSender>,
    outbound_tx: mpsc::Sender<Outbound>,
    outbound_rx: Option<mpsc::Receiver<Outbound>>,
    status_tx: Option<watch::Sender<ConnectionStatus>>,
    status_rx: watch::Receiver<ConnectionStatus>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl<C: WsCodec> StreamConnection<C> {
    /// Create a connection for one channel
    ///
    /// # Arguments
    /// * `kind` - Public or private; private channels require a signer
    /// * `url` - WebSocket endpoint
    /// * `exchange_name` - Name of the exchange for logging/tracing
    /// * `codec` - Frame codec
    /// * `signer` - Signs the private `authenticate` handshake
    /// * `inbound` - Producer handle of the shared inbound queue
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        kind: ChannelKind,
        url: String,
        exchange_name: String,
        config: WsConfig,
        backpressure: Backpressure,
        codec: Arc<C>,
        signer: Option<Arc<dyn Signer>>,
        inbound: InboundSender,
    ) -> Result<Self, ExchangeError> {
        if kind.requires_auth() && signer.is_none() {
            return Err(ExchangeError::AuthenticationRequired);
        }

        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_buffer.max(1));
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::default());

        Ok(Self {
            kind,
            url,
            exchange_name,
            config,
            backpressure,
            codec,
            signer,
            inbound: Some(inbound),
            outbound_tx,
            outbound_rx: Some(outbound_rx),
            status_tx: Some(status_tx),
            status_rx,
            cancel: CancellationToken::new(),
            task: None,
        })
    }

    pub const fn kind(&self) -> ChannelKind {
        self.kind
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status_rx.borrow()
    }

    pub fn state(&self) -> ConnectionState {
        self.status_rx.borrow().state
    }

    /// Receiver that observes every status change
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_rx.clone()
    }

    /// Spawn the connection task. Must be called from within a tokio runtime.
    pub fn start(&mut self) -> Result<(), ExchangeError> {
        if self.task.is_some() || self.cancel.is_cancelled() {
            return Err(ExchangeError::AlreadyStarted(format!(
                "{} stream connection",
                self.kind
            )));
        }

        let (Some(inbound), Some(outbound), Some(status)) = (
            self.inbound.take(),
            self.outbound_rx.take(),
            self.status_tx.take(),
        ) else {
            return Err(ExchangeError::AlreadyStarted(format!(
                "{} stream connection",
                self.kind
            )));
        };

        let task = ConnectionTask {
            kind: self.kind,
            url: self.url.clone(),
            exchange_name: self.exchange_name.clone(),
            config: self.config.clone(),
            backpressure: self.backpressure,
            codec: Arc::clone(&self.codec),
            signer: self.signer.clone(),
            inbound,
            outbound,
            status,
            cancel: self.cancel.clone(),
        };

        self.task = Some(tokio::spawn(task.run()));
        Ok(())
    }

    /// Close the socket, cancel the heartbeat and wait for the task to exit.
    ///
    /// Terminal: the connection cannot be started again. Calling it twice is a no-op.
    pub async fn stop(&mut self) -> Result<(), ExchangeError> {
        self.cancel.cancel();
        self.inbound = None;
        self.outbound_rx = None;

        if let Some(status) = self.status_tx.take() {
            status.send_modify(|s| s.state = ConnectionState::Closing);
        }

        if let Some(task) = self.task.take() {
            task.await.map_err(|e| {
                ExchangeError::TaskFailed(format!("{} stream task: {}", self.kind, e))
            })?;
            info!(exchange = %self.exchange_name, channel = %self.kind, "stream connection stopped");
        }

        Ok(())
    }

    /// Write an envelope on the current socket and wait until it is flushed.
    ///
    /// Fails with `NotReady` before the channel can accept subscriptions (a
    /// private channel only after `authenticate` went out), and with
    /// `StaleConnection` if the socket it was accepted for dropped first.
    pub async fn send(&self, envelope: Envelope) -> Result<(), ExchangeError> {
        let status = self.status();
        if !status.accepts_outbound(self.kind) {
            return Err(ExchangeError::NotReady { channel: self.kind });
        }

        let (ack_tx, ack_rx) = oneshot::channel();
        self.outbound_tx
            .send(Outbound {
                envelope,
                epoch: status.epoch,
                ack: ack_tx,
            })
            .await
            .map_err(|_| ExchangeError::NotReady { channel: self.kind })?;

        ack_rx
            .await
            .map_err(|_| ExchangeError::StaleConnection { channel: self.kind })?
    }
}

impl<C: WsCodec> Drop for StreamConnection<C> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

enum SessionEnd {
    Stopped,
    Failed(ExchangeError),
}

/// Per-socket state, discarded when the socket drops
struct Session {
    sink: WsSink,
    epoch: u64,
    auth_sent: bool,
    pong_deadline: Option<Instant>,
}

struct ConnectionTask<C: WsCodec> {
    kind: ChannelKind,
    url: String,
    exchange_name: String,
    config: WsConfig,
    backpressure: Backpressure,
    codec: Arc<C>,
    signer: Option<Arc<dyn Signer>>,
    inbound: InboundSender,
    outbound: mpsc::Receiver<Outbound>,
    status: watch::Sender<ConnectionStatus>,
    cancel: CancellationToken,
}

impl<C: WsCodec> ConnectionTask<C> {
    #[instrument(skip(self), fields(exchange = %self.exchange_name, channel = %self.kind, url = %self.url))]
    async fn run(mut self) {
        let mut backoff = Backoff::from_config(&self.config);
        let mut epoch = 0_u64;

        loop {
            self.publish(ConnectionState::Connecting, epoch, false);

            let connected = tokio::select! {
                () = self.cancel.cancelled() => break,
                result = self.connect() => result,
            };

            let end = match connected {
                Ok(stream) => {
                    epoch += 1;
                    self.run_session(stream, epoch, &mut backoff).await
                }
                Err(e) => SessionEnd::Failed(e),
            };

            match end {
                SessionEnd::Stopped => break,
                SessionEnd::Failed(e) => warn!(error = %e, "stream connection lost"),
            }

            self.publish(ConnectionState::Disconnected, epoch, false);
            self.reject_pending();

            let Some(delay) = backoff.next_delay() else {
                error!(attempts = backoff.attempts(), "reconnect attempts exhausted");
                let exhausted = ExchangeError::ReconnectExhausted {
                    channel: self.kind,
                    attempts: backoff.attempts(),
                };
                tokio::select! {
                    () = self.cancel.cancelled() => {}
                    _ = self.inbound.send(Err(exhausted)) => {}
                }
                break;
            };

            info!(delay_ms = delay.as_millis() as u64, attempt = backoff.attempts(), "reconnecting");
            if !self.sleep_backoff(delay).await {
                break;
            }
        }

        self.publish(ConnectionState::Closing, epoch, false);
        debug!("stream task exited");
    }

    async fn connect(&self) -> Result<WsStream, ExchangeError> {
        let (stream, _) = tokio::time::timeout(self.config.connect_timeout, connect_async(self.url.as_str()))
            .await
            .map_err(|_| ExchangeError::ConnectionTimeout("WebSocket connection timeout".to_string()))?
            .map_err(|e| ExchangeError::NetworkError(format!("WebSocket connection failed: {}", e)))?;

        Ok(stream)
    }

    /// Sleep between attempts; returns `false` if stopped meanwhile
    async fn sleep_backoff(&mut self, delay: Duration) -> bool {
        let pause = sleep(delay);
        tokio::pin!(pause);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => return false,
                () = &mut pause => return true,
                Some(command) = self.outbound.recv() => {
                    let _ = command.ack.send(Err(ExchangeError::StaleConnection { channel: self.kind }));
                }
            }
        }
    }

    async fn run_session(&mut self, stream: WsStream, epoch: u64, backoff: &mut Backoff) -> SessionEnd {
        let (sink, mut read) = stream.split();
        let mut session = Session {
            sink,
            epoch,
            auth_sent: false,
            pong_deadline: None,
        };

        if self.kind.requires_auth() {
            self.publish(ConnectionState::AwaitingHandshake, epoch, false);
        } else {
            self.publish(ConnectionState::Ready, epoch, false);
            backoff.reset();
        }
        info!(epoch, "stream connected");

        let heartbeat = sleep(self.config.ping_interval);
        tokio::pin!(heartbeat);

        let end = loop {
            let pong_deadline = session.pong_deadline;

            tokio::select! {
                () = self.cancel.cancelled() => break SessionEnd::Stopped,
                message = read.next() => {
                    let message = match message {
                        Some(Ok(message)) => message,
                        Some(Err(e)) => break SessionEnd::Failed(ExchangeError::NetworkError(format!("WebSocket error: {}", e))),
                        None => break SessionEnd::Failed(ExchangeError::NetworkError("WebSocket stream ended".to_string())),
                    };
                    if let Some(end) = self.handle_message(message, &mut session, heartbeat.as_mut(), backoff).await {
                        break end;
                    }
                }
                Some(command) = self.outbound.recv() => {
                    if let Some(end) = self.handle_outbound(command, &mut session).await {
                        break end;
                    }
                }
                () = &mut heartbeat => {
                    if let Err(e) = self.write(&mut session, &Envelope::ping(unix_now_millis())).await {
                        break SessionEnd::Failed(e);
                    }
                    trace!("ping sent");
                    heartbeat.as_mut().reset(Instant::now() + self.config.ping_interval);
                    if let (Some(timeout), None) = (self.config.pong_timeout, session.pong_deadline) {
                        session.pong_deadline = Some(Instant::now() + timeout);
                    }
                }
                () = sleep_until(pong_deadline.unwrap_or_else(Instant::now)), if pong_deadline.is_some() => {
                    break SessionEnd::Failed(ExchangeError::ConnectionTimeout("no pong before deadline".to_string()));
                }
            }
        };

        let _ = tokio::time::timeout(CLOSE_TIMEOUT, session.sink.send(Message::Close(None))).await;
        end
    }

    async fn handle_message(
        &mut self,
        message: Message,
        session: &mut Session,
        heartbeat: Pin<&mut Sleep>,
        backoff: &mut Backoff,
    ) -> Option<SessionEnd> {
        match message {
            Message::Ping(payload) => {
                // Transport-level ping, answered here and never decoded
                if let Err(e) = session.sink.send(Message::Pong(payload)).await {
                    return Some(SessionEnd::Failed(ExchangeError::NetworkError(format!(
                        "Failed to send pong response: {}",
                        e
                    ))));
                }
                None
            }
            Message::Pong(_) | Message::Frame(_) => None,
            Message::Close(frame) => Some(SessionEnd::Failed(ExchangeError::NetworkError(format!(
                "WebSocket closed by server: {:?}",
                frame
            )))),
            Message::Text(_) | Message::Binary(_) => match self.codec.decode_message(message) {
                Ok(Some(frame)) => self.handle_frame(frame, session, heartbeat, backoff).await,
                Ok(None) => None,
                Err(e) => {
                    warn!(error = %e, "dropping malformed frame");
                    None
                }
            },
        }
    }

    async fn handle_frame(
        &mut self,
        frame: Frame,
        session: &mut Session,
        heartbeat: Pin<&mut Sleep>,
        backoff: &mut Backoff,
    ) -> Option<SessionEnd> {
        let control = match frame {
            Frame::Data(envelope) => return self.enqueue(envelope, session).await,
            Frame::Control(control) => control,
        };

        match &control {
            Control::Connected(_) => {
                debug!(epoch = session.epoch, "server sent connected");
                if self.kind.requires_auth() && !session.auth_sent {
                    if let Err(e) = self.authenticate(session).await {
                        return Some(SessionEnd::Failed(e));
                    }
                }
            }
            Control::Authenticated(_) => {
                if self.kind.requires_auth() {
                    info!(epoch = session.epoch, "stream authenticated");
                    self.publish(ConnectionState::Ready, session.epoch, session.auth_sent);
                    backoff.reset();
                }
            }
            Control::Pong(_) => {
                trace!("pong received");
                heartbeat.reset(Instant::now() + self.config.ping_interval);
                session.pong_deadline = None;
            }
        }

        match control.into_envelope() {
            Some(envelope) => self.enqueue(envelope, session).await,
            None => None,
        }
    }

    async fn authenticate(&self, session: &mut Session) -> Result<(), ExchangeError> {
        let signer = self
            .signer
            .as_ref()
            .ok_or(ExchangeError::AuthenticationRequired)?;
        let signed = signer.sign_stream_auth(unix_now_secs())?;
        let envelope = Envelope::new("authenticate", serde_json::to_value(&signed)?);

        self.write(session, &envelope).await?;
        session.auth_sent = true;
        self.publish(ConnectionState::AwaitingHandshake, session.epoch, true);
        debug!(epoch = session.epoch, "authenticate sent");
        Ok(())
    }

    /// Forward an envelope to the consumer, applying the backpressure policy
    async fn enqueue(&mut self, envelope: Envelope, session: &mut Session) -> Option<SessionEnd> {
        let envelope = envelope.with_channel(self.kind);

        match self.backpressure {
            Backpressure::DropNewest => match self.inbound.try_send(Ok(envelope)) {
                Ok(()) => None,
                Err(TrySendError::Full(dropped)) => {
                    if let Ok(envelope) = dropped {
                        warn!(event = %envelope.event, "inbound queue full, dropping message");
                    }
                    None
                }
                Err(TrySendError::Closed(_)) => Some(SessionEnd::Stopped),
            },
            Backpressure::Block => {
                let inbound = self.inbound.clone();
                let blocked_since = Instant::now();
                loop {
                    // Keep serving outbound writes while the consumer is behind
                    tokio::select! {
                        () = self.cancel.cancelled() => return Some(SessionEnd::Stopped),
                        permit = inbound.reserve() => {
                            return match permit {
                                Ok(permit) => {
                                    permit.send(Ok(envelope));
                                    // The socket is not read while blocked, so that time is not charged to the pong
                                    if let Some(deadline) = session.pong_deadline.as_mut() {
                                        *deadline += blocked_since.elapsed();
                                    }
                                    None
                                }
                                Err(_) => Some(SessionEnd::Stopped),
                            };
                        }
                        Some(command) = self.outbound.recv() => {
                            if let Some(end) = self.handle_outbound(command, session).await {
                                return Some(end);
                            }
                        }
                    }
                }
            }
        }
    }

    async fn handle_outbound(&self, command: Outbound, session: &mut Session) -> Option<SessionEnd> {
        let stale = command.epoch != session.epoch || (self.kind.requires_auth() && !session.auth_sent);
        if stale {
            debug!(event = %command.envelope.event, "rejecting message bound to an earlier socket");
            let _ = command
                .ack
                .send(Err(ExchangeError::StaleConnection { channel: self.kind }));
            return None;
        }

        let message = match self.codec.encode_envelope(&command.envelope) {
            Ok(message) => message,
            Err(e) => {
                let _ = command.ack.send(Err(e));
                return None;
            }
        };

        match session.sink.send(message).await {
            Ok(()) => {
                debug!(event = %command.envelope.event, "envelope sent");
                let _ = command.ack.send(Ok(()));
                None
            }
            Err(e) => {
                let reason = format!("Failed to send WebSocket message: {}", e);
                let _ = command.ack.send(Err(ExchangeError::NetworkError(reason.clone())));
                Some(SessionEnd::Failed(ExchangeError::NetworkError(reason)))
            }
        }
    }

    async fn write(&self, session: &mut Session, envelope: &Envelope) -> Result<(), ExchangeError> {
        let message = self.codec.encode_envelope(envelope)?;
        session
            .sink
            .send(message)
            .await
            .map_err(|e| ExchangeError::NetworkError(format!("Failed to send WebSocket message: {}", e)))
    }

    fn reject_pending(&mut self) {
        while let Ok(command) = self.outbound.try_recv() {
            let _ = command
                .ack
                .send(Err(ExchangeError::StaleConnection { channel: self.kind }));
        }
    }

    fn publish(&self, state: ConnectionState, epoch: u64, auth_sent: bool) {
        self.status.send_replace(ConnectionStatus {
            state,
            epoch,
            auth_sent,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_to_cap() {
        let mut backoff = Backoff::new(
            Duration::from_secs(1),
            Duration::from_secs(10),
            RetryPolicy::Forever,
        );

        let delays: Vec<u64> = (0..6)
            .map(|_| backoff.next_delay().unwrap().as_secs())
            .collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 10, 10]);
    }

    #[test]
    fn test_backoff_reset_restores_floor() {
        let mut backoff = Backoff::new(
            Duration::from_millis(250),
            Duration::from_secs(10),
            RetryPolicy::Forever,
        );
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.current_delay(), Duration::from_secs(1));

        backoff.reset();
        assert_eq!(backoff.attempts(), 0);
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_backoff_bounded_policy() {
        let mut backoff = Backoff::new(
            Duration::from_millis(10),
            Duration::from_secs(1),
            RetryPolicy::Bounded(2),
        );
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_none());

        backoff.reset();
        assert!(backoff.next_delay().is_some());
    }

    #[test]
    fn test_backoff_floor_above_cap() {
        let mut backoff = Backoff::new(
            Duration::from_secs(30),
            Duration::from_secs(10),
            RetryPolicy::Forever,
        );
        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_outbound_gate() {
        let mut status = ConnectionStatus::default();
        assert!(!status.accepts_outbound(ChannelKind::Public));
        assert!(!status.accepts_outbound(ChannelKind::Private));

        status.state = ConnectionState::Ready;
        assert!(status.accepts_outbound(ChannelKind::Public));

        status.state = ConnectionState::AwaitingHandshake;
        assert!(!status.accepts_outbound(ChannelKind::Private));
        status.auth_sent = true;
        assert!(status.accepts_outbound(ChannelKind::Private));

        status.state = ConnectionState::Disconnected;
        assert!(!status.accepts_outbound(ChannelKind::Private));
    }
}
