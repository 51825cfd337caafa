//! Per-relay WebSocket connection actor.
//!
//! Connection state lives entirely inside one task — the loop in
//! [`run_actor`] — so mutation is always serialized. Callers talk to it
//! through an `mpsc` command mailbox; outcomes come back over `oneshot`
//! (single completions) or are broadcast (the `messages()`/
//! `state_changes()` streams, which support any number of independent
//! subscribers without affecting the underlying socket).

use std::collections::HashMap;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use nostr_core::Event;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::message::{ClientMessage, RelayMessage};

const MESSAGE_CHANNEL_CAPACITY: usize = 256;

/// Connection lifecycle state, mirroring the teacher's straightforward
/// enum-with-reason style for failure cases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
    Failed(String),
}

/// Tunable timeouts and reconnect policy for one relay connection.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub connection_timeout: Duration,
    pub operation_timeout: Duration,
    pub auto_reconnect: bool,
    pub max_reconnect_attempts: u32,
    pub initial_reconnect_delay: Duration,
    pub max_reconnect_delay: Duration,
    pub reconnect_backoff_multiplier: f64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            connection_timeout: Duration::from_secs(10),
            operation_timeout: Duration::from_secs(30),
            auto_reconnect: true,
            max_reconnect_attempts: 0,
            initial_reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(60),
            reconnect_backoff_multiplier: 2.0,
        }
    }
}

enum Command {
    Connect(oneshot::Sender<Result<()>>),
    Disconnect,
    Send(ClientMessage, oneshot::Sender<Result<()>>),
    Publish(Event, oneshot::Sender<Result<()>>),
    Subscribe(String, Vec<Filter>, oneshot::Sender<Result<()>>),
    Unsubscribe(String, oneshot::Sender<Result<()>>),
}

/// A handle to a running relay connection actor. Cheap to clone; every
/// clone talks to the same underlying task.
#[derive(Clone)]
pub struct RelayConnection {
    url: String,
    cmd_tx: mpsc::Sender<Command>,
    state_rx: watch::Receiver<RelayConnectionState>,
    msg_tx: broadcast::Sender<RelayMessage>,
}

impl RelayConnection {
    /// Spawn a new connection actor for `url`. The actor starts
    /// `Disconnected`; call [`RelayConnection::connect`] to open the
    /// socket.
    pub fn spawn(url: impl Into<String>, config: RelayConfig) -> Self {
        let url = url.into();
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let (state_tx, state_rx) = watch::channel(RelayConnectionState::Disconnected);
        let (msg_tx, _) = broadcast::channel(MESSAGE_CHANNEL_CAPACITY);

        let actor_url = url.clone();
        let actor_msg_tx = msg_tx.clone();
        tokio::spawn(async move {
            run_actor(actor_url, config, cmd_rx, state_tx, actor_msg_tx).await;
        });

        Self {
            url,
            cmd_tx,
            state_rx,
            msg_tx,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> RelayConnectionState {
        self.state_rx.borrow().clone()
    }

    /// A stream of state transitions. The current state is available
    /// immediately via [`watch::Receiver::borrow`] without waiting for a
    /// change.
    pub fn state_changes(&self) -> watch::Receiver<RelayConnectionState> {
        self.state_rx.clone()
    }

    /// A stream of inbound relay messages. Multiple independent
    /// subscribers may be created; dropping one never closes the socket.
    pub fn messages(&self) -> broadcast::Receiver<RelayMessage> {
        self.msg_tx.subscribe()
    }

    async fn call(&self, make_cmd: impl FnOnce(oneshot::Sender<Result<()>>) -> Command) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(make_cmd(tx))
            .await
            .map_err(|_| Error::NotConnected)?;
        rx.await.map_err(|_| Error::NotConnected)?
    }

    /// Connect and wait for the outcome: a live socket that has confirmed
    /// liveness with a WS ping/pong, or an `Err` describing why it didn't.
    pub async fn connect(&self) -> Result<()> {
        self.call(Command::Connect).await
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.cmd_tx
            .send(Command::Disconnect)
            .await
            .map_err(|_| Error::NotConnected)
    }

    pub async fn send(&self, msg: ClientMessage) -> Result<()> {
        self.call(|tx| Command::Send(msg, tx)).await
    }

    /// Publish an event and await the relay's `OK` response, up to
    /// `operation_timeout`.
    pub async fn publish(&self, event: Event) -> Result<()> {
        self.call(|tx| Command::Publish(event, tx)).await
    }

    pub async fn subscribe(&self, sub_id: impl Into<String>, filters: Vec<Filter>) -> Result<()> {
        let sub_id = sub_id.into();
        self.call(|tx| Command::Subscribe(sub_id, filters, tx)).await
    }

    pub async fn unsubscribe(&self, sub_id: impl Into<String>) -> Result<()> {
        let sub_id = sub_id.into();
        self.call(|tx| Command::Unsubscribe(sub_id, tx)).await
    }
}

struct ActorState {
    config: RelayConfig,
    waiters: HashMap<String, Vec<(oneshot::Sender<Result<()>>, Instant)>>,
    subscriptions: HashMap<String, Vec<Filter>>,
    reconnect_delay: Duration,
    reconnect_attempts: u32,
}

impl ActorState {
    fn new(config: RelayConfig) -> Self {
        let reconnect_delay = config.initial_reconnect_delay;
        Self {
            config,
            waiters: HashMap::new(),
            subscriptions: HashMap::new(),
            reconnect_delay,
            reconnect_attempts: 0,
        }
    }

    fn reset_backoff(&mut self) {
        self.reconnect_delay = self.config.initial_reconnect_delay;
        self.reconnect_attempts = 0;
    }

    fn next_backoff(&mut self) -> Duration {
        let delay = self.reconnect_delay;
        let scaled = delay.mul_f64(self.config.reconnect_backoff_multiplier);
        self.reconnect_delay = scaled.min(self.config.max_reconnect_delay);
        self.reconnect_attempts += 1;
        delay
    }

    fn fail_all_waiters(&mut self, err: Error) {
        for (_, waiters) in self.waiters.drain() {
            for (waiter, _) in waiters {
                let _ = waiter.send(Err(err.clone()));
            }
        }
    }

    /// Earliest deadline among pending publish waiters, if any.
    fn next_waiter_deadline(&self) -> Option<Instant> {
        self.waiters
            .values()
            .flat_map(|waiters| waiters.iter().map(|(_, deadline)| *deadline))
            .min()
    }

    /// Fail and remove every waiter whose deadline has passed, dropping any
    /// event id whose waiter list becomes empty.
    fn sweep_expired_waiters(&mut self, now: Instant) {
        for waiters in self.waiters.values_mut() {
            let mut i = 0;
            while i < waiters.len() {
                if waiters[i].1 <= now {
                    let (waiter, _) = waiters.remove(i);
                    let _ = waiter.send(Err(Error::Timeout));
                } else {
                    i += 1;
                }
            }
        }
        self.waiters.retain(|_, waiters| !waiters.is_empty());
    }
}

/// Arm a backoff-governed reconnect deadline if `auto_reconnect` and the
/// attempt budget allow it. Called after every failed connect attempt,
/// regardless of what triggered it.
fn schedule_retry(url: &str, state: &mut ActorState, reconnect_deadline: &mut Option<Instant>) {
    if state.config.auto_reconnect
        && (state.config.max_reconnect_attempts == 0
            || state.reconnect_attempts < state.config.max_reconnect_attempts)
    {
        let delay = state.next_backoff();
        tracing::debug!("{url}: reconnecting in {delay:?}");
        *reconnect_deadline = Some(Instant::now() + delay);
    }
}

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Run `handle_connect` and, on failure, arm the next backoff retry. This
/// is the only path that should ever attempt a connection, so every
/// failure — first attempt or Nth retry — reliably schedules the next one.
async fn attempt_connect(
    url: &str,
    state: &mut ActorState,
    socket: &mut Option<WsStream>,
    state_tx: &watch::Sender<RelayConnectionState>,
    msg_tx: &broadcast::Sender<RelayMessage>,
    reconnect_deadline: &mut Option<Instant>,
) -> Result<()> {
    *reconnect_deadline = None;
    let result = handle_connect(url, state, socket, state_tx, msg_tx).await;
    if result.is_err() {
        schedule_retry(url, state, reconnect_deadline);
    }
    result
}

async fn run_actor(
    url: String,
    config: RelayConfig,
    mut cmd_rx: mpsc::Receiver<Command>,
    state_tx: watch::Sender<RelayConnectionState>,
    msg_tx: broadcast::Sender<RelayMessage>,
) {
    let mut state = ActorState::new(config);
    let mut socket: Option<WsStream> = None;
    let mut reconnect_deadline: Option<Instant> = None;

    loop {
        let sleep_branch = async {
            match reconnect_deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };
        let waiter_timeout_branch = async {
            match state.next_waiter_deadline() {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else { break };
                match cmd {
                    Command::Connect(reply) => {
                        if socket.is_some() {
                            // already connected; don't tear down a live socket
                            // (and its pending publish waiters) just to redo
                            // a no-op handshake.
                            let _ = reply.send(Ok(()));
                        } else {
                            let result = attempt_connect(&url, &mut state, &mut socket, &state_tx, &msg_tx, &mut reconnect_deadline).await;
                            let _ = reply.send(result);
                        }
                    }
                    Command::Disconnect => {
                        reconnect_deadline = None;
                        let _ = state_tx.send(RelayConnectionState::Disconnecting);
                        socket = None;
                        state.fail_all_waiters(Error::NotConnected);
                        let _ = state_tx.send(RelayConnectionState::Disconnected);
                    }
                    Command::Send(msg, reply) => {
                        let result = handle_send(&url, &mut state, &mut socket, &state_tx, &msg_tx, &mut reconnect_deadline, &msg).await;
                        let _ = reply.send(result);
                    }
                    Command::Publish(event, reply) => {
                        let id = event.id.clone();
                        let client_msg = ClientMessage::Event(event);
                        match handle_send(&url, &mut state, &mut socket, &state_tx, &msg_tx, &mut reconnect_deadline, &client_msg).await {
                            Ok(()) => {
                                let deadline = Instant::now() + state.config.operation_timeout;
                                state.waiters.entry(id).or_default().push((reply, deadline));
                            }
                            Err(e) => {
                                let _ = reply.send(Err(e));
                            }
                        }
                    }
                    Command::Subscribe(sub_id, filters, reply) => {
                        let client_msg = ClientMessage::Req { sub_id: sub_id.clone(), filters: filters.clone() };
                        let result = handle_send(&url, &mut state, &mut socket, &state_tx, &msg_tx, &mut reconnect_deadline, &client_msg).await;
                        if result.is_ok() {
                            state.subscriptions.insert(sub_id, filters);
                        }
                        let _ = reply.send(result);
                    }
                    Command::Unsubscribe(sub_id, reply) => {
                        state.subscriptions.remove(&sub_id);
                        let client_msg = ClientMessage::Close(sub_id);
                        let result = handle_send(&url, &mut state, &mut socket, &state_tx, &msg_tx, &mut reconnect_deadline, &client_msg).await;
                        let _ = reply.send(result);
                    }
                }
            }

            incoming = recv_frame(&mut socket), if socket.is_some() => {
                match incoming {
                    Some(Ok(Some(text))) => {
                        handle_inbound_text(&text, &mut state, &msg_tx);
                    }
                    Some(Ok(None)) => {
                        // binary or other non-text frame; Nostr is text-only, ignore.
                    }
                    Some(Err(_)) | None => {
                        socket = None;
                        state.fail_all_waiters(Error::NotConnected);
                        let reason = "connection closed".to_string();
                        tracing::warn!("{url}: connection closed unexpectedly");
                        let _ = state_tx.send(RelayConnectionState::Failed(reason));
                        schedule_retry(&url, &mut state, &mut reconnect_deadline);
                    }
                }
            }

            _ = sleep_branch, if reconnect_deadline.is_some() => {
                let _ = attempt_connect(&url, &mut state, &mut socket, &state_tx, &msg_tx, &mut reconnect_deadline).await;
            }

            _ = waiter_timeout_branch, if !state.waiters.is_empty() => {
                state.sweep_expired_waiters(Instant::now());
            }
        }
    }
}

async fn recv_frame(socket: &mut Option<WsStream>) -> Option<std::result::Result<Option<String>, ()>> {
    let stream = socket.as_mut()?;
    match stream.next().await {
        Some(Ok(WsMessage::Text(text))) => Some(Ok(Some(text.to_string()))),
        Some(Ok(WsMessage::Ping(_))) | Some(Ok(WsMessage::Pong(_))) => Some(Ok(None)),
        Some(Ok(WsMessage::Binary(_))) => Some(Ok(None)),
        Some(Ok(WsMessage::Frame(_))) => Some(Ok(None)),
        Some(Ok(WsMessage::Close(_))) => Some(Err(())),
        Some(Err(_)) => Some(Err(())),
        None => None,
    }
}

fn handle_inbound_text(text: &str, state: &mut ActorState, msg_tx: &broadcast::Sender<RelayMessage>) {
    let parsed = match RelayMessage::from_json(text) {
        Ok(parsed) => parsed,
        Err(_) => return,
    };

    if let RelayMessage::Ok { ref event_id, accepted, ref msg } = parsed {
        if let Some(waiters) = state.waiters.remove(event_id) {
            for (waiter, _) in waiters {
                let result = if accepted {
                    Ok(())
                } else {
                    Err(Error::RelayError(msg.clone()))
                };
                let _ = waiter.send(result);
            }
        }
    }

    let _ = msg_tx.send(parsed);
}

/// Send a WS ping and wait for the matching pong, up to `timeout`. A
/// completed TCP/TLS handshake only proves the socket opened; this is
/// what actually confirms the relay is alive on the other end.
///
/// Any text frame that arrives before the pong (a relay is free to push
/// `AUTH`/`NOTICE` immediately after the handshake) is buffered and
/// returned rather than dropped, so the caller can still deliver it once
/// the connection is declared live.
async fn confirm_liveness(stream: &mut WsStream, timeout: Duration) -> Result<Vec<String>> {
    stream
        .send(WsMessage::Ping(Vec::new().into()))
        .await
        .map_err(|e| Error::ConnectionFailed(format!("liveness ping failed: {e}")))?;

    let mut buffered = Vec::new();
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(Error::ConnectionFailed(
                "no pong before connection_timeout".to_string(),
            ));
        }
        match tokio::time::timeout(remaining, stream.next()).await {
            Ok(Some(Ok(WsMessage::Pong(_)))) => return Ok(buffered),
            Ok(Some(Ok(WsMessage::Text(text)))) => {
                buffered.push(text.to_string());
                continue;
            }
            Ok(Some(Ok(_))) => continue,
            Ok(Some(Err(e))) => {
                return Err(Error::ConnectionFailed(format!(
                    "connection broke during liveness check: {e}"
                )))
            }
            Ok(None) => {
                return Err(Error::ConnectionFailed(
                    "connection closed during liveness check".to_string(),
                ))
            }
            Err(_) => {
                return Err(Error::ConnectionFailed(
                    "no pong before connection_timeout".to_string(),
                ))
            }
        }
    }
}

async fn handle_connect(
    url: &str,
    state: &mut ActorState,
    socket: &mut Option<WsStream>,
    state_tx: &watch::Sender<RelayConnectionState>,
    msg_tx: &broadcast::Sender<RelayMessage>,
) -> Result<()> {
    let _ = state_tx.send(RelayConnectionState::Connecting);

    let connect_fut = tokio_tungstenite::connect_async(url);
    let outcome = tokio::time::timeout(state.config.connection_timeout, connect_fut).await;

    let mut stream = match outcome {
        Ok(Ok((stream, _response))) => stream,
        Ok(Err(e)) => {
            let reason = format!("websocket handshake failed: {e}");
            tracing::warn!("{url}: {reason}");
            *socket = None;
            let _ = state_tx.send(RelayConnectionState::Failed(reason.clone()));
            return Err(Error::ConnectionFailed(reason));
        }
        Err(_) => {
            let reason = "connection timed out".to_string();
            tracing::warn!("{url}: {reason}");
            *socket = None;
            let _ = state_tx.send(RelayConnectionState::Failed(reason.clone()));
            return Err(Error::ConnectionFailed(reason));
        }
    };

    let buffered = match confirm_liveness(&mut stream, state.config.connection_timeout).await {
        Ok(buffered) => buffered,
        Err(e) => {
            let reason = e.to_string();
            tracing::warn!("{url}: {reason}");
            *socket = None;
            let _ = state_tx.send(RelayConnectionState::Failed(reason.clone()));
            return Err(Error::ConnectionFailed(reason));
        }
    };

    tracing::debug!("{url}: connected");
    *socket = Some(stream);
    state.reset_backoff();
    let _ = state_tx.send(RelayConnectionState::Connected);
    for text in &buffered {
        handle_inbound_text(text, state, msg_tx);
    }
    Ok(())
}

async fn handle_send(
    url: &str,
    state: &mut ActorState,
    socket: &mut Option<WsStream>,
    state_tx: &watch::Sender<RelayConnectionState>,
    msg_tx: &broadcast::Sender<RelayMessage>,
    reconnect_deadline: &mut Option<Instant>,
    msg: &ClientMessage,
) -> Result<()> {
    if socket.is_none() {
        attempt_connect(url, state, socket, state_tx, msg_tx, reconnect_deadline).await?;
    }
    let Some(stream) = socket.as_mut() else {
        return Err(Error::NotConnected);
    };

    let text = msg.to_json()?;
    let send_fut = stream.send(WsMessage::Text(text.into()));
    match tokio::time::timeout(state.config.operation_timeout, send_fut).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            *socket = None;
            state.fail_all_waiters(Error::NotConnected);
            let reason = format!("send failed: {e}");
            tracing::warn!("{url}: {reason}");
            let _ = state_tx.send(RelayConnectionState::Failed(reason));
            schedule_retry(url, state, reconnect_deadline);
            Err(Error::NotConnected)
        }
        Err(_) => {
            *socket = None;
            state.fail_all_waiters(Error::Timeout);
            let reason = "send timed out".to_string();
            tracing::warn!("{url}: {reason}");
            let _ = state_tx.send(RelayConnectionState::Failed(reason));
            schedule_retry(url, state, reconnect_deadline);
            Err(Error::Timeout)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.connection_timeout, Duration::from_secs(10));
        assert_eq!(config.operation_timeout, Duration::from_secs(30));
        assert!(config.auto_reconnect);
        assert_eq!(config.max_reconnect_attempts, 0);
        assert_eq!(config.initial_reconnect_delay, Duration::from_secs(1));
        assert_eq!(config.max_reconnect_delay, Duration::from_secs(60));
    }

    #[test]
    fn backoff_doubles_up_to_max() {
        let mut state = ActorState::new(RelayConfig::default());
        let first = state.next_backoff();
        assert_eq!(first, Duration::from_secs(1));
        let second = state.next_backoff();
        assert_eq!(second, Duration::from_secs(2));
        let third = state.next_backoff();
        assert_eq!(third, Duration::from_secs(4));
    }

    #[test]
    fn schedule_retry_arms_deadline_on_first_failed_attempt() {
        let mut state = ActorState::new(RelayConfig::default());
        let mut deadline = None;
        assert_eq!(state.reconnect_attempts, 0);
        schedule_retry("wss://example.invalid", &mut state, &mut deadline);
        assert!(deadline.is_some());
        assert_eq!(state.reconnect_attempts, 1);
    }

    #[test]
    fn schedule_retry_keeps_arming_after_repeated_failures() {
        let mut state = ActorState::new(RelayConfig::default());
        let mut deadline = None;
        for expected_attempts in 1..=3 {
            deadline = None;
            schedule_retry("wss://example.invalid", &mut state, &mut deadline);
            assert!(deadline.is_some(), "attempt {expected_attempts} did not arm a retry");
            assert_eq!(state.reconnect_attempts, expected_attempts);
        }
    }

    #[test]
    fn schedule_retry_respects_attempt_cap() {
        let mut config = RelayConfig::default();
        config.max_reconnect_attempts = 2;
        let mut state = ActorState::new(config);
        let mut deadline = None;

        schedule_retry("wss://example.invalid", &mut state, &mut deadline);
        assert!(deadline.is_some());
        deadline = None;
        schedule_retry("wss://example.invalid", &mut state, &mut deadline);
        assert!(deadline.is_some());

        deadline = None;
        schedule_retry("wss://example.invalid", &mut state, &mut deadline);
        assert!(deadline.is_none(), "retry should stop once the attempt cap is reached");
    }

    #[test]
    fn waiter_sweep_times_out_only_expired_entries() {
        let mut state = ActorState::new(RelayConfig::default());
        let (fresh_tx, mut fresh_rx) = oneshot::channel();
        let (stale_tx, mut stale_rx) = oneshot::channel();
        let now = Instant::now();
        state.waiters.insert("fresh".to_string(), vec![(fresh_tx, now + Duration::from_secs(30))]);
        state.waiters.insert("stale".to_string(), vec![(stale_tx, now - Duration::from_millis(1))]);

        state.sweep_expired_waiters(now);

        assert!(stale_rx.try_recv().unwrap().is_err());
        assert!(matches!(fresh_rx.try_recv(), Err(oneshot::error::TryRecvError::Empty)));
        assert_eq!(state.waiters.len(), 1);
    }

    #[test]
    fn duplicate_event_id_notifies_every_waiter() {
        let mut state = ActorState::new(RelayConfig::default());
        let (tx_a, mut rx_a) = oneshot::channel();
        let (tx_b, mut rx_b) = oneshot::channel();
        let now = Instant::now();
        let deadline = now + Duration::from_secs(30);
        state.waiters.entry("dup".to_string()).or_default().push((tx_a, deadline));
        state.waiters.entry("dup".to_string()).or_default().push((tx_b, deadline));

        let (msg_tx, _msg_rx) = broadcast::channel(8);
        handle_inbound_text(
            r#"["OK","dup",true,""]"#,
            &mut state,
            &msg_tx,
        );

        assert!(rx_a.try_recv().unwrap().is_ok());
        assert!(rx_b.try_recv().unwrap().is_ok());
        assert!(!state.waiters.contains_key("dup"));
    }

    #[tokio::test]
    async fn connection_starts_disconnected() {
        let conn = RelayConnection::spawn("wss://example.invalid", RelayConfig::default());
        assert_eq!(conn.state(), RelayConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn disconnect_wakes_pending_state_watch_with_disconnected() {
        let conn = RelayConnection::spawn("wss://example.invalid", RelayConfig::default());
        conn.disconnect().await.unwrap();
        // give the actor a tick to process the command
        tokio::task::yield_now().await;
        assert_eq!(conn.state(), RelayConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn connect_to_unreachable_host_reports_connection_failed() {
        let mut config = RelayConfig::default();
        config.connection_timeout = Duration::from_millis(200);
        config.auto_reconnect = false;
        let conn = RelayConnection::spawn("ws://127.0.0.1:1", config);
        let err = conn.connect().await.unwrap_err();
        assert!(matches!(err, Error::ConnectionFailed(_)));
    }
}
