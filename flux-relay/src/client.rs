//! Client-side connection manager for the relay link.
//!
//! Provides:
//! - Connection lifecycle (connect, reconnect with capped backoff, close)
//! - Role announcement on connect (producer / consumer)
//! - Heartbeat liveness inferred from inbound traffic
//! - Payload normalization before events reach the caller
//!
//! Liveness is inferred purely from the relay forwarding *some* traffic
//! within the heartbeat window; there is no explicit ping frame. On a quiet
//! relay with a single participant the link will therefore cycle through
//! reconnects even though nothing is wrong. Known limitation.
//!
//! Reference: Kleppmann, Chapter 8 — Unreliable Networks

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::normalize::{normalize, ControlEvent};
use crate::protocol::{Frame, Role};

/// Externally visible link status.
///
/// A derived projection of the manager's lifecycle; observers cannot set it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    /// A connection attempt is in flight.
    Connecting,
    /// The transport is open and the role has been announced.
    Connected,
    /// Transient: the current transport failed; a reconnect is scheduled.
    Error,
    /// Terminal: the caller closed the link. No further reconnects.
    Closed,
}

/// Callback receiving normalized events.
pub type EventCallback = Arc<dyn Fn(ControlEvent) + Send + Sync>;
/// Callback receiving status transitions.
pub type StatusCallback = Arc<dyn Fn(LinkStatus) + Send + Sync>;

/// Reconnect backoff: monotone growth up to a ceiling.
///
/// The delay for the next attempt never shrinks across consecutive failures;
/// a successful connect resets it to the initial value.
#[derive(Debug, Clone)]
pub struct Backoff {
    current: Duration,
    initial: Duration,
    growth: f64,
    max: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, growth: f64, max: Duration) -> Self {
        Self {
            current: initial,
            initial,
            growth: growth.max(1.0),
            max,
        }
    }

    /// Delay to wait before the next attempt, then grow for the one after.
    pub fn advance(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.mul_f64(self.growth).min(self.max);
        delay
    }

    /// Reset to the initial delay after a successful connect.
    pub fn reset(&mut self) {
        self.current = self.initial;
    }

    /// The delay the next `advance` will return.
    pub fn current(&self) -> Duration {
        self.current
    }
}

/// Client configuration. All fields have working defaults.
#[derive(Clone)]
pub struct ClientConfig {
    /// Relay endpoint.
    pub endpoint: String,
    /// Participant role. Consumers cannot send.
    pub role: Role,
    /// Maximum silence before the transport is declared dead.
    pub heartbeat_window: Duration,
    /// First reconnect delay.
    pub retry_initial: Duration,
    /// Multiplier applied to the delay after each failed attempt.
    pub retry_growth: f64,
    /// Reconnect delay ceiling.
    pub retry_max: Duration,
    /// Receives every normalized application event.
    pub on_event: EventCallback,
    /// Receives every status transition, including the initial Connecting.
    pub on_status: StatusCallback,
    /// Secondary event observers (monitors, learn tooling). Each is isolated
    /// from the others and from `on_event`.
    pub taps: Vec<EventCallback>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://localhost:8787".to_string(),
            role: Role::Consumer,
            heartbeat_window: Duration::from_secs(10),
            retry_initial: Duration::from_millis(1200),
            retry_growth: 1.5,
            retry_max: Duration::from_millis(6000),
            on_event: Arc::new(|_| {}),
            on_status: Arc::new(|_| {}),
            taps: Vec::new(),
        }
    }
}

/// State shared between the handle and the manager task.
struct LinkShared {
    alive: AtomicBool,
    closed: AtomicBool,
    /// Sender into the current transport's writer; present only while open.
    outbound: Mutex<Option<mpsc::Sender<String>>>,
    close_tx: watch::Sender<bool>,
}

/// Handle to a relay link.
///
/// Owns at most one open transport at a time; the transport is replaced,
/// never mutated, on each reconnect. The handle exposes exactly the control
/// surface: [`send`](Self::send), [`close`](Self::close),
/// [`is_alive`](Self::is_alive).
pub struct RelayClient {
    role: Role,
    shared: Arc<LinkShared>,
}

impl RelayClient {
    /// Build the client and immediately begin connecting.
    ///
    /// Must be called from within a Tokio runtime; the manager task is
    /// spawned onto it.
    pub fn connect(config: ClientConfig) -> Self {
        let (close_tx, close_rx) = watch::channel(false);
        let shared = Arc::new(LinkShared {
            alive: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            outbound: Mutex::new(None),
            close_tx,
        });
        let role = config.role;
        tokio::spawn(run_link(config, shared.clone(), close_rx));
        Self { role, shared }
    }

    /// Publish an application event.
    ///
    /// Producer-only: silently a no-op for consumers and whenever no
    /// transport is open. Fire-and-forget — a frame that fails to serialize
    /// or enqueue is dropped, since a retried control signal would be stale
    /// by the time it arrived.
    pub fn send<T: Serialize>(&self, event: &T) {
        if self.role != Role::Producer {
            return;
        }
        let payload = match serde_json::to_value(event) {
            Ok(v) => v,
            Err(_) => return,
        };
        let text = match Frame::event(payload).encode() {
            Ok(t) => t,
            Err(_) => return,
        };
        if let Ok(guard) = self.shared.outbound.lock() {
            if let Some(tx) = guard.as_ref() {
                let _ = tx.try_send(text);
            }
        }
    }

    /// Close the link. Idempotent and terminal: the transport is asked to
    /// close, pending reconnect and heartbeat timers are cancelled, and no
    /// further transports are created.
    pub fn close(&self) {
        if !self.shared.closed.swap(true, Ordering::SeqCst) {
            let _ = self.shared.close_tx.send(true);
        }
    }

    /// True only while the link is Connected. Pure query.
    pub fn is_alive(&self) -> bool {
        self.shared.alive.load(Ordering::SeqCst)
    }

    /// The role fixed at construction.
    pub fn role(&self) -> Role {
        self.role
    }
}

/// The manager task: one logical stream of control per link.
///
/// All lifecycle mutation happens here; timers and transport events are
/// arms of a single `select!` loop, so there is never more than one
/// in-flight mutation.
async fn run_link(
    config: ClientConfig,
    shared: Arc<LinkShared>,
    mut close_rx: watch::Receiver<bool>,
) {
    let mut backoff = Backoff::new(config.retry_initial, config.retry_growth, config.retry_max);

    while !shared.closed.load(Ordering::SeqCst) {
        emit_status(&config, LinkStatus::Connecting);

        let attempt = tokio::select! {
            res = tokio_tungstenite::connect_async(&config.endpoint) => Some(res),
            _ = close_rx.changed() => None,
        };
        let Some(result) = attempt else { break };

        match result {
            Ok((ws_stream, _)) => {
                backoff.reset();
                log::info!("Connected to {} as {}", config.endpoint, config.role);
                pump(&config, &shared, ws_stream, &mut close_rx).await;
                shared.alive.store(false, Ordering::SeqCst);
                if let Ok(mut guard) = shared.outbound.lock() {
                    *guard = None;
                }
            }
            Err(e) => {
                log::debug!("Connect to {} failed: {e}", config.endpoint);
            }
        }

        if shared.closed.load(Ordering::SeqCst) {
            break;
        }

        emit_status(&config, LinkStatus::Error);
        let delay = backoff.advance();
        log::debug!("Reconnecting to {} in {delay:?}", config.endpoint);
        tokio::select! {
            _ = sleep(delay) => {}
            _ = close_rx.changed() => break,
        }
    }

    shared.alive.store(false, Ordering::SeqCst);
    if let Ok(mut guard) = shared.outbound.lock() {
        *guard = None;
    }
    emit_status(&config, LinkStatus::Closed);
    log::info!("Link to {} closed", config.endpoint);
}

/// Drive one open transport until it dies or the caller closes the link.
async fn pump(
    config: &ClientConfig,
    shared: &Arc<LinkShared>,
    ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    close_rx: &mut watch::Receiver<bool>,
) {
    let (mut sink, mut stream) = ws_stream.split();

    // Announce the role before anything else; a failure here is an ordinary
    // transport failure and flows into the reconnect path.
    let hello = match Frame::hello(config.role).encode() {
        Ok(t) => t,
        Err(e) => {
            log::error!("Failed to encode hello frame: {e}");
            return;
        }
    };
    if sink.send(Message::text(hello)).await.is_err() {
        return;
    }

    let (out_tx, mut out_rx) = mpsc::channel::<String>(64);
    if let Ok(mut guard) = shared.outbound.lock() {
        *guard = Some(out_tx);
    }
    shared.alive.store(true, Ordering::SeqCst);
    emit_status(config, LinkStatus::Connected);

    let deadline = sleep(config.heartbeat_window);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            msg = stream.next() => {
                match msg {
                    Some(Ok(frame)) => {
                        // Any inbound frame proves the link is up.
                        deadline
                            .as_mut()
                            .reset(Instant::now() + config.heartbeat_window);
                        match frame {
                            Message::Text(text) => handle_frame(config, text.as_str()),
                            Message::Ping(data) => {
                                let _ = sink.send(Message::Pong(data)).await;
                            }
                            Message::Close(_) => break,
                            _ => {}
                        }
                    }
                    Some(Err(e)) => {
                        log::debug!("Transport error: {e}");
                        break;
                    }
                    None => break,
                }
            }

            Some(text) = out_rx.recv() => {
                if sink.send(Message::text(text)).await.is_err() {
                    break;
                }
            }

            _ = deadline.as_mut() => {
                log::warn!(
                    "No traffic for {:?}, closing transport",
                    config.heartbeat_window
                );
                let _ = sink.send(Message::Close(None)).await;
                break;
            }

            _ = close_rx.changed() => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
        }
    }
}

/// Dispatch one inbound text frame.
///
/// Only `midi_like` envelopes reach the event callback; every other frame is
/// liveness-only. Malformed text is dropped.
fn handle_frame(config: &ClientConfig, text: &str) {
    match Frame::decode(text) {
        Ok(Frame::MidiLike { payload }) => {
            let event = normalize(&payload);
            emit_event(config, event);
        }
        Ok(Frame::Hello { role }) => {
            log::debug!("Peer announced role {role}");
        }
        Ok(Frame::Other(_)) => {
            log::trace!("Ignoring non-event frame");
        }
        Err(e) => {
            log::debug!("Dropping malformed frame: {e}");
        }
    }
}

/// Deliver an event to the primary callback and every tap, isolating each
/// from the others' panics.
fn emit_event(config: &ClientConfig, event: ControlEvent) {
    let primary = AssertUnwindSafe(|| (config.on_event)(event.clone()));
    if catch_unwind(primary).is_err() {
        log::warn!("Event callback panicked; link continues");
    }
    for tap in &config.taps {
        if catch_unwind(AssertUnwindSafe(|| tap(event.clone()))).is_err() {
            log::warn!("Event tap panicked; link continues");
        }
    }
}

/// Notify the status observer. A panicking observer must not abort the
/// manager's transition.
fn emit_status(config: &ClientConfig, status: LinkStatus) {
    if catch_unwind(AssertUnwindSafe(|| (config.on_status)(status))).is_err() {
        log::warn!("Status callback panicked; link continues");
    }
}
