//! Feed connection management.
//!
//! One [`FeedConnection`] owns one persistent socket to the controller
//! (game state, magazine status or camera). It reconnects after any closure
//! the caller did not ask for, with exponential backoff, and stops for good
//! once [`FeedConnection::close`] has been called.
//!
//! The connection never touches the network itself. The host opens and
//! closes sockets through a [`Transport`] and reports what happened with
//! [`FeedConnection::handle`]; retry timers fire through
//! [`FeedConnection::poll`].

use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use url::Url;

/// Default first reconnect delay (1 second).
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Default reconnect delay ceiling (10 seconds).
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(10);

/// Default delay after the transport refused to even create a socket.
pub const DEFAULT_CONSTRUCTION_RETRY: Duration = Duration::from_secs(1);

/// Default number of consecutive failed cycles before a feed gives up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// The independent push feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedKind {
    GameState,
    MagazineStatus,
    Camera,
}

impl FeedKind {
    pub const ALL: [FeedKind; 3] = [Self::GameState, Self::MagazineStatus, Self::Camera];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GameState => "game_state",
            Self::MagazineStatus => "magazine_status",
            Self::Camera => "camera",
        }
    }
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one socket open attempt. Signals for any other id are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SocketId(pub u64);

/// A websocket payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

/// Socket lifecycle signal reported by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketSignal {
    Opened,
    Frame(Frame),
    /// The socket went away. Every closure reported here is unexpected:
    /// caller-initiated closes go through [`FeedConnection::close`].
    Closed { reason: Option<String> },
}

/// Output of the connection state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    StatusChanged(ConnectionState),
    Message(Frame),
}

/// Errors raised by a [`Transport`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("transport unavailable: {0}")]
    Unavailable(String),

    #[error("socket is not open")]
    NotOpen,
}

/// Socket operations the host provides for one feed.
pub trait Transport {
    /// Begin opening a socket. Success only means the attempt started;
    /// the host later reports [`SocketSignal::Opened`] or
    /// [`SocketSignal::Closed`] for `socket`.
    fn open(&mut self, socket: SocketId, endpoint: &Url) -> Result<(), TransportError>;

    fn send(&mut self, socket: SocketId, frame: &Frame) -> Result<(), TransportError>;

    fn close(&mut self, socket: SocketId);
}

/// Reconnect delay policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
    pub construction_retry: Duration,
    /// Consecutive failed cycles tolerated before the feed fails for good.
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: DEFAULT_BACKOFF_BASE,
            max: DEFAULT_BACKOFF_MAX,
            construction_retry: DEFAULT_CONSTRUCTION_RETRY,
            max_attempts: Some(DEFAULT_MAX_ATTEMPTS),
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `attempt` (1-based):
    /// `min(base * 2^(attempt - 1), max)`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base
            .checked_mul(1u32 << exponent)
            .map_or(self.max, |d| d.min(self.max))
    }

    fn exhausted(&self, attempt: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempt > max)
    }
}

/// Per-socket connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Socket requested, not yet open.
    Connecting { attempt: u32 },

    Open,

    /// Closed by the caller. No retry will happen.
    ClosedClean,

    /// Lost unexpectedly, a retry is scheduled.
    ClosedRetrying { attempt: u32, retry_at: Instant },

    /// Retries exhausted.
    Failed { attempts: u32 },
}

impl ConnectionState {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting { .. } => "connecting",
            Self::Open => "open",
            Self::ClosedClean => "closed_clean",
            Self::ClosedRetrying { .. } => "closed_retrying",
            Self::Failed { .. } => "failed",
        }
    }
}

/// One persistent, self-healing feed socket.
#[derive(Debug)]
pub struct FeedConnection<T: Transport> {
    kind: FeedKind,
    transport: T,
    policy: BackoffPolicy,
    endpoint: Option<Url>,
    state: ConnectionState,

    /// Failed cycles since the last successful open
    attempt: u32,

    /// Set by `close()`; checked before every reconnect
    stopped: bool,

    socket: Option<SocketId>,
    next_socket: u64,

    /// Frames delivered since construction
    pub frames_received: u64,
}

impl<T: Transport> FeedConnection<T> {
    pub fn new(kind: FeedKind, transport: T, policy: BackoffPolicy) -> Self {
        Self {
            kind,
            transport,
            policy,
            endpoint: None,
            state: ConnectionState::ClosedClean,
            attempt: 0,
            stopped: true,
            socket: None,
            next_socket: 0,
            frames_received: 0,
        }
    }

    pub fn kind(&self) -> FeedKind {
        self.kind
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn current_socket(&self) -> Option<SocketId> {
        self.socket
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// When the pending retry timer fires, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        match self.state {
            ConnectionState::ClosedRetrying { retry_at, .. } if !self.stopped => Some(retry_at),
            _ => None,
        }
    }

    /// Open the feed at `endpoint`, replacing any previous socket.
    pub fn connect(&mut self, endpoint: Url, now: Instant) -> Vec<FeedEvent> {
        let mut events = Vec::new();
        if let Some(old) = self.socket.take() {
            self.transport.close(old);
        }
        self.endpoint = Some(endpoint);
        self.stopped = false;
        self.attempt = 0;
        self.open_socket(now, &mut events);
        events
    }

    /// Clean, caller-initiated shutdown. Suppresses any further reconnect.
    pub fn close(&mut self) -> Vec<FeedEvent> {
        self.stopped = true;
        if let Some(socket) = self.socket.take() {
            self.transport.close(socket);
        }
        if self.state == ConnectionState::ClosedClean {
            return Vec::new();
        }
        debug!(feed = %self.kind, "feed closed by caller");
        self.set_state(ConnectionState::ClosedClean)
    }

    /// Apply a socket signal reported by the host.
    pub fn handle(&mut self, socket: SocketId, signal: SocketSignal, now: Instant) -> Vec<FeedEvent> {
        if self.stopped || self.socket != Some(socket) {
            debug!(feed = %self.kind, socket = socket.0, "ignoring signal from stale socket");
            return Vec::new();
        }

        match signal {
            SocketSignal::Opened => {
                if self.attempt > 0 {
                    info!(feed = %self.kind, after = self.attempt, "feed reconnected");
                }
                self.attempt = 0;
                self.set_state(ConnectionState::Open)
            }
            SocketSignal::Frame(frame) => {
                self.frames_received += 1;
                vec![FeedEvent::Message(frame)]
            }
            SocketSignal::Closed { reason } => {
                warn!(
                    feed = %self.kind,
                    reason = reason.as_deref().unwrap_or("unknown"),
                    "feed closed unexpectedly"
                );
                self.socket = None;
                let mut events = Vec::new();
                let delay = self.policy.delay(self.attempt + 1);
                self.schedule_retry(now, delay, &mut events);
                events
            }
        }
    }

    /// Fire the retry timer if it is due.
    pub fn poll(&mut self, now: Instant) -> Vec<FeedEvent> {
        let mut events = Vec::new();
        if self.stopped {
            return events;
        }
        if let ConnectionState::ClosedRetrying { retry_at, .. } = self.state {
            if now >= retry_at {
                self.open_socket(now, &mut events);
            }
        }
        events
    }

    /// Send a frame on the open socket.
    pub fn send(&mut self, frame: &Frame) -> Result<(), TransportError> {
        match (self.state, self.socket) {
            (ConnectionState::Open, Some(socket)) => self.transport.send(socket, frame),
            _ => Err(TransportError::NotOpen),
        }
    }

    fn open_socket(&mut self, now: Instant, events: &mut Vec<FeedEvent>) {
        let Some(endpoint) = self.endpoint.clone() else {
            return;
        };

        self.next_socket += 1;
        let socket = SocketId(self.next_socket);

        match self.transport.open(socket, &endpoint) {
            Ok(()) => {
                debug!(feed = %self.kind, %endpoint, attempt = self.attempt, "opening feed");
                self.socket = Some(socket);
                events.extend(self.set_state(ConnectionState::Connecting {
                    attempt: self.attempt,
                }));
            }
            Err(err) => {
                warn!(feed = %self.kind, %endpoint, error = %err, "could not create feed socket");
                self.socket = None;
                self.schedule_retry(now, self.policy.construction_retry, events);
            }
        }
    }

    fn schedule_retry(&mut self, now: Instant, delay: Duration, events: &mut Vec<FeedEvent>) {
        self.attempt += 1;

        if self.policy.exhausted(self.attempt) {
            warn!(feed = %self.kind, attempts = self.attempt - 1, "giving up on feed");
            events.extend(self.set_state(ConnectionState::Failed {
                attempts: self.attempt - 1,
            }));
            return;
        }

        info!(
            feed = %self.kind,
            attempt = self.attempt,
            delay_ms = delay.as_millis() as u64,
            "scheduling feed reconnect"
        );
        events.extend(self.set_state(ConnectionState::ClosedRetrying {
            attempt: self.attempt,
            retry_at: now + delay,
        }));
    }

    fn set_state(&mut self, state: ConnectionState) -> Vec<FeedEvent> {
        self.state = state;
        vec![FeedEvent::StatusChanged(state)]
    }
}
