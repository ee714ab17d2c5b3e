//! ConnecTUM State Library
//!
//! This crate provides the client-side state for the ConnecTUM
//! Connect-Four kiosk: live feeds from the board controller, the session
//! screens, and the checks that keep illegal or stale moves from leaving
//! the kiosk.
//!
//! # Overview
//!
//! - **Connection Management** - One self-healing socket per feed
//!   (game state, magazine status, camera) with exponential backoff and an
//!   explicit stop flag so torn-down feeds never reconnect.
//!
//! - **State Store** - The latest complete game snapshot, replaced whole on
//!   every frame. Malformed frames are dropped.
//!
//! - **Session State Machine** - Start, playing and leaderboard screens with
//!   validated transitions and a single in-flight request marker.
//!
//! - **Move Gate** - Turn, validity and in-flight checks before a move is sent.
//!
//! - **Prompt Scheduler** - Shows the bot's move message for a fixed window,
//!   then an idle "your turn" prompt.
//!
//! # Design Principles
//!
//! 1. **State machines validate transitions** - Invalid screen changes are
//!    rejected with clear errors.
//!
//! 2. **No networking** - The host owns sockets and HTTP; this crate is pure
//!    state driven by events and an injected clock.
//!
//! 3. **Failures become surfaces** - Request failures are classified and shown,
//!    never propagated to the host.
//!
//! 4. **Serialization-ready** - Wire types are serde data; state can be dumped
//!    to JSON for diagnostics.
//!
//! # Example
//!
//! ```rust
//! use std::time::Instant;
//!
//! use connectum_state::config::ClientConfig;
//! use connectum_state::protocol::{OutboundRequest, RequestOutcome};
//! use connectum_state::state::{
//!     FeedKind, FeedTransports, Frame, KioskState, SessionScreen, SocketId, SocketSignal,
//!     Transport, TransportError,
//! };
//! use url::Url;
//!
//! #[derive(Default)]
//! struct NullTransport;
//!
//! impl Transport for NullTransport {
//!     fn open(&mut self, _: SocketId, _: &Url) -> Result<(), TransportError> {
//!         Ok(())
//!     }
//!     fn send(&mut self, _: SocketId, _: &Frame) -> Result<(), TransportError> {
//!         Ok(())
//!     }
//!     fn close(&mut self, _: SocketId) {}
//! }
//!
//! let transports = FeedTransports::<NullTransport>::default();
//! let mut kiosk = KioskState::new(ClientConfig::default(), transports, Vec::<OutboundRequest>::new())
//!     .unwrap();
//! let now = Instant::now();
//!
//! // Ask the controller for a game; the host performs the request
//! let seq = kiosk.start_game(now).unwrap();
//! kiosk.complete_request(seq, RequestOutcome::ok("{}"), now);
//! assert_eq!(kiosk.screen(), SessionScreen::Playing);
//!
//! // Snapshots arrive on the game feed
//! let socket = kiosk.feed(FeedKind::GameState).current_socket().unwrap();
//! kiosk.on_socket(FeedKind::GameState, socket, SocketSignal::Opened, now);
//! let frame = r#"{"board":[[0,0,0]],"winner":null,"turn":0,"valid_moves":[0,1,2]}"#;
//! kiosk.on_socket(
//!     FeedKind::GameState,
//!     socket,
//!     SocketSignal::Frame(Frame::Text(frame.to_string())),
//!     now,
//! );
//!
//! assert!(kiosk.submit_move(1, now).is_ok());
//! ```

pub mod config;
pub mod protocol;
pub mod state;

// Re-export everything from state module at crate root
pub use state::*;
