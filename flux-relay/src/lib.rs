//! # flux-relay — publish/subscribe relay link for MIDI-like control events
//!
//! A producer publishes control events (notes, controller changes, pitch
//! bends) to a dumb broadcast relay; consumers receive them normalized into
//! one canonical shape. The client survives relay restarts and flaky links
//! by reconnecting with capped backoff, and detects silent failures through
//! a heartbeat window.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐      WebSocket      ┌──────────────┐
//! │ RelayClient  │ ◄─────────────────► │ RelayServer  │
//! │ (producer)   │     JSON frames     │ (flux-bridge)│
//! └──────────────┘                     └──────┬───────┘
//!                                             │
//!                                      ┌──────┴───────┐
//!                                      │   RelayHub   │
//!                                      │ (N-1 fan-out)│
//!                                      └──────┬───────┘
//!                                  ┌──────────┴──────────┐
//!                                  ▼                     ▼
//!                          ┌──────────────┐      ┌──────────────┐
//!                          │ RelayClient  │      │ RelayClient  │
//!                          │ (consumer)   │      │ (consumer)   │
//!                          └──────────────┘      └──────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] — JSON text-frame envelopes (`hello` / `midi_like`)
//! - [`normalize`] — canonical shaping for heterogeneous payloads
//! - [`relative`] — 7-bit relative controller decoding
//! - [`client`] — connection manager: lifecycle, heartbeat, backoff
//! - [`hub`] — broadcast fan-out with per-peer backpressure
//! - [`server`] — the WebSocket relay loop

pub mod client;
pub mod hub;
pub mod normalize;
pub mod protocol;
pub mod relative;
pub mod server;

// Re-exports for convenience
pub use client::{
    Backoff, ClientConfig, EventCallback, LinkStatus, RelayClient, StatusCallback,
};
pub use hub::{HubStats, RelayFrame, RelayHub};
pub use normalize::{normalize, ControlEvent};
pub use protocol::{Frame, ProtocolError, Role};
pub use relative::decode_relative7;
pub use server::{RelayConfig, RelayServer, RelayStats};
