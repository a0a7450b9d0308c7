//! # sorng-vnc — VNC (RFB) client connection engine
//!
//! Maintains a single stateful session with a remote framebuffer server:
//! connection lifecycle (establish, stream, reconnect, tear down), decoding
//! of server-pushed framebuffer deltas into a shared pixel store, and
//! serialisation of user input (pointer, keyboard, clipboard cut) back to
//! the server. The wire codec itself is external and plugged in through
//! the `client` module's traits.
//!
//! Architecture:
//! - `types` — states, quality levels, outward session events
//! - `error` — categorised error type
//! - `settings` — tunables payload and resolved timeouts/intervals
//! - `flags` — atomic cross-thread control bitset
//! - `host` — host string parsing (IPv6 forms, trailing ports)
//! - `quality` — quality level → encoding profile mapping
//! - `framebuffer` — pixel store, snapshots, scaled view
//! - `queue` — outbound command FIFO drained by the session thread
//! - `client` — codec boundary traits (`RfbClient`, `RfbHooks`)
//! - `hooks` — codec callback adapter with shutdown race shield
//! - `stats` — per-session counters
//! - `network` — host ping and TCP keepalive configuration
//! - `session` — the connection driver thread and public API

pub mod client;
pub mod error;
pub mod flags;
pub mod framebuffer;
mod hooks;
pub mod host;
pub mod network;
pub mod quality;
pub mod queue;
pub mod session;
pub mod settings;
pub mod stats;
pub mod types;

pub use error::{VncError, VncErrorKind, VncResult};
pub use session::VncSession;
pub use types::{VncSessionEvent, VncState};
