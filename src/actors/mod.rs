//! Actor-based telemetry engine
//!
//! Each long-lived concern runs as an independent async task communicating
//! via Tokio channels.
//!
//! ```text
//!   push feed ──────────────┐
//!   (per-building topics)   │
//!                     ┌─────▼──────┐   liveness snapshots   ┌──────────────┐
//!   commands ────────►│ EngineActor│◄───────────────────────│LivenessPoller│
//!   (mpsc)            │ (owns the  │                        │ (fixed tick +│
//!                     │  registry) │────────────────────────►  poll-now)   │
//!                     └─────┬──────┘  current building       └──────────────┘
//!                           │          (watch)
//!                     ┌─────▼──────┐
//!                     │ broadcast  │  snapshots + chart-ready views
//!                     │ (ViewEvent)│  for the rendering layer
//!                     └────────────┘
//! ```
//!
//! The engine actor is the single writer of the in-memory registry; derived
//! views are computed from snapshot copies, and expensive recomputes
//! triggered by bursty stream events are coalesced by per-topic debounce
//! timers. Historical-range queries run off-actor and carry a generation
//! tag so stale responses are discarded instead of overwriting newer state.

pub mod engine;
pub mod messages;
pub mod poller;
