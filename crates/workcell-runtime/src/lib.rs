//! `workcell-runtime` – the work cell's decision loop.
//!
//! # Modules
//!
//! - [`control_loop`] – [`ControlLoop`][control_loop::ControlLoop]: the
//!   fixed-rate scheduler. Drains inbound messages into cell state, then
//!   resolves, locates and projects the first product of the oldest order
//!   once per tick.
//! - [`location`] – [`LocationResolver`][location::LocationResolver]:
//!   timeout-bounded wrapper around the material-location service.
//! - [`report`] – [`ReportLatch`][report::ReportLatch] and
//!   [`Throttle`][report::Throttle]: keep a periodic loop from repeating the
//!   same log line every tick.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: global
//!   `tracing` subscriber with an optional OTLP span exporter.

pub mod control_loop;
pub mod location;
pub mod report;
pub mod telemetry;

pub use control_loop::{CellServices, ControlLoop, ControlLoopConfig, IdleReason, LoopState, TickOutcome};
pub use location::LocationResolver;
pub use report::{ReportLatch, Throttle};
pub use telemetry::{TracerProviderGuard, init_tracing};
