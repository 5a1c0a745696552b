//! Event bus utilities providing fan-out to configurable sinks.
//!
//! Producers (node handlers, the scheduler, the runner) push [`Event`]s into
//! a shared flume channel; a background listener broadcasts each event to
//! every registered [`EventSink`].

pub mod bus;
pub mod event;
pub mod sink;

pub use bus::EventBus;
pub use event::{DiagnosticEvent, Event, NodeEvent};
pub use sink::{ChannelSink, EventSink, MemorySink, StdOutSink};
