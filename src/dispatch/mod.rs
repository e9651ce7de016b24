//! Latest-frame-wins dispatch of frames to a skill.

pub mod dispatcher;
pub mod gate;
pub mod slot;

pub use dispatcher::{DEFAULT_REPORT_BUFFER, DispatchReport, DispatchStats, FrameDispatcher};
pub use gate::{GateGuard, SingleFlightGate};
pub use slot::{Delivery, FrameSink, FrameSlot};
