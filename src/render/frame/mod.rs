//! Frame pacing: in-flight bound and per-frame state

pub mod in_flight;
pub mod scheduler;

pub use in_flight::{FramePermit, InFlightSemaphore};
pub use scheduler::{
    DispatchSize, Frame, FrameCompletion, FrameScheduler, FrameState, SubmittedFrame, WORKGROUP_SIZE,
};

/// Frames that may be queued on the GPU at once
///
/// Also the slot count of the uniform ring: a slot is rewritten only after the
/// frame that last read it has completed.
pub const MAX_FRAMES_IN_FLIGHT: usize = 3;
