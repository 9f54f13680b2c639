//! Frame lifecycle: Idle -> Submitted -> Completed
//!
//! A frame starts `Idle` once it holds an in-flight permit, becomes
//! `Submitted` when its command buffer is handed to the queue, and
//! `Completed` when the GPU signals that the work is done. `Completed` is
//! terminal; the next frame starts again at `Idle`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use super::in_flight::{FramePermit, InFlightSemaphore};
use super::MAX_FRAMES_IN_FLIGHT;

/// Threads per workgroup of the ray tracing kernel (must match `@workgroup_size` in ray_trace.wgsl)
pub const WORKGROUP_SIZE: [u32; 2] = [8, 8];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    Submitted,
    Completed,
}

impl FrameState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => FrameState::Idle,
            1 => FrameState::Submitted,
            _ => FrameState::Completed,
        }
    }
}

#[derive(Default)]
struct FrameStatus(AtomicU8);

impl FrameStatus {
    fn set(&self, state: FrameState) {
        self.0.store(state as u8, Ordering::Release);
    }

    fn get(&self) -> FrameState {
        FrameState::from_u8(self.0.load(Ordering::Acquire))
    }
}

/// Thread grid and workgroup count for one dispatch over the output image
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DispatchSize {
    /// Threads, exactly the image size
    pub grid: [u32; 3],
    /// Workgroups covering the grid; edge groups are partially masked
    pub workgroups: [u32; 3],
}

impl DispatchSize {
    pub fn for_output(width: u32, height: u32) -> Self {
        Self {
            grid: [width, height, 1],
            workgroups: [
                width.div_ceil(WORKGROUP_SIZE[0]),
                height.div_ceil(WORKGROUP_SIZE[1]),
                1,
            ],
        }
    }
}

/// Issues frames one at a time and bounds how many are outstanding on the GPU
pub struct FrameScheduler {
    in_flight: InFlightSemaphore,
    next_index: u64,
}

impl FrameScheduler {
    pub fn new(frames_in_flight: usize) -> Self {
        Self {
            in_flight: InFlightSemaphore::new(frames_in_flight),
            next_index: 0,
        }
    }

    /// Start a frame, blocking while every in-flight slot is taken
    pub fn begin_frame(&mut self) -> Frame {
        let permit = self.in_flight.acquire();
        self.frame(permit)
    }

    /// Start a frame if a slot is free
    pub fn try_begin_frame(&mut self) -> Option<Frame> {
        let permit = self.in_flight.try_acquire()?;
        Some(self.frame(permit))
    }

    /// Start a frame, calling `pump` while no slot is free
    ///
    /// Completion callbacks are only delivered while the device is being
    /// polled, so `pump` must make progress on GPU work (and should block
    /// until some of it finishes).
    pub fn begin_frame_with(&mut self, mut pump: impl FnMut()) -> Frame {
        loop {
            if let Some(frame) = self.try_begin_frame() {
                return frame;
            }
            pump();
        }
    }

    /// Call `pump` until every submitted frame has completed
    pub fn wait_idle_with(&self, mut pump: impl FnMut()) {
        while self.in_flight.in_flight() > 0 {
            pump();
        }
    }

    /// Hand a recorded frame over to the GPU
    ///
    /// The returned completion must be run once the GPU has finished the
    /// frame's work; it releases the in-flight slot.
    pub fn submit(&mut self, frame: Frame) -> (SubmittedFrame, FrameCompletion) {
        let index = self.next_index;
        self.next_index += 1;
        frame.status.set(FrameState::Submitted);

        let submitted = SubmittedFrame {
            index,
            status: Arc::clone(&frame.status),
        };
        let completion = FrameCompletion {
            permit: frame.permit,
            status: frame.status,
        };
        (submitted, completion)
    }

    /// Frames holding a slot (recording or submitted but not completed)
    pub fn in_flight(&self) -> usize {
        self.in_flight.in_flight()
    }

    pub fn frames_in_flight(&self) -> usize {
        self.in_flight.capacity()
    }

    fn frame(&self, permit: FramePermit) -> Frame {
        Frame {
            index: self.next_index,
            permit,
            status: Arc::new(FrameStatus::default()),
        }
    }
}

impl Default for FrameScheduler {
    fn default() -> Self {
        Self::new(MAX_FRAMES_IN_FLIGHT)
    }
}

/// A frame being recorded; dropping it without submitting frees its slot
pub struct Frame {
    index: u64,
    permit: FramePermit,
    status: Arc<FrameStatus>,
}

impl Frame {
    /// Index the frame gets when submitted next
    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn state(&self) -> FrameState {
        self.status.get()
    }
}

/// Observer for a frame handed to the GPU
#[derive(Clone)]
pub struct SubmittedFrame {
    index: u64,
    status: Arc<FrameStatus>,
}

impl SubmittedFrame {
    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn state(&self) -> FrameState {
        self.status.get()
    }

    pub fn is_complete(&self) -> bool {
        self.state() == FrameState::Completed
    }
}

/// Completion handler for one submitted frame
///
/// Sendable so it can run inside the queue's work-done callback.
pub struct FrameCompletion {
    permit: FramePermit,
    status: Arc<FrameStatus>,
}

impl FrameCompletion {
    /// Mark the frame completed and release its in-flight slot
    pub fn complete(self) {
        self.status.set(FrameState::Completed);
        drop(self.permit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_state_transitions() {
        let mut scheduler = FrameScheduler::default();
        let frame = scheduler.begin_frame();
        assert_eq!(frame.state(), FrameState::Idle);

        let (submitted, completion) = scheduler.submit(frame);
        assert_eq!(submitted.state(), FrameState::Submitted);
        assert_eq!(scheduler.in_flight(), 1);

        completion.complete();
        assert_eq!(submitted.state(), FrameState::Completed);
        assert!(submitted.is_complete());
        assert_eq!(scheduler.in_flight(), 0);
    }

    #[test]
    fn test_never_more_than_n_in_flight() {
        let mut scheduler = FrameScheduler::new(MAX_FRAMES_IN_FLIGHT);
        let mut completions = Vec::new();
        for _ in 0..MAX_FRAMES_IN_FLIGHT {
            let frame = scheduler.try_begin_frame().expect("slot available");
            completions.push(scheduler.submit(frame).1);
        }
        assert_eq!(scheduler.in_flight(), MAX_FRAMES_IN_FLIGHT);
        assert!(scheduler.try_begin_frame().is_none());

        completions.remove(0).complete();
        assert!(scheduler.try_begin_frame().is_some());
    }

    #[test]
    fn test_extra_frame_blocks_until_completion() {
        let mut scheduler = FrameScheduler::new(MAX_FRAMES_IN_FLIGHT);
        let mut completions = Vec::new();
        for _ in 0..MAX_FRAMES_IN_FLIGHT {
            let frame = scheduler.begin_frame();
            completions.push(scheduler.submit(frame).1);
        }

        let (started_tx, started_rx) = mpsc::channel();
        let producer = thread::spawn(move || {
            let frame = scheduler.begin_frame();
            started_tx.send(frame.index()).unwrap();
            scheduler
        });

        assert!(started_rx.recv_timeout(Duration::from_millis(100)).is_err());

        // GPU completion fires on another thread
        let first = completions.remove(0);
        thread::spawn(move || first.complete()).join().unwrap();

        let index = started_rx.recv_timeout(Duration::from_secs(5)).expect("producer should proceed");
        assert_eq!(index, MAX_FRAMES_IN_FLIGHT as u64);
        let scheduler = producer.join().unwrap();
        // The producer's unsubmitted frame was dropped with its thread
        assert_eq!(scheduler.in_flight(), MAX_FRAMES_IN_FLIGHT - 1);
    }

    #[test]
    fn test_dropped_frame_releases_slot() {
        let mut scheduler = FrameScheduler::new(1);
        let frame = scheduler.begin_frame();
        assert!(scheduler.try_begin_frame().is_none());
        drop(frame);
        let frame = scheduler.try_begin_frame().expect("skipped frame freed its slot");
        // Skipped frames do not consume an index
        assert_eq!(frame.index(), 0);
    }

    #[test]
    fn test_drawable_taken_only_after_slot() {
        use std::sync::atomic::AtomicUsize;

        let mut scheduler = FrameScheduler::new(1);
        let (_, completion) = {
            let frame = scheduler.begin_frame();
            scheduler.submit(frame)
        };

        let drawables = Arc::new(AtomicUsize::new(0));
        let producer = {
            let drawables = Arc::clone(&drawables);
            thread::spawn(move || {
                let frame = scheduler.begin_frame();
                drawables.fetch_add(1, Ordering::SeqCst);
                frame.index()
            })
        };

        // Blocked on the slot without holding a drawable
        thread::sleep(Duration::from_millis(100));
        assert_eq!(drawables.load(Ordering::SeqCst), 0);

        completion.complete();
        assert_eq!(producer.join().unwrap(), 1);
        assert_eq!(drawables.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_begin_frame_with_pumps_until_free() {
        let mut scheduler = FrameScheduler::new(1);
        let frame = scheduler.begin_frame();
        let (_, completion) = scheduler.submit(frame);

        let mut pending = Some(completion);
        let mut pumps = 0;
        let frame = scheduler.begin_frame_with(|| {
            pumps += 1;
            if let Some(completion) = pending.take() {
                completion.complete();
            }
        });
        assert_eq!(pumps, 1);
        assert_eq!(frame.index(), 1);
    }

    #[test]
    fn test_wait_idle() {
        let mut scheduler = FrameScheduler::new(2);
        let mut completions = Vec::new();
        for _ in 0..2 {
            let frame = scheduler.begin_frame();
            completions.push(scheduler.submit(frame).1);
        }
        scheduler.wait_idle_with(|| {
            if let Some(completion) = completions.pop() {
                completion.complete();
            }
        });
        assert_eq!(scheduler.in_flight(), 0);
    }

    #[test]
    fn test_dispatch_matches_output_size() {
        for (w, h) in [(800, 600), (801, 599), (1, 1), (8, 8), (1920, 1080)] {
            let dispatch = DispatchSize::for_output(w, h);
            assert_eq!(dispatch.grid, [w, h, 1]);
            assert!(dispatch.workgroups[0] * WORKGROUP_SIZE[0] >= w);
            assert!(dispatch.workgroups[1] * WORKGROUP_SIZE[1] >= h);
            assert!((dispatch.workgroups[0] - 1) * WORKGROUP_SIZE[0] < w);
            assert!((dispatch.workgroups[1] - 1) * WORKGROUP_SIZE[1] < h);
            assert_eq!(dispatch.workgroups[2], 1);
        }
    }
}
