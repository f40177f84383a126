// =============================================================================
// FRAME SYNCHRONIZER - one frame in flight, fence + two semaphores
// =============================================================================
//
// FRAME TIMELINE:
// ┌──────────────────────────────────────────────────────────────────────────┐
// │  wait_fence ─> acquire ─> reset_fence ─> upload+record ─> submit ─> present│
// │                                                                          │
// │  (CPU blocks   (image      (only after    (mapped buffers  (GPU    (display│
// │   until GPU     available   a successful   are safe: GPU    works)  shows) │
// │   is done)      semaphore)  acquire)       is idle)                        │
// └──────────────────────────────────────────────────────────────────────────┘
//
// The fence wait at the top is the ONLY backpressure. It guarantees the GPU
// has finished reading the vertex buffer and command buffer from the
// previous frame before we overwrite them. Going to more than one frame in
// flight would need a fence, semaphore pair, command buffer and buffer copy
// per slot.
//
// The synchronizer itself owns no Vulkan objects. It drives a `FrameBackend`
// (the device provider), which keeps it testable without a GPU.
//
// =============================================================================

use ash::prelude::VkResult;
use ash::vk;
use std::fmt;
use thiserror::Error;

use crate::scene::SceneFrame;

/// Effectively infinite, matches the single-frame design
pub const FRAME_TIMEOUT_NS: u64 = u64::MAX;

/// Everything the synchronizer needs from the GPU side
pub trait FrameBackend {
    /// Block until the frame fence is signaled
    fn wait_for_frame_fence(&mut self, timeout_ns: u64) -> VkResult<()>;

    /// Current drawable size; zero area means minimized
    fn surface_extent(&self) -> vk::Extent2D;

    /// Returns (image index, suboptimal). Signals the image-acquired semaphore.
    fn acquire_next_image(&mut self, timeout_ns: u64) -> VkResult<(u32, bool)>;

    fn reset_frame_fence(&mut self) -> VkResult<()>;

    /// Copy vertices and per-quad offsets into the mapped buffers
    fn upload_scene(&mut self, scene: &SceneFrame) -> Result<(), RecordError>;

    fn record_commands(&mut self, image_index: u32, vertex_count: u32) -> VkResult<()>;

    /// Waits on image-acquired, signals render-complete and the frame fence
    fn submit(&mut self) -> VkResult<()>;

    /// Waits on render-complete. Ok(true) = suboptimal.
    fn present(&mut self, image_index: u32) -> VkResult<bool>;
}

/// Where the synchronizer is inside a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    WaitFence,
    Acquiring,
    Recording,
    Submitted,
    Presenting,
}

/// Stage names used in diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStage {
    Wait,
    Acquire,
    Record,
    Submit,
    Present,
}

impl fmt::Display for FrameStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FrameStage::Wait => "wait",
            FrameStage::Acquire => "acquire",
            FrameStage::Record => "record",
            FrameStage::Submit => "submit",
            FrameStage::Present => "present",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("Vulkan error while recording: {0}")]
    Vulkan(#[from] vk::Result),

    #[error("Scene needs {needed} vertices but the geometry buffer holds {capacity}")]
    GeometryOverflow { needed: usize, capacity: usize },

    #[error("Scene has {needed} quads but the transform buffer holds {capacity}")]
    TooManyQuads { needed: usize, capacity: usize },

    #[error("{0} buffer memory is not mapped")]
    Unmapped(&'static str),
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("waiting for the frame fence failed: {0}")]
    Wait(vk::Result),

    #[error("acquiring a swapchain image failed: {0}")]
    Acquire(vk::Result),

    #[error("resetting the frame fence failed: {0}")]
    FenceReset(vk::Result),

    #[error("recording the frame failed: {0}")]
    Record(#[source] RecordError),

    #[error("queue submission failed: {0}")]
    Submit(vk::Result),

    #[error("presenting failed: {0}")]
    Present(vk::Result),
}

impl FrameError {
    pub fn stage(&self) -> FrameStage {
        match self {
            FrameError::Wait(_) => FrameStage::Wait,
            FrameError::Acquire(_) | FrameError::FenceReset(_) => FrameStage::Acquire,
            FrameError::Record(_) => FrameStage::Record,
            FrameError::Submit(_) => FrameStage::Submit,
            FrameError::Present(_) => FrameStage::Present,
        }
    }

    /// Out-of-date swapchain: rebuild it and carry on.
    ///
    /// Every other error leaves GPU state undefined and is fatal.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            FrameError::Acquire(vk::Result::ERROR_OUT_OF_DATE_KHR)
                | FrameError::Present(vk::Result::ERROR_OUT_OF_DATE_KHR)
        )
    }
}

/// Why a tick did not render
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Surface has zero area (minimized)
    ZeroArea,
    FenceTimeout,
    AcquireTimeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented {
        image_index: u32,
        /// Swapchain still works but should be rebuilt
        suboptimal: bool,
    },
    Skipped(SkipReason),
}

pub struct FrameSynchronizer {
    state: FrameState,
    frames_presented: u64,
    frames_skipped: u64,
}

impl FrameSynchronizer {
    pub fn new() -> Self {
        Self {
            state: FrameState::Idle,
            frames_presented: 0,
            frames_skipped: 0,
        }
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    pub fn frames_skipped(&self) -> u64 {
        self.frames_skipped
    }

    /// Run one full frame. Always returns to `Idle`.
    pub fn run_frame<B: FrameBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        scene: &SceneFrame,
    ) -> Result<FrameOutcome, FrameError> {
        let result = self.drive(backend, scene);

        match &result {
            Ok(FrameOutcome::Presented { .. }) => self.frames_presented += 1,
            Ok(FrameOutcome::Skipped(reason)) => {
                self.frames_skipped += 1;
                log::trace!("Frame skipped: {:?}", reason);
            }
            Err(e) => log::trace!("Frame aborted in {} stage", e.stage()),
        }

        self.enter(FrameState::Idle);
        result
    }

    fn enter(&mut self, state: FrameState) {
        log::trace!("Frame state {:?} -> {:?}", self.state, state);
        self.state = state;
    }

    fn drive<B: FrameBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        scene: &SceneFrame,
    ) -> Result<FrameOutcome, FrameError> {
        // ─────────────────────────────────────────────────────────────────────
        // WAIT: previous frame must be done with the command and vertex buffers
        // ─────────────────────────────────────────────────────────────────────
        self.enter(FrameState::WaitFence);
        match backend.wait_for_frame_fence(FRAME_TIMEOUT_NS) {
            Ok(()) => {}
            Err(vk::Result::TIMEOUT) => return Ok(FrameOutcome::Skipped(SkipReason::FenceTimeout)),
            Err(e) => return Err(FrameError::Wait(e)),
        }

        // ─────────────────────────────────────────────────────────────────────
        // ACQUIRE: nothing to draw into while minimized
        // ─────────────────────────────────────────────────────────────────────
        self.enter(FrameState::Acquiring);
        let extent = backend.surface_extent();
        if extent.width == 0 || extent.height == 0 {
            return Ok(FrameOutcome::Skipped(SkipReason::ZeroArea));
        }

        let (image_index, acquire_suboptimal) = match backend.acquire_next_image(FRAME_TIMEOUT_NS) {
            Ok(acquired) => acquired,
            Err(vk::Result::TIMEOUT | vk::Result::NOT_READY) => {
                return Ok(FrameOutcome::Skipped(SkipReason::AcquireTimeout));
            }
            Err(e) => return Err(FrameError::Acquire(e)),
        };

        // Reset only once we know a submit (which re-signals it) will follow.
        // Resetting on a skipped tick would deadlock the next wait.
        backend.reset_frame_fence().map_err(FrameError::FenceReset)?;

        // ─────────────────────────────────────────────────────────────────────
        // RECORD
        // ─────────────────────────────────────────────────────────────────────
        self.enter(FrameState::Recording);
        backend.upload_scene(scene).map_err(FrameError::Record)?;
        backend
            .record_commands(image_index, scene.vertex_count())
            .map_err(|e| FrameError::Record(RecordError::Vulkan(e)))?;

        // ─────────────────────────────────────────────────────────────────────
        // SUBMIT
        // ─────────────────────────────────────────────────────────────────────
        backend.submit().map_err(FrameError::Submit)?;
        self.enter(FrameState::Submitted);

        // ─────────────────────────────────────────────────────────────────────
        // PRESENT
        // ─────────────────────────────────────────────────────────────────────
        self.enter(FrameState::Presenting);
        let present_suboptimal = backend.present(image_index).map_err(FrameError::Present)?;

        Ok(FrameOutcome::Presented {
            image_index,
            suboptimal: acquire_suboptimal || present_suboptimal,
        })
    }
}

impl Default for FrameSynchronizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{compose, Sprite, Vertex, PLAYER_COLOR};
    use crate::sim::KinematicBody;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Call {
        Wait,
        Acquire,
        ResetFence,
        Upload,
        Record(u32, u32),
        Submit,
        Present(u32),
    }

    /// Scripted backend that also models the GPU owning the buffers
    /// between submit and the next fence wait.
    struct MockBackend {
        calls: Vec<Call>,
        extent: vk::Extent2D,
        wait_result: VkResult<()>,
        acquire_result: VkResult<(u32, bool)>,
        upload_capacity: usize,
        submit_result: VkResult<()>,
        present_result: VkResult<bool>,
        gpu_busy: bool,
        fence_signaled: bool,
    }

    impl MockBackend {
        fn new() -> Self {
            Self {
                calls: Vec::new(),
                extent: vk::Extent2D { width: 800, height: 600 },
                wait_result: Ok(()),
                acquire_result: Ok((1, false)),
                upload_capacity: 64,
                submit_result: Ok(()),
                present_result: Ok(false),
                gpu_busy: false,
                fence_signaled: true,
            }
        }

        fn count(&self, call: Call) -> usize {
            self.calls.iter().filter(|&&c| c == call).count()
        }
    }

    impl FrameBackend for MockBackend {
        fn wait_for_frame_fence(&mut self, _timeout_ns: u64) -> VkResult<()> {
            self.calls.push(Call::Wait);
            self.wait_result?;
            // The GPU finishes whatever was submitted
            self.gpu_busy = false;
            assert!(self.fence_signaled, "waiting on an unsignaled fence with no work queued");
            Ok(())
        }

        fn surface_extent(&self) -> vk::Extent2D {
            self.extent
        }

        fn acquire_next_image(&mut self, _timeout_ns: u64) -> VkResult<(u32, bool)> {
            self.calls.push(Call::Acquire);
            self.acquire_result
        }

        fn reset_frame_fence(&mut self) -> VkResult<()> {
            self.calls.push(Call::ResetFence);
            self.fence_signaled = false;
            Ok(())
        }

        fn upload_scene(&mut self, scene: &SceneFrame) -> Result<(), RecordError> {
            self.calls.push(Call::Upload);
            assert!(!self.gpu_busy, "vertex buffer written while the GPU may read it");
            if scene.vertices.len() > self.upload_capacity {
                return Err(RecordError::GeometryOverflow {
                    needed: scene.vertices.len(),
                    capacity: self.upload_capacity,
                });
            }
            Ok(())
        }

        fn record_commands(&mut self, image_index: u32, vertex_count: u32) -> VkResult<()> {
            self.calls.push(Call::Record(image_index, vertex_count));
            Ok(())
        }

        fn submit(&mut self) -> VkResult<()> {
            self.calls.push(Call::Submit);
            self.submit_result?;
            self.gpu_busy = true;
            self.fence_signaled = true;
            Ok(())
        }

        fn present(&mut self, image_index: u32) -> VkResult<bool> {
            self.calls.push(Call::Present(image_index));
            self.present_result
        }
    }

    fn player_scene() -> SceneFrame {
        let sprite = Sprite {
            body: KinematicBody::new(-0.8, -0.5, 0.2, 0.2),
            color: PLAYER_COLOR,
            depth: 0.1,
        };
        compose(&[], [&sprite])
    }

    #[test]
    fn test_full_frame_order() {
        let mut backend = MockBackend::new();
        let mut sync = FrameSynchronizer::new();

        let outcome = sync.run_frame(&mut backend, &player_scene()).unwrap();

        assert_eq!(
            outcome,
            FrameOutcome::Presented { image_index: 1, suboptimal: false }
        );
        assert_eq!(
            backend.calls,
            vec![
                Call::Wait,
                Call::Acquire,
                Call::ResetFence,
                Call::Upload,
                Call::Record(1, 6),
                Call::Submit,
                Call::Present(1),
            ]
        );
        assert_eq!(sync.state(), FrameState::Idle);
        assert_eq!(sync.frames_presented(), 1);
    }

    #[test]
    fn test_zero_area_skips_without_reset() {
        let mut backend = MockBackend::new();
        backend.extent = vk::Extent2D { width: 0, height: 600 };
        let mut sync = FrameSynchronizer::new();

        let outcome = sync.run_frame(&mut backend, &player_scene()).unwrap();

        assert_eq!(outcome, FrameOutcome::Skipped(SkipReason::ZeroArea));
        assert_eq!(backend.calls, vec![Call::Wait]);
        assert!(backend.fence_signaled);
        assert_eq!(sync.state(), FrameState::Idle);
    }

    #[test]
    fn test_recovers_after_minimize() {
        let mut backend = MockBackend::new();
        let mut sync = FrameSynchronizer::new();
        let scene = player_scene();

        backend.extent = vk::Extent2D { width: 0, height: 0 };
        for _ in 0..3 {
            assert_eq!(
                sync.run_frame(&mut backend, &scene).unwrap(),
                FrameOutcome::Skipped(SkipReason::ZeroArea)
            );
        }

        // The fence is still signaled, so the next wait does not hang
        backend.extent = vk::Extent2D { width: 640, height: 480 };
        assert!(matches!(
            sync.run_frame(&mut backend, &scene).unwrap(),
            FrameOutcome::Presented { .. }
        ));
        assert_eq!(sync.frames_skipped(), 3);
        assert_eq!(sync.frames_presented(), 1);
    }

    #[test]
    fn test_fence_reset_iff_acquired() {
        let mut backend = MockBackend::new();
        let mut sync = FrameSynchronizer::new();
        let scene = player_scene();

        let script: [(u32, VkResult<(u32, bool)>); 6] = [
            (800, Ok((0, false))),
            (0, Ok((1, false))),
            (800, Err(vk::Result::TIMEOUT)),
            (800, Ok((2, true))),
            (800, Err(vk::Result::NOT_READY)),
            (800, Ok((0, false))),
        ];

        let mut acquired = 0;
        for (width, acquire) in script {
            backend.extent = vk::Extent2D { width, height: 600 };
            backend.acquire_result = acquire;
            let resets_before = backend.count(Call::ResetFence);

            let outcome = sync.run_frame(&mut backend, &scene).unwrap();

            let reset = backend.count(Call::ResetFence) > resets_before;
            let presented = matches!(outcome, FrameOutcome::Presented { .. });
            assert_eq!(reset, presented);
            if presented {
                acquired += 1;
            }
        }

        assert_eq!(acquired, 3);
        assert_eq!(backend.count(Call::ResetFence), 3);
    }

    #[test]
    fn test_wait_failure_is_fatal() {
        let mut backend = MockBackend::new();
        backend.wait_result = Err(vk::Result::ERROR_DEVICE_LOST);
        let mut sync = FrameSynchronizer::new();

        let err = sync.run_frame(&mut backend, &player_scene()).unwrap_err();

        assert_eq!(err.stage(), FrameStage::Wait);
        assert!(!err.is_recoverable());
        assert_eq!(backend.calls, vec![Call::Wait]);
        assert_eq!(sync.state(), FrameState::Idle);
    }

    #[test]
    fn test_wait_timeout_skips() {
        let mut backend = MockBackend::new();
        backend.wait_result = Err(vk::Result::TIMEOUT);
        let mut sync = FrameSynchronizer::new();

        let outcome = sync.run_frame(&mut backend, &player_scene()).unwrap();
        assert_eq!(outcome, FrameOutcome::Skipped(SkipReason::FenceTimeout));
        assert_eq!(backend.calls, vec![Call::Wait]);
    }

    #[test]
    fn test_acquire_errors() {
        let mut sync = FrameSynchronizer::new();

        let mut backend = MockBackend::new();
        backend.acquire_result = Err(vk::Result::ERROR_OUT_OF_DATE_KHR);
        let err = sync.run_frame(&mut backend, &player_scene()).unwrap_err();
        assert_eq!(err.stage(), FrameStage::Acquire);
        assert!(err.is_recoverable());
        assert_eq!(backend.count(Call::ResetFence), 0);

        let mut backend = MockBackend::new();
        backend.acquire_result = Err(vk::Result::ERROR_SURFACE_LOST_KHR);
        let err = sync.run_frame(&mut backend, &player_scene()).unwrap_err();
        assert_eq!(err.stage(), FrameStage::Acquire);
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_overflow_fails_recording_before_submit() {
        let mut backend = MockBackend::new();
        backend.upload_capacity = 3;
        let mut sync = FrameSynchronizer::new();

        let err = sync.run_frame(&mut backend, &player_scene()).unwrap_err();

        assert_eq!(err.stage(), FrameStage::Record);
        assert!(matches!(
            err,
            FrameError::Record(RecordError::GeometryOverflow { needed: 6, capacity: 3 })
        ));
        assert_eq!(backend.count(Call::Submit), 0);
        assert_eq!(backend.count(Call::Present(1)), 0);
    }

    #[test]
    fn test_submit_failure_is_fatal() {
        let mut backend = MockBackend::new();
        backend.submit_result = Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        let mut sync = FrameSynchronizer::new();

        let err = sync.run_frame(&mut backend, &player_scene()).unwrap_err();
        assert_eq!(err.stage(), FrameStage::Submit);
        assert!(!err.is_recoverable());
        assert_eq!(backend.count(Call::Present(1)), 0);
    }

    #[test]
    fn test_present_results() {
        let mut sync = FrameSynchronizer::new();

        let mut backend = MockBackend::new();
        backend.present_result = Ok(true);
        assert_eq!(
            sync.run_frame(&mut backend, &player_scene()).unwrap(),
            FrameOutcome::Presented { image_index: 1, suboptimal: true }
        );

        let mut backend = MockBackend::new();
        backend.present_result = Err(vk::Result::ERROR_OUT_OF_DATE_KHR);
        let err = sync.run_frame(&mut backend, &player_scene()).unwrap_err();
        assert_eq!(err.stage(), FrameStage::Present);
        assert!(err.is_recoverable());

        let mut backend = MockBackend::new();
        backend.present_result = Err(vk::Result::ERROR_DEVICE_LOST);
        let err = sync.run_frame(&mut backend, &player_scene()).unwrap_err();
        assert!(!err.is_recoverable());
        assert_eq!(err.to_string(), format!("presenting failed: {}", vk::Result::ERROR_DEVICE_LOST));
    }

    #[test]
    fn test_consecutive_frames_never_write_busy_buffer() {
        let mut backend = MockBackend::new();
        let mut sync = FrameSynchronizer::new();
        let mut scene = player_scene();

        for i in 0..10u32 {
            backend.acquire_result = Ok((i % 3, false));
            scene.vertices.push(Vertex::new([0.0; 3], [0.0; 3]));
            sync.run_frame(&mut backend, &scene).unwrap();
        }

        assert_eq!(sync.frames_presented(), 10);
        assert_eq!(backend.count(Call::Wait), 10);
    }
}
