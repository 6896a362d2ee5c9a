//! Contains all the logic responsible for pacing frames and synchronizing them with presentation.
//!
//! A [`FrameSynchronizer`] owns a fixed number of frame slots. Each slot has its own command buffer, fence and pair of
//! semaphores, so the CPU can record a frame while the GPU is still executing up to `N - 1` earlier ones. The fence of a
//! slot is the only thing the CPU ever waits on, which bounds how far it can run ahead of the GPU.
//!
//! The synchronizer does not talk to Vulkan directly, but to a [`FrameBackend`]. The real backend is
//! [`WindowContext`](crate::WindowContext).
//!
//! # Example
//! ```no_run
//! # use deimos::*;
//! # use anyhow::Result;
//! # fn frame_loop(ctx: &mut WindowContext, window: &dyn Window, render_pass: &RenderPass) -> Result<()> {
//! let frames_in_flight = ctx.frames_in_flight();
//! let mut frames = FrameSynchronizer::new(ctx, frames_in_flight)?;
//! loop {
//!     let status = frames.draw_next_frame(
//!         ctx,
//!         |_frame| {
//!             // Update uniform buffers of this frame slot.
//!             Ok(())
//!         },
//!         |cmd, framebuffer| {
//!             let mut ops: Vec<RenderOp> = vec![Box::new(|_cmd| Ok(()))];
//!             render_pass.run(cmd, framebuffer, &mut ops)
//!         },
//!     )?;
//!     if status == FrameStatus::NeedsRecreate {
//!         ctx.recreate(window)?;
//!         // Rebuild the render pass here.
//!     }
//! }
//! # }
//! ```

use anyhow::Result;

use crate::Error;

/// The default number of frames in flight. With two frames in flight, we can prepare a frame on the CPU while one
/// frame is rendering on the GPU. This gives a good amount of parallelization while avoiding input lag.
pub const FRAMES_IN_FLIGHT: usize = 2;

/// Result of a frame that did not fail.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FrameStatus {
    /// The frame was submitted and presented.
    Success,
    /// The swapchain no longer matches the surface. The swapchain and everything derived from it has to be recreated
    /// before the next frame.
    NeedsRecreate,
}

/// Result of acquiring a swapchain image.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum AcquireOutcome {
    /// An image was acquired. It can still be rendered to if the swapchain is suboptimal.
    Acquired {
        /// Index of the image within the swapchain.
        index: u32,
        /// The swapchain should be recreated after this frame.
        suboptimal: bool,
    },
    /// No image was acquired, the swapchain must be recreated.
    OutOfDate,
}

/// Result of presenting a swapchain image.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PresentOutcome {
    /// The image was queued for presentation.
    Presented {
        /// The swapchain should be recreated.
        suboptimal: bool,
    },
    /// The swapchain must be recreated.
    OutOfDate,
}

/// Operations the [`FrameSynchronizer`] needs from the GPU and the presentation engine.
pub trait FrameBackend {
    /// Signaled by the GPU when a submission completes, waited on by the CPU.
    type Fence;
    /// Orders operations on the GPU.
    type Semaphore;
    /// Handle to a command buffer.
    type CommandBuffer: Copy;

    /// Create a fence, optionally already signaled.
    fn create_fence(&mut self, signaled: bool) -> Result<Self::Fence>;
    /// Create a semaphore.
    fn create_semaphore(&mut self) -> Result<Self::Semaphore>;
    /// Allocate a command buffer that can be reset and recorded again every frame.
    fn allocate_command_buffer(&mut self) -> Result<Self::CommandBuffer>;
    /// Block until the fence is signaled.
    fn wait_fence(&mut self, fence: &Self::Fence) -> Result<()>;
    /// Put the fence back in the unsignaled state.
    fn reset_fence(&mut self, fence: &Self::Fence) -> Result<()>;
    /// Acquire the next swapchain image. `signal` is signaled once the image can be written to.
    fn acquire_image(&mut self, signal: &Self::Semaphore) -> Result<AcquireOutcome>;
    /// Reset the command buffer and start recording.
    fn begin(&mut self, cmd: Self::CommandBuffer) -> Result<()>;
    /// Finish recording.
    fn end(&mut self, cmd: Self::CommandBuffer) -> Result<()>;
    /// Submit to the graphics queue. The submission waits on `wait` before writing color attachments, signals `signal`
    /// and `fence` when done.
    fn submit(
        &mut self,
        cmd: Self::CommandBuffer,
        wait: &Self::Semaphore,
        signal: &Self::Semaphore,
        fence: &Self::Fence,
    ) -> Result<()>;
    /// Present the swapchain image at `image_index` after `wait` is signaled.
    fn present(&mut self, image_index: u32, wait: &Self::Semaphore) -> Result<PresentOutcome>;
}

/// Where a frame slot is in its life cycle.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SlotState {
    /// The slot is not used by the GPU and can be recorded into.
    Idle,
    /// Commands are being recorded into the slot's command buffer.
    Recording,
    /// The slot's commands were submitted and may still be executing.
    Submitted,
}

#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
struct FrameSlot<B: FrameBackend> {
    #[derivative(Debug = "ignore")]
    command_buffer: B::CommandBuffer,
    #[derivative(Debug = "ignore")]
    image_available: B::Semaphore,
    #[derivative(Debug = "ignore")]
    render_finished: B::Semaphore,
    #[derivative(Debug = "ignore")]
    fence: B::Fence,
    state: SlotState,
}

/// Drives frames in flight, see the [module level documentation](self).
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct FrameSynchronizer<B: FrameBackend> {
    slots: Vec<FrameSlot<B>>,
    current: usize,
}

impl<B: FrameBackend> FrameSynchronizer<B> {
    /// Create `frames_in_flight` frame slots. Fences start signaled, so the first use of every slot does not wait.
    pub fn new(backend: &mut B, frames_in_flight: usize) -> Result<Self> {
        if frames_in_flight == 0 {
            return Err(Error::Uncategorized("At least one frame in flight is required").into());
        }
        let slots = (0..frames_in_flight)
            .map(|_| -> Result<FrameSlot<B>> {
                Ok(FrameSlot {
                    command_buffer: backend.allocate_command_buffer()?,
                    image_available: backend.create_semaphore()?,
                    render_finished: backend.create_semaphore()?,
                    fence: backend.create_fence(true)?,
                    state: SlotState::Idle,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            slots,
            current: 0,
        })
    }

    /// Number of frame slots.
    pub fn frames_in_flight(&self) -> usize {
        self.slots.len()
    }

    /// Slot that [`draw_next_frame`](Self::draw_next_frame) uses next.
    pub fn current_frame(&self) -> usize {
        self.current
    }

    /// State of a frame slot.
    pub fn slot_state(&self, frame: usize) -> Result<SlotState> {
        self.slots
            .get(frame)
            .map(|slot| slot.state)
            .ok_or_else(|| self.out_of_range(frame))
    }

    fn out_of_range(&self, frame: usize) -> anyhow::Error {
        Error::FrameOutOfRange {
            index: frame,
            count: self.slots.len(),
        }
        .into()
    }

    /// Render and present one frame using frame slot `frame`.
    ///
    /// `update` is called with the frame slot index once the slot is no longer in use by the GPU, so per-frame data
    /// can be written safely. `draw` records commands into the slot's command buffer. It receives the index of the
    /// acquired swapchain image, which is the framebuffer to render into.
    ///
    /// If the swapchain is out of date, nothing is submitted and [`FrameStatus::NeedsRecreate`] is returned.
    /// If recording fails, nothing is submitted either and the slot can be used again. The acquired image is not
    /// presented in that case, so the swapchain should be recreated before the next frame.
    pub fn draw_frame<U, D>(&mut self, backend: &mut B, frame: usize, update: U, draw: D) -> Result<FrameStatus>
    where
        U: FnOnce(usize) -> Result<()>,
        D: FnOnce(B::CommandBuffer, usize) -> Result<()>, {
        let count = self.slots.len();
        let slot = self.slots.get_mut(frame).ok_or(Error::FrameOutOfRange { index: frame, count })?;

        backend.wait_fence(&slot.fence)?;
        slot.state = SlotState::Idle;

        let (image_index, suboptimal) = match backend.acquire_image(&slot.image_available)? {
            AcquireOutcome::Acquired { index, suboptimal } => (index, suboptimal),
            AcquireOutcome::OutOfDate => return Ok(FrameStatus::NeedsRecreate),
        };

        slot.state = SlotState::Recording;
        if let Err(e) = record(backend, slot.command_buffer, frame, image_index as usize, update, draw) {
            slot.state = SlotState::Idle;
            return Err(e);
        }

        // Only reset once we know something will be submitted, or the next wait on this slot never returns.
        backend.reset_fence(&slot.fence)?;
        backend.submit(slot.command_buffer, &slot.image_available, &slot.render_finished, &slot.fence)?;
        slot.state = SlotState::Submitted;

        let presented = backend.present(image_index, &slot.render_finished)?;
        match presented {
            PresentOutcome::Presented { suboptimal: false } if !suboptimal => Ok(FrameStatus::Success),
            _ => {
                debug!("Swapchain needs to be recreated after frame {frame}");
                Ok(FrameStatus::NeedsRecreate)
            }
        }
    }

    /// Render a frame using the next slot in round robin order. See [`draw_frame`](Self::draw_frame).
    pub fn draw_next_frame<U, D>(&mut self, backend: &mut B, update: U, draw: D) -> Result<FrameStatus>
    where
        U: FnOnce(usize) -> Result<()>,
        D: FnOnce(B::CommandBuffer, usize) -> Result<()>, {
        let frame = self.current;
        self.current = (self.current + 1) % self.slots.len();
        self.draw_frame(backend, frame, update, draw)
    }

    /// Wait until the GPU finished every submitted frame.
    pub fn wait_all(&mut self, backend: &mut B) -> Result<()> {
        for slot in &mut self.slots {
            if slot.state == SlotState::Submitted {
                backend.wait_fence(&slot.fence)?;
                slot.state = SlotState::Idle;
            }
        }
        Ok(())
    }
}

fn record<B, U, D>(backend: &mut B, cmd: B::CommandBuffer, frame: usize, image_index: usize, update: U, draw: D) -> Result<()>
where
    B: FrameBackend,
    U: FnOnce(usize) -> Result<()>,
    D: FnOnce(B::CommandBuffer, usize) -> Result<()>, {
    backend.begin(cmd)?;
    update(frame)?;
    draw(cmd, image_index)?;
    backend.end(cmd)
}

/// One value per frame slot, for data that is written by the CPU while earlier frames are still read by the GPU.
/// Index it with the frame slot passed to the update callback of [`FrameSynchronizer::draw_frame`].
#[derive(Debug, Clone)]
pub struct PerFrame<T> {
    items: Vec<T>,
}

impl<T> PerFrame<T> {
    /// Create `count` values, calling `init` with the index of every slot.
    pub fn new(count: usize, init: impl FnMut(usize) -> Result<T>) -> Result<Self> {
        Ok(Self {
            items: (0..count).map(init).collect::<Result<Vec<_>>>()?,
        })
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether there are no slots.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Value of slot `frame`.
    pub fn get(&self, frame: usize) -> Result<&T> {
        let count = self.items.len();
        self.items
            .get(frame)
            .ok_or_else(|| Error::FrameOutOfRange { index: frame, count }.into())
    }

    /// Mutable value of slot `frame`.
    pub fn get_mut(&mut self, frame: usize) -> Result<&mut T> {
        let count = self.items.len();
        self.items
            .get_mut(frame)
            .ok_or_else(|| Error::FrameOutOfRange { index: frame, count }.into())
    }

    /// Iterate over all values in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}
