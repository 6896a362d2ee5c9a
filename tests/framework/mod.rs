#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};

use anyhow::{bail, Result};

use deimos::{
    vk, AcquireOutcome, AppBuilder, AttachmentImage, DefaultAllocator, Device, FrameBackend, GPURequirements,
    Instance, PhysicalDevice, PresentOutcome, QueueRequest, QueueType, Usage, UsageHistory,
};

pub fn init_logging() {
    let _ = pretty_env_logger::try_init();
}

/// Headless deimos context for tests that need a real device.
pub struct Context {
    pub allocator: DefaultAllocator,
    pub device: Device,
    pub phys_device: PhysicalDevice,
    pub instance: Instance,
}

pub fn make_context() -> Result<Context> {
    init_logging();
    let settings = AppBuilder::new()
        .name("deimos test framework")
        .version((0, 0, 1))
        .validation(false)
        .gpu(GPURequirements {
            queues: vec![QueueRequest {
                dedicated: false,
                queue_type: QueueType::Graphics,
            }],
            ..Default::default()
        })
        .build();
    let (instance, phys_device, None, device, allocator, None) = deimos::initialize(&settings)? else {
        panic!("test framework: requested headless non-debug context but got debug context or a window.");
    };
    Ok(Context {
        allocator,
        device,
        phys_device,
        instance,
    })
}

/// Attachment image description with a null view, for render pass builders that are never built.
pub fn attachment(width: u32, height: u32) -> AttachmentImage {
    AttachmentImage {
        view: vk::ImageView::null(),
        format: vk::Format::R8G8B8A8_UNORM,
        samples: vk::SampleCountFlags::TYPE_1,
        extent: vk::Extent2D { width, height },
    }
}

/// History of an image that starts out undefined and is rendered to in subpasses `first..=last`.
pub fn render_target_history(first: u32, last: u32) -> UsageHistory {
    UsageHistory::new(Usage::undefined()).add_usage_range(first, last, Usage::render_target())
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct MockFence(pub usize);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct MockSemaphore(pub usize);

/// Everything the mock backend was asked to do, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    WaitFence(MockFence),
    /// The GPU finished the submission guarded by this fence while the CPU waited on it.
    Completed(MockFence),
    ResetFence(MockFence),
    Acquire { signal: MockSemaphore, image: Option<u32> },
    Begin(usize),
    End(usize),
    Submit {
        cmd: usize,
        wait: MockSemaphore,
        signal: MockSemaphore,
        fence: MockFence,
    },
    Present { image: u32, wait: MockSemaphore },
}

#[derive(Debug, Default)]
struct FenceState {
    signaled: bool,
    pending: bool,
}

/// Frame backend that simulates a GPU which only finishes work when the CPU waits on it.
/// Misuse that would hang or be invalid on a real device is reported as an error.
#[derive(Debug, Default)]
pub struct MockBackend {
    pub events: Vec<Event>,
    pub acquire_script: VecDeque<AcquireOutcome>,
    pub present_script: VecDeque<PresentOutcome>,
    pub image_count: u32,
    pub max_outstanding: usize,
    next_id: usize,
    next_image: u32,
    outstanding: usize,
    fences: HashMap<MockFence, FenceState>,
}

impl MockBackend {
    pub fn new(image_count: u32) -> Self {
        Self {
            image_count,
            ..Default::default()
        }
    }

    fn id(&mut self) -> usize {
        self.next_id += 1;
        self.next_id
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    pub fn submits(&self) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|event| matches!(event, Event::Submit { .. }))
            .collect()
    }

    pub fn position(&self, event: &Event) -> Option<usize> {
        self.events.iter().position(|e| e == event)
    }
}

impl FrameBackend for MockBackend {
    type Fence = MockFence;
    type Semaphore = MockSemaphore;
    type CommandBuffer = usize;

    fn create_fence(&mut self, signaled: bool) -> Result<MockFence> {
        let fence = MockFence(self.id());
        self.fences.insert(
            fence,
            FenceState {
                signaled,
                pending: false,
            },
        );
        Ok(fence)
    }

    fn create_semaphore(&mut self) -> Result<MockSemaphore> {
        Ok(MockSemaphore(self.id()))
    }

    fn allocate_command_buffer(&mut self) -> Result<usize> {
        Ok(self.id())
    }

    fn wait_fence(&mut self, fence: &MockFence) -> Result<()> {
        self.events.push(Event::WaitFence(*fence));
        let Some(state) = self.fences.get_mut(fence) else {
            bail!("unknown fence {fence:?}");
        };
        if state.pending {
            state.pending = false;
            state.signaled = true;
            self.outstanding -= 1;
            self.events.push(Event::Completed(*fence));
        }
        if !state.signaled {
            bail!("waiting on {fence:?} which is never signaled");
        }
        Ok(())
    }

    fn reset_fence(&mut self, fence: &MockFence) -> Result<()> {
        self.events.push(Event::ResetFence(*fence));
        match self.fences.get_mut(fence) {
            Some(state) if !state.pending => {
                state.signaled = false;
                Ok(())
            }
            _ => bail!("resetting {fence:?} while it is in use"),
        }
    }

    fn acquire_image(&mut self, signal: &MockSemaphore) -> Result<AcquireOutcome> {
        let outcome = match self.acquire_script.pop_front() {
            Some(outcome) => outcome,
            None => {
                let index = self.next_image;
                self.next_image = (self.next_image + 1) % self.image_count.max(1);
                AcquireOutcome::Acquired {
                    index,
                    suboptimal: false,
                }
            }
        };
        let image = match outcome {
            AcquireOutcome::Acquired { index, .. } => Some(index),
            AcquireOutcome::OutOfDate => None,
        };
        self.events.push(Event::Acquire { signal: *signal, image });
        Ok(outcome)
    }

    fn begin(&mut self, cmd: usize) -> Result<()> {
        self.events.push(Event::Begin(cmd));
        Ok(())
    }

    fn end(&mut self, cmd: usize) -> Result<()> {
        self.events.push(Event::End(cmd));
        Ok(())
    }

    fn submit(&mut self, cmd: usize, wait: &MockSemaphore, signal: &MockSemaphore, fence: &MockFence) -> Result<()> {
        self.events.push(Event::Submit {
            cmd,
            wait: *wait,
            signal: *signal,
            fence: *fence,
        });
        let Some(state) = self.fences.get_mut(fence) else {
            bail!("unknown fence {fence:?}");
        };
        if state.signaled || state.pending {
            bail!("submitting with {fence:?} which was not reset");
        }
        state.pending = true;
        self.outstanding += 1;
        self.max_outstanding = self.max_outstanding.max(self.outstanding);
        Ok(())
    }

    fn present(&mut self, image: u32, wait: &MockSemaphore) -> Result<PresentOutcome> {
        self.events.push(Event::Present { image, wait: *wait });
        Ok(self
            .present_script
            .pop_front()
            .unwrap_or(PresentOutcome::Presented { suboptimal: false }))
    }
}
