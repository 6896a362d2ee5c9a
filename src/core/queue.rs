use ash::vk;

use crate::{Device, Error};
use anyhow::Result;

/// Abstraction over vulkan queue capabilities. Note that in raw Vulkan, there is no 'Graphics queue'. Deimos will expose one, but behind the scenes the exposed
/// e.g. graphics queue and transfer could point to the same hardware queue.
#[derive(Copy, Clone, Default, Debug, Eq, PartialEq)]
pub enum QueueType {
    #[default]
    Graphics = vk::QueueFlags::GRAPHICS.as_raw() as isize,
    Compute = vk::QueueFlags::COMPUTE.as_raw() as isize,
    Transfer = vk::QueueFlags::TRANSFER.as_raw() as isize,
}

/// Stores all information of a queue that was found on the physical device.
#[derive(Default, Debug, Copy, Clone)]
pub struct QueueInfo {
    /// Functionality that this queue provides.
    pub queue_type: QueueType,
    /// Whether this is a dedicated queue or not.
    pub dedicated: bool,
    /// Whether this queue is capable of presenting to a surface.
    pub can_present: bool,
    /// The queue family index.
    pub family_index: u32,
    /// All supported operations on this queue, instead of its primary type.
    pub flags: vk::QueueFlags,
}

/// Exposes a command queue on the device. Queues in deimos are only used from the thread that drives
/// frames, so no locking is done here.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Queue {
    #[derivative(Debug = "ignore")]
    device: Device,
    handle: vk::Queue,
    family_index: u32,
}

impl Queue {
    /// Obtain the first queue of a family that was created together with the device.
    pub fn new(device: Device, family_index: u32) -> Result<Self> {
        if !device.queue_families().contains(&family_index) {
            return Err(Error::NoCapableQueue.into());
        }
        let handle = unsafe { device.get_device_queue(family_index, 0) };
        Ok(Queue {
            device,
            handle,
            family_index,
        })
    }

    /// Submits a batch of submissions to the queue, and signals the given fence when the
    /// submission is done
    /// # Safety
    /// All handles referenced by `submits` must be valid and the command buffers must be fully recorded.
    pub unsafe fn submit(&self, submits: &[vk::SubmitInfo], fence: vk::Fence) -> Result<()> {
        self.device
            .queue_submit(self.handle, submits, fence)
            .map_err(|e| Error::from(e).into())
    }

    /// Obtain the raw vulkan handle of a queue.
    /// # Safety
    /// Submitting to this handle from outside of deimos must be externally synchronized.
    pub unsafe fn handle(&self) -> vk::Queue {
        self.handle
    }

    /// Family this queue belongs to.
    pub fn family_index(&self) -> u32 {
        self.family_index
    }
}
