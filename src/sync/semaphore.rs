use anyhow::Result;
use ash::vk;

use crate::Device;

/// Wrapper around a [`VkSemaphore`](vk::Semaphore) object. Semaphores are used for GPU-GPU sync.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Semaphore {
    #[derivative(Debug = "ignore")]
    device: Device,
    handle: vk::Semaphore,
}

impl Semaphore {
    /// Create a new binary `VkSemaphore` object.
    pub fn new(device: Device) -> Result<Self> {
        let info = vk::SemaphoreCreateInfo::default();
        let handle = unsafe { device.create_semaphore(&info, None)? };
        #[cfg(feature = "log-objects")]
        trace!("Created new VkSemaphore {handle:p}");
        Ok(Semaphore {
            device,
            handle,
        })
    }

    /// Get unsafe access to the underlying `VkSemaphore` handle.
    /// # Safety
    /// The semaphore must not be destroyed through this handle.
    pub unsafe fn handle(&self) -> vk::Semaphore {
        self.handle
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkSemaphore {:p}", self.handle);
        unsafe {
            self.device.destroy_semaphore(self.handle, None);
        }
    }
}
