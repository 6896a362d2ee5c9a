use std::slice;
use std::time::Duration;

use anyhow::Result;
use ash::vk;

use crate::{Device, Error};

/// Wrapper around a [`VkFence`](vk::Fence) object. Fences are used for CPU-GPU sync.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Fence {
    #[derivative(Debug = "ignore")]
    device: Device,
    handle: vk::Fence,
}

impl Fence {
    /// Create a new fence, possibly in the signaled status.
    pub fn new(device: Device, signaled: bool) -> Result<Self> {
        let info = vk::FenceCreateInfo {
            flags: if signaled {
                vk::FenceCreateFlags::SIGNALED
            } else {
                vk::FenceCreateFlags::empty()
            },
            ..Default::default()
        };
        let handle = unsafe { device.create_fence(&info, None)? };
        #[cfg(feature = "log-objects")]
        trace!("Created new VkFence {handle:p}");
        Ok(Fence {
            device,
            handle,
        })
    }

    /// Blocks until the fence is signaled. Running out of time is reported as [`Error::Timeout`].
    pub fn wait(&self, timeout: Duration) -> Result<()> {
        let nanos = u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX);
        match unsafe { self.device.wait_for_fences(slice::from_ref(&self.handle), true, nanos) } {
            Ok(()) => Ok(()),
            Err(vk::Result::TIMEOUT) => Err(Error::Timeout("fence").into()),
            Err(e) => Err(Error::from(e).into()),
        }
    }

    /// Resets a fence to the unsignaled status.
    pub fn reset(&self) -> Result<()> {
        unsafe { self.device.reset_fences(slice::from_ref(&self.handle)) }.map_err(|e| Error::from(e).into())
    }

    /// Get unsafe access to the underlying `VkFence` handle.
    /// # Safety
    /// The fence must not be destroyed through this handle.
    pub unsafe fn handle(&self) -> vk::Fence {
        self.handle
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkFence {:p}", self.handle);
        unsafe {
            self.device.destroy_fence(self.handle, None);
        }
    }
}
