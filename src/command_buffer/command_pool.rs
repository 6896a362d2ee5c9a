use anyhow::Result;
use ash::vk;

use crate::{Device, Error};

/// Wrapper around a [`VkCommandPool`](vk::CommandPool). Command buffers allocated from the pool are freed
/// together with it.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct CommandPool {
    #[derivative(Debug = "ignore")]
    device: Device,
    handle: vk::CommandPool,
}

impl CommandPool {
    /// Create a command pool for a queue family.
    pub fn new(device: Device, family: u32, flags: vk::CommandPoolCreateFlags) -> Result<Self> {
        let info = vk::CommandPoolCreateInfo {
            flags,
            queue_family_index: family,
            ..Default::default()
        };
        let handle = unsafe { device.create_command_pool(&info, None)? };
        #[cfg(feature = "log-objects")]
        trace!("Created new VkCommandPool {handle:p}");

        Ok(CommandPool {
            device,
            handle,
        })
    }

    /// Allocate `count` primary command buffers.
    pub fn allocate_primary(&self, count: u32) -> Result<Vec<vk::CommandBuffer>> {
        let info = vk::CommandBufferAllocateInfo {
            command_pool: self.handle,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: count,
            ..Default::default()
        };
        Ok(unsafe { self.device.allocate_command_buffers(&info)? })
    }

    /// Reset a command buffer allocated from this pool and put it in the recording state.
    /// # Safety
    /// The command buffer must not be pending execution on the device.
    pub unsafe fn begin(&self, cmd: vk::CommandBuffer) -> Result<()> {
        self.device
            .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
            .map_err(Error::from)?;
        let info = vk::CommandBufferBeginInfo {
            flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            ..Default::default()
        };
        self.device.begin_command_buffer(cmd, &info).map_err(Error::from)?;
        Ok(())
    }

    /// Finish recording a command buffer.
    /// # Safety
    /// The command buffer must be in the recording state.
    pub unsafe fn end(&self, cmd: vk::CommandBuffer) -> Result<()> {
        self.device.end_command_buffer(cmd).map_err(Error::from)?;
        Ok(())
    }

    /// Get unsafe access to the underlying `VkCommandPool` handle.
    /// # Safety
    /// The pool must not be destroyed through this handle.
    pub unsafe fn handle(&self) -> vk::CommandPool {
        self.handle
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkCommandPool {:p}", self.handle);
        unsafe {
            self.device.destroy_command_pool(self.handle, None);
        }
    }
}
