//! Contains a default allocator type based on the [`gpu_allocator`] crate.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use ash::vk::{DeviceMemory, DeviceSize, MemoryRequirements};
use gpu_allocator::vulkan as vk_alloc;
use gpu_allocator::vulkan::AllocationScheme;

use crate::allocator::memory_type::MemoryType;
use crate::allocator::traits;
use crate::{Allocator, Device, Error, Instance, PhysicalDevice};

/// The default allocator. This calls into the `gpu_allocator` crate.
/// The allocator is `Clone`, `Send` and `Sync`, all its internal state is wrapped inside an `Arc<Mutex<T>>`.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct DefaultAllocator {
    #[derivative(Debug = "ignore")]
    alloc: Arc<Mutex<vk_alloc::Allocator>>,
}

/// Allocation returned from the default allocator. The memory is returned to the allocator when this is dropped.
#[derive(Derivative)]
#[derivative(Default, Debug)]
pub struct Allocation {
    // Both are always Some(_) until the allocation is freed.
    allocator: Option<DefaultAllocator>,
    allocation: Option<vk_alloc::Allocation>,
}

impl DefaultAllocator {
    /// Create a new default allocator.
    /// # Errors
    /// * May fail if creating the internal `gpu_allocator` fails.
    pub fn new(instance: &Instance, device: &Device, physical_device: &PhysicalDevice) -> Result<Self> {
        Ok(Self {
            alloc: Arc::new(Mutex::new(vk_alloc::Allocator::new(&vk_alloc::AllocatorCreateDesc {
                instance: (*instance).clone(),
                // SAFETY: The user passed in a valid Device reference.
                device: unsafe { device.handle() },
                // SAFETY: The user passed in a valid PhysicalDevice reference.
                physical_device: unsafe { physical_device.handle() },
                debug_settings: Default::default(),
                buffer_device_address: false,
            })?)),
        })
    }

    fn free_impl(&self, allocation: &mut Allocation) -> Result<()> {
        if let Some(allocation) = allocation.allocation.take() {
            let mut alloc = self.alloc.lock().map_err(|_| Error::PoisonError)?;
            alloc.free(allocation)?;
        }
        Ok(())
    }
}

impl Allocator for DefaultAllocator {
    type Allocation = Allocation;

    fn allocate(&mut self, name: &str, requirements: &MemoryRequirements, ty: MemoryType) -> Result<Self::Allocation> {
        let mut alloc = self.alloc.lock().map_err(|_| Error::PoisonError)?;
        let allocation = alloc.allocate(&vk_alloc::AllocationCreateDesc {
            name,
            requirements: *requirements,
            location: gpu_allocator::MemoryLocation::from(ty),
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?;

        Ok(Allocation {
            allocator: Some(self.clone()),
            allocation: Some(allocation),
        })
    }

    fn free(&mut self, mut allocation: Self::Allocation) -> Result<()> {
        self.free_impl(&mut allocation)
    }
}

impl traits::Allocation for Allocation {
    unsafe fn memory(&self) -> DeviceMemory {
        self.allocation
            .as_ref()
            .map(|allocation| allocation.memory())
            .unwrap_or_default()
    }

    fn offset(&self) -> DeviceSize {
        self.allocation
            .as_ref()
            .map(|allocation| allocation.offset())
            .unwrap_or_default()
    }
}

impl Drop for Allocation {
    fn drop(&mut self) {
        if let Some(allocator) = self.allocator.take() {
            if let Err(e) = allocator.free_impl(self) {
                error!("Failed to free allocation: {e}");
            }
        }
    }
}
