use anyhow::Result;
use ash::vk;

use crate::allocator::memory_type::MemoryType;

/// A source of device memory. Implementations must be cheap to clone, since every resource keeps a handle
/// to its allocator so it can return its memory on drop.
pub trait Allocator: Clone + Send + Sync {
    /// Allocation type returned by this allocator.
    type Allocation: Allocation;

    /// Allocate memory satisfying `requirements` in the given memory type. `name` is only used for debugging.
    fn allocate(&mut self, name: &str, requirements: &vk::MemoryRequirements, ty: MemoryType) -> Result<Self::Allocation>;
    /// Return an allocation to the allocator. Dropping the allocation has the same effect.
    fn free(&mut self, allocation: Self::Allocation) -> Result<()>;
}

/// A block of device memory owned by a single resource.
pub trait Allocation: Default {
    /// Get unsafe access to the underlying memory object.
    /// # Safety
    /// The memory must not be freed, and only the range starting at [`Allocation::offset()`] may be used.
    unsafe fn memory(&self) -> vk::DeviceMemory;
    /// Offset of this allocation inside [`Allocation::memory()`].
    fn offset(&self) -> vk::DeviceSize;
}
