//! Exposes different memory types that determine where memory allocations should live.

/// The memory type of an allocation indicates where it should live.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum MemoryType {
    /// Device local memory. Attachments and textures live here.
    GpuOnly,
    /// Host visible memory used to upload data, for example per-frame uniforms.
    CpuToGpu,
    /// Memory useful for CPU readback of data.
    GpuToCpu,
}

impl From<MemoryType> for gpu_allocator::MemoryLocation {
    fn from(value: MemoryType) -> Self {
        match value {
            MemoryType::GpuOnly => gpu_allocator::MemoryLocation::GpuOnly,
            MemoryType::CpuToGpu => gpu_allocator::MemoryLocation::CpuToGpu,
            MemoryType::GpuToCpu => gpu_allocator::MemoryLocation::GpuToCpu,
        }
    }
}
