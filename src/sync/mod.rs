//! The sync module provides thin wrappers around the Vulkan synchronization primitives used to pace frames.
//!
//! - The [`fence`] module wraps `VkFence` objects, used for CPU-GPU sync.
//! - The [`semaphore`] module wraps `VkSemaphore` objects, used for GPU-GPU sync.
//!
//! Synchronization between subpasses of a render pass is derived from image usages, see the [`pass`](crate::pass) module.

pub mod fence;
pub mod semaphore;
