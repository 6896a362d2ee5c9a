//! Memory allocation for images owned by deimos, such as multisampled color targets.
//!
//! Resources in deimos each own exactly one allocation. The [`Allocator`](traits::Allocator) trait abstracts over
//! the allocation backend, and [`DefaultAllocator`](default_allocator::DefaultAllocator) implements it on top of the
//! `gpu_allocator` crate.

pub mod default_allocator;
pub mod memory_type;
pub mod traits;
