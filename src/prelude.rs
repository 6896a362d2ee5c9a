pub use ash::vk;

pub use crate::core::app_info::*;
pub use crate::core::debug::DebugMessenger;
pub use crate::core::device::Device;
pub use crate::core::error::Error;
pub use crate::core::init::*;
pub use crate::core::instance::Instance;
pub use crate::core::physical_device::PhysicalDevice;
pub use crate::core::queue::{Queue, QueueInfo, QueueType};

pub use crate::allocator::default_allocator::DefaultAllocator;
pub use crate::allocator::memory_type::MemoryType;
pub use crate::allocator::traits::*;

pub use crate::command_buffer::command_pool::CommandPool;

pub use crate::sync::fence::Fence;
pub use crate::sync::semaphore::Semaphore;

pub use crate::resource::image::*;
pub use crate::resource::shared_cache::{Shared, SharedCache};

pub use crate::pass::base::{BasePass, ImageUsagesInfo, PassKind};
pub use crate::pass::compute::{ComputeOp, ComputePass, ImageBarrier};
pub use crate::pass::graphics::GraphicsPass;
pub use crate::pass::render_pass::{
    Attachment, AttachmentOps, ImageResolver, RenderOp, RenderPass, RenderPassBuilder, SubpassAccess,
    SubpassAttachments, SubpassDependency,
};
pub use crate::pass::usage::*;
pub use crate::pass::Pass;

pub use crate::wsi::context::WindowContext;
pub use crate::wsi::frame::*;
pub use crate::wsi::surface::Surface;
pub use crate::wsi::swapchain::{Swapchain, SwapchainConfig};
pub use crate::wsi::window::*;
