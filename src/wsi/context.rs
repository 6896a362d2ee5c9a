//! The window context bundles everything that depends on the window surface: the swapchain, the queues that render and
//! present, command buffers for every frame slot and an optional multisampled color target. It is the
//! [`FrameBackend`] used to drive frames on a real device.
//!
//! # Example
//! ```no_run
//! # use deimos::*;
//! # use anyhow::Result;
//! # fn setup(window: &dyn Window) -> Result<()> {
//! let settings = AppBuilder::new()
//!     .name("deimos window")
//!     .surface(Some(SurfaceSettings {
//!         surface_format: None,
//!         present_mode: None,
//!         window,
//!     }))
//!     .multisampling(MultisamplingMode::Decent)
//!     .build();
//! let (instance, physical_device, surface, device, allocator, _debug) = initialize(&settings)?;
//! let surface = surface.ok_or(Error::NoWindow)?;
//! let ctx = WindowContext::new(&instance, &physical_device, device, surface, allocator, &settings)?;
//! # Ok(())
//! # }
//! ```

use std::slice;

use anyhow::Result;
use ash::vk;

use crate::command_buffer::command_pool::CommandPool;
use crate::core::queue::QueueType;
use crate::wsi::frame::{AcquireOutcome, FrameBackend, PresentOutcome};
use crate::wsi::swapchain::SwapchainConfig;
use crate::{
    AppSettings, AttachmentImage, DefaultAllocator, Device, Error, Fence, FrameSettings, Image, ImageCreateInfo,
    ImageResolver, ImageView, Instance, MultisamplingMode, PhysicalDevice, Queue, Semaphore, Surface, Swapchain,
    Window,
};

/// Pick the number of samples for color attachments. Only counts supported for both color and depth attachments are
/// considered, so a depth buffer with the same count can always be created.
pub fn choose_sample_count(mode: MultisamplingMode, limits: &vk::PhysicalDeviceLimits) -> vk::SampleCountFlags {
    let supported = limits.framebuffer_color_sample_counts & limits.framebuffer_depth_sample_counts;
    let best = [
        vk::SampleCountFlags::TYPE_64,
        vk::SampleCountFlags::TYPE_32,
        vk::SampleCountFlags::TYPE_16,
        vk::SampleCountFlags::TYPE_8,
        vk::SampleCountFlags::TYPE_4,
        vk::SampleCountFlags::TYPE_2,
    ]
    .into_iter()
    .find(|count| supported.contains(*count))
    .unwrap_or(vk::SampleCountFlags::TYPE_1);

    match mode {
        MultisamplingMode::None => vk::SampleCountFlags::TYPE_1,
        MultisamplingMode::Decent if supported.contains(vk::SampleCountFlags::TYPE_4) => vk::SampleCountFlags::TYPE_4,
        MultisamplingMode::Decent | MultisamplingMode::Best => best,
    }
}

#[derive(Debug)]
struct MultisampleTarget {
    // Dropped before the image it views.
    view: ImageView,
    #[allow(dead_code)]
    image: Image,
}

/// Swapchain side of a windowed application, see the [module level documentation](self).
#[derive(Derivative)]
#[derivative(Debug)]
pub struct WindowContext {
    #[derivative(Debug = "ignore")]
    device: Device,
    #[derivative(Debug = "ignore")]
    physical_device: PhysicalDevice,
    multisample: Option<MultisampleTarget>,
    swapchain: Swapchain,
    // Must outlive the swapchain.
    surface: Surface,
    graphics_queue: Queue,
    present_queue: Queue,
    command_pool: CommandPool,
    #[derivative(Debug = "ignore")]
    allocator: DefaultAllocator,
    config: SwapchainConfig,
    frames: FrameSettings,
    sample_count: vk::SampleCountFlags,
}

impl WindowContext {
    /// Create the swapchain and everything needed to render frames to it. The surface details must have been queried
    /// for `physical_device`, which [`initialize`](crate::initialize) does.
    pub fn new(
        instance: &Instance,
        physical_device: &PhysicalDevice,
        device: Device,
        surface: Surface,
        allocator: DefaultAllocator,
        settings: &AppSettings,
    ) -> Result<Self> {
        let surface_settings = settings.surface_settings.as_ref().ok_or(Error::NoWindow)?;
        let graphics_family = physical_device
            .queues()
            .iter()
            .find(|queue| queue.queue_type == QueueType::Graphics)
            .map(|queue| queue.family_index)
            .ok_or(Error::NoCapableQueue)?;
        let present_family = physical_device.present_family().ok_or(Error::NoPresentQueue)?;

        let mut preferred_extent = settings.swapchain.preferred_extent;
        if preferred_extent.width == 0 || preferred_extent.height == 0 {
            preferred_extent = surface_settings.window.extent();
        }
        let config = SwapchainConfig {
            surface_format: surface_settings.surface_format,
            present_mode: surface_settings.present_mode,
            preferred_extent,
            graphics_family,
            present_family,
        };

        let swapchain = Swapchain::new(instance, device.clone(), &surface, &config)?;
        let sample_count = choose_sample_count(settings.swapchain.multisampling, &physical_device.properties().limits);
        info!("Using {sample_count:?} samples for window color attachments");

        let mut ctx = WindowContext {
            graphics_queue: Queue::new(device.clone(), graphics_family)?,
            present_queue: Queue::new(device.clone(), present_family)?,
            command_pool: CommandPool::new(
                device.clone(),
                graphics_family,
                vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            )?,
            device,
            physical_device: physical_device.clone(),
            multisample: None,
            swapchain,
            surface,
            allocator,
            config,
            frames: settings.frames,
            sample_count,
        };
        ctx.multisample = ctx.create_multisample_target()?;
        Ok(ctx)
    }

    fn create_multisample_target(&mut self) -> Result<Option<MultisampleTarget>> {
        if self.sample_count == vk::SampleCountFlags::TYPE_1 {
            return Ok(None);
        }
        let extent = self.swapchain.extent();
        let image = Image::new(
            self.device.clone(),
            &mut self.allocator,
            "multisample color",
            ImageCreateInfo {
                width: extent.width,
                height: extent.height,
                usage: vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSIENT_ATTACHMENT,
                format: self.swapchain.format().format,
                samples: self.sample_count,
            },
        )?;
        let view = image.view(vk::ImageAspectFlags::COLOR)?;
        Ok(Some(MultisampleTarget { view, image }))
    }

    /// Rebuild the swapchain and the multisample target for the current window size. Waits until the device is idle
    /// first. Everything built from swapchain images, like framebuffers, must be rebuilt afterwards.
    pub fn recreate(&mut self, window: &dyn Window) -> Result<()> {
        self.device.wait_idle()?;
        self.surface.query_details(&self.physical_device)?;
        self.config.preferred_extent = window.extent();
        self.multisample = None;
        self.swapchain.recreate(&self.surface, &self.config)?;
        self.multisample = self.create_multisample_target()?;
        Ok(())
    }

    /// Resolver returning the swapchain image of every framebuffer. There is one framebuffer per swapchain image.
    pub fn swapchain_resolver(&self) -> Result<ImageResolver> {
        let images = (0..self.swapchain.image_count())
            .map(|index| self.swapchain.attachment_image(index))
            .collect::<Result<Vec<_>>>()?;
        Ok(Box::new(move |index| images[index % images.len()]))
    }

    /// Resolver returning the multisampled color target for every framebuffer, if multisampling is enabled.
    pub fn multisample_resolver(&self) -> Option<ImageResolver> {
        let image = self.multisample_image()?;
        Some(Box::new(move |_| image))
    }

    /// The multisampled color target, if multisampling is enabled.
    pub fn multisample_image(&self) -> Option<AttachmentImage> {
        self.multisample
            .as_ref()
            .map(|target| AttachmentImage::from(&target.view))
    }

    /// Number of samples used for the multisampled color target.
    pub fn sample_count(&self) -> vk::SampleCountFlags {
        self.sample_count
    }

    /// Number of frame slots configured in the application settings.
    pub fn frames_in_flight(&self) -> usize {
        self.frames.frames_in_flight
    }

    /// Frame pacing settings.
    pub fn frame_settings(&self) -> &FrameSettings {
        &self.frames
    }

    /// The swapchain.
    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    /// The surface rendered to.
    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    /// The logical device.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Queue frames are submitted to.
    pub fn graphics_queue(&self) -> &Queue {
        &self.graphics_queue
    }

    /// Queue frames are presented from.
    pub fn present_queue(&self) -> &Queue {
        &self.present_queue
    }
}

impl FrameBackend for WindowContext {
    type Fence = Fence;
    type Semaphore = Semaphore;
    type CommandBuffer = vk::CommandBuffer;

    fn create_fence(&mut self, signaled: bool) -> Result<Fence> {
        Fence::new(self.device.clone(), signaled)
    }

    fn create_semaphore(&mut self) -> Result<Semaphore> {
        Semaphore::new(self.device.clone())
    }

    fn allocate_command_buffer(&mut self) -> Result<vk::CommandBuffer> {
        self.command_pool
            .allocate_primary(1)?
            .pop()
            .ok_or_else(|| Error::Uncategorized("No command buffer allocated").into())
    }

    fn wait_fence(&mut self, fence: &Fence) -> Result<()> {
        fence.wait(self.frames.fence_timeout)
    }

    fn reset_fence(&mut self, fence: &Fence) -> Result<()> {
        fence.reset()
    }

    fn acquire_image(&mut self, signal: &Semaphore) -> Result<AcquireOutcome> {
        self.swapchain
            .acquire_next_image(unsafe { signal.handle() }, self.frames.acquire_timeout)
    }

    fn begin(&mut self, cmd: vk::CommandBuffer) -> Result<()> {
        // SAFETY: The frame synchronizer only records into a slot after waiting on its fence.
        unsafe { self.command_pool.begin(cmd) }
    }

    fn end(&mut self, cmd: vk::CommandBuffer) -> Result<()> {
        unsafe { self.command_pool.end(cmd) }
    }

    fn submit(&mut self, cmd: vk::CommandBuffer, wait: &Semaphore, signal: &Semaphore, fence: &Fence) -> Result<()> {
        let wait = unsafe { wait.handle() };
        let signal = unsafe { signal.handle() };
        let stage = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
        let info = vk::SubmitInfo::builder()
            .wait_semaphores(slice::from_ref(&wait))
            .wait_dst_stage_mask(slice::from_ref(&stage))
            .command_buffers(slice::from_ref(&cmd))
            .signal_semaphores(slice::from_ref(&signal))
            .build();
        unsafe { self.graphics_queue.submit(slice::from_ref(&info), fence.handle()) }
    }

    fn present(&mut self, image_index: u32, wait: &Semaphore) -> Result<PresentOutcome> {
        self.swapchain
            .present(&self.present_queue, image_index, unsafe { wait.handle() })
    }
}

impl Drop for WindowContext {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle while destroying window context: {e}");
        }
    }
}
