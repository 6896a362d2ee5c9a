//! Wrapper around a [`VkSwapchainKHR`](vk::SwapchainKHR) and the images it presents.
//!
//! The swapchain negotiates its surface format, present mode, extent and image count with the surface through the
//! `choose_*` functions in this module. These are pure functions of the surface properties, so they can be inspected
//! without a device.
//!
//! A swapchain is never patched. When the surface changes, [`Swapchain::recreate`] destroys the old swapchain together
//! with all of its images and views, and builds a new one from scratch.

use std::time::Duration;

use anyhow::Result;
use ash::vk;

use crate::wsi::frame::{AcquireOutcome, PresentOutcome};
use crate::{AttachmentImage, Device, Error, Image, ImageView, Instance, Queue, Surface};

/// Format used when no preferred format is given or when the preferred format is unsupported.
pub const FALLBACK_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_SRGB,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Pick the surface format: [`FALLBACK_FORMAT`] if the surface supports it, and otherwise the first format the
/// surface lists. A preferred format from [`SurfaceSettings`](crate::SurfaceSettings) is tried first if it is
/// available.
pub fn choose_surface_format(
    preferred: Option<vk::SurfaceFormatKHR>,
    available: &[vk::SurfaceFormatKHR],
) -> Result<vk::SurfaceFormatKHR> {
    if let Some(format) = preferred.filter(|format| available.contains(format)) {
        return Ok(format);
    }
    if available.contains(&FALLBACK_FORMAT) {
        return Ok(FALLBACK_FORMAT);
    }
    available
        .first()
        .copied()
        .ok_or_else(|| Error::NoSurfaceFormat.into())
}

/// Pick the present mode: `MAILBOX`, then `IMMEDIATE`. `FIFO` is always supported and used when neither is. A
/// preferred mode from [`SurfaceSettings`](crate::SurfaceSettings) is tried first if it is available.
pub fn choose_present_mode(preferred: Option<vk::PresentModeKHR>, available: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    preferred
        .into_iter()
        .chain([vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE])
        .find(|mode| available.contains(mode))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// Pick the swapchain extent. Most surfaces dictate their extent. Surfaces that leave it up to the application report
/// `u32::MAX` as their current extent, in which case the preferred extent is clamped into the supported range.
pub fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, preferred: vk::Extent2D) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }
    let min = capabilities.min_image_extent;
    let max = capabilities.max_image_extent;
    vk::Extent2D {
        width: preferred.width.clamp(min.width, max.width),
        height: preferred.height.clamp(min.height, max.height),
    }
}

/// One image more than the minimum, so the application never waits on the driver for an image to render into.
/// A maximum of zero means there is no maximum.
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = capabilities.min_image_count + 1;
    match capabilities.max_image_count {
        0 => count,
        max => count.min(max),
    }
}

/// Images are only shared between queue families if presentation happens on a different family than rendering.
/// Returns the sharing mode and the families to share with.
pub fn choose_sharing_mode(graphics_family: u32, present_family: u32) -> (vk::SharingMode, Vec<u32>) {
    if graphics_family == present_family {
        (vk::SharingMode::EXCLUSIVE, Vec::new())
    } else {
        (vk::SharingMode::CONCURRENT, vec![graphics_family, present_family])
    }
}

/// Everything needed to (re)create a swapchain apart from the surface itself.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SwapchainConfig {
    /// Preferred surface format, see [`choose_surface_format`].
    pub surface_format: Option<vk::SurfaceFormatKHR>,
    /// Preferred present mode, see [`choose_present_mode`].
    pub present_mode: Option<vk::PresentModeKHR>,
    /// Extent to use if the surface leaves it up to us, see [`choose_extent`].
    pub preferred_extent: vk::Extent2D,
    /// Queue family that renders into the swapchain images.
    pub graphics_family: u32,
    /// Queue family that presents them.
    pub present_family: u32,
}

/// A swapchain image together with a view of it.
#[derive(Debug)]
pub struct SwapchainImage {
    /// Owned by the presentation engine, never destroyed by us.
    pub image: Image,
    /// View covering the whole image.
    pub view: ImageView,
}

/// A swapchain is an abstraction of a presentation system. It handles buffering, VSync, and acquiring images
/// to render and present frames to.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Swapchain {
    #[derivative(Debug = "ignore")]
    device: Device,
    /// Vulkan extension functions operating on the swapchain.
    #[derivative(Debug = "ignore")]
    functions: ash::extensions::khr::Swapchain,
    handle: vk::SwapchainKHR,
    images: Vec<SwapchainImage>,
    format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
}

impl Swapchain {
    /// Create a new swapchain for `surface`. The surface details must have been queried already.
    pub fn new(instance: &Instance, device: Device, surface: &Surface, config: &SwapchainConfig) -> Result<Self> {
        let functions = ash::extensions::khr::Swapchain::new(instance, &device);
        let mut swapchain = Swapchain {
            device,
            functions,
            handle: vk::SwapchainKHR::null(),
            images: Vec::new(),
            format: FALLBACK_FORMAT,
            present_mode: vk::PresentModeKHR::FIFO,
            extent: vk::Extent2D::default(),
        };
        swapchain.create(surface, config)?;
        Ok(swapchain)
    }

    /// Destroy the swapchain with all of its images and views, and create it again with the current surface
    /// properties. The device must be idle, and the surface details must have been queried again.
    pub fn recreate(&mut self, surface: &Surface, config: &SwapchainConfig) -> Result<()> {
        self.destroy();
        self.create(surface, config)
    }

    fn create(&mut self, surface: &Surface, config: &SwapchainConfig) -> Result<()> {
        let capabilities = surface.capabilities();
        let format = choose_surface_format(config.surface_format, surface.formats())?;
        let present_mode = choose_present_mode(config.present_mode, surface.present_modes());
        let extent = choose_extent(capabilities, config.preferred_extent);
        let image_count = choose_image_count(capabilities);
        let (sharing_mode, families) = choose_sharing_mode(config.graphics_family, config.present_family);
        if extent.width == 0 || extent.height == 0 {
            return Err(Error::ZeroExtent(extent.width, extent.height).into());
        }

        let info = vk::SwapchainCreateInfoKHR::builder()
            .surface(unsafe { surface.handle() })
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(&families)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        self.handle = unsafe { self.functions.create_swapchain(&info, None)? };
        #[cfg(feature = "log-objects")]
        trace!("Created new VkSwapchainKHR {:p}", self.handle);

        self.format = format;
        self.present_mode = present_mode;
        self.extent = extent;
        self.images = unsafe { self.functions.get_swapchain_images(self.handle)? }
            .into_iter()
            .enumerate()
            .map(|(index, handle)| -> Result<SwapchainImage> {
                let image = Image::new_managed(
                    self.device.clone(),
                    format!("swapchain image {index}"),
                    handle,
                    format.format,
                    extent,
                    vk::SampleCountFlags::TYPE_1,
                );
                let view = image.view(vk::ImageAspectFlags::COLOR)?;
                Ok(SwapchainImage { image, view })
            })
            .collect::<Result<Vec<_>>>()?;

        info!(
            "Created swapchain with format {:?}, present mode {:?}, extent {}x{} and {} images",
            format.format,
            present_mode,
            extent.width,
            extent.height,
            self.images.len()
        );
        Ok(())
    }

    fn destroy(&mut self) {
        // Views must go before the swapchain that owns their images.
        self.images.clear();
        if self.handle != vk::SwapchainKHR::null() {
            #[cfg(feature = "log-objects")]
            trace!("Destroying VkSwapchainKHR {:p}", self.handle);
            unsafe { self.functions.destroy_swapchain(self.handle, None) };
            self.handle = vk::SwapchainKHR::null();
        }
    }

    /// Acquire the next image to render into. `semaphore` is signaled once the presentation engine is done reading it.
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore, timeout: Duration) -> Result<AcquireOutcome> {
        let timeout = u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX);
        let result = unsafe {
            self.functions
                .acquire_next_image(self.handle, timeout, semaphore, vk::Fence::null())
        };
        match result {
            Ok((index, suboptimal)) => Ok(AcquireOutcome::Acquired { index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                debug!("Swapchain out of date while acquiring an image");
                Ok(AcquireOutcome::OutOfDate)
            }
            Err(vk::Result::TIMEOUT) | Err(vk::Result::NOT_READY) => Err(Error::Timeout("swapchain image").into()),
            Err(e) => Err(Error::from(e).into()),
        }
    }

    /// Present the image at `index` once `wait` is signaled.
    pub fn present(&self, queue: &Queue, index: u32, wait: vk::Semaphore) -> Result<PresentOutcome> {
        let wait_semaphores = [wait];
        let swapchains = [self.handle];
        let indices = [index];
        let info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&indices);
        match unsafe { self.functions.queue_present(queue.handle(), &info) } {
            Ok(suboptimal) => Ok(PresentOutcome::Presented { suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                debug!("Swapchain out of date while presenting");
                Ok(PresentOutcome::OutOfDate)
            }
            Err(e) => Err(Error::from(e).into()),
        }
    }

    /// Surface format of the images.
    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    /// Present mode.
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    /// Size of the images.
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Number of images.
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// All images in presentation engine order.
    pub fn images(&self) -> &[SwapchainImage] {
        &self.images
    }

    /// Describe the image at `index` for use as a render pass attachment.
    pub fn attachment_image(&self, index: usize) -> Result<AttachmentImage> {
        self.images
            .get(index)
            .map(|image| AttachmentImage::from(&image.view))
            .ok_or_else(|| Error::FramebufferOutOfRange(index).into())
    }

    /// Get unsafe access to the underlying `VkSwapchainKHR` handle.
    /// # Safety
    /// The handle is invalidated by [`Swapchain::recreate`].
    pub unsafe fn handle(&self) -> vk::SwapchainKHR {
        self.handle
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.destroy();
    }
}
