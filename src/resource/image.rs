//! Provides utilities to manage [`VkImage`](vk::Image) and [`VkImageView`](vk::ImageView) objects.
//!
//! # Images
//!
//! Images are managed through the [`Image`] struct. These images are usually backed by a memory allocation, except when
//! they are swapchain images owned by the presentation engine. Every image has exactly one owner: the swapchain or
//! whichever component created it as an offscreen target. Everything else borrows it.
//!
//! # Image views
//!
//! [`Image::view`] creates an [`ImageView`], which is an `Arc<ImgView>`. Views are what framebuffers are built from.
//!
//! # Attachment images
//!
//! Render pass construction does not need to own views, it only needs to know a handful of properties of the image that
//! will be bound to each attachment slot. [`AttachmentImage`] is that plain-data description, and is what
//! [`ImageResolver`](crate::ImageResolver)s return.

use std::ops::Deref;
use std::sync::Arc;

use anyhow::Result;
use ash::vk;

use crate::{Allocation, Allocator, DefaultAllocator, Device, Error, MemoryType};

/// Abstraction over a [`VkImage`](vk::Image). Stores information about size, format, etc. Additionally couples the image data together
/// with a memory allocation.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Image<A: Allocator = DefaultAllocator> {
    #[derivative(Debug = "ignore")]
    device: Device,
    /// Name used in usage histories and debug output.
    name: String,
    handle: vk::Image,
    /// GPU memory allocation. If this is None, then the image is not owned by us (for example a swapchain image) and should not be
    /// destroyed.
    #[derivative(Debug = "ignore")]
    memory: Option<A::Allocation>,
    format: vk::Format,
    extent: vk::Extent2D,
    samples: vk::SampleCountFlags,
}

unsafe impl<A: Allocator> Send for Image<A> {}

unsafe impl<A: Allocator> Sync for Image<A> {}

/// Abstraction over a [`VkImageView`](vk::ImageView) covering a whole 2D image.
#[derive(Derivative)]
#[derivative(Debug, Hash, PartialEq, Eq)]
pub struct ImgView {
    #[derivative(Debug = "ignore")]
    #[derivative(Hash = "ignore")]
    #[derivative(PartialEq = "ignore")]
    device: Device,
    handle: vk::ImageView,
    image: vk::Image,
    format: vk::Format,
    samples: vk::SampleCountFlags,
    aspect: vk::ImageAspectFlags,
    extent: vk::Extent2D,
}

/// Reference-counted version of [`ImgView`].
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct ImageView(pub Arc<ImgView>);

impl Deref for ImageView {
    type Target = Arc<ImgView>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

unsafe impl Send for ImageView {}

unsafe impl Sync for ImageView {}

/// Settings that describe how an image should be created
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq)]
pub struct ImageCreateInfo {
    /// Width in pixels of the image
    pub width: u32,
    /// Height in pixels of the image
    pub height: u32,
    /// Image usage flags
    pub usage: vk::ImageUsageFlags,
    /// Pixel format of the image
    pub format: vk::Format,
    /// MSAA samples
    pub samples: vk::SampleCountFlags,
}

/// Everything a render pass needs to know about the image bound to one of its attachments for one framebuffer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct AttachmentImage {
    /// View that is put in the framebuffer.
    pub view: vk::ImageView,
    /// Format of the view.
    pub format: vk::Format,
    /// Sample count of the image.
    pub samples: vk::SampleCountFlags,
    /// Size of the image. All attachments of a framebuffer must have the same size.
    pub extent: vk::Extent2D,
}

impl From<&ImageView> for AttachmentImage {
    fn from(view: &ImageView) -> Self {
        AttachmentImage {
            // SAFETY: The handle is only recorded into framebuffers, which never outlive the view's owner.
            view: unsafe { view.handle() },
            format: view.format(),
            samples: view.samples(),
            extent: view.extent(),
        }
    }
}

impl<A: Allocator> Image<A> {
    /// Create a new 2D [`VkImage`](vk::Image) and allocate memory for it.
    pub fn new(device: Device, alloc: &mut A, name: impl Into<String>, info: ImageCreateInfo) -> Result<Self> {
        if info.width == 0 || info.height == 0 {
            return Err(Error::ZeroExtent(info.width, info.height).into());
        }
        let name = name.into();
        let sharing_mode = if device.is_single_queue()
            || info
                .usage
                .intersects(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
        {
            vk::SharingMode::EXCLUSIVE
        } else {
            vk::SharingMode::CONCURRENT
        };

        let handle = unsafe {
            device.create_image(
                &vk::ImageCreateInfo::builder()
                    .image_type(vk::ImageType::TYPE_2D)
                    .format(info.format)
                    .extent(vk::Extent3D {
                        width: info.width,
                        height: info.height,
                        depth: 1,
                    })
                    .mip_levels(1)
                    .array_layers(1)
                    .samples(info.samples)
                    .tiling(vk::ImageTiling::OPTIMAL)
                    .usage(info.usage)
                    .sharing_mode(sharing_mode)
                    .queue_family_indices(if sharing_mode == vk::SharingMode::CONCURRENT {
                        device.queue_families()
                    } else {
                        &[]
                    })
                    .initial_layout(vk::ImageLayout::UNDEFINED),
                None,
            )?
        };
        #[cfg(feature = "log-objects")]
        trace!("Created new VkImage {handle:p} ({name})");

        let requirements = unsafe { device.get_image_memory_requirements(handle) };
        let memory = match alloc.allocate(&name, &requirements, MemoryType::GpuOnly) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_image(handle, None) };
                return Err(e);
            }
        };
        unsafe {
            device.bind_image_memory(handle, memory.memory(), memory.offset())?;
        }

        Ok(Self {
            device,
            name,
            handle,
            format: info.format,
            extent: vk::Extent2D {
                width: info.width,
                height: info.height,
            },
            samples: info.samples,
            memory: Some(memory),
        })
    }

    /// Wrap an image whose memory is owned by someone else, such as the presentation engine.
    pub(crate) fn new_managed(
        device: Device,
        name: impl Into<String>,
        handle: vk::Image,
        format: vk::Format,
        extent: vk::Extent2D,
        samples: vk::SampleCountFlags,
    ) -> Self {
        Self {
            device,
            name: name.into(),
            handle,
            memory: None,
            format,
            extent,
            samples,
        }
    }

    /// Create an [`ImageView`] covering the whole image.
    /// # Lifetime
    /// The returned [`ImageView`] is valid as long as `self` is valid.
    pub fn view(&self, aspect: vk::ImageAspectFlags) -> Result<ImageView> {
        let info = vk::ImageViewCreateInfo {
            image: self.handle,
            view_type: vk::ImageViewType::TYPE_2D,
            format: self.format,
            components: vk::ComponentMapping::default(),
            subresource_range: vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            },
            ..Default::default()
        };

        let view_handle = unsafe { self.device.create_image_view(&info, None)? };
        #[cfg(feature = "log-objects")]
        trace!("Created new VkImageView {view_handle:p} ({})", self.name);
        Ok(ImageView(Arc::new(ImgView {
            device: self.device.clone(),
            handle: view_handle,
            image: self.handle,
            format: self.format,
            samples: self.samples,
            aspect,
            extent: self.extent,
        })))
    }

    /// Whether this image resource is owned by the application or an external manager (such as the swapchain).
    pub fn is_owned(&self) -> bool {
        self.memory.is_some()
    }

    /// Get unsafe access to the underlying `VkImage` handle.
    /// # Safety
    /// Any vulkan calls that mutate this image's state may put the system into an undefined state.
    pub unsafe fn handle(&self) -> vk::Image {
        self.handle
    }

    /// Name of the image.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the image format
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Get the image size
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Get the number of MSAA samples for this image.
    pub fn samples(&self) -> vk::SampleCountFlags {
        self.samples
    }
}

impl<A: Allocator> Drop for Image<A> {
    fn drop(&mut self) {
        if self.is_owned() {
            #[cfg(feature = "log-objects")]
            trace!("Destroying VkImage {:p} ({})", self.handle, self.name);
            unsafe {
                self.device.destroy_image(self.handle, None);
            }
        }
    }
}

impl ImgView {
    /// Get unsafe access to the underlying `VkImageView` handle.
    /// # Safety
    /// Any vulkan calls that mutate this image view's state may put the system in an undefined state.
    pub unsafe fn handle(&self) -> vk::ImageView {
        self.handle
    }

    /// Get unsafe access to the underlying `VkImage` handle.
    /// # Safety
    /// Any vulkan calls that mutate this image's state may put the system in an undefined state.
    pub unsafe fn image(&self) -> vk::Image {
        self.image
    }

    /// Get the image format
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Get the number of MSAA samples for this image.
    pub fn samples(&self) -> vk::SampleCountFlags {
        self.samples
    }

    /// Get the image aspect that this view was built from
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        self.aspect
    }

    /// Get the image size
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for ImgView {
    fn drop(&mut self) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkImageView {:p}", self.handle);
        unsafe {
            self.device.destroy_image_view(self.handle, None);
        }
    }
}
