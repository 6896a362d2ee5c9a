//! Exposes all structs needed to store initialization parameters.

use std::time::Duration;

use ash::vk;

use crate::{core::queue::QueueType, Window};

/// Structure holding a queue with specific capabilities to request from the physical device.
///
/// See also: [`GPURequirements`](crate::GPURequirements), [`QueueType`](crate::core::queue::QueueType), [`Queue`](crate::core::queue::Queue)
///
/// # Example
/// ```
/// # use deimos::*;
/// let graphics = QueueRequest {
///     dedicated: false,
///     queue_type: QueueType::Graphics
/// };
/// ```
#[derive(Debug, Clone, Copy)]
pub struct QueueRequest {
    /// Whether this queue should be dedicated if possible. For example, requesting a dedicated queue of type [`QueueType::Transfer`] will try to
    /// match this to a queue that does not have graphics or compute capabilities.
    pub dedicated: bool,
    /// Capabilities that are requested from the queue.
    pub queue_type: QueueType,
}

/// Minimum requirements for the GPU. This will be used to determine what physical device is selected, and enable
/// optional Vulkan features and extensions.
/// # Example
/// ```
/// # use deimos::*;
/// let mut requirements = GPURequirements {
///     dedicated: true,
///     min_video_memory: 1024  * 1024 * 1024,
///     queues: vec![
///         QueueRequest {
///             dedicated: false,
///             queue_type: QueueType::Graphics,
///         }
///     ],
///     ..Default::default()
/// };
/// // Enable an optional Vulkan feature.
/// requirements.features.sampler_anisotropy = vk::TRUE;
/// ```
#[derive(Default, Debug)]
pub struct GPURequirements {
    /// Whether a dedicated GPU is required. Setting this to true will discard integrated GPUs.
    pub dedicated: bool,
    /// Minimum amount of video memory required, in bytes. Note that this might count shared memory if RAM is shared.
    pub min_video_memory: usize,
    /// Minimum amount of dedicated video memory, in bytes. This only counts memory that is on the device.
    pub min_dedicated_video_memory: usize,
    /// Command queue types requested from the physical device.
    pub queues: Vec<QueueRequest>,
    /// Optional Vulkan 1.0 features that are required from the physical device.
    pub features: vk::PhysicalDeviceFeatures,
    /// Vulkan device extensions that should be present and enabled.
    pub device_extensions: Vec<String>,
}

/// How much multisampling offscreen color attachments created by a [`WindowContext`](crate::WindowContext) should use.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum MultisamplingMode {
    /// Render directly to the swapchain image.
    #[default]
    None,
    /// 4x multisampling, or the highest supported count if 4x is not available.
    Decent,
    /// The highest sample count supported for both color and depth attachments.
    Best,
}

/// Parameters for swapchain creation that are not negotiated with the surface.
#[derive(Debug, Default, Copy, Clone)]
pub struct SwapchainSettings {
    /// Extent used when the surface lets the application pick one. Usually the window size.
    /// This is clamped into the range the surface supports.
    pub preferred_extent: vk::Extent2D,
    /// Multisampling hint for the window's color attachment.
    pub multisampling: MultisamplingMode,
}

/// Controls frame pacing.
#[derive(Debug, Copy, Clone)]
pub struct FrameSettings {
    /// Number of frames that can be recorded on the CPU while earlier ones are still executing on the GPU.
    pub frames_in_flight: usize,
    /// Maximum time to wait for a frame slot's fence before giving up.
    pub fence_timeout: Duration,
    /// Maximum time to wait for the presentation engine to hand out an image.
    pub acquire_timeout: Duration,
}

impl Default for FrameSettings {
    fn default() -> Self {
        Self {
            frames_in_flight: crate::wsi::frame::FRAMES_IN_FLIGHT,
            fence_timeout: Duration::from_secs(5),
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// Extra data that is stored within the AppSettings whenever we want to enable renderable Surfaces
#[derive(Derivative)]
#[derivative(Debug)]
pub struct SurfaceSettings<'a> {
    /// Optionally a preferred surface format, tried before the regular negotiation and ignored if the surface does
    /// not support it. If set to None, `{B8G8R8A8_SRGB, SRGB_NONLINEAR}` is chosen if it is available. Otherwise,
    /// the first format reported by the surface is used.
    pub surface_format: Option<vk::SurfaceFormatKHR>,
    /// Optionally a preferred present mode. If set to None or unsupported, this falls back to `MAILBOX`, then `IMMEDIATE`
    /// and finally `FIFO`, which is always supported.
    pub present_mode: Option<vk::PresentModeKHR>,
    /// The window that we will use for rendering. Do note that this doesn't necessarily need to be a winit window
    #[derivative(Debug = "ignore")]
    pub window: &'a dyn Window,
}

/// Application settings used to initialize the deimos context.
#[derive(Debug)]
pub struct AppSettings<'a> {
    /// Application name. Possibly displayed in debugging tools, task manager, etc.
    pub name: String,
    /// Application version.
    pub version: (u32, u32, u32),
    /// Enable Vulkan validation layers for additional debug output. For developing this should almost always be on.
    pub enable_validation: bool,
    /// Set to None for headless rendering, or to Some with the appropriate settings
    pub surface_settings: Option<SurfaceSettings<'a>>,
    /// Minimum requirements the selected physical device should have.
    pub gpu_requirements: GPURequirements,
    /// Swapchain parameters.
    pub swapchain: SwapchainSettings,
    /// Frame pacing parameters.
    pub frames: FrameSettings,
}

/// The app builder is a convenience struct to easily create [`AppSettings`](crate::AppSettings).
///
/// For information about each of the fields, see [`AppSettings`](crate::AppSettings)
/// # Example
/// ```
/// # use deimos::*;
/// let info: AppSettings = AppBuilder::new()
///     .name("My deimos application")
///     .validation(true)
///     .frames_in_flight(3)
///     .multisampling(MultisamplingMode::Decent)
///     .build();
/// ```
pub struct AppBuilder<'a> {
    inner: AppSettings<'a>,
}

impl<'a> Default for AppBuilder<'a> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> AppBuilder<'a> {
    /// Create a new app builder with default settings.
    pub fn new() -> Self {
        AppBuilder {
            inner: AppSettings {
                name: String::from(""),
                version: (0, 0, 0),
                enable_validation: false,
                gpu_requirements: GPURequirements::default(),
                surface_settings: None,
                swapchain: SwapchainSettings::default(),
                frames: FrameSettings::default(),
            },
        }
    }

    /// Sets the application name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.inner.name = name.into();
        self
    }

    /// Sets the application version.
    pub fn version(mut self, ver: impl Into<(u32, u32, u32)>) -> Self {
        self.inner.version = ver.into();
        self
    }

    /// Enable the Vulkan validation layers.
    pub fn validation(mut self, val: bool) -> Self {
        self.inner.enable_validation = val;
        self
    }

    /// The gpu requirements that the physical device must satisfy.
    pub fn gpu(mut self, gpu: GPURequirements) -> Self {
        self.inner.gpu_requirements = gpu;
        self
    }

    /// Enable or disable windowed surface
    pub fn surface(mut self, surface: Option<SurfaceSettings<'a>>) -> Self {
        self.inner.surface_settings = surface;
        self
    }

    /// Extent used when the surface does not dictate one.
    pub fn preferred_extent(mut self, width: u32, height: u32) -> Self {
        self.inner.swapchain.preferred_extent = vk::Extent2D {
            width,
            height,
        };
        self
    }

    /// Multisampling hint for the window's color attachment.
    pub fn multisampling(mut self, mode: MultisamplingMode) -> Self {
        self.inner.swapchain.multisampling = mode;
        self
    }

    /// Number of frame slots. Values below 1 are raised to 1.
    pub fn frames_in_flight(mut self, count: usize) -> Self {
        self.inner.frames.frames_in_flight = count.max(1);
        self
    }

    /// Maximum time the CPU may block on a frame slot's fence.
    pub fn fence_timeout(mut self, timeout: Duration) -> Self {
        self.inner.frames.fence_timeout = timeout;
        self
    }

    /// Maximum time the CPU may block on acquiring a swapchain image.
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.inner.frames.acquire_timeout = timeout;
        self
    }

    /// Build the resulting application settings.
    pub fn build(self) -> AppSettings<'a> {
        self.inner
    }
}
