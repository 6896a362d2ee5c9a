//! Exposes the deimos error type

use std::ffi::NulError;
use std::sync::PoisonError;

use ash;
use gpu_allocator::AllocationError;
use thiserror::Error;

/// Error type that deimos can return.
///
/// Most variants describe a broken contract between the caller and the library (an unknown image, a malformed
/// usage history, a callback count that does not match the number of subpasses). These are never worth retrying,
/// see [`Error::is_fatal()`]. An out of date swapchain is not an error at all, it is reported through
/// [`FrameStatus::NeedsRecreate`](crate::FrameStatus::NeedsRecreate).
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to load the Vulkan library.
    #[error("Failed to load Vulkan.")]
    LoadFailed(ash::LoadingError),
    /// Could not convert rust string to C-String because it has null bytes
    #[error("Invalid C string")]
    InvalidString(NulError),
    /// Generic Vulkan error type.
    #[error("Vulkan error: `{0}`")]
    VkError(ash::vk::Result),
    /// The logical device was lost. Nothing created from it can be used anymore.
    #[error("Device lost")]
    DeviceLost,
    /// Waiting on a fence or acquiring an image did not complete within the configured timeout.
    #[error("Timed out while waiting for `{0}`")]
    Timeout(&'static str),
    /// No window context specified where one was expected.
    #[error("Expected a window context.")]
    NoWindow,
    /// No suitable GPU found.
    #[error("No physical device found matching requirements.")]
    NoGPU,
    /// No supported surface formats found.
    #[error("No supported surface formats found.")]
    NoSurfaceFormat,
    /// No queue was found that supports presentation.
    #[error("No queue found that supports presentation.")]
    NoPresentQueue,
    /// No queue was found with the requested capabilities. Did you forget to request it?
    #[error("No queue found with the requested capabilities. Did you forget a queue request on initialization?")]
    NoCapableQueue,
    /// Vulkan allocation error.
    #[error("Vulkan allocation error: `{0}`")]
    AllocationError(AllocationError),
    /// Poisoned mutex
    #[error("Poisoned mutex")]
    PoisonError,
    /// The same image was registered twice within one pass.
    #[error("Image `{0}` is already registered in this pass")]
    DuplicateImage(String),
    /// The image was never registered with the pass or tracker being queried.
    #[error("Image `{0}` is not registered")]
    UnknownImage(String),
    /// Two usages were specified for the same subpass of one image.
    #[error("Usage of `{image}` at subpass {subpass} specified more than once")]
    DuplicateUsage {
        /// Image name.
        image: String,
        /// Offending subpass.
        subpass: i32,
    },
    /// A subpass index is outside of the range allowed for the call.
    #[error("Subpass {subpass} of `{image}` is out of range [{min}, {max}]")]
    SubpassOutOfRange {
        /// Image name.
        image: String,
        /// Offending subpass.
        subpass: i32,
        /// Smallest allowed index.
        min: i32,
        /// Largest allowed index.
        max: i32,
    },
    /// No usage was recorded for the image at the requested subpass.
    #[error("No usage of `{image}` recorded at subpass {subpass}")]
    NoUsageAtSubpass {
        /// Image name.
        image: String,
        /// Requested subpass.
        subpass: i32,
    },
    /// An image history does not contain a single usage at a real subpass.
    #[error("Usage history of `{0}` is empty")]
    EmptyUsageHistory(String),
    /// An image is used as a color attachment in one subpass and as a depth stencil attachment in another.
    #[error("Image `{0}` mixes color and depth stencil attachment usages")]
    MixedAttachmentFamily(String),
    /// An attachment was registered with a history that does not match how it was registered.
    #[error("Image `{image}` has usage `{found:?}` which is not allowed here")]
    InvalidUsageType {
        /// Image name.
        image: String,
        /// The usage type that was found.
        found: crate::UsageType,
    },
    /// More than one depth stencil attachment is used within one subpass.
    #[error("Subpass {0} uses more than one depth stencil attachment")]
    MultipleDepthStencil(u32),
    /// Two color attachments claim the same location within one subpass.
    #[error("Color location {location} is used twice in subpass {subpass}")]
    DuplicateColorLocation {
        /// Subpass index.
        subpass: u32,
        /// Location that was claimed twice.
        location: u32,
    },
    /// A subpass would need to depend on itself. Input attachments are not supported.
    #[error("Image `{0}` requires a self dependency, which is not supported")]
    SelfDependency(String),
    /// Number of callbacks passed to a render pass does not match its number of subpasses.
    #[error("Expected {expected} subpass callbacks, got {found}")]
    SubpassCountMismatch {
        /// Number of subpasses in the render pass.
        expected: usize,
        /// Number of callbacks given.
        found: usize,
    },
    /// The number of framebuffers was not set before building a render pass.
    #[error("Number of framebuffers is not set")]
    NoFramebufferCount,
    /// An attachment has no image resolver bound to it.
    #[error("Attachment image at index {0} is not set")]
    AttachmentNotBound(usize),
    /// An attachment index is not part of the render pass.
    #[error("Attachment index {0} is out of range")]
    AttachmentOutOfRange(usize),
    /// A framebuffer would be created with a zero width or height.
    #[error("Framebuffer extent {0}x{1} is empty")]
    ZeroExtent(u32, u32),
    /// Attachment images bound to one framebuffer do not have the same size.
    #[error("Attachment {index} has extent {found:?}, expected {expected:?}")]
    ExtentMismatch {
        /// Attachment index.
        index: usize,
        /// Extent of attachment 0.
        expected: ash::vk::Extent2D,
        /// Extent of the offending attachment.
        found: ash::vk::Extent2D,
    },
    /// A framebuffer index outside of the range of created framebuffers was requested.
    #[error("Framebuffer index {0} is out of range")]
    FramebufferOutOfRange(usize),
    /// A frame slot index is not smaller than the number of frames in flight.
    #[error("Frame index {index} is out of range, there are {count} frames in flight")]
    FrameOutOfRange {
        /// Requested slot.
        index: usize,
        /// Number of slots.
        count: usize,
    },
    /// A compute pass image has no `VkImage` bound.
    #[error("No image bound to `{0}`")]
    NoResourceBound(String),
    /// Uncategorized error.
    #[error("Uncategorized error: `{0}`")]
    Uncategorized(&'static str),
}

impl Error {
    /// Whether this error leaves the system in a state where retrying the operation cannot help.
    /// This is true for everything except a poisoned lock, which the caller may be able to recover from.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::PoisonError)
    }
}

impl From<ash::LoadingError> for Error {
    fn from(value: ash::LoadingError) -> Self {
        Error::LoadFailed(value)
    }
}

impl From<NulError> for Error {
    fn from(value: NulError) -> Self {
        Error::InvalidString(value)
    }
}

impl From<ash::vk::Result> for Error {
    fn from(value: ash::vk::Result) -> Self {
        match value {
            ash::vk::Result::ERROR_DEVICE_LOST => Error::DeviceLost,
            ash::vk::Result::TIMEOUT => Error::Timeout("device operation"),
            _ => Error::VkError(value),
        }
    }
}

impl From<AllocationError> for Error {
    fn from(value: AllocationError) -> Self {
        Error::AllocationError(value)
    }
}

impl<T> From<PoisonError<T>> for Error {
    fn from(_: PoisonError<T>) -> Self {
        Error::PoisonError
    }
}
