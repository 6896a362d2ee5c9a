//! Utilities for generic window handling

use anyhow::Result;
use ash::vk;
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
#[cfg(feature = "winit")]
use winit;

/// Trait for windows that exposes the content width and height of a window.
pub trait WindowSize {
    /// Get the width of the window
    fn width(&self) -> u32;
    /// Get the height of the window
    fn height(&self) -> u32;

    /// Size of the client area as an extent.
    fn extent(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.width(),
            height: self.height(),
        }
    }
}

#[cfg(feature = "winit")]
impl WindowSize for winit::window::Window {
    fn width(&self) -> u32 {
        self.inner_size().width
    }

    fn height(&self) -> u32 {
        self.inner_size().height
    }
}

/// Generic "window" trait that is applied to all raw_window_handle providers and those who implement window size
pub trait Window: WindowSize + HasRawDisplayHandle + HasRawWindowHandle {}
impl<T: WindowSize + HasRawDisplayHandle + HasRawWindowHandle> Window for T {}

/// Block until the window has a non-zero client area, calling `pump` to process window events in between.
/// A minimized window has a zero sized client area, and no swapchain can be created for it.
/// Returns the client area once it is visible.
pub fn wait_until_visible<W: WindowSize + ?Sized>(window: &W, mut pump: impl FnMut() -> Result<()>) -> Result<vk::Extent2D> {
    loop {
        let extent = window.extent();
        if extent.width != 0 && extent.height != 0 {
            return Ok(extent);
        }
        pump()?;
    }
}
