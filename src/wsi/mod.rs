//! The wsi module provides utilities for interacting with the window and rendering frames.
//! If you are using a headless context, you can largely ignore this module.
//!
//! - [`swapchain`] negotiates presentation parameters with the surface and owns the presentable images.
//! - [`frame`] paces frames in flight and drives acquire, submit and present.
//! - [`context`] ties both to a real device.

pub mod context;
pub mod frame;
pub mod surface;
pub mod swapchain;
pub mod window;
