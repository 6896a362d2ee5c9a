//! Render pass synchronization and frame pacing for Vulkan
//!
//! Deimos derives the layout transitions and subpass dependencies a render pass needs from a declaration of how every
//! image is used in every subpass, and paces frames in flight so the CPU never runs more than a fixed number of frames
//! ahead of the GPU.
//!
//! To get started, the easiest way is to simply
//! ```
//! // Import all types.
//! use deimos::prelude::*;
//! // Or, import them under a namespace.
//! use deimos::prelude as dm;
//! ```
//!
//! # Example
//!
//! First, declare how the images are used. Here, the first subpass renders into an offscreen color target, which the
//! second subpass samples while rendering into the swapchain image.
//! ```
//! use deimos::prelude::*;
//! # use anyhow::Result;
//! # fn main() -> Result<()> {
//! let mut pass = GraphicsPass::new(2);
//! let offscreen = pass.add_color_attachment(
//!     "offscreen",
//!     UsageHistory::new(Usage::undefined())
//!         .add_usage(0, Usage::render_target())
//!         .add_usage(1, Usage::sampled(vk::PipelineStageFlags::FRAGMENT_SHADER))
//!         .set_final_usage(Usage::undefined()),
//! )?;
//! let swapchain = pass.add_color_attachment(
//!     "swapchain",
//!     UsageHistory::new(Usage::undefined())
//!         .add_usage(1, Usage::render_target())
//!         .set_final_usage(Usage::present()),
//! )?;
//! # let _ = (offscreen, swapchain);
//! // The dependency between the two subpasses was derived from the usages.
//! let builder = pass.create_render_pass_builder(3)?;
//! assert!(builder.dependencies().iter().any(|dep| dep.src.index == 0 && dep.dst.index == 1));
//! # Ok(())
//! # }
//! ```
//! Then, create a Vulkan context and a [`WindowContext`] for the window, bind the images to the attachments and build
//! the [`RenderPass`]. A [`FrameSynchronizer`] then drives every frame.
//! ```no_run
//! use deimos::prelude::*;
//! # use anyhow::Result;
//! # fn run(window: &dyn Window, mut builder: RenderPassBuilder) -> Result<()> {
//! let settings = AppBuilder::new()
//!     .name("deimos demo app")
//!     .validation(true)
//!     .surface(Some(SurfaceSettings {
//!         surface_format: None,
//!         present_mode: Some(vk::PresentModeKHR::MAILBOX),
//!         window,
//!     }))
//!     .build();
//! let (instance, physical_device, surface, device, allocator, _debug) = initialize(&settings)?;
//! let mut ctx = WindowContext::new(
//!     &instance,
//!     &physical_device,
//!     device.clone(),
//!     surface.ok_or(Error::NoWindow)?,
//!     allocator,
//!     &settings,
//! )?;
//! builder.update_attachment_image(1, ctx.swapchain_resolver()?)?;
//! let render_pass = builder.build(device.clone())?;
//!
//! let frames_in_flight = ctx.frames_in_flight();
//! let mut frames = FrameSynchronizer::new(&mut ctx, frames_in_flight)?;
//! let status = frames.draw_next_frame(
//!     &mut ctx,
//!     |_frame| Ok(()),
//!     |cmd, framebuffer| {
//!         let mut ops: Vec<RenderOp> = vec![Box::new(|_cmd| Ok(())), Box::new(|_cmd| Ok(()))];
//!         render_pass.run(cmd, framebuffer, &mut ops)
//!     },
//! )?;
//! # let _ = status;
//! # Ok(())
//! # }
//! ```
//! For further example code, check out the following modules
//! - [`pass`] for usage histories and render pass construction.
//! - [`wsi`] for the swapchain and the frame loop.
//! - [`resource`] for images and the shared resource cache.
//! - [`core`] for initialization and configuration.

#[macro_use]
extern crate derivative;
#[macro_use]
extern crate log;

pub mod prelude;
pub use crate::prelude::*;

pub mod allocator;
pub mod command_buffer;
pub mod core;
pub mod pass;
pub mod resource;
pub mod sync;
pub(crate) mod util;
pub mod wsi;
