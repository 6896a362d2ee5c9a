//! Passes describe how images are used across a sequence of subpasses, and derive the synchronization needed between
//! those uses.
//!
//! Every pass embeds a [`BasePass`](base::BasePass) holding the usage histories of its images. A
//! [`GraphicsPass`](graphics::GraphicsPass) turns these into a render pass with subpass dependencies, while a
//! [`ComputePass`](compute::ComputePass) records pipeline barriers between dispatch groups.

use anyhow::Result;

use crate::pass::base::{BasePass, PassKind};
use crate::pass::compute::ComputePass;
use crate::pass::graphics::GraphicsPass;
use crate::pass::usage::ImageUsageTracker;

pub mod base;
pub mod compute;
pub mod graphics;
pub mod render_pass;
pub mod usage;

/// Any kind of pass.
#[derive(Debug)]
pub enum Pass {
    Graphics(GraphicsPass),
    Compute(ComputePass),
}

impl Pass {
    /// Usage tracking state shared by every kind of pass.
    pub fn base(&self) -> &BasePass {
        match self {
            Pass::Graphics(pass) => pass.base(),
            Pass::Compute(pass) => pass.base(),
        }
    }

    /// Kind of the pass.
    pub fn kind(&self) -> PassKind {
        self.base().kind()
    }

    /// Write the usage every image of the pass is left in into `tracker`.
    pub fn update_tracked_image_usages(&self, tracker: &mut ImageUsageTracker) -> Result<()> {
        match self {
            Pass::Graphics(pass) => pass.update_tracked_image_usages(tracker),
            Pass::Compute(pass) => pass.update_tracked_image_usages(tracker),
        }
    }
}

impl From<GraphicsPass> for Pass {
    fn from(pass: GraphicsPass) -> Self {
        Pass::Graphics(pass)
    }
}

impl From<ComputePass> for Pass {
    fn from(pass: ComputePass) -> Self {
        Pass::Compute(pass)
    }
}
