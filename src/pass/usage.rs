//! Describes how an image is used, per subpass, within a single pass.
//!
//! A [`Usage`] bundles everything synchronization needs to know about one use of an image: the kind of use, the memory
//! access it performs, the pipeline stage it happens in, and the layout the image must be in. A [`UsageHistory`] maps
//! subpass indices to usages for one image in one pass. Besides the real subpasses `0..N`, every history has two virtual
//! entries: the usage before the pass (index `-1`) and the usage after it (index `N`).
//!
//! Between passes, the usage an image was left in is remembered by an [`ImageUsageTracker`], so the next pass can pick
//! it up as its initial usage.
//!
//! # Example
//! ```
//! # use deimos::*;
//! let history = UsageHistory::new(Usage::undefined())
//!     .add_usage(0, Usage::render_target())
//!     .add_usage(1, Usage::sampled(vk::PipelineStageFlags::FRAGMENT_SHADER))
//!     .set_final_usage(Usage::present());
//! ```

use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use ash::vk;

use crate::Error;

/// The kind of use of an image.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum UsageType {
    /// Contents are irrelevant. Used as the initial usage of images that are about to be overwritten.
    Undefined,
    /// Color attachment written by a subpass.
    RenderTarget,
    /// Depth stencil attachment.
    DepthStencilAttachment,
    /// Single sample color attachment a multisampled render target is resolved into.
    MultisampleResolveTarget,
    /// Read through a sampler in a shader.
    SampledTexture,
    /// Accessed as a storage image in a shader.
    StorageImage,
    /// Source of a transfer command.
    TransferSrc,
    /// Destination of a transfer command.
    TransferDst,
    /// Handed to the presentation engine.
    Present,
}

/// Attachments are either color-like (render targets and resolve targets) or depth stencil.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum AttachmentFamily {
    /// Render targets and resolve targets.
    Color,
    /// Depth stencil attachments.
    DepthStencil,
}

impl UsageType {
    /// The attachment family of this usage, or `None` if the usage does not bind the image as an attachment.
    pub fn attachment_family(&self) -> Option<AttachmentFamily> {
        match self {
            UsageType::RenderTarget | UsageType::MultisampleResolveTarget => Some(AttachmentFamily::Color),
            UsageType::DepthStencilAttachment => Some(AttachmentFamily::DepthStencil),
            _ => None,
        }
    }
}

/// How a shader accesses a storage image.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum AccessType {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

const WRITE_ACCESS: vk::AccessFlags = vk::AccessFlags::from_raw(
    vk::AccessFlags::SHADER_WRITE.as_raw()
        | vk::AccessFlags::COLOR_ATTACHMENT_WRITE.as_raw()
        | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE.as_raw()
        | vk::AccessFlags::TRANSFER_WRITE.as_raw()
        | vk::AccessFlags::HOST_WRITE.as_raw()
        | vk::AccessFlags::MEMORY_WRITE.as_raw(),
);

/// One use of an image at one subpass.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Usage {
    /// Kind of use.
    pub usage_type: UsageType,
    /// Memory accesses performed.
    pub access: vk::AccessFlags,
    /// Pipeline stages the accesses happen in.
    pub stage: vk::PipelineStageFlags,
    /// Layout the image must be in.
    pub layout: vk::ImageLayout,
}

impl Usage {
    /// Create a usage with explicit flags.
    pub fn new(usage_type: UsageType, access: vk::AccessFlags, stage: vk::PipelineStageFlags, layout: vk::ImageLayout) -> Self {
        Self {
            usage_type,
            access,
            stage,
            layout,
        }
    }

    /// Contents are discarded.
    pub fn undefined() -> Self {
        Self::new(
            UsageType::Undefined,
            vk::AccessFlags::empty(),
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::ImageLayout::UNDEFINED,
        )
    }

    /// Color attachment, written and possibly blended.
    pub fn render_target() -> Self {
        Self::new(
            UsageType::RenderTarget,
            vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        )
    }

    /// Depth stencil attachment. A read only attachment is depth tested against but never written.
    pub fn depth_stencil(read_only: bool) -> Self {
        let (access, layout) = if read_only {
            (
                vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ,
                vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
            )
        } else {
            (
                vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            )
        };
        Self::new(
            UsageType::DepthStencilAttachment,
            access,
            vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
            layout,
        )
    }

    /// Target of a multisample resolve.
    pub fn multisample_resolve() -> Self {
        Self::new(
            UsageType::MultisampleResolveTarget,
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        )
    }

    /// Sampled in a shader running at `stage`.
    pub fn sampled(stage: vk::PipelineStageFlags) -> Self {
        Self::new(
            UsageType::SampledTexture,
            vk::AccessFlags::SHADER_READ,
            stage,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
    }

    /// Storage image accessed in a shader running at `stage`.
    pub fn storage(access: AccessType, stage: vk::PipelineStageFlags) -> Self {
        let access = match access {
            AccessType::ReadOnly => vk::AccessFlags::SHADER_READ,
            AccessType::WriteOnly => vk::AccessFlags::SHADER_WRITE,
            AccessType::ReadWrite => vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE,
        };
        Self::new(UsageType::StorageImage, access, stage, vk::ImageLayout::GENERAL)
    }

    /// Source of a copy or blit.
    pub fn transfer_src() -> Self {
        Self::new(
            UsageType::TransferSrc,
            vk::AccessFlags::TRANSFER_READ,
            vk::PipelineStageFlags::TRANSFER,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        )
    }

    /// Destination of a copy, blit or clear.
    pub fn transfer_dst() -> Self {
        Self::new(
            UsageType::TransferDst,
            vk::AccessFlags::TRANSFER_WRITE,
            vk::PipelineStageFlags::TRANSFER,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )
    }

    /// Presented to the screen.
    pub fn present() -> Self {
        Self::new(
            UsageType::Present,
            vk::AccessFlags::empty(),
            vk::PipelineStageFlags::BOTTOM_OF_PIPE,
            vk::ImageLayout::PRESENT_SRC_KHR,
        )
    }

    /// Whether this usage writes to the image.
    pub fn is_write(&self) -> bool {
        self.access.intersects(WRITE_ACCESS)
    }
}

/// Usages of one image across the subpasses of one pass.
///
/// The history is built with consuming builder methods. Specifying two usages for the same subpass is not an error
/// immediately, it is reported when the history is registered with a pass, where the image name is known.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageHistory {
    /// Usages keyed by subpass, including the virtual before (-1) and after (N) entries once registered.
    usages: BTreeMap<i32, Usage>,
    final_usage: Option<Usage>,
    duplicate: Option<i32>,
}

impl UsageHistory {
    /// Index of the virtual subpass preceding every pass.
    pub const BEFORE_PASS: i32 = -1;

    /// Start a history for an image that is in `initial` usage before the pass.
    pub fn new(initial: Usage) -> Self {
        let mut usages = BTreeMap::new();
        usages.insert(Self::BEFORE_PASS, initial);
        Self {
            usages,
            final_usage: None,
            duplicate: None,
        }
    }

    /// Start a history for an image, using the usage it was last left in according to `tracker`.
    pub fn from_tracker(tracker: &ImageUsageTracker, image: &str) -> Result<Self> {
        Ok(Self::new(tracker.usage(image)?))
    }

    /// Record the usage at `subpass`.
    pub fn add_usage(mut self, subpass: u32, usage: Usage) -> Self {
        let index = subpass as i32;
        if self.usages.insert(index, usage).is_some() && self.duplicate.is_none() {
            self.duplicate = Some(index);
        }
        self
    }

    /// Record the same usage for every subpass in `first..=last`.
    pub fn add_usage_range(self, first: u32, last: u32, usage: Usage) -> Self {
        (first..=last).fold(self, |history, subpass| history.add_usage(subpass, usage))
    }

    /// Usage the image should be left in after the pass. If this is never called, the image stays in the usage of the
    /// last subpass that uses it.
    pub fn set_final_usage(mut self, usage: Usage) -> Self {
        self.final_usage = Some(usage);
        self
    }

    /// Usage before the pass.
    pub fn initial_usage(&self) -> &Usage {
        // Always present, inserted in new()
        &self.usages[&Self::BEFORE_PASS]
    }

    /// Explicitly requested usage after the pass, if any.
    pub fn final_usage(&self) -> Option<&Usage> {
        self.final_usage.as_ref()
    }

    /// Iterate over all recorded `(subpass, usage)` pairs in subpass order.
    pub fn usages(&self) -> impl Iterator<Item = (i32, &Usage)> {
        self.usages.iter().map(|(subpass, usage)| (*subpass, usage))
    }

    /// Iterate over the usages at real subpasses.
    pub fn real_usages(&self, num_subpasses: u32) -> impl Iterator<Item = (u32, &Usage)> {
        self.usages
            .range(0..num_subpasses as i32)
            .map(|(subpass, usage)| (*subpass as u32, usage))
    }

    /// Usage recorded at `subpass`, virtual subpasses included.
    pub fn usage(&self, subpass: i32) -> Option<&Usage> {
        self.usages.get(&subpass)
    }

    /// Nearest usage strictly before `subpass`. The virtual before entry guarantees there always is one for
    /// `subpass >= 0`.
    pub(crate) fn previous_usage(&self, subpass: i32) -> Option<(i32, &Usage)> {
        self.usages
            .range(..subpass)
            .next_back()
            .map(|(index, usage)| (*index, usage))
    }

    pub(crate) fn duplicate_subpass(&self) -> Option<i32> {
        self.duplicate
    }

    /// Insert the virtual after entry at `num_subpasses`. Without an explicit final usage, the last real usage is used.
    pub(crate) fn seal(&mut self, num_subpasses: u32) {
        let last = self
            .usages
            .range(0..num_subpasses as i32)
            .next_back()
            .map(|(_, usage)| *usage);
        if let Some(usage) = self.final_usage.or(last) {
            self.usages.insert(num_subpasses as i32, usage);
        }
    }
}

/// Remembers the usage every image was left in, so consecutive passes can chain their histories.
#[derive(Debug, Default, Clone)]
pub struct ImageUsageTracker {
    usages: HashMap<String, Usage>,
}

impl ImageUsageTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking an image that is currently in `usage`. Tracking an image again overwrites its usage.
    pub fn track(&mut self, image: impl Into<String>, usage: Usage) -> &mut Self {
        self.usages.insert(image.into(), usage);
        self
    }

    /// Current usage of a tracked image.
    pub fn usage(&self, image: &str) -> Result<Usage> {
        self.usages
            .get(image)
            .copied()
            .ok_or_else(|| Error::UnknownImage(image.to_owned()).into())
    }

    /// Update the usage of an image that is already tracked.
    pub fn update(&mut self, image: &str, usage: Usage) -> Result<()> {
        match self.usages.get_mut(image) {
            Some(current) => {
                *current = usage;
                Ok(())
            }
            None => Err(Error::UnknownImage(image.to_owned()).into()),
        }
    }

    /// Whether the image is tracked.
    pub fn is_tracked(&self, image: &str) -> bool {
        self.usages.contains_key(image)
    }
}
