//! A compute pass runs a sequence of dispatch groups. Images are accessed from shaders or by transfers, so unlike a
//! graphics pass there is no render pass object to express dependencies. Instead, image pipeline barriers are recorded
//! before every group that needs them, and once more after the last group to move images into their final usage.

use std::collections::HashMap;

use anyhow::Result;
use ash::vk;

use crate::pass::base::{BasePass, PassKind};
use crate::pass::usage::{ImageUsageTracker, UsageHistory};
use crate::{Device, Error};

/// Records the commands of one dispatch group.
pub type ComputeOp<'a> = Box<dyn FnMut(vk::CommandBuffer) -> Result<()> + 'a>;

/// Barrier required by one image before a dispatch group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBarrier {
    /// Image name.
    pub image: String,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
}

#[derive(Debug, Copy, Clone)]
struct BoundImage {
    handle: vk::Image,
    aspect: vk::ImageAspectFlags,
}

/// Pass made of sequential compute dispatch groups.
#[derive(Debug)]
pub struct ComputePass {
    base: BasePass,
    images: HashMap<String, BoundImage>,
}

impl ComputePass {
    /// Create a compute pass with `num_subpasses` dispatch groups.
    pub fn new(num_subpasses: u32) -> Self {
        Self {
            base: BasePass::new(PassKind::Compute, num_subpasses),
            images: HashMap::new(),
        }
    }

    /// Usage tracking state of the pass.
    pub fn base(&self) -> &BasePass {
        &self.base
    }

    /// Register an image accessed by this pass.
    pub fn add_image(&mut self, name: impl Into<String>, history: UsageHistory) -> Result<&mut Self> {
        self.base.add_usage_history(name, history)?;
        Ok(self)
    }

    /// Bind the `VkImage` to use for a registered image. Must be done again whenever the image is recreated.
    pub fn bind_image(&mut self, name: &str, image: vk::Image, aspect: vk::ImageAspectFlags) -> Result<&mut Self> {
        self.base.usage_history(name)?;
        self.images.insert(
            name.to_owned(),
            BoundImage {
                handle: image,
                aspect,
            },
        );
        Ok(self)
    }

    /// Barriers that have to be recorded before the dispatch group `subpass`. Querying the virtual subpass after the
    /// pass gives the barriers into the final usages. Images whose final usage is undefined get no final barrier.
    pub fn barriers_at(&self, subpass: i32) -> Result<Vec<ImageBarrier>> {
        let mut barriers = Vec::new();
        for image in self.base.images() {
            let Some(info) = self.base.image_usages_if_need_synchronization(image, subpass)? else {
                continue;
            };
            // An undefined usage discards the contents, so the image stays in the layout of its previous usage.
            if info.curr_usage.layout == vk::ImageLayout::UNDEFINED {
                continue;
            }
            barriers.push(ImageBarrier {
                image: image.to_owned(),
                old_layout: info.prev_usage.layout,
                new_layout: info.curr_usage.layout,
                src_stage: info.prev_usage.stage,
                dst_stage: info.curr_usage.stage,
                src_access: info.src_access(),
                dst_access: info.dst_access(),
            });
        }
        Ok(barriers)
    }

    fn record_barriers(&self, device: &Device, cmd: vk::CommandBuffer, subpass: i32) -> Result<()> {
        let barriers = self.barriers_at(subpass)?;
        if barriers.is_empty() {
            return Ok(());
        }
        let mut src_stage = vk::PipelineStageFlags::empty();
        let mut dst_stage = vk::PipelineStageFlags::empty();
        let mut image_barriers = Vec::with_capacity(barriers.len());
        for barrier in &barriers {
            let bound = self
                .images
                .get(&barrier.image)
                .ok_or_else(|| Error::NoResourceBound(barrier.image.clone()))?;
            src_stage |= barrier.src_stage;
            dst_stage |= barrier.dst_stage;
            image_barriers.push(
                vk::ImageMemoryBarrier::builder()
                    .src_access_mask(barrier.src_access)
                    .dst_access_mask(barrier.dst_access)
                    .old_layout(barrier.old_layout)
                    .new_layout(barrier.new_layout)
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .image(bound.handle)
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: bound.aspect,
                        base_mip_level: 0,
                        level_count: vk::REMAINING_MIP_LEVELS,
                        base_array_layer: 0,
                        layer_count: vk::REMAINING_ARRAY_LAYERS,
                    })
                    .build(),
            );
        }
        unsafe {
            device.cmd_pipeline_barrier(
                cmd,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &image_barriers,
            );
        }
        Ok(())
    }

    /// Record the pass into `cmd`. `ops` holds exactly one operation per dispatch group.
    pub fn run(&self, device: &Device, cmd: vk::CommandBuffer, ops: &mut [ComputeOp<'_>]) -> Result<()> {
        let num_subpasses = self.base.num_subpasses() as usize;
        if ops.len() != num_subpasses {
            return Err(Error::SubpassCountMismatch {
                expected: num_subpasses,
                found: ops.len(),
            }
            .into());
        }
        for (subpass, op) in ops.iter_mut().enumerate() {
            self.record_barriers(device, cmd, subpass as i32)?;
            op(cmd)?;
        }
        self.record_barriers(device, cmd, self.base.virtual_final_subpass())
    }

    /// Write the usage every image is left in after this pass into `tracker`.
    pub fn update_tracked_image_usages(&self, tracker: &mut ImageUsageTracker) -> Result<()> {
        for image in self.base.images() {
            self.base.update_tracked_image_usage(image, tracker)?;
        }
        Ok(())
    }
}
