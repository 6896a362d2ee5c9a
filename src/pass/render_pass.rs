//! Wrappers around [`VkRenderPass`](vk::RenderPass) and the framebuffers rendered into with it.
//!
//! A [`RenderPassBuilder`] holds the structure of a render pass: attachment descriptions, the attachments referenced by
//! every subpass and the dependencies between subpasses. Images are bound per attachment through an [`ImageResolver`],
//! which maps a framebuffer index to the image used by that framebuffer. Since the structure never depends on the bound
//! images, the same builder can be used to build a new [`RenderPass`] after the images changed, for example after the
//! window was resized.
//!
//! Builders are usually not filled in by hand, but derived from a [`GraphicsPass`](crate::GraphicsPass).

use anyhow::Result;
use ash::vk;

use crate::{AttachmentImage, Device, Error};

/// Returns the image bound to an attachment for the framebuffer with the given index.
pub type ImageResolver = Box<dyn Fn(usize) -> AttachmentImage>;

/// Records the commands of one subpass. Only valid for a single call to [`RenderPass::run`].
pub type RenderOp<'a> = Box<dyn FnMut(vk::CommandBuffer) -> Result<()> + 'a>;

/// Load and store operations of an attachment.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AttachmentOps {
    Color {
        load: vk::AttachmentLoadOp,
        store: vk::AttachmentStoreOp,
    },
    DepthStencil {
        load_depth: vk::AttachmentLoadOp,
        store_depth: vk::AttachmentStoreOp,
        load_stencil: vk::AttachmentLoadOp,
        store_stencil: vk::AttachmentStoreOp,
    },
}

/// Description of one attachment. Format and sample count come from the image bound later.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Load and store operations.
    pub ops: AttachmentOps,
    /// Layout the image is in when the render pass begins.
    pub initial_layout: vk::ImageLayout,
    /// Layout the image is transitioned to when the render pass ends.
    pub final_layout: vk::ImageLayout,
}

impl Attachment {
    fn default_clear_value(&self) -> vk::ClearValue {
        match self.ops {
            AttachmentOps::Color { .. } => vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: [0.0, 0.0, 0.0, 0.0],
                },
            },
            AttachmentOps::DepthStencil { .. } => vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
        }
    }

    fn description(&self) -> vk::AttachmentDescription {
        let (load_op, store_op, stencil_load_op, stencil_store_op) = match self.ops {
            AttachmentOps::Color { load, store } => (
                load,
                store,
                vk::AttachmentLoadOp::DONT_CARE,
                vk::AttachmentStoreOp::DONT_CARE,
            ),
            AttachmentOps::DepthStencil {
                load_depth,
                store_depth,
                load_stencil,
                store_stencil,
            } => (load_depth, store_depth, load_stencil, store_stencil),
        };
        vk::AttachmentDescription {
            flags: vk::AttachmentDescriptionFlags::empty(),
            format: vk::Format::UNDEFINED,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op,
            store_op,
            stencil_load_op,
            stencil_store_op,
            initial_layout: self.initial_layout,
            final_layout: self.final_layout,
        }
    }
}

/// One side of a subpass dependency.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SubpassAccess {
    /// Subpass index, or [`vk::SUBPASS_EXTERNAL`].
    pub index: u32,
    /// Stages that are waited on, or that wait.
    pub stage: vk::PipelineStageFlags,
    /// Accesses that are made available, or made visible.
    pub access: vk::AccessFlags,
}

/// Dependency required by a single image between two subpasses.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubpassDependency {
    /// Image that required this dependency.
    pub image: String,
    /// Earlier usage.
    pub src: SubpassAccess,
    /// Later usage.
    pub dst: SubpassAccess,
    /// Dependency flags.
    pub flags: vk::DependencyFlags,
}

/// Attachments referenced by one subpass.
#[derive(Debug, Clone, Default)]
pub struct SubpassAttachments {
    /// Color attachments, indexed by shader location. Unused locations hold [`vk::ATTACHMENT_UNUSED`].
    pub color_refs: Vec<vk::AttachmentReference>,
    /// Resolve targets, with the same length as `color_refs`.
    pub resolve_refs: Option<Vec<vk::AttachmentReference>>,
    /// Depth stencil attachment.
    pub depth_stencil_ref: Option<vk::AttachmentReference>,
}

/// Reference to an attachment slot that is not used.
pub const UNUSED_ATTACHMENT: vk::AttachmentReference = vk::AttachmentReference {
    attachment: vk::ATTACHMENT_UNUSED,
    layout: vk::ImageLayout::UNDEFINED,
};

/// Builds [`RenderPass`] objects. Unlike most builders in this crate, this one is not consumed by [`build`](Self::build),
/// so it can be rebuilt after attachment images are rebound.
#[derive(Derivative, Default)]
#[derivative(Debug)]
pub struct RenderPassBuilder {
    num_framebuffers: Option<usize>,
    attachments: Vec<vk::AttachmentDescription>,
    #[derivative(Debug = "ignore")]
    clear_values: Vec<vk::ClearValue>,
    #[derivative(Debug = "ignore")]
    resolvers: Vec<Option<ImageResolver>>,
    subpasses: Vec<SubpassAttachments>,
    dependencies: Vec<SubpassDependency>,
}

impl RenderPassBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of framebuffers to create, usually one per swapchain image.
    pub fn set_num_framebuffers(&mut self, count: usize) -> &mut Self {
        self.num_framebuffers = Some(count);
        self
    }

    /// Describe the attachment at `index`. This also resets its clear value to the default for its kind.
    pub fn set_attachment(&mut self, index: usize, attachment: Attachment) -> &mut Self {
        if index >= self.attachments.len() {
            self.attachments.resize(index + 1, vk::AttachmentDescription::default());
            self.clear_values.resize(index + 1, vk::ClearValue::default());
            self.resolvers.resize_with(index + 1, || None);
        }
        self.attachments[index] = attachment.description();
        self.clear_values[index] = attachment.default_clear_value();
        self
    }

    /// Bind the images of an attachment. The format and sample count of the attachment are taken from the image of the
    /// first framebuffer.
    pub fn update_attachment_image(&mut self, index: usize, resolver: ImageResolver) -> Result<&mut Self> {
        let Some(description) = self.attachments.get_mut(index) else {
            return Err(Error::AttachmentOutOfRange(index).into());
        };
        let sample = resolver(0);
        description.format = sample.format;
        description.samples = sample.samples;
        self.resolvers[index] = Some(resolver);
        Ok(self)
    }

    /// Override the value an attachment is cleared to when it is loaded with [`vk::AttachmentLoadOp::CLEAR`].
    pub fn set_clear_value(&mut self, index: usize, value: vk::ClearValue) -> Result<&mut Self> {
        let Some(clear_value) = self.clear_values.get_mut(index) else {
            return Err(Error::AttachmentOutOfRange(index).into());
        };
        *clear_value = value;
        Ok(self)
    }

    /// Set the color and depth stencil attachments used by a subpass.
    pub fn set_subpass(
        &mut self,
        index: usize,
        color_refs: Vec<vk::AttachmentReference>,
        depth_stencil_ref: Option<vk::AttachmentReference>,
    ) -> &mut Self {
        if index >= self.subpasses.len() {
            self.subpasses.resize_with(index + 1, SubpassAttachments::default);
        }
        self.subpasses[index] = SubpassAttachments {
            color_refs,
            resolve_refs: None,
            depth_stencil_ref,
        };
        self
    }

    /// Set the resolve targets of a subpass. Must be called after [`set_subpass`](Self::set_subpass), with as many
    /// references as the subpass has color references.
    pub fn set_multisampling(&mut self, subpass: usize, resolve_refs: Vec<vk::AttachmentReference>) -> Result<&mut Self> {
        let Some(attachments) = self.subpasses.get_mut(subpass) else {
            return Err(Error::Uncategorized("Attachments not set for subpass").into());
        };
        if attachments.color_refs.len() != resolve_refs.len() {
            return Err(Error::Uncategorized("Number of resolve references must match number of color references").into());
        }
        attachments.resolve_refs = Some(resolve_refs);
        Ok(self)
    }

    /// Record a dependency between two subpasses.
    pub fn add_subpass_dependency(&mut self, dependency: SubpassDependency) -> &mut Self {
        self.dependencies.push(dependency);
        self
    }

    /// Number of framebuffers, if set.
    pub fn num_framebuffers(&self) -> Option<usize> {
        self.num_framebuffers
    }

    /// Attachment descriptions.
    pub fn attachments(&self) -> &[vk::AttachmentDescription] {
        &self.attachments
    }

    /// Clear values, one per attachment.
    pub fn clear_values(&self) -> &[vk::ClearValue] {
        &self.clear_values
    }

    /// Attachments referenced by every subpass.
    pub fn subpasses(&self) -> &[SubpassAttachments] {
        &self.subpasses
    }

    /// Dependencies as recorded, one per image and pair of subpasses.
    pub fn dependencies(&self) -> &[SubpassDependency] {
        &self.dependencies
    }

    /// Dependencies passed to Vulkan. All dependencies between the same pair of subpasses are merged into one.
    pub fn merged_dependencies(&self) -> Vec<vk::SubpassDependency> {
        let mut merged: Vec<vk::SubpassDependency> = Vec::new();
        for dependency in &self.dependencies {
            let existing = merged
                .iter_mut()
                .find(|d| d.src_subpass == dependency.src.index && d.dst_subpass == dependency.dst.index);
            match existing {
                Some(d) => {
                    d.src_stage_mask |= dependency.src.stage;
                    d.dst_stage_mask |= dependency.dst.stage;
                    d.src_access_mask |= dependency.src.access;
                    d.dst_access_mask |= dependency.dst.access;
                    d.dependency_flags |= dependency.flags;
                }
                None => merged.push(vk::SubpassDependency {
                    src_subpass: dependency.src.index,
                    dst_subpass: dependency.dst.index,
                    src_stage_mask: dependency.src.stage,
                    dst_stage_mask: dependency.dst.stage,
                    src_access_mask: dependency.src.access,
                    dst_access_mask: dependency.dst.access,
                    dependency_flags: dependency.flags,
                }),
            }
        }
        merged
    }

    /// Check everything [`build`](Self::build) needs without touching the device. Returns the framebuffer extent.
    /// # Errors
    /// * Fails if the number of framebuffers is not set.
    /// * Fails if an attachment has no images bound.
    /// * Fails if the images of the first framebuffer have an empty extent, or if they differ in size.
    pub fn validate(&self) -> Result<vk::Extent2D> {
        let num_framebuffers = self.num_framebuffers.ok_or(Error::NoFramebufferCount)?;
        if num_framebuffers == 0 {
            return Err(Error::NoFramebufferCount.into());
        }
        let mut resolvers = Vec::with_capacity(self.resolvers.len());
        for (index, resolver) in self.resolvers.iter().enumerate() {
            resolvers.push(resolver.as_ref().ok_or(Error::AttachmentNotBound(index))?);
        }
        let Some(first) = resolvers.first() else {
            return Err(Error::AttachmentNotBound(0).into());
        };
        let extent = first(0).extent;
        if extent.width == 0 || extent.height == 0 {
            return Err(Error::ZeroExtent(extent.width, extent.height).into());
        }
        for (index, resolver) in resolvers.iter().enumerate().skip(1) {
            let found = resolver(0).extent;
            if found != extent {
                return Err(Error::ExtentMismatch {
                    index,
                    expected: extent,
                    found,
                }
                .into());
            }
        }
        Ok(extent)
    }

    /// Create the render pass and its framebuffers.
    pub fn build(&self, device: Device) -> Result<RenderPass> {
        let extent = self.validate()?;
        let num_framebuffers = self.num_framebuffers.ok_or(Error::NoFramebufferCount)?;

        let descriptions = self
            .subpasses
            .iter()
            .map(|attachments| {
                let mut description = vk::SubpassDescription::builder()
                    .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
                    .color_attachments(&attachments.color_refs);
                if let Some(resolve_refs) = &attachments.resolve_refs {
                    description = description.resolve_attachments(resolve_refs);
                }
                if let Some(depth_stencil_ref) = &attachments.depth_stencil_ref {
                    description = description.depth_stencil_attachment(depth_stencil_ref);
                }
                description.build()
            })
            .collect::<Vec<_>>();
        let dependencies = self.merged_dependencies();

        let info = vk::RenderPassCreateInfo::builder()
            .attachments(&self.attachments)
            .subpasses(&descriptions)
            .dependencies(&dependencies);
        let handle = unsafe { device.create_render_pass(&info, None)? };
        #[cfg(feature = "log-objects")]
        trace!("Created new VkRenderPass {handle:p}");

        // Framebuffers created so far are cleaned up by Drop if a later one fails.
        let mut render_pass = RenderPass {
            device,
            handle,
            framebuffers: Vec::with_capacity(num_framebuffers),
            clear_values: self.clear_values.clone(),
            extent,
            num_subpasses: self.subpasses.len(),
        };

        for index in 0..num_framebuffers {
            let views = self
                .resolvers
                .iter()
                .flatten()
                .map(|resolver| resolver(index).view)
                .collect::<Vec<_>>();
            let info = vk::FramebufferCreateInfo::builder()
                .render_pass(handle)
                .attachments(&views)
                .width(extent.width)
                .height(extent.height)
                .layers(1);
            let framebuffer = unsafe { render_pass.device.create_framebuffer(&info, None)? };
            #[cfg(feature = "log-objects")]
            trace!("Created new VkFramebuffer {framebuffer:p}");
            render_pass.framebuffers.push(framebuffer);
        }

        Ok(render_pass)
    }
}

/// A [`VkRenderPass`](vk::RenderPass) together with one framebuffer per swapchain image.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct RenderPass {
    #[derivative(Debug = "ignore")]
    device: Device,
    handle: vk::RenderPass,
    framebuffers: Vec<vk::Framebuffer>,
    #[derivative(Debug = "ignore")]
    clear_values: Vec<vk::ClearValue>,
    extent: vk::Extent2D,
    num_subpasses: usize,
}

impl RenderPass {
    /// Record the render pass into `cmd`, rendering into the framebuffer at `framebuffer_index`.
    /// `ops` holds exactly one operation per subpass, they are called in subpass order.
    pub fn run(&self, cmd: vk::CommandBuffer, framebuffer_index: usize, ops: &mut [RenderOp<'_>]) -> Result<()> {
        if ops.len() != self.num_subpasses {
            return Err(Error::SubpassCountMismatch {
                expected: self.num_subpasses,
                found: ops.len(),
            }
            .into());
        }
        let framebuffer = *self
            .framebuffers
            .get(framebuffer_index)
            .ok_or(Error::FramebufferOutOfRange(framebuffer_index))?;

        let begin_info = vk::RenderPassBeginInfo::builder()
            .render_pass(self.handle)
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent: self.extent,
            })
            .clear_values(&self.clear_values);

        unsafe {
            self.device
                .cmd_begin_render_pass(cmd, &begin_info, vk::SubpassContents::INLINE);
        }
        for (subpass, op) in ops.iter_mut().enumerate() {
            if subpass != 0 {
                unsafe { self.device.cmd_next_subpass(cmd, vk::SubpassContents::INLINE) };
            }
            op(cmd)?;
        }
        unsafe { self.device.cmd_end_render_pass(cmd) };
        Ok(())
    }

    /// Number of subpasses.
    pub fn num_subpasses(&self) -> usize {
        self.num_subpasses
    }

    /// Size of every framebuffer.
    pub fn framebuffer_extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Number of framebuffers.
    pub fn num_framebuffers(&self) -> usize {
        self.framebuffers.len()
    }

    /// Get unsafe access to the underlying `VkRenderPass` handle.
    /// # Safety
    /// The render pass must not be destroyed through this handle.
    pub unsafe fn handle(&self) -> vk::RenderPass {
        self.handle
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe {
            for framebuffer in self.framebuffers.drain(..) {
                #[cfg(feature = "log-objects")]
                trace!("Destroying VkFramebuffer {framebuffer:p}");
                self.device.destroy_framebuffer(framebuffer, None);
            }
            #[cfg(feature = "log-objects")]
            trace!("Destroying VkRenderPass {:p}", self.handle);
            self.device.destroy_render_pass(self.handle, None);
        }
    }
}
