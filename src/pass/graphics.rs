//! A graphics pass declares the attachments of a render pass and how each of them is used in every subpass. From that
//! it derives a [`RenderPassBuilder`] with the attachment descriptions, the attachment references of each subpass and
//! all the subpass dependencies needed to synchronize the attachments.
//!
//! # Example
//! ```
//! # use deimos::*;
//! # use anyhow::Result;
//! # fn main() -> Result<()> {
//! let mut pass = GraphicsPass::new(2);
//! pass.add_color_attachment(
//!     "gbuffer",
//!     UsageHistory::new(Usage::undefined())
//!         .add_usage(0, Usage::render_target())
//!         .add_usage(1, Usage::sampled(vk::PipelineStageFlags::FRAGMENT_SHADER)),
//! )?;
//! pass.add_color_attachment(
//!     "swapchain",
//!     UsageHistory::new(Usage::undefined())
//!         .add_usage(1, Usage::render_target())
//!         .set_final_usage(Usage::present()),
//! )?;
//! let builder = pass.create_render_pass_builder(3)?;
//! assert_eq!(builder.attachments().len(), 2);
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;

use anyhow::Result;
use ash::vk;

use crate::pass::base::{attachment_family, BasePass, PassKind};
use crate::pass::render_pass::{
    Attachment, AttachmentOps, RenderPassBuilder, SubpassAccess, SubpassDependency, UNUSED_ATTACHMENT,
};
use crate::pass::usage::{AttachmentFamily, ImageUsageTracker, Usage, UsageHistory, UsageType};
use crate::Error;

/// Returns the shader location of a color attachment at the given subpass.
pub type LocationGetter = Box<dyn Fn(u32) -> u32>;

enum Location {
    Fixed(u32),
    Custom(LocationGetter),
}

impl Location {
    fn at(&self, subpass: u32) -> u32 {
        match self {
            Location::Fixed(location) => *location,
            Location::Custom(getter) => getter(subpass),
        }
    }
}

#[derive(Derivative)]
#[derivative(Debug)]
struct AttachmentEntry {
    name: String,
    family: AttachmentFamily,
    #[derivative(Debug = "ignore")]
    location: Option<Location>,
}

/// Pass that renders into attachments, see the [module level documentation](self).
#[derive(Derivative)]
#[derivative(Debug)]
pub struct GraphicsPass {
    base: BasePass,
    attachments: Vec<AttachmentEntry>,
    next_color_slot: u32,
    /// Resolve (source, destination) pairs per subpass.
    resolves: BTreeMap<u32, Vec<(String, String)>>,
}

impl GraphicsPass {
    /// Create a graphics pass with `num_subpasses` subpasses.
    pub fn new(num_subpasses: u32) -> Self {
        Self {
            base: BasePass::new(PassKind::Graphics, num_subpasses),
            attachments: Vec::new(),
            next_color_slot: 0,
            resolves: BTreeMap::new(),
        }
    }

    /// Usage tracking state of the pass.
    pub fn base(&self) -> &BasePass {
        &self.base
    }

    /// Number of subpasses.
    pub fn num_subpasses(&self) -> u32 {
        self.base.num_subpasses()
    }

    /// Index of the attachment registered under `name`.
    pub fn attachment_index(&self, name: &str) -> Result<usize> {
        self.attachments
            .iter()
            .position(|entry| entry.name == name)
            .ok_or_else(|| Error::UnknownImage(name.to_owned()).into())
    }

    /// Register a color attachment. If the image is used as a render target, it is bound to the next free shader
    /// location, counting color attachments in registration order. Images that are only resolved into do not take a
    /// location. Returns the attachment index.
    pub fn add_color_attachment(&mut self, name: impl Into<String>, history: UsageHistory) -> Result<usize> {
        let renders = history
            .real_usages(self.num_subpasses())
            .any(|(_, usage)| usage.usage_type == UsageType::RenderTarget);
        let location = renders.then(|| Location::Fixed(self.next_color_slot));
        let index = self.add_attachment(name.into(), history, AttachmentFamily::Color, location)?;
        if renders {
            self.next_color_slot += 1;
        }
        Ok(index)
    }

    /// Register a color attachment whose shader location changes between subpasses. Returns the attachment index.
    pub fn add_color_attachment_at(
        &mut self,
        name: impl Into<String>,
        history: UsageHistory,
        location: impl Fn(u32) -> u32 + 'static,
    ) -> Result<usize> {
        self.add_attachment(
            name.into(),
            history,
            AttachmentFamily::Color,
            Some(Location::Custom(Box::new(location))),
        )
    }

    /// Register a depth stencil attachment. Returns the attachment index.
    pub fn add_depth_stencil_attachment(&mut self, name: impl Into<String>, history: UsageHistory) -> Result<usize> {
        self.add_attachment(name.into(), history, AttachmentFamily::DepthStencil, None)
    }

    fn add_attachment(
        &mut self,
        name: String,
        history: UsageHistory,
        family: AttachmentFamily,
        location: Option<Location>,
    ) -> Result<usize> {
        let found = attachment_family(&name, &history, self.num_subpasses())?;
        if found != family {
            let found = history
                .real_usages(self.num_subpasses())
                .map(|(_, usage)| usage.usage_type)
                .find(|ty| ty.attachment_family() == Some(found))
                .unwrap_or(UsageType::Undefined);
            return Err(Error::InvalidUsageType { image: name, found }.into());
        }
        self.base.add_usage_history(name.clone(), history)?;
        self.attachments.push(AttachmentEntry { name, family, location });
        Ok(self.attachments.len() - 1)
    }

    /// Resolve the multisampled color attachment `src` into `dst` at the end of `subpass`.
    pub fn add_multisample_resolving(
        &mut self,
        src: impl Into<String>,
        dst: impl Into<String>,
        subpass: u32,
    ) -> Result<&mut Self> {
        let src = src.into();
        let dst = dst.into();
        for image in [&src, &dst] {
            let index = self.attachment_index(image)?;
            if self.attachments[index].family != AttachmentFamily::Color {
                return Err(Error::InvalidUsageType {
                    image: image.clone(),
                    found: UsageType::DepthStencilAttachment,
                }
                .into());
            }
        }
        if subpass >= self.num_subpasses() {
            return Err(Error::SubpassOutOfRange {
                image: src,
                subpass: subpass as i32,
                min: 0,
                max: self.num_subpasses() as i32 - 1,
            }
            .into());
        }
        self.resolves.entry(subpass).or_default().push((src, dst));
        Ok(self)
    }

    /// Write the usage every attachment is left in after this pass into `tracker`.
    pub fn update_tracked_image_usages(&self, tracker: &mut ImageUsageTracker) -> Result<()> {
        for entry in &self.attachments {
            self.base.update_tracked_image_usage(&entry.name, tracker)?;
        }
        Ok(())
    }

    /// Derive a render pass builder rendering into `num_framebuffers` framebuffers. Attachment images still have to be
    /// bound with [`RenderPassBuilder::update_attachment_image`] before building.
    pub fn create_render_pass_builder(&self, num_framebuffers: usize) -> Result<RenderPassBuilder> {
        let mut builder = RenderPassBuilder::new();
        builder.set_num_framebuffers(num_framebuffers);

        for (index, entry) in self.attachments.iter().enumerate() {
            builder.set_attachment(index, self.attachment_description(entry)?);
        }

        for subpass in 0..self.num_subpasses() {
            let color_refs = self.color_refs(subpass)?;
            let depth_stencil_ref = self.depth_stencil_ref(subpass)?;
            let resolve_refs = self.resolve_refs(subpass, &color_refs)?;
            builder.set_subpass(subpass as usize, color_refs, depth_stencil_ref);
            if let Some(resolve_refs) = resolve_refs {
                builder.set_multisampling(subpass as usize, resolve_refs)?;
            }
        }

        for entry in &self.attachments {
            for subpass in 0..=self.base.virtual_final_subpass() {
                if let Some(dependency) = self.dependency(&entry.name, subpass)? {
                    builder.add_subpass_dependency(dependency);
                }
            }
        }

        Ok(builder)
    }

    fn attachment_description(&self, entry: &AttachmentEntry) -> Result<Attachment> {
        let history = self.base.usage_history(&entry.name)?;
        let before = history.initial_usage();
        let after = history
            .usage(self.base.virtual_final_subpass())
            .copied()
            .unwrap_or_else(Usage::undefined);

        let load = if before.usage_type == UsageType::Undefined {
            vk::AttachmentLoadOp::CLEAR
        } else {
            vk::AttachmentLoadOp::LOAD
        };
        let store = if after.usage_type == UsageType::Undefined {
            vk::AttachmentStoreOp::DONT_CARE
        } else {
            vk::AttachmentStoreOp::STORE
        };
        let ops = match entry.family {
            AttachmentFamily::Color => AttachmentOps::Color { load, store },
            AttachmentFamily::DepthStencil => AttachmentOps::DepthStencil {
                load_depth: load,
                store_depth: store,
                load_stencil: load,
                store_stencil: store,
            },
        };
        Ok(Attachment {
            ops,
            initial_layout: before.layout,
            final_layout: self.base.image_layout_after_pass(&entry.name)?,
        })
    }

    fn color_location(&self, entry: &AttachmentEntry, subpass: u32) -> Result<u32> {
        entry
            .location
            .as_ref()
            .map(|location| location.at(subpass))
            .ok_or_else(|| {
                Error::InvalidUsageType {
                    image: entry.name.clone(),
                    found: UsageType::RenderTarget,
                }
                .into()
            })
    }

    fn color_refs(&self, subpass: u32) -> Result<Vec<vk::AttachmentReference>> {
        let mut located = BTreeMap::new();
        for (index, entry) in self.attachments.iter().enumerate() {
            let Some(usage) = self.base.usage(&entry.name, subpass as i32)? else {
                continue;
            };
            if usage.usage_type != UsageType::RenderTarget {
                continue;
            }
            let location = self.color_location(entry, subpass)?;
            let reference = vk::AttachmentReference {
                attachment: index as u32,
                layout: usage.layout,
            };
            if located.insert(location, reference).is_some() {
                return Err(Error::DuplicateColorLocation { subpass, location }.into());
            }
        }

        let count = located.keys().next_back().map(|last| *last as usize + 1).unwrap_or(0);
        let mut refs = vec![UNUSED_ATTACHMENT; count];
        for (location, reference) in located {
            refs[location as usize] = reference;
        }
        Ok(refs)
    }

    fn depth_stencil_ref(&self, subpass: u32) -> Result<Option<vk::AttachmentReference>> {
        let mut found = None;
        for (index, entry) in self.attachments.iter().enumerate() {
            let Some(usage) = self.base.usage(&entry.name, subpass as i32)? else {
                continue;
            };
            if usage.usage_type != UsageType::DepthStencilAttachment {
                continue;
            }
            if found.is_some() {
                return Err(Error::MultipleDepthStencil(subpass).into());
            }
            found = Some(vk::AttachmentReference {
                attachment: index as u32,
                layout: usage.layout,
            });
        }
        Ok(found)
    }

    fn resolve_refs(
        &self,
        subpass: u32,
        color_refs: &[vk::AttachmentReference],
    ) -> Result<Option<Vec<vk::AttachmentReference>>> {
        let Some(pairs) = self.resolves.get(&subpass) else {
            return Ok(None);
        };
        let mut refs = vec![UNUSED_ATTACHMENT; color_refs.len()];
        for (src, dst) in pairs {
            let src_entry = &self.attachments[self.attachment_index(src)?];
            let dst_index = self.attachment_index(dst)?;
            for (image, expected) in [(src, UsageType::RenderTarget), (dst, UsageType::MultisampleResolveTarget)] {
                let found = self
                    .base
                    .usage(image, subpass as i32)?
                    .map(|usage| usage.usage_type)
                    .unwrap_or(UsageType::Undefined);
                if found != expected {
                    return Err(Error::InvalidUsageType {
                        image: image.clone(),
                        found,
                    }
                    .into());
                }
            }
            let location = self.color_location(src_entry, subpass)? as usize;
            refs[location] = vk::AttachmentReference {
                attachment: dst_index as u32,
                layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            };
        }
        Ok(Some(refs))
    }

    fn subpass_index(&self, subpass: i32) -> u32 {
        if subpass < 0 || subpass >= self.base.virtual_final_subpass() {
            vk::SUBPASS_EXTERNAL
        } else {
            subpass as u32
        }
    }

    fn dependency(&self, image: &str, subpass: i32) -> Result<Option<SubpassDependency>> {
        let Some(info) = self.base.image_usages_if_need_synchronization(image, subpass)? else {
            return Ok(None);
        };
        let src = self.subpass_index(info.prev_subpass);
        let dst = self.subpass_index(subpass);
        if src == dst {
            return Err(Error::SelfDependency(image.to_owned()).into());
        }
        Ok(Some(SubpassDependency {
            image: image.to_owned(),
            src: SubpassAccess {
                index: src,
                stage: info.prev_usage.stage,
                access: info.src_access(),
            },
            dst: SubpassAccess {
                index: dst,
                stage: info.curr_usage.stage,
                access: info.dst_access(),
            },
            flags: vk::DependencyFlags::empty(),
        }))
    }
}
