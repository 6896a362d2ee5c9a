//! State shared by every kind of pass: the number of subpasses and the usage history of every image the pass touches.
//!
//! The [`BasePass`] answers the questions synchronization is built from. What layout is an image in before or after
//! the pass, and does using an image at some subpass require waiting on an earlier use? The answer to the latter is
//! given by [`BasePass::image_usages_if_need_synchronization`], which compares the usage at a subpass with the nearest
//! earlier usage of the same image.

use std::collections::HashMap;

use anyhow::Result;
use ash::vk;

use crate::pass::usage::{AttachmentFamily, ImageUsageTracker, Usage, UsageHistory, UsageType};
use crate::Error;

/// Kind of pass a [`BasePass`] belongs to. Determines which usage types are valid inside the pass.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PassKind {
    /// Every registered image is a color or depth stencil attachment in at least one subpass.
    Graphics,
    /// Images are only accessed from shaders or by transfers.
    Compute,
}

impl PassKind {
    fn validate(&self, image: &str, history: &UsageHistory, num_subpasses: u32) -> Result<()> {
        match self {
            PassKind::Graphics => {
                for (_, usage) in history.real_usages(num_subpasses) {
                    match usage.usage_type {
                        UsageType::Undefined | UsageType::Present | UsageType::TransferSrc | UsageType::TransferDst => {
                            return Err(Error::InvalidUsageType {
                                image: image.to_owned(),
                                found: usage.usage_type,
                            }
                            .into());
                        }
                        _ => {}
                    }
                }
                attachment_family(image, history, num_subpasses).map(|_| ())
            }
            PassKind::Compute => {
                for (_, usage) in history.real_usages(num_subpasses) {
                    if usage.usage_type.attachment_family().is_some() || usage.usage_type == UsageType::Present {
                        return Err(Error::InvalidUsageType {
                            image: image.to_owned(),
                            found: usage.usage_type,
                        }
                        .into());
                    }
                }
                Ok(())
            }
        }
    }
}

/// Determine whether an image is a color or depth stencil attachment. Every attachment usage at a real subpass must be
/// of the same family, and there must be at least one.
pub(crate) fn attachment_family(image: &str, history: &UsageHistory, num_subpasses: u32) -> Result<AttachmentFamily> {
    let mut family = None;
    for (_, usage) in history.real_usages(num_subpasses) {
        let Some(current) = usage.usage_type.attachment_family() else {
            continue;
        };
        match family {
            None => family = Some(current),
            Some(previous) if previous != current => return Err(Error::MixedAttachmentFamily(image.to_owned()).into()),
            Some(_) => {}
        }
    }
    family.ok_or_else(|| {
        let found = history
            .real_usages(num_subpasses)
            .map(|(_, usage)| usage.usage_type)
            .next()
            .unwrap_or(UsageType::Undefined);
        Error::InvalidUsageType {
            image: image.to_owned(),
            found,
        }
        .into()
    })
}

/// The two usages that must be synchronized before an image can be used at some subpass.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ImageUsagesInfo<'a> {
    /// Subpass of the previous usage. May be the virtual subpass before the pass.
    pub prev_subpass: i32,
    /// Previous usage.
    pub prev_usage: &'a Usage,
    /// Usage at the queried subpass.
    pub curr_usage: &'a Usage,
}

impl ImageUsagesInfo<'_> {
    /// Whether memory has to be made available and visible, as opposed to only ordering execution.
    /// Only consecutive reads in the same layout get away with an execution dependency.
    pub fn needs_memory_barrier(&self) -> bool {
        self.prev_usage.layout != self.curr_usage.layout || self.prev_usage.is_write() || self.curr_usage.is_write()
    }

    /// Access mask to wait on.
    pub fn src_access(&self) -> vk::AccessFlags {
        if self.needs_memory_barrier() {
            self.prev_usage.access
        } else {
            vk::AccessFlags::empty()
        }
    }

    /// Access mask that waits.
    pub fn dst_access(&self) -> vk::AccessFlags {
        if self.needs_memory_barrier() {
            self.curr_usage.access
        } else {
            vk::AccessFlags::empty()
        }
    }
}

/// Images and their usage histories for one pass.
#[derive(Debug, Clone)]
pub struct BasePass {
    kind: PassKind,
    num_subpasses: u32,
    histories: HashMap<String, UsageHistory>,
    /// Registration order, so everything derived from the pass is deterministic.
    order: Vec<String>,
}

impl BasePass {
    /// Create an empty pass with `num_subpasses` subpasses.
    pub fn new(kind: PassKind, num_subpasses: u32) -> Self {
        Self {
            kind,
            num_subpasses,
            histories: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Kind of this pass.
    pub fn kind(&self) -> PassKind {
        self.kind
    }

    /// Number of real subpasses.
    pub fn num_subpasses(&self) -> u32 {
        self.num_subpasses
    }

    /// Index of the virtual subpass before the pass.
    pub fn virtual_initial_subpass(&self) -> i32 {
        UsageHistory::BEFORE_PASS
    }

    /// Index of the virtual subpass after the pass.
    pub fn virtual_final_subpass(&self) -> i32 {
        self.num_subpasses as i32
    }

    /// Register the usage history of an image. The history must use the image in at least one real subpass, and every
    /// usage must be valid for the kind of pass.
    pub fn add_usage_history(&mut self, image: impl Into<String>, mut history: UsageHistory) -> Result<()> {
        let image = image.into();
        if self.histories.contains_key(&image) {
            return Err(Error::DuplicateImage(image).into());
        }
        if let Some(subpass) = history.duplicate_subpass() {
            return Err(Error::DuplicateUsage { image, subpass }.into());
        }
        let last = self.num_subpasses as i32 - 1;
        if let Some((subpass, _)) = history
            .usages()
            .find(|(subpass, _)| *subpass != UsageHistory::BEFORE_PASS && (*subpass < 0 || *subpass > last))
        {
            return Err(Error::SubpassOutOfRange {
                image,
                subpass,
                min: 0,
                max: last,
            }
            .into());
        }
        if history.real_usages(self.num_subpasses).next().is_none() {
            return Err(Error::EmptyUsageHistory(image).into());
        }
        self.kind.validate(&image, &history, self.num_subpasses)?;

        history.seal(self.num_subpasses);
        self.order.push(image.clone());
        self.histories.insert(image, history);
        Ok(())
    }

    /// Names of all registered images in registration order.
    pub fn images(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Usage history of a registered image.
    pub fn usage_history(&self, image: &str) -> Result<&UsageHistory> {
        self.histories
            .get(image)
            .ok_or_else(|| Error::UnknownImage(image.to_owned()).into())
    }

    fn check_subpass(&self, image: &str, subpass: i32) -> Result<()> {
        let min = self.virtual_initial_subpass();
        let max = self.virtual_final_subpass();
        if subpass < min || subpass > max {
            return Err(Error::SubpassOutOfRange {
                image: image.to_owned(),
                subpass,
                min,
                max,
            }
            .into());
        }
        Ok(())
    }

    /// Usage of an image at `subpass`, or `None` if the image is not used there. Virtual subpasses are included.
    pub fn usage(&self, image: &str, subpass: i32) -> Result<Option<&Usage>> {
        let history = self.usage_history(image)?;
        self.check_subpass(image, subpass)?;
        Ok(history.usage(subpass))
    }

    /// Layout the image is in before the pass starts.
    pub fn image_layout_before_pass(&self, image: &str) -> Result<vk::ImageLayout> {
        Ok(self.usage_history(image)?.initial_usage().layout)
    }

    /// Layout the image is left in after the pass. When the final usage does not care about the contents, the image
    /// stays in the layout of its last real usage.
    pub fn image_layout_after_pass(&self, image: &str) -> Result<vk::ImageLayout> {
        let history = self.usage_history(image)?;
        let final_layout = history
            .usage(self.virtual_final_subpass())
            .map(|usage| usage.layout)
            .unwrap_or(vk::ImageLayout::UNDEFINED);
        if final_layout != vk::ImageLayout::UNDEFINED {
            return Ok(final_layout);
        }
        Ok(self
            .last_real_usage(image)?
            .map(|usage| usage.layout)
            .unwrap_or(final_layout))
    }

    /// Layout of the image during a real subpass. Fails if the image is not used at that subpass.
    pub fn image_layout_at_subpass(&self, image: &str, subpass: u32) -> Result<vk::ImageLayout> {
        let history = self.usage_history(image)?;
        let index = subpass as i32;
        if subpass >= self.num_subpasses {
            return Err(Error::SubpassOutOfRange {
                image: image.to_owned(),
                subpass: index,
                min: 0,
                max: self.num_subpasses as i32 - 1,
            }
            .into());
        }
        history.usage(index).map(|usage| usage.layout).ok_or_else(|| {
            Error::NoUsageAtSubpass {
                image: image.to_owned(),
                subpass: index,
            }
            .into()
        })
    }

    pub(crate) fn last_real_usage(&self, image: &str) -> Result<Option<&Usage>> {
        Ok(self
            .usage_history(image)?
            .real_usages(self.num_subpasses)
            .last()
            .map(|(_, usage)| usage))
    }

    /// Determine whether using the image at `subpass` must wait for its previous usage.
    ///
    /// Returns `None` if the image is not used at `subpass`, or if both the previous and the current usage only read
    /// the image in the same layout at the same pipeline stage. Reads at different stages still need an execution
    /// dependency, which the returned info reports through [`ImageUsagesInfo::needs_memory_barrier`].
    /// The virtual subpass after the pass can be queried to find out what the transition to the final usage requires.
    pub fn image_usages_if_need_synchronization(&self, image: &str, subpass: i32) -> Result<Option<ImageUsagesInfo<'_>>> {
        let history = self.usage_history(image)?;
        self.check_subpass(image, subpass)?;
        if subpass == self.virtual_initial_subpass() {
            return Ok(None);
        }
        let Some(curr_usage) = history.usage(subpass) else {
            return Ok(None);
        };
        let Some((prev_subpass, prev_usage)) = history.previous_usage(subpass) else {
            return Ok(None);
        };

        let info = ImageUsagesInfo {
            prev_subpass,
            prev_usage,
            curr_usage,
        };
        if info.needs_memory_barrier() || prev_usage.stage != curr_usage.stage {
            Ok(Some(info))
        } else {
            Ok(None)
        }
    }

    /// Store the usage the image is left in after this pass into `tracker`.
    pub fn update_tracked_image_usage(&self, image: &str, tracker: &mut ImageUsageTracker) -> Result<()> {
        let history = self.usage_history(image)?;
        let usage = history
            .usage(self.virtual_final_subpass())
            .copied()
            .ok_or_else(|| Error::EmptyUsageHistory(image.to_owned()))?;
        tracker.track(image, usage);
        Ok(())
    }
}
