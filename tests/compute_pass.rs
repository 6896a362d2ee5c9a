use anyhow::Result;

use deimos::{vk, AccessType, ComputePass, Error, ImageUsageTracker, Pass, PassKind, Usage, UsageHistory, UsageType};

mod framework;

fn compute_storage(access: AccessType) -> Usage {
    Usage::storage(access, vk::PipelineStageFlags::COMPUTE_SHADER)
}

fn compute_sampled() -> Usage {
    Usage::sampled(vk::PipelineStageFlags::COMPUTE_SHADER)
}

fn blur_pass() -> Result<ComputePass> {
    let mut pass = ComputePass::new(2);
    pass.add_image(
        "blur",
        UsageHistory::new(Usage::undefined())
            .add_usage(0, compute_storage(AccessType::WriteOnly))
            .add_usage(1, compute_sampled())
            .set_final_usage(Usage::sampled(vk::PipelineStageFlags::FRAGMENT_SHADER)),
    )?
    .add_image(
        "lut",
        UsageHistory::new(compute_sampled()).add_usage_range(0, 1, compute_sampled()),
    )?;
    Ok(pass)
}

#[test]
pub fn barriers_between_groups() -> Result<()> {
    framework::init_logging();
    let pass = blur_pass()?;
    assert!(pass.barriers_at(-1)?.is_empty());

    let first = pass.barriers_at(0)?;
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].image, "blur");
    assert_eq!(first[0].old_layout, vk::ImageLayout::UNDEFINED);
    assert_eq!(first[0].new_layout, vk::ImageLayout::GENERAL);
    assert_eq!(first[0].src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
    assert_eq!(first[0].dst_stage, vk::PipelineStageFlags::COMPUTE_SHADER);
    assert_eq!(first[0].src_access, vk::AccessFlags::empty());
    assert_eq!(first[0].dst_access, vk::AccessFlags::SHADER_WRITE);

    let second = pass.barriers_at(1)?;
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].old_layout, vk::ImageLayout::GENERAL);
    assert_eq!(second[0].new_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    assert_eq!(second[0].src_access, vk::AccessFlags::SHADER_WRITE);
    assert_eq!(second[0].dst_access, vk::AccessFlags::SHADER_READ);
    Ok(())
}

#[test]
pub fn final_barrier_orders_stages_only() -> Result<()> {
    let pass = blur_pass()?;
    let last = pass.barriers_at(pass.base().virtual_final_subpass())?;
    assert_eq!(last.len(), 1);
    assert_eq!(last[0].old_layout, last[0].new_layout);
    assert_eq!(last[0].src_stage, vk::PipelineStageFlags::COMPUTE_SHADER);
    assert_eq!(last[0].dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    assert_eq!(last[0].src_access, vk::AccessFlags::empty());
    assert_eq!(last[0].dst_access, vk::AccessFlags::empty());
    expect_out_of_range(pass.barriers_at(3));
    Ok(())
}

fn expect_out_of_range(result: Result<Vec<deimos::ImageBarrier>>) {
    let err = result.expect_err("subpass should be out of range");
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::SubpassOutOfRange { .. })));
}

#[test]
pub fn transfers_are_allowed() -> Result<()> {
    let mut pass = ComputePass::new(2);
    pass.add_image(
        "upload",
        UsageHistory::new(Usage::undefined())
            .add_usage(0, Usage::transfer_dst())
            .add_usage(1, compute_storage(AccessType::ReadWrite)),
    )?;
    let barriers = pass.barriers_at(1)?;
    assert_eq!(barriers[0].src_stage, vk::PipelineStageFlags::TRANSFER);
    assert_eq!(barriers[0].src_access, vk::AccessFlags::TRANSFER_WRITE);
    assert_eq!(barriers[0].new_layout, vk::ImageLayout::GENERAL);
    // The image stays in GENERAL, but later users still have to see the writes.
    let last = pass.barriers_at(2)?;
    assert_eq!(last.len(), 1);
    assert_eq!(last[0].old_layout, vk::ImageLayout::GENERAL);
    assert_eq!(last[0].new_layout, vk::ImageLayout::GENERAL);
    assert!(last[0].src_access.contains(vk::AccessFlags::SHADER_WRITE));
    Ok(())
}

#[test]
pub fn discarded_images_keep_their_layout() -> Result<()> {
    let mut pass = ComputePass::new(1);
    pass.add_image(
        "scratch",
        UsageHistory::new(Usage::undefined())
            .add_usage(0, compute_storage(AccessType::WriteOnly))
            .set_final_usage(Usage::undefined()),
    )?;
    assert_eq!(pass.barriers_at(0)?.len(), 1);
    // Never transition into UNDEFINED.
    assert!(pass.barriers_at(pass.base().virtual_final_subpass())?.is_empty());

    let mut tracker = ImageUsageTracker::new();
    pass.update_tracked_image_usages(&mut tracker)?;
    assert_eq!(tracker.usage("scratch")?.usage_type, UsageType::Undefined);
    Ok(())
}

#[test]
pub fn attachments_are_rejected() -> Result<()> {
    let mut pass = ComputePass::new(1);
    let err = pass
        .add_image("color", UsageHistory::new(Usage::undefined()).add_usage(0, Usage::render_target()))
        .expect_err("render targets are not allowed in compute passes");
    assert!(matches!(
        err.downcast_ref::<Error>(),
        Some(Error::InvalidUsageType {
            found: UsageType::RenderTarget,
            ..
        })
    ));

    let err = pass
        .bind_image("color", vk::Image::null(), vk::ImageAspectFlags::COLOR)
        .expect_err("image was never registered");
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::UnknownImage(_))));
    Ok(())
}

#[test]
pub fn tracked_usages() -> Result<()> {
    let mut tracker = ImageUsageTracker::new();
    let pass: Pass = blur_pass()?.into();
    assert_eq!(pass.kind(), PassKind::Compute);
    pass.update_tracked_image_usages(&mut tracker)?;
    assert_eq!(tracker.usage("blur")?, Usage::sampled(vk::PipelineStageFlags::FRAGMENT_SHADER));
    assert_eq!(tracker.usage("lut")?, compute_sampled());
    Ok(())
}
