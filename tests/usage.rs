use anyhow::Result;

use deimos::{vk, AccessType, BasePass, Error, ImageUsageTracker, PassKind, Usage, UsageHistory, UsageType};

mod framework;

fn expect_error(result: Result<impl std::fmt::Debug>, check: impl Fn(&Error) -> bool) {
    let err = result.expect_err("operation should fail");
    let err = err.downcast_ref::<Error>().expect("error should be a deimos error");
    assert!(check(err), "unexpected error {err:?}");
}

fn graphics_pass(num_subpasses: u32) -> BasePass {
    BasePass::new(PassKind::Graphics, num_subpasses)
}

#[test]
pub fn usage_constructors() -> Result<()> {
    let rt = Usage::render_target();
    assert_eq!(rt.usage_type, UsageType::RenderTarget);
    assert_eq!(rt.layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
    assert!(rt.is_write());

    let depth = Usage::depth_stencil(true);
    assert_eq!(depth.layout, vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL);
    assert!(!depth.is_write());
    assert!(Usage::depth_stencil(false).is_write());

    let sampled = Usage::sampled(vk::PipelineStageFlags::FRAGMENT_SHADER);
    assert_eq!(sampled.access, vk::AccessFlags::SHADER_READ);
    assert!(!sampled.is_write());

    let storage = Usage::storage(AccessType::ReadWrite, vk::PipelineStageFlags::COMPUTE_SHADER);
    assert_eq!(storage.layout, vk::ImageLayout::GENERAL);
    assert!(storage.is_write());
    assert!(!Usage::storage(AccessType::ReadOnly, vk::PipelineStageFlags::COMPUTE_SHADER).is_write());

    assert_eq!(Usage::present().layout, vk::ImageLayout::PRESENT_SRC_KHR);
    assert_eq!(Usage::undefined().layout, vk::ImageLayout::UNDEFINED);
    Ok(())
}

#[test]
pub fn final_usage_defaults_to_last_usage() -> Result<()> {
    let mut pass = graphics_pass(3);
    pass.add_usage_history(
        "color",
        UsageHistory::new(Usage::undefined())
            .add_usage(0, Usage::render_target())
            .add_usage(1, Usage::sampled(vk::PipelineStageFlags::FRAGMENT_SHADER)),
    )?;
    let after = pass.usage("color", pass.virtual_final_subpass())?.copied();
    assert_eq!(after, Some(Usage::sampled(vk::PipelineStageFlags::FRAGMENT_SHADER)));
    assert_eq!(pass.usage("color", 2)?, None);
    assert_eq!(pass.usage("color", -1)?, Some(&Usage::undefined()));
    Ok(())
}

#[test]
pub fn layout_lookups() -> Result<()> {
    let mut pass = graphics_pass(2);
    pass.add_usage_history(
        "color",
        UsageHistory::new(Usage::undefined())
            .add_usage(0, Usage::render_target())
            .set_final_usage(Usage::present()),
    )?;
    pass.add_usage_history(
        "scratch",
        UsageHistory::new(Usage::undefined())
            .add_usage(1, Usage::render_target())
            .set_final_usage(Usage::undefined()),
    )?;

    assert_eq!(pass.image_layout_before_pass("color")?, vk::ImageLayout::UNDEFINED);
    assert_eq!(pass.image_layout_after_pass("color")?, vk::ImageLayout::PRESENT_SRC_KHR);
    assert_eq!(pass.image_layout_at_subpass("color", 0)?, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
    // Not caring about the contents afterwards keeps the image in its last layout.
    assert_eq!(pass.image_layout_after_pass("scratch")?, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

    expect_error(pass.image_layout_at_subpass("color", 1), |e| {
        matches!(e, Error::NoUsageAtSubpass { subpass: 1, .. })
    });
    expect_error(pass.image_layout_before_pass("missing"), |e| matches!(e, Error::UnknownImage(_)));
    Ok(())
}

#[test]
pub fn subpass_arguments_are_range_checked() -> Result<()> {
    let mut pass = graphics_pass(2);
    pass.add_usage_history("color", framework::render_target_history(0, 0))?;
    expect_error(pass.usage("color", 3), |e| {
        matches!(e, Error::SubpassOutOfRange { subpass: 3, min: -1, max: 2, .. })
    });
    expect_error(pass.usage("color", -2), |e| matches!(e, Error::SubpassOutOfRange { .. }));
    expect_error(pass.image_usages_if_need_synchronization("color", 5), |e| {
        matches!(e, Error::SubpassOutOfRange { .. })
    });
    Ok(())
}

#[test]
pub fn invalid_histories_are_rejected() -> Result<()> {
    let mut pass = graphics_pass(2);
    pass.add_usage_history("color", UsageHistory::new(Usage::undefined()).add_usage(0, Usage::render_target()))?;
    expect_error(
        pass.add_usage_history("color", UsageHistory::new(Usage::undefined()).add_usage(1, Usage::render_target())),
        |e| matches!(e, Error::DuplicateImage(_)),
    );
    expect_error(
        pass.add_usage_history(
            "twice",
            UsageHistory::new(Usage::undefined())
                .add_usage(1, Usage::render_target())
                .add_usage(1, Usage::render_target()),
        ),
        |e| matches!(e, Error::DuplicateUsage { subpass: 1, .. }),
    );
    expect_error(
        pass.add_usage_history("late", UsageHistory::new(Usage::undefined()).add_usage(2, Usage::render_target())),
        |e| matches!(e, Error::SubpassOutOfRange { subpass: 2, .. }),
    );
    expect_error(
        pass.add_usage_history("empty", UsageHistory::new(Usage::undefined()).set_final_usage(Usage::present())),
        |e| matches!(e, Error::EmptyUsageHistory(_)),
    );
    expect_error(
        pass.add_usage_history("copy", UsageHistory::new(Usage::undefined()).add_usage(0, Usage::transfer_dst())),
        |e| matches!(e, Error::InvalidUsageType { found: UsageType::TransferDst, .. }),
    );
    assert_eq!(pass.images().collect::<Vec<_>>(), vec!["color"]);
    Ok(())
}

#[test]
pub fn compute_passes_reject_attachments() -> Result<()> {
    let mut pass = BasePass::new(PassKind::Compute, 1);
    expect_error(
        pass.add_usage_history("color", UsageHistory::new(Usage::undefined()).add_usage(0, Usage::render_target())),
        |e| matches!(e, Error::InvalidUsageType { found: UsageType::RenderTarget, .. }),
    );
    pass.add_usage_history(
        "storage",
        UsageHistory::new(Usage::undefined())
            .add_usage(0, Usage::storage(AccessType::WriteOnly, vk::PipelineStageFlags::COMPUTE_SHADER)),
    )?;
    Ok(())
}

#[test]
pub fn read_after_read_in_same_layout_needs_no_sync() -> Result<()> {
    let sampled = Usage::sampled(vk::PipelineStageFlags::FRAGMENT_SHADER);
    let mut pass = graphics_pass(3);
    pass.add_usage_history(
        "texture",
        UsageHistory::new(sampled)
            .add_usage(0, Usage::render_target())
            .add_usage_range(1, 2, sampled),
    )?;
    // The layout changes between 0 and 1, but 1 and 2 are identical reads.
    assert!(pass.image_usages_if_need_synchronization("texture", 1)?.is_some());
    assert_eq!(pass.image_usages_if_need_synchronization("texture", 2)?, None);
    // Final usage defaults to the last one, which does not need anything either.
    assert_eq!(pass.image_usages_if_need_synchronization("texture", 3)?, None);
    Ok(())
}

#[test]
pub fn write_then_read_needs_memory_dependency() -> Result<()> {
    let mut pass = graphics_pass(2);
    pass.add_usage_history(
        "color",
        UsageHistory::new(Usage::undefined())
            .add_usage(0, Usage::render_target())
            .add_usage(1, Usage::sampled(vk::PipelineStageFlags::FRAGMENT_SHADER)),
    )?;
    let info = pass
        .image_usages_if_need_synchronization("color", 1)?
        .expect("write then read must synchronize");
    assert_eq!(info.prev_subpass, 0);
    assert!(info.needs_memory_barrier());
    assert!(info.src_access().contains(vk::AccessFlags::COLOR_ATTACHMENT_WRITE));
    assert!(info.dst_access().contains(vk::AccessFlags::SHADER_READ));
    assert_eq!(info.prev_usage.stage, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);
    assert_eq!(info.curr_usage.stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    Ok(())
}

#[test]
pub fn reads_at_different_stages_need_execution_dependency() -> Result<()> {
    let mut compute = BasePass::new(PassKind::Compute, 2);
    compute.add_usage_history(
        "lut",
        UsageHistory::new(Usage::sampled(vk::PipelineStageFlags::FRAGMENT_SHADER))
            .add_usage(0, Usage::sampled(vk::PipelineStageFlags::COMPUTE_SHADER))
            .add_usage(1, Usage::sampled(vk::PipelineStageFlags::COMPUTE_SHADER)),
    )?;

    let info = compute
        .image_usages_if_need_synchronization("lut", 0)?
        .expect("reads at different stages must be ordered");
    assert!(!info.needs_memory_barrier());
    assert_eq!(info.src_access(), vk::AccessFlags::empty());
    assert_eq!(info.dst_access(), vk::AccessFlags::empty());
    assert_eq!(compute.image_usages_if_need_synchronization("lut", 1)?, None);
    Ok(())
}

#[test]
pub fn tracker_chains_passes() -> Result<()> {
    let mut tracker = ImageUsageTracker::new();
    tracker.track("color", Usage::undefined());
    assert!(tracker.is_tracked("color"));

    let mut first = graphics_pass(1);
    first.add_usage_history(
        "color",
        UsageHistory::from_tracker(&tracker, "color")?
            .add_usage(0, Usage::render_target())
            .set_final_usage(Usage::sampled(vk::PipelineStageFlags::FRAGMENT_SHADER)),
    )?;
    first.update_tracked_image_usage("color", &mut tracker)?;
    assert_eq!(tracker.usage("color")?, Usage::sampled(vk::PipelineStageFlags::FRAGMENT_SHADER));

    let second = UsageHistory::from_tracker(&tracker, "color")?;
    assert_eq!(second.initial_usage().layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);

    tracker.update("color", Usage::present())?;
    assert_eq!(tracker.usage("color")?, Usage::present());
    expect_error(tracker.update("depth", Usage::present()), |e| matches!(e, Error::UnknownImage(_)));
    expect_error(UsageHistory::from_tracker(&tracker, "depth"), |e| matches!(e, Error::UnknownImage(_)));
    Ok(())
}

#[test]
pub fn error_classification() -> Result<()> {
    assert!(matches!(Error::from(vk::Result::ERROR_DEVICE_LOST), Error::DeviceLost));
    assert!(Error::from(vk::Result::ERROR_DEVICE_LOST).is_fatal());
    assert!(matches!(Error::from(vk::Result::TIMEOUT), Error::Timeout(_)));
    assert!(Error::DuplicateImage("color".into()).is_fatal());
    assert!(!Error::PoisonError.is_fatal());
    Ok(())
}
