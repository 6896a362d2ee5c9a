use anyhow::Result;

use deimos::{
    vk, Error, GraphicsPass, ImageResolver, ImageUsageTracker, Pass, PassKind, RenderPassBuilder, Usage,
    UsageHistory, UsageType,
};

mod framework;

fn expect_error(result: Result<impl std::fmt::Debug>, check: impl Fn(&Error) -> bool) {
    let err = result.expect_err("operation should fail");
    let err = err.downcast_ref::<Error>().expect("error should be a deimos error");
    assert!(check(err), "unexpected error {err:?}");
}

fn bind(width: u32, height: u32) -> ImageResolver {
    Box::new(move |_: usize| framework::attachment(width, height))
}

fn fragment_sampled() -> Usage {
    Usage::sampled(vk::PipelineStageFlags::FRAGMENT_SHADER)
}

/// Two subpasses: the first renders into `offscreen`, the second samples it while rendering into `output`.
fn deferred_pass() -> Result<GraphicsPass> {
    let mut pass = GraphicsPass::new(2);
    pass.add_color_attachment(
        "offscreen",
        UsageHistory::new(Usage::undefined())
            .add_usage(0, Usage::render_target())
            .add_usage(1, fragment_sampled())
            .set_final_usage(Usage::transfer_src()),
    )?;
    pass.add_color_attachment(
        "output",
        UsageHistory::new(Usage::undefined())
            .add_usage(1, Usage::render_target())
            .set_final_usage(Usage::present()),
    )?;
    Ok(pass)
}

#[test]
pub fn dependencies_follow_usages() -> Result<()> {
    framework::init_logging();
    let pass = deferred_pass()?;
    let builder = pass.create_render_pass_builder(2)?;
    let deps = builder
        .dependencies()
        .iter()
        .map(|dep| (dep.image.as_str(), dep.src.index, dep.dst.index))
        .collect::<Vec<_>>();
    assert_eq!(
        deps,
        vec![
            ("offscreen", vk::SUBPASS_EXTERNAL, 0),
            ("offscreen", 0, 1),
            ("offscreen", 1, vk::SUBPASS_EXTERNAL),
            ("output", vk::SUBPASS_EXTERNAL, 1),
            ("output", 1, vk::SUBPASS_EXTERNAL),
        ]
    );

    let internal = &builder.dependencies()[1];
    assert_eq!(internal.src.stage, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);
    assert_eq!(internal.dst.stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    assert!(internal.src.access.contains(vk::AccessFlags::COLOR_ATTACHMENT_WRITE));
    assert_eq!(internal.dst.access, vk::AccessFlags::SHADER_READ);
    Ok(())
}

#[test]
pub fn dependencies_between_same_subpasses_are_merged() -> Result<()> {
    let builder = deferred_pass()?.create_render_pass_builder(2)?;
    let merged = builder.merged_dependencies();
    assert_eq!(merged.len(), 4);

    let to_external = merged
        .iter()
        .find(|dep| dep.src_subpass == 1 && dep.dst_subpass == vk::SUBPASS_EXTERNAL)
        .expect("missing dependency out of subpass 1");
    assert_eq!(
        to_external.src_stage_mask,
        vk::PipelineStageFlags::FRAGMENT_SHADER | vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
    );
    assert_eq!(
        to_external.dst_stage_mask,
        vk::PipelineStageFlags::TRANSFER | vk::PipelineStageFlags::BOTTOM_OF_PIPE
    );
    assert!(to_external.dst_access_mask.contains(vk::AccessFlags::TRANSFER_READ));
    Ok(())
}

#[test]
pub fn attachment_descriptions() -> Result<()> {
    let mut pass = deferred_pass()?;
    pass.add_depth_stencil_attachment(
        "depth",
        UsageHistory::new(Usage::undefined())
            .add_usage(0, Usage::depth_stencil(false))
            .set_final_usage(Usage::undefined()),
    )?;
    pass.add_color_attachment(
        "history",
        UsageHistory::new(fragment_sampled()).add_usage(0, Usage::render_target()),
    )?;
    let builder = pass.create_render_pass_builder(1)?;
    let attachments = builder.attachments();
    assert_eq!(attachments.len(), 4);

    let offscreen = &attachments[pass.attachment_index("offscreen")?];
    assert_eq!(offscreen.load_op, vk::AttachmentLoadOp::CLEAR);
    assert_eq!(offscreen.store_op, vk::AttachmentStoreOp::STORE);
    assert_eq!(offscreen.initial_layout, vk::ImageLayout::UNDEFINED);
    assert_eq!(offscreen.final_layout, vk::ImageLayout::TRANSFER_SRC_OPTIMAL);

    let output = &attachments[pass.attachment_index("output")?];
    assert_eq!(output.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);

    let depth = &attachments[pass.attachment_index("depth")?];
    assert_eq!(depth.load_op, vk::AttachmentLoadOp::CLEAR);
    assert_eq!(depth.store_op, vk::AttachmentStoreOp::DONT_CARE);
    assert_eq!(depth.stencil_load_op, depth.load_op);
    assert_eq!(depth.stencil_store_op, depth.store_op);
    assert_eq!(depth.final_layout, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
    let depth_clear = unsafe { builder.clear_values()[pass.attachment_index("depth")?].depth_stencil };
    assert_eq!(depth_clear.depth, 1.0);
    assert_eq!(depth_clear.stencil, 0);

    let history = &attachments[pass.attachment_index("history")?];
    assert_eq!(history.load_op, vk::AttachmentLoadOp::LOAD);
    assert_eq!(history.initial_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    // The final usage defaults to the last usage, so the contents are kept.
    assert_eq!(history.store_op, vk::AttachmentStoreOp::STORE);
    Ok(())
}

#[test]
pub fn color_locations() -> Result<()> {
    let pass = deferred_pass()?;
    let builder = pass.create_render_pass_builder(1)?;
    let subpasses = builder.subpasses();
    assert_eq!(subpasses.len(), 2);

    assert_eq!(subpasses[0].color_refs.len(), 1);
    assert_eq!(subpasses[0].color_refs[0].attachment, 0);
    assert_eq!(subpasses[0].color_refs[0].layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

    // `output` has the second location, the first one is unused while `offscreen` is sampled.
    assert_eq!(subpasses[1].color_refs.len(), 2);
    assert_eq!(subpasses[1].color_refs[0].attachment, vk::ATTACHMENT_UNUSED);
    assert_eq!(subpasses[1].color_refs[1].attachment, 1);
    assert!(subpasses.iter().all(|subpass| subpass.depth_stencil_ref.is_none()));
    assert!(subpasses.iter().all(|subpass| subpass.resolve_refs.is_none()));
    Ok(())
}

#[test]
pub fn custom_color_locations() -> Result<()> {
    let mut pass = GraphicsPass::new(2);
    pass.add_color_attachment_at(
        "moving",
        framework::render_target_history(0, 1),
        |subpass| subpass * 2,
    )?;
    let builder = pass.create_render_pass_builder(1)?;
    assert_eq!(builder.subpasses()[0].color_refs.len(), 1);
    assert_eq!(builder.subpasses()[1].color_refs.len(), 3);
    assert_eq!(builder.subpasses()[1].color_refs[2].attachment, 0);

    pass.add_color_attachment("fixed", framework::render_target_history(0, 0))?;
    expect_error(pass.create_render_pass_builder(1), |e| {
        matches!(e, Error::DuplicateColorLocation { subpass: 0, location: 0 })
    });
    Ok(())
}

#[test]
pub fn multisample_resolve() -> Result<()> {
    let mut pass = GraphicsPass::new(1);
    let msaa = pass.add_color_attachment(
        "msaa",
        UsageHistory::new(Usage::undefined())
            .add_usage(0, Usage::render_target())
            .set_final_usage(Usage::undefined()),
    )?;
    let resolved = pass.add_color_attachment(
        "resolved",
        UsageHistory::new(Usage::undefined())
            .add_usage(0, Usage::multisample_resolve())
            .set_final_usage(Usage::present()),
    )?;
    pass.add_multisample_resolving("msaa", "resolved", 0)?;

    let builder = pass.create_render_pass_builder(3)?;
    let subpass = &builder.subpasses()[0];
    assert_eq!(subpass.color_refs.len(), 1);
    assert_eq!(subpass.color_refs[0].attachment, msaa as u32);
    let resolve_refs = subpass.resolve_refs.as_ref().expect("subpass should resolve");
    assert_eq!(resolve_refs.len(), 1);
    assert_eq!(resolve_refs[0].attachment, resolved as u32);
    assert_eq!(resolve_refs[0].layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

    assert_eq!(builder.attachments()[msaa].store_op, vk::AttachmentStoreOp::DONT_CARE);
    assert_eq!(builder.attachments()[resolved].final_layout, vk::ImageLayout::PRESENT_SRC_KHR);

    expect_error(pass.add_multisample_resolving("msaa", "missing", 0), |e| {
        matches!(e, Error::UnknownImage(_))
    });
    expect_error(pass.add_multisample_resolving("msaa", "resolved", 1), |e| {
        matches!(e, Error::SubpassOutOfRange { .. })
    });
    Ok(())
}

#[test]
pub fn resolving_requires_resolve_target() -> Result<()> {
    let mut pass = GraphicsPass::new(1);
    pass.add_color_attachment("a", framework::render_target_history(0, 0))?;
    pass.add_color_attachment("b", framework::render_target_history(0, 0))?;
    pass.add_multisample_resolving("a", "b", 0)?;
    expect_error(pass.create_render_pass_builder(1), |e| {
        matches!(e, Error::InvalidUsageType { found: UsageType::RenderTarget, .. })
    });
    Ok(())
}

#[test]
pub fn attachment_families() -> Result<()> {
    let mut pass = GraphicsPass::new(2);
    expect_error(
        pass.add_color_attachment(
            "mixed",
            UsageHistory::new(Usage::undefined())
                .add_usage(0, Usage::render_target())
                .add_usage(1, Usage::depth_stencil(false)),
        ),
        |e| matches!(e, Error::MixedAttachmentFamily(_)),
    );
    expect_error(
        pass.add_color_attachment("depth", UsageHistory::new(Usage::undefined()).add_usage(0, Usage::depth_stencil(false))),
        |e| matches!(e, Error::InvalidUsageType { found: UsageType::DepthStencilAttachment, .. }),
    );
    expect_error(
        pass.add_depth_stencil_attachment("texture", UsageHistory::new(Usage::undefined()).add_usage(0, fragment_sampled())),
        |e| matches!(e, Error::InvalidUsageType { .. }),
    );
    // Failed registrations leave nothing behind.
    assert_eq!(pass.base().images().count(), 0);
    expect_error(pass.attachment_index("mixed"), |e| matches!(e, Error::UnknownImage(_)));
    Ok(())
}

#[test]
pub fn one_depth_stencil_per_subpass() -> Result<()> {
    let mut pass = GraphicsPass::new(1);
    pass.add_depth_stencil_attachment("depth", UsageHistory::new(Usage::undefined()).add_usage(0, Usage::depth_stencil(false)))?;
    pass.add_depth_stencil_attachment("shadow", UsageHistory::new(Usage::undefined()).add_usage(0, Usage::depth_stencil(true)))?;
    expect_error(pass.create_render_pass_builder(1), |e| matches!(e, Error::MultipleDepthStencil(0)));
    Ok(())
}

#[test]
pub fn builder_validation() -> Result<()> {
    let builder = deferred_pass()?.create_render_pass_builder(2)?;
    assert_eq!(builder.num_framebuffers(), Some(2));
    expect_error(builder.validate(), |e| matches!(e, Error::AttachmentNotBound(0)));

    let mut builder = builder;
    builder.update_attachment_image(0, bind(800, 600))?;
    expect_error(builder.validate(), |e| matches!(e, Error::AttachmentNotBound(1)));
    builder.update_attachment_image(1, bind(640, 480))?;
    expect_error(builder.validate(), |e| matches!(e, Error::ExtentMismatch { index: 1, .. }));

    // Rebinding keeps the rest of the structure.
    builder.update_attachment_image(1, bind(800, 600))?;
    assert_eq!(builder.validate()?, vk::Extent2D { width: 800, height: 600 });
    assert_eq!(builder.dependencies().len(), 5);

    builder.update_attachment_image(0, bind(0, 600))?;
    expect_error(builder.validate(), |e| matches!(e, Error::ZeroExtent(0, 600)));
    expect_error(builder.update_attachment_image(2, bind(800, 600)), |e| {
        matches!(e, Error::AttachmentOutOfRange(2))
    });

    let mut empty = RenderPassBuilder::new();
    expect_error(empty.validate(), |e| matches!(e, Error::NoFramebufferCount));
    empty.set_num_framebuffers(0);
    expect_error(empty.validate(), |e| matches!(e, Error::NoFramebufferCount));
    Ok(())
}

#[test]
pub fn bound_images_set_format_and_samples() -> Result<()> {
    let mut builder = deferred_pass()?.create_render_pass_builder(1)?;
    builder.update_attachment_image(
        0,
        Box::new(|_: usize| deimos::AttachmentImage {
            format: vk::Format::R16G16B16A16_SFLOAT,
            samples: vk::SampleCountFlags::TYPE_4,
            ..framework::attachment(800, 600)
        }),
    )?;
    assert_eq!(builder.attachments()[0].format, vk::Format::R16G16B16A16_SFLOAT);
    assert_eq!(builder.attachments()[0].samples, vk::SampleCountFlags::TYPE_4);
    assert_eq!(builder.attachments()[1].format, vk::Format::UNDEFINED);
    Ok(())
}

#[test]
pub fn clear_values() -> Result<()> {
    let mut builder = deferred_pass()?.create_render_pass_builder(1)?;
    let default = unsafe { builder.clear_values()[0].color.float32 };
    assert_eq!(default, [0.0; 4]);

    builder.set_clear_value(
        0,
        vk::ClearValue {
            color: vk::ClearColorValue {
                float32: [0.1, 0.2, 0.3, 1.0],
            },
        },
    )?;
    let color = unsafe { builder.clear_values()[0].color.float32 };
    assert_eq!(color, [0.1, 0.2, 0.3, 1.0]);
    expect_error(builder.set_clear_value(5, vk::ClearValue::default()), |e| {
        matches!(e, Error::AttachmentOutOfRange(5))
    });
    Ok(())
}

#[test]
pub fn passes_chain_through_tracker() -> Result<()> {
    let mut tracker = ImageUsageTracker::new();
    tracker.track("offscreen", Usage::undefined()).track("output", Usage::undefined());

    let pass: Pass = deferred_pass()?.into();
    assert_eq!(pass.kind(), PassKind::Graphics);
    pass.update_tracked_image_usages(&mut tracker)?;
    assert_eq!(tracker.usage("offscreen")?, Usage::transfer_src());
    assert_eq!(tracker.usage("output")?, Usage::present());

    let mut next = GraphicsPass::new(1);
    next.add_color_attachment(
        "offscreen",
        UsageHistory::from_tracker(&tracker, "offscreen")?.add_usage(0, Usage::render_target()),
    )?;
    let builder = next.create_render_pass_builder(1)?;
    assert_eq!(builder.attachments()[0].initial_layout, vk::ImageLayout::TRANSFER_SRC_OPTIMAL);
    assert_eq!(builder.attachments()[0].load_op, vk::AttachmentLoadOp::LOAD);
    Ok(())
}
