use std::slice;
use std::time::Duration;

use anyhow::Result;
use ash::vk::Handle;

use deimos::{
    vk, AccessType, AttachmentImage, CommandPool, ComputeOp, ComputePass, Error, Fence, GraphicsPass, Image,
    ImageCreateInfo, Queue, RenderOp, Usage, UsageHistory,
};

mod framework;

fn color_image(ctx: &mut framework::Context, name: &str, usage: vk::ImageUsageFlags) -> Result<Image> {
    Image::new(
        ctx.device.clone(),
        &mut ctx.allocator,
        name,
        ImageCreateInfo {
            width: 64,
            height: 64,
            usage,
            format: vk::Format::R8G8B8A8_UNORM,
            samples: vk::SampleCountFlags::TYPE_1,
        },
    )
}

#[test]
#[ignore = "requires a Vulkan device"]
pub fn can_initialize() -> Result<()> {
    let context = framework::make_context()?;
    assert_ne!(context.instance.handle().as_raw(), 0, "VkInstance handle should not be zero");
    assert!(!context.phys_device.queues().is_empty());
    Ok(())
}

#[test]
#[ignore = "requires a Vulkan device"]
pub fn fences_start_signaled() -> Result<()> {
    let context = framework::make_context()?;
    let fence = Fence::new(context.device.clone(), true)?;
    fence.wait(Duration::from_secs(1))?;
    fence.reset()?;
    let err = fence.wait(Duration::from_millis(1)).expect_err("an unsignaled fence never completes");
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Timeout(_))));
    Ok(())
}

#[test]
#[ignore = "requires a Vulkan device"]
pub fn render_pass_from_graphics_pass() -> Result<()> {
    let mut context = framework::make_context()?;
    let image = color_image(&mut context, "color", vk::ImageUsageFlags::COLOR_ATTACHMENT)?;
    let view = image.view(vk::ImageAspectFlags::COLOR)?;

    let mut pass = GraphicsPass::new(2);
    let color = pass.add_color_attachment(
        "color",
        UsageHistory::new(Usage::undefined())
            .add_usage_range(0, 1, Usage::render_target())
            .set_final_usage(Usage::transfer_src()),
    )?;
    let mut builder = pass.create_render_pass_builder(2)?;
    let attachment = AttachmentImage::from(&view);
    builder.update_attachment_image(color, Box::new(move |_: usize| attachment))?;

    let render_pass = builder.build(context.device.clone())?;
    assert_eq!(render_pass.num_subpasses(), 2);
    assert_eq!(render_pass.num_framebuffers(), 2);
    assert_eq!(render_pass.framebuffer_extent(), vk::Extent2D { width: 64, height: 64 });

    // The builder outlives the render pass, so it can be rebuilt.
    drop(render_pass);
    let render_pass = builder.build(context.device.clone())?;

    let mut ops: Vec<RenderOp> = vec![Box::new(|_| Ok(()))];
    let err = render_pass
        .run(vk::CommandBuffer::null(), 0, &mut ops)
        .expect_err("one op for two subpasses");
    assert!(matches!(
        err.downcast_ref::<Error>(),
        Some(Error::SubpassCountMismatch { expected: 2, found: 1 })
    ));
    Ok(())
}

#[test]
#[ignore = "requires a Vulkan device"]
pub fn compute_pass_records_barriers() -> Result<()> {
    let mut context = framework::make_context()?;
    let image = color_image(
        &mut context,
        "storage",
        vk::ImageUsageFlags::STORAGE | vk::ImageUsageFlags::SAMPLED,
    )?;
    let family = context.phys_device.queues()[0].family_index;
    let queue = Queue::new(context.device.clone(), family)?;
    let pool = CommandPool::new(context.device.clone(), family, vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)?;
    let cmd = pool.allocate_primary(1)?[0];

    let mut pass = ComputePass::new(2);
    pass.add_image(
        "storage",
        UsageHistory::new(Usage::undefined())
            .add_usage(0, Usage::storage(AccessType::WriteOnly, vk::PipelineStageFlags::COMPUTE_SHADER))
            .add_usage(1, Usage::storage(AccessType::ReadWrite, vk::PipelineStageFlags::COMPUTE_SHADER))
            .set_final_usage(Usage::sampled(vk::PipelineStageFlags::FRAGMENT_SHADER)),
    )?;

    let mut calls = 0;
    unsafe { pool.begin(cmd)? };
    {
        let mut ops: Vec<ComputeOp> = vec![Box::new(|_| Ok(())), Box::new(|_| Ok(()))];
        let err = pass
            .run(&context.device, cmd, &mut ops)
            .expect_err("no image bound yet");
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::NoResourceBound(_))));
    }
    pass.bind_image("storage", unsafe { image.handle() }, vk::ImageAspectFlags::COLOR)?;
    {
        let mut ops: Vec<ComputeOp> = vec![
            Box::new(|_| {
                calls += 1;
                Ok(())
            }),
            Box::new(|_| Ok(())),
        ];
        pass.run(&context.device, cmd, &mut ops)?;
    }
    unsafe { pool.end(cmd)? };
    assert_eq!(calls, 1);

    let fence = Fence::new(context.device.clone(), false)?;
    let info = vk::SubmitInfo::builder().command_buffers(slice::from_ref(&cmd)).build();
    unsafe { queue.submit(slice::from_ref(&info), fence.handle())? };
    fence.wait(Duration::from_secs(5))?;
    Ok(())
}
