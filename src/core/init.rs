//! Exposes methods to make initialization of the library easier without losing flexibility.

use anyhow::Result;

use crate::{Allocator, AppSettings, DebugMessenger, DefaultAllocator, Device, Instance, PhysicalDevice, Surface, SurfaceSettings};

/// Struct that contains all common deimos resources to be used at initialization
pub type Deimos<A> = (Instance, PhysicalDevice, Option<Surface>, Device, A, Option<DebugMessenger>);

/// Initialize the context with the default allocator
pub fn initialize(settings: &AppSettings) -> Result<Deimos<DefaultAllocator>> {
    initialize_with_allocator(settings, |instance, physical_device, device| {
        DefaultAllocator::new(instance, device, physical_device)
    })
}

/// Initialize the context with a custom allocator
pub fn initialize_with_allocator<A: Allocator + 'static, F: FnOnce(&Instance, &PhysicalDevice, &Device) -> Result<A>>(
    settings: &AppSettings,
    make_alloc: F,
) -> Result<Deimos<A>> {
    let instance = Instance::new(settings)?;

    let debug_messenger = if settings.enable_validation {
        Some(DebugMessenger::new(&instance)?)
    } else {
        None
    };

    let mut surface = if let Some(SurfaceSettings { window, .. }) = settings.surface_settings.as_ref() {
        Some(Surface::new(&instance, *window)?)
    } else {
        None
    };

    let physical_device = PhysicalDevice::select(&instance, surface.as_ref(), settings)?;

    if let Some(surface) = surface.as_mut() {
        surface.query_details(&physical_device)?;
    }

    let device = Device::new(&instance, &physical_device, settings)?;
    let allocator = make_alloc(&instance, &physical_device, &device)?;

    Ok((instance, physical_device, surface, device, allocator, debug_messenger))
}
