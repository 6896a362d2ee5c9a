use std::ffi::CStr;

use anyhow::Result;
use ash::vk;

use crate::core::queue::{QueueInfo, QueueType};
use crate::util::string::wrap_c_str;
use crate::{AppSettings, Error, Instance, Surface};

/// Stores queried properties of a Vulkan extension.
#[derive(Debug, Default, Clone)]
pub struct ExtensionProperties {
    /// Name of the extension.
    pub name: String,
    /// Specification version of the extension.
    pub spec_version: u32,
}

/// A physical device abstracts away an actual device, like a graphics card or integrated graphics card.
#[derive(Default, Debug, Clone)]
pub struct PhysicalDevice {
    /// Handle to the [`VkPhysicalDevice`](vk::PhysicalDevice).
    handle: vk::PhysicalDevice,
    /// [`VkPhysicalDeviceProperties`](vk::PhysicalDeviceProperties) structure with properties of this physical device.
    properties: vk::PhysicalDeviceProperties,
    /// [`VkPhysicalDeviceMemoryProperties`](vk::PhysicalDeviceMemoryProperties) structure with memory properties of the physical device.
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Available Vulkan extensions.
    extension_properties: Vec<ExtensionProperties>,
    /// List of [`VkQueueFamilyProperties`](vk::QueueFamilyProperties) with properties of each queue family on the device.
    queue_families: Vec<vk::QueueFamilyProperties>,
    /// List of [`QueueInfo`]  with requested queues abstracted away from the physical queues.
    queues: Vec<QueueInfo>,
    /// Queue family used for presentation, if a surface was given.
    present_family: Option<u32>,
}

impl PhysicalDevice {
    /// Selects the best available physical device from the given requirements and parameters.
    pub fn select(instance: &Instance, surface: Option<&Surface>, settings: &AppSettings) -> Result<Self> {
        let devices = unsafe { instance.enumerate_physical_devices()? };
        if devices.is_empty() {
            return Err(anyhow::Error::from(Error::NoGPU));
        }

        devices
            .iter()
            .find_map(|device| -> Option<PhysicalDevice> {
                let mut physical_device = PhysicalDevice {
                    handle: *device,
                    properties: unsafe { instance.get_physical_device_properties(*device) },
                    memory_properties: unsafe { instance.get_physical_device_memory_properties(*device) },
                    extension_properties: unsafe {
                        instance
                            .enumerate_device_extension_properties(*device)
                            .ok()?
                            .iter()
                            .map(|vk_properties| ExtensionProperties {
                                name: wrap_c_str(vk_properties.extension_name.as_ptr()),
                                spec_version: vk_properties.spec_version,
                            })
                            .collect()
                    },
                    queue_families: unsafe { instance.get_physical_device_queue_family_properties(*device) },
                    ..Default::default()
                };

                if settings.gpu_requirements.dedicated && physical_device.properties.device_type != vk::PhysicalDeviceType::DISCRETE_GPU {
                    return None;
                }
                if settings.gpu_requirements.min_video_memory > total_video_memory(&physical_device) {
                    return None;
                }
                if settings.gpu_requirements.min_dedicated_video_memory > total_device_memory(&physical_device) {
                    return None;
                }

                physical_device.queues = settings
                    .gpu_requirements
                    .queues
                    .iter()
                    .filter_map(|request| -> Option<QueueInfo> {
                        let avoid = if request.dedicated {
                            match request.queue_type {
                                QueueType::Graphics => vk::QueueFlags::COMPUTE,
                                QueueType::Compute => vk::QueueFlags::GRAPHICS,
                                QueueType::Transfer => vk::QueueFlags::COMPUTE | vk::QueueFlags::GRAPHICS,
                            }
                        } else {
                            vk::QueueFlags::default()
                        };

                        get_queue_family_prefer_dedicated(physical_device.queue_families.as_slice(), request.queue_type, avoid).map(
                            |(index, dedicated)| QueueInfo {
                                queue_type: request.queue_type,
                                dedicated,
                                can_present: false,
                                family_index: index as u32,
                                flags: physical_device.queue_families[index].queue_flags,
                            },
                        )
                    })
                    .collect();

                // If we could not fulfill every request, reject the device.
                if physical_device.queues.len() < settings.gpu_requirements.queues.len() {
                    return None;
                }

                if let Some(surface) = surface {
                    let handle = physical_device.handle;
                    let supports_present = |family: u32| unsafe {
                        surface
                            .get_physical_device_surface_support(handle, family, surface.handle())
                            .unwrap_or(false)
                    };
                    // Prefer presenting from a queue we already requested, so no ownership transfer is needed.
                    let requested = physical_device
                        .queues
                        .iter_mut()
                        .find(|queue| supports_present(queue.family_index));
                    match requested {
                        Some(queue) => {
                            queue.can_present = true;
                            physical_device.present_family = Some(queue.family_index);
                        }
                        None => {
                            let family = (0..physical_device.queue_families.len() as u32).find(|&family| supports_present(family))?;
                            physical_device.present_family = Some(family);
                        }
                    }
                }

                // Check if all requested extensions are present
                if !settings.gpu_requirements.device_extensions.iter().all(|requested_extension| {
                    physical_device
                        .extension_properties
                        .iter()
                        .any(|ext| ext.name == *requested_extension)
                }) {
                    return None;
                }

                let name = unsafe { CStr::from_ptr(physical_device.properties.device_name.as_ptr()) };
                info!(
                    "Picked physical device {:?}, driver version {:?}.",
                    name, physical_device.properties.driver_version
                );
                info!(
                    "Device has {} bytes of available video memory, of which {} are device local.",
                    total_video_memory(&physical_device),
                    total_device_memory(&physical_device)
                );
                Some(physical_device)
            })
            .ok_or(anyhow::Error::from(Error::NoGPU))
    }

    /// Get all queue families available on this device
    pub fn queue_families(&self) -> &[vk::QueueFamilyProperties] {
        self.queue_families.as_slice()
    }

    /// Get all requested queues
    pub fn queues(&self) -> &[QueueInfo] {
        self.queues.as_slice()
    }

    /// Queue family that presents to the surface given at selection time.
    pub fn present_family(&self) -> Option<u32> {
        self.present_family
    }

    /// Get unsafe access to the physical device handle
    /// # Safety
    /// Any vulkan calls that mutate the physical device may put the system in an undefined state.
    pub unsafe fn handle(&self) -> vk::PhysicalDevice {
        self.handle
    }

    pub fn properties(&self) -> &vk::PhysicalDeviceProperties {
        &self.properties
    }

    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }
}

fn total_video_memory(device: &PhysicalDevice) -> usize {
    device
        .memory_properties
        .memory_heaps
        .iter()
        .map(|heap| heap.size as usize)
        .sum()
}

fn total_device_memory(device: &PhysicalDevice) -> usize {
    device
        .memory_properties
        .memory_heaps
        .iter()
        .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
        .map(|heap| heap.size as usize)
        .sum()
}

fn get_queue_family_prefer_dedicated(families: &[vk::QueueFamilyProperties], queue_type: QueueType, avoid: vk::QueueFlags) -> Option<(usize, bool)> {
    let required = vk::QueueFlags::from_raw(queue_type as vk::Flags);
    families
        .iter()
        .enumerate()
        .fold(None, |current_best_match, (index, family)| -> Option<usize> {
            // Does not contain required flags, must skip
            if !family.queue_flags.contains(required) {
                return current_best_match;
            }
            // Contains required flags and none of the flags to avoid, this is an optimal match.
            if !family.queue_flags.intersects(avoid) {
                return Some(index);
            }
            // Only if we don't have a match yet, settle for a suboptimal match
            current_best_match.or(Some(index))
        })
        .map(|index| (index, !families[index].queue_flags.intersects(avoid)))
}
