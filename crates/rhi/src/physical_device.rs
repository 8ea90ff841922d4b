//! Physical device (GPU) selection.
//!
//! Enumerates the GPUs, drops the ones that cannot drive this engine
//! (no graphics+compute queue, no presentation to the surface, no swapchain
//! extension or no usable swapchain configuration), then applies the
//! configured [`DeviceSelection`] strategy to the survivors.
//!
//! # Example
//!
//! ```no_run
//! use engine_core::DeviceSelection;
//! use engine_rhi::instance::Instance;
//! use engine_rhi::physical_device::select_physical_device;
//! use ash::vk;
//!
//! # fn example(instance: &Instance, surface: vk::SurfaceKHR) -> Result<(), engine_rhi::RhiError> {
//! let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
//! let info = select_physical_device(
//!     instance.handle(),
//!     surface,
//!     &surface_loader,
//!     DeviceSelection::Rated,
//! )?;
//! tracing::info!("Using {}", info.device_name());
//! # Ok(())
//! # }
//! ```

use std::ffi::CStr;

use ash::vk;
use engine_core::DeviceSelection;
use tracing::{debug, info, warn};

use crate::error::RhiError;
use crate::swapchain::SwapchainSupportDetails;

/// Device extensions the engine cannot run without.
pub const REQUIRED_DEVICE_EXTENSIONS: &[&CStr] = &[ash::khr::swapchain::NAME];

/// Queue family indices.
///
/// The graphics family must also support compute: particle simulation and
/// drawing are recorded into the same command buffer and rely on
/// same-queue submission order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// Family supporting graphics and compute.
    pub graphics_family: Option<u32>,
    /// Family that can present to the surface.
    pub present_family: Option<u32>,
}

impl QueueFamilyIndices {
    /// Both required families were found.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.graphics_family.is_some() && self.present_family.is_some()
    }

    /// Distinct family indices, graphics first.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families = Vec::with_capacity(2);

        if let Some(graphics) = self.graphics_family {
            families.push(graphics);
        }
        if let Some(present) = self.present_family
            && !families.contains(&present)
        {
            families.push(present);
        }

        families
    }
}

/// Information about a physical device (GPU).
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle.
    pub device: vk::PhysicalDevice,
    /// Device properties (name, limits, API version, etc.).
    pub properties: vk::PhysicalDeviceProperties,
    /// Supported device features.
    pub features: vk::PhysicalDeviceFeatures,
    /// Memory properties (heap sizes, memory types).
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Queue family indices for different operations.
    pub queue_families: QueueFamilyIndices,
}

impl PhysicalDeviceInfo {
    /// Returns the device name as a string.
    pub fn device_name(&self) -> &str {
        self.properties
            .device_name_as_c_str()
            .ok()
            .and_then(|name| name.to_str().ok())
            .unwrap_or("Unknown Device")
    }

    /// Returns a human-readable string for the device type.
    pub fn device_type_name(&self) -> &'static str {
        match self.properties.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => "Discrete GPU",
            vk::PhysicalDeviceType::INTEGRATED_GPU => "Integrated GPU",
            vk::PhysicalDeviceType::VIRTUAL_GPU => "Virtual GPU",
            vk::PhysicalDeviceType::CPU => "CPU",
            _ => "Other",
        }
    }

    /// Whether one indirect call may cover several draw records.
    #[inline]
    pub fn supports_multi_draw_indirect(&self) -> bool {
        self.features.multi_draw_indirect == vk::TRUE
    }

    /// Returns the total device local memory in bytes.
    pub fn device_local_memory(&self) -> u64 {
        self.memory_properties
            .memory_heaps
            .iter()
            .take(self.memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size)
            .sum()
    }
}

impl std::fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let version = self.properties.api_version;
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("type", &self.device_type_name())
            .field(
                "api_version",
                &format!(
                    "{}.{}.{}",
                    vk::api_version_major(version),
                    vk::api_version_minor(version),
                    vk::api_version_patch(version)
                ),
            )
            .field("queue_families", &self.queue_families)
            .finish()
    }
}

/// Selects the physical device to render with.
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableGpu`] if no GPU passes the suitability checks.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
    strategy: DeviceSelection,
) -> Result<PhysicalDeviceInfo, RhiError> {
    let devices = unsafe { instance.enumerate_physical_devices()? };
    info!("Found {} GPU(s)", devices.len());

    let candidates: Vec<PhysicalDeviceInfo> = devices
        .into_iter()
        .filter_map(|device| check_device_suitability(instance, device, surface, surface_loader))
        .collect();

    let selected = pick_device(candidates, strategy).ok_or_else(|| {
        warn!("No suitable GPU found with required capabilities");
        RhiError::NoSuitableGpu
    })?;

    info!(
        "Selected GPU: '{}' ({}) via {:?}, multi-draw-indirect: {}",
        selected.device_name(),
        selected.device_type_name(),
        strategy,
        selected.supports_multi_draw_indirect()
    );

    Ok(selected)
}

/// Applies a selection strategy to devices that already passed suitability.
pub fn pick_device(
    candidates: Vec<PhysicalDeviceInfo>,
    strategy: DeviceSelection,
) -> Option<PhysicalDeviceInfo> {
    match strategy {
        DeviceSelection::FirstSuitable => candidates.into_iter().next(),
        DeviceSelection::Rated => candidates
            .into_iter()
            .map(|info| {
                let score = rate_device(&info);
                debug!("GPU '{}' score: {}", info.device_name(), score);
                (score, info)
            })
            // max_by_key keeps the last maximum; reverse so ties favour enumeration order
            .rev()
            .max_by_key(|(score, _)| *score)
            .map(|(_, info)| info),
    }
}

fn check_device_suitability(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Option<PhysicalDeviceInfo> {
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let features = unsafe { instance.get_physical_device_features(device) };
    let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };

    let info = PhysicalDeviceInfo {
        device,
        properties,
        features,
        memory_properties,
        queue_families: find_queue_families(instance, device, surface, surface_loader),
    };
    let name = info.device_name();

    if !info.queue_families.is_complete() {
        debug!("GPU '{}' skipped: missing graphics+compute or present queue", name);
        return None;
    }

    if !supports_required_extensions(instance, device) {
        debug!("GPU '{}' skipped: swapchain extension not supported", name);
        return None;
    }

    let adequate = SwapchainSupportDetails::query(surface_loader, device, surface)
        .map(|support| support.is_adequate())
        .unwrap_or(false);
    if !adequate {
        debug!("GPU '{}' skipped: no usable surface format or present mode", name);
        return None;
    }

    if features.sampler_anisotropy == vk::FALSE {
        debug!("GPU '{}' skipped: sampler anisotropy not supported", name);
        return None;
    }

    Some(info)
}

fn supports_required_extensions(instance: &ash::Instance, device: vk::PhysicalDevice) -> bool {
    let Ok(available) = (unsafe { instance.enumerate_device_extension_properties(device) }) else {
        return false;
    };

    REQUIRED_DEVICE_EXTENSIONS.iter().all(|required| {
        available
            .iter()
            .any(|ext| ext.extension_name_as_c_str().is_ok_and(|name| name == *required))
    })
}

fn find_queue_families(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> QueueFamilyIndices {
    let families = unsafe { instance.get_physical_device_queue_family_properties(device) };
    let mut indices = QueueFamilyIndices::default();

    for (i, family) in families.iter().enumerate() {
        let i = i as u32;
        if family.queue_count == 0 {
            continue;
        }

        if indices.graphics_family.is_none()
            && family
                .queue_flags
                .contains(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)
        {
            indices.graphics_family = Some(i);
        }

        if indices.present_family.is_none() {
            let present_support = unsafe {
                surface_loader
                    .get_physical_device_surface_support(device, i, surface)
                    .unwrap_or(false)
            };
            if present_support {
                indices.present_family = Some(i);
            }
        }

        if indices.is_complete() {
            break;
        }
    }

    indices
}

/// Scores a device; higher is better.
fn rate_device(info: &PhysicalDeviceInfo) -> u32 {
    let mut score = match info.properties.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 10000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 1000,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 100,
        vk::PhysicalDeviceType::CPU => 10,
        _ => 1,
    };

    score += info.properties.limits.max_image_dimension2_d;

    let vram_mb = (info.device_local_memory() / (1024 * 1024)) as u32;
    score += vram_mb.min(16000);

    if info.supports_multi_draw_indirect() {
        score += 100;
    }

    score
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_device(raw: u64, device_type: vk::PhysicalDeviceType, max_dim: u32) -> PhysicalDeviceInfo {
        let mut properties = vk::PhysicalDeviceProperties::default();
        properties.device_type = device_type;
        properties.limits.max_image_dimension2_d = max_dim;

        PhysicalDeviceInfo {
            device: ash::vk::Handle::from_raw(raw),
            properties,
            features: vk::PhysicalDeviceFeatures::default(),
            memory_properties: vk::PhysicalDeviceMemoryProperties::default(),
            queue_families: QueueFamilyIndices {
                graphics_family: Some(0),
                present_family: Some(0),
            },
        }
    }

    fn raw(info: &PhysicalDeviceInfo) -> u64 {
        ash::vk::Handle::as_raw(info.device)
    }

    #[test]
    fn test_queue_family_indices_complete() {
        let mut indices = QueueFamilyIndices::default();
        assert!(!indices.is_complete());

        indices.graphics_family = Some(0);
        assert!(!indices.is_complete());

        indices.present_family = Some(2);
        assert!(indices.is_complete());
    }

    #[test]
    fn test_unique_families_dedups_shared_queue() {
        let shared = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(0),
        };
        assert_eq!(shared.unique_families(), vec![0]);

        let split = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(1),
        };
        assert_eq!(split.unique_families(), vec![0, 1]);
    }

    #[test]
    fn test_rated_prefers_discrete() {
        let candidates = vec![
            fake_device(1, vk::PhysicalDeviceType::INTEGRATED_GPU, 16384),
            fake_device(2, vk::PhysicalDeviceType::DISCRETE_GPU, 8192),
        ];
        let picked = pick_device(candidates, DeviceSelection::Rated).unwrap();
        assert_eq!(raw(&picked), 2);
    }

    #[test]
    fn test_first_suitable_keeps_enumeration_order() {
        let candidates = vec![
            fake_device(1, vk::PhysicalDeviceType::INTEGRATED_GPU, 16384),
            fake_device(2, vk::PhysicalDeviceType::DISCRETE_GPU, 8192),
        ];
        let picked = pick_device(candidates, DeviceSelection::FirstSuitable).unwrap();
        assert_eq!(raw(&picked), 1);
    }

    #[test]
    fn test_rated_tie_keeps_first() {
        let candidates = vec![
            fake_device(7, vk::PhysicalDeviceType::DISCRETE_GPU, 4096),
            fake_device(8, vk::PhysicalDeviceType::DISCRETE_GPU, 4096),
        ];
        let picked = pick_device(candidates, DeviceSelection::Rated).unwrap();
        assert_eq!(raw(&picked), 7);
    }

    #[test]
    fn test_no_candidates() {
        assert!(pick_device(Vec::new(), DeviceSelection::Rated).is_none());
        assert!(pick_device(Vec::new(), DeviceSelection::FirstSuitable).is_none());
    }

    #[test]
    fn test_multi_draw_indirect_flag() {
        let mut info = fake_device(1, vk::PhysicalDeviceType::DISCRETE_GPU, 1);
        assert!(!info.supports_multi_draw_indirect());
        info.features.multi_draw_indirect = vk::TRUE;
        assert!(info.supports_multi_draw_indirect());
    }
}
