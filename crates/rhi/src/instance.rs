//! Vulkan instance and validation output.
//!
//! The instance is created once at startup with the window-system extensions
//! reported by the platform layer. With validation requested and the Khronos
//! layer installed, a debug-utils messenger forwards layer output into
//! `tracing` at the matching level.
//!
//! # Example
//!
//! ```no_run
//! use engine_rhi::instance::Instance;
//!
//! # fn example() -> Result<(), engine_rhi::RhiError> {
//! // Window-system extensions normally come from the platform layer.
//! let instance = Instance::new(cfg!(debug_assertions), &[])?;
//! tracing::info!("validation: {}", instance.has_validation());
//! # Ok(())
//! # }
//! ```

use std::borrow::Cow;
use std::ffi::{CStr, c_char, c_void};

use ash::{Entry, vk};
use tracing::{Level, debug, error, info, trace, warn};

use crate::error::RhiResult;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

const APP_NAME: &CStr = c"Particle Engine";
const ENGINE_NAME: &CStr = c"engine";

/// Owns the loader entry, the `VkInstance` and, with validation, the
/// messenger. Everything else in the RHI must be dropped first.
pub struct Instance {
    entry: Entry,
    instance: ash::Instance,
    messenger: Option<DebugMessenger>,
}

/// Debug-utils loader plus the messenger it created.
struct DebugMessenger {
    loader: ash::ext::debug_utils::Instance,
    handle: vk::DebugUtilsMessengerEXT,
}

impl Instance {
    /// Loads Vulkan and creates an API 1.2 instance.
    ///
    /// `surface_extensions` lists the window-system extensions the platform
    /// needs (as reported by `ash_window::enumerate_required_extensions`).
    /// When empty, the surface extensions for the current OS are used.
    ///
    /// Validation is best effort: if the layer is missing the instance is
    /// created without it and a warning is logged.
    ///
    /// # Errors
    ///
    /// [`RhiError::LoadingError`](crate::RhiError::LoadingError) if no Vulkan loader is installed, or the
    /// driver error if instance or messenger creation fails.
    pub fn new(enable_validation: bool, surface_extensions: &[*const c_char]) -> RhiResult<Self> {
        let entry = unsafe { Entry::load()? };

        let validation = if enable_validation {
            let layers = unsafe { entry.enumerate_instance_layer_properties()? };
            let found = has_layer(&layers, VALIDATION_LAYER);
            if !found {
                warn!("Validation requested but {:?} is not installed", VALIDATION_LAYER);
            }
            found
        } else {
            false
        };

        let version = vk::make_api_version(0, 1, 0, 0);
        let app_info = vk::ApplicationInfo::default()
            .application_name(APP_NAME)
            .application_version(version)
            .engine_name(ENGINE_NAME)
            .engine_version(version)
            .api_version(vk::API_VERSION_1_2);

        let extensions = instance_extensions(surface_extensions, validation);
        let layers: Vec<*const c_char> = if validation {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            Vec::new()
        };

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);

        let instance = unsafe { entry.create_instance(&create_info, None)? };
        info!(
            "Vulkan instance created: API 1.2, {} extensions, validation {}",
            extensions.len(),
            if validation { "on" } else { "off" }
        );

        let messenger = if validation {
            match DebugMessenger::new(&entry, &instance) {
                Ok(messenger) => Some(messenger),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        Ok(Self {
            entry,
            instance,
            messenger,
        })
    }

    #[inline]
    pub fn handle(&self) -> &ash::Instance {
        &self.instance
    }

    #[inline]
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Whether validation output is being forwarded.
    #[inline]
    pub fn has_validation(&self) -> bool {
        self.messenger.is_some()
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        // The messenger is a child of the instance.
        if let Some(messenger) = self.messenger.take() {
            unsafe {
                messenger
                    .loader
                    .destroy_debug_utils_messenger(messenger.handle, None);
            }
        }
        unsafe { self.instance.destroy_instance(None) };
        info!("Vulkan instance destroyed");
    }
}

impl DebugMessenger {
    fn new(entry: &Entry, instance: &ash::Instance) -> RhiResult<Self> {
        let loader = ash::ext::debug_utils::Instance::new(entry, instance);
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(forward_to_tracing));

        let handle = unsafe { loader.create_debug_utils_messenger(&create_info, None)? };
        debug!("Debug messenger created");
        Ok(Self { loader, handle })
    }
}

/// Extensions to enable: the surface set plus debug utils with validation.
fn instance_extensions(
    surface_extensions: &[*const c_char],
    validation: bool,
) -> Vec<*const c_char> {
    let mut extensions = if surface_extensions.is_empty() {
        os_surface_extensions()
    } else {
        surface_extensions.to_vec()
    };
    if validation {
        extensions.push(ash::ext::debug_utils::NAME.as_ptr());
    }
    extensions
}

/// `VK_KHR_surface` plus every window-system extension the OS may need.
fn os_surface_extensions() -> Vec<*const c_char> {
    let mut extensions = vec![ash::khr::surface::NAME.as_ptr()];

    #[cfg(target_os = "windows")]
    extensions.push(ash::khr::win32_surface::NAME.as_ptr());

    #[cfg(target_os = "linux")]
    extensions.extend([
        ash::khr::xlib_surface::NAME.as_ptr(),
        ash::khr::wayland_surface::NAME.as_ptr(),
    ]);

    #[cfg(target_os = "macos")]
    extensions.push(ash::ext::metal_surface::NAME.as_ptr());

    extensions
}

fn has_layer(layers: &[vk::LayerProperties], name: &CStr) -> bool {
    layers
        .iter()
        .any(|layer| layer.layer_name_as_c_str().is_ok_and(|layer_name| layer_name == name))
}

/// Level a validation message of `severity` is logged at.
fn severity_level(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> Level {
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        Level::ERROR
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        Level::WARN
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        Level::DEBUG
    } else {
        Level::TRACE
    }
}

fn message_kind(kind: vk::DebugUtilsMessageTypeFlagsEXT) -> &'static str {
    if kind.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        "validation"
    } else if kind.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        "performance"
    } else {
        "general"
    }
}

/// # Safety
///
/// Called by the validation layer with a valid (or null) callback data
/// pointer that lives for the duration of the call.
unsafe extern "system" fn forward_to_tracing(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    kind: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    let message = match unsafe { callback_data.as_ref() } {
        Some(data) if !data.p_message.is_null() => unsafe {
            CStr::from_ptr(data.p_message).to_string_lossy()
        },
        _ => Cow::Borrowed("(no message)"),
    };
    let kind = message_kind(kind);

    let level = severity_level(severity);
    if level == Level::ERROR {
        error!(target: "vulkan", "[{}] {}", kind, message);
    } else if level == Level::WARN {
        warn!(target: "vulkan", "[{}] {}", kind, message);
    } else if level == Level::DEBUG {
        debug!(target: "vulkan", "[{}] {}", kind, message);
    } else {
        trace!(target: "vulkan", "[{}] {}", kind, message);
    }

    // Never abort the triggering call.
    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RhiError;

    fn layer(name: &CStr) -> vk::LayerProperties {
        let mut properties = vk::LayerProperties::default();
        for (dst, &src) in properties.layer_name.iter_mut().zip(name.to_bytes()) {
            *dst = src as c_char;
        }
        properties
    }

    #[test]
    fn test_has_layer() {
        let layers = [layer(c"VK_LAYER_MESA_overlay"), layer(VALIDATION_LAYER)];
        assert!(has_layer(&layers, VALIDATION_LAYER));
        assert!(!has_layer(&layers[..1], VALIDATION_LAYER));
        assert!(!has_layer(&[], VALIDATION_LAYER));
    }

    #[test]
    fn test_os_surface_extensions_start_with_khr_surface() {
        let extensions = instance_extensions(&[], false);
        assert!(extensions.len() >= 2);
        assert_eq!(extensions[0], ash::khr::surface::NAME.as_ptr());
    }

    #[test]
    fn test_validation_appends_debug_utils() {
        let surface = [ash::khr::surface::NAME.as_ptr()];
        let extensions = instance_extensions(&surface, true);
        assert_eq!(extensions.len(), 2);
        assert_eq!(extensions[1], ash::ext::debug_utils::NAME.as_ptr());

        assert_eq!(instance_extensions(&surface, false).len(), 1);
    }

    #[test]
    fn test_severity_levels() {
        use vk::DebugUtilsMessageSeverityFlagsEXT as S;
        assert_eq!(severity_level(S::ERROR), Level::ERROR);
        assert_eq!(severity_level(S::WARNING), Level::WARN);
        assert_eq!(severity_level(S::INFO), Level::DEBUG);
        assert_eq!(severity_level(S::VERBOSE), Level::TRACE);
        assert_eq!(severity_level(S::WARNING | S::ERROR), Level::ERROR);
    }

    #[test]
    fn test_message_kind_prefers_validation() {
        use vk::DebugUtilsMessageTypeFlagsEXT as T;
        assert_eq!(message_kind(T::GENERAL), "general");
        assert_eq!(message_kind(T::PERFORMANCE), "performance");
        assert_eq!(message_kind(T::VALIDATION | T::PERFORMANCE), "validation");
    }

    #[test]
    fn test_instance_without_validation() {
        // Needs a Vulkan loader with window-system support; skipped otherwise.
        match Instance::new(false, &[]) {
            Ok(instance) => assert!(!instance.has_validation()),
            Err(RhiError::LoadingError(_)) => {
                eprintln!("Skipping test: Vulkan not available");
            }
            Err(RhiError::VulkanError(vk::Result::ERROR_EXTENSION_NOT_PRESENT)) => {
                eprintln!("Skipping test: no surface extensions");
            }
            Err(e) => panic!("Unexpected error: {:?}", e),
        }
    }
}
