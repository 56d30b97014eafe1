//! Vulkan context management
//!
//! Instance, debug messenger, surface, physical device selection and the
//! logical device. Every wrapper destroys its handle on drop; [`VulkanContext`]
//! orders the drops so the device goes before the surface and the instance.

use std::ffi::{c_void, CStr, CString};

use ash::extensions::ext::DebugUtils;
use ash::extensions::khr::{Surface, Swapchain as SwapchainLoader};
use ash::{vk, Device, Entry, Instance};
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use thiserror::Error;

use crate::render::RenderError;

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// Vulkan context initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// No suitable memory type found for allocation
    #[error("No suitable memory type found")]
    NoSuitableMemoryType,

    /// None of the candidate formats is supported
    #[error("No supported {0} format")]
    UnsupportedFormat(&'static str),

    /// Shader code could not be turned into a module
    #[error("Invalid shader '{name}': {reason}")]
    InvalidShader {
        /// Debug name of the program
        name: String,
        /// What was wrong
        reason: String,
    },
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

impl VulkanError {
    /// Recoverable frame errors. Everything else is a bug or a dead driver.
    pub fn recoverable(&self) -> Option<RenderError> {
        match self {
            Self::Api(vk::Result::ERROR_OUT_OF_DATE_KHR) => Some(RenderError::SurfaceOutOfDate),
            Self::Api(vk::Result::ERROR_DEVICE_LOST) => Some(RenderError::DeviceLost { reason: "device lost".to_string() }),
            Self::Api(vk::Result::ERROR_SURFACE_LOST_KHR) => {
                Some(RenderError::DeviceLost { reason: "surface lost".to_string() })
            }
            Self::Api(vk::Result::TIMEOUT | vk::Result::NOT_READY) => {
                Some(RenderError::DeviceLost { reason: "swapchain image acquire timed out".to_string() })
            }
            _ => None,
        }
    }
}

impl From<VulkanError> for RenderError {
    fn from(error: VulkanError) -> Self {
        if let Some(recoverable) = error.recoverable() {
            return recoverable;
        }
        match error {
            VulkanError::InitializationFailed(reason) => RenderError::InitializationFailed(reason),
            VulkanError::UnsupportedFormat(_) => RenderError::InitializationFailed(error.to_string()),
            VulkanError::NoSuitableMemoryType | VulkanError::InvalidShader { .. } => {
                RenderError::ResourceCreationFailed(error.to_string())
            }
            VulkanError::Api(_) => RenderError::BackendError(error.to_string()),
        }
    }
}

/// Map a failed frame operation: recoverable results become errors, anything
/// else is fatal.
pub(crate) fn frame_error(operation: &str, error: VulkanError) -> RenderError {
    match error.recoverable() {
        Some(recoverable) => {
            log::warn!("{} failed: {}", operation, error);
            recoverable
        }
        None => panic!("{} failed: {}", operation, error),
    }
}

/// Vulkan instance with its optional debug messenger
pub struct VulkanInstance {
    /// Loader entry points
    pub entry: Entry,
    /// Instance handle
    pub instance: Instance,
    debug: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
}

impl VulkanInstance {
    /// Create an instance with the extensions the window's platform needs
    pub fn new<D>(app_name: &str, display: &D, enable_validation: bool) -> VulkanResult<Self>
    where
        D: HasRawDisplayHandle + ?Sized,
    {
        let entry = unsafe { Entry::load() }
            .map_err(|e| VulkanError::InitializationFailed(format!("Failed to load Vulkan: {}", e)))?;

        let app_name = CString::new(app_name)
            .map_err(|_| VulkanError::InitializationFailed("application name contains NUL".to_string()))?;
        let engine_name = CString::new("Aether").map_err(|e| VulkanError::InitializationFailed(e.to_string()))?;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_1);

        let mut extensions = ash_window::enumerate_required_extensions(display.raw_display_handle())
            .map_err(|e| VulkanError::InitializationFailed(format!("Unsupported display: {:?}", e)))?
            .to_vec();
        if enable_validation {
            extensions.push(DebugUtils::name().as_ptr());
        }

        let validation_layer = CString::new("VK_LAYER_KHRONOS_validation")
            .map_err(|e| VulkanError::InitializationFailed(e.to_string()))?;
        let layers = if enable_validation && Self::has_layer(&entry, &validation_layer) {
            vec![validation_layer.as_ptr()]
        } else {
            if enable_validation {
                log::warn!("Validation requested but VK_LAYER_KHRONOS_validation is not installed");
            }
            Vec::new()
        };

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .map_err(|e| VulkanError::InitializationFailed(format!("Instance creation: {:?}", e)))?;

        let debug = if enable_validation {
            let debug_utils = DebugUtils::new(&entry, &instance);
            match Self::setup_debug_messenger(&debug_utils) {
                Ok(messenger) => Some((debug_utils, messenger)),
                Err(e) => {
                    log::warn!("Debug messenger unavailable: {}", e);
                    None
                }
            }
        } else {
            None
        };

        Ok(Self { entry, instance, debug })
    }

    fn has_layer(entry: &Entry, name: &CStr) -> bool {
        entry
            .enumerate_instance_layer_properties()
            .map(|layers| {
                layers
                    .iter()
                    .any(|layer| unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) } == name)
            })
            .unwrap_or(false)
    }

    fn setup_debug_messenger(debug_utils: &DebugUtils) -> VulkanResult<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }.map_err(VulkanError::Api)
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            if let Some((debug_utils, messenger)) = self.debug.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Routes validation messages into `log`
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    if callback_data.is_null() || (*callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*callback_data).p_message).to_string_lossy();

    if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::ERROR {
        log::error!("[Vulkan] {:?} - {}", message_type, message);
    } else if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING {
        log::warn!("[Vulkan] {:?} - {}", message_type, message);
    } else if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::INFO {
        log::debug!("[Vulkan] {:?} - {}", message_type, message);
    } else {
        log::trace!("[Vulkan] {:?} - {}", message_type, message);
    }

    vk::FALSE
}

/// Selected GPU and its queue family
pub struct PhysicalDeviceInfo {
    /// Physical device handle
    pub device: vk::PhysicalDevice,
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Memory heaps and types
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Queue family supporting graphics, compute and present
    pub queue_family: u32,
}

impl PhysicalDeviceInfo {
    /// Pick the first GPU with a graphics+compute queue that can present,
    /// preferring discrete GPUs.
    pub fn select(instance: &Instance, surface: vk::SurfaceKHR, surface_loader: &Surface) -> VulkanResult<Self> {
        let devices = unsafe { instance.enumerate_physical_devices() }.map_err(VulkanError::Api)?;

        let mut candidates: Vec<Self> = devices
            .into_iter()
            .filter_map(|device| Self::evaluate(instance, device, surface, surface_loader))
            .collect();
        candidates.sort_by_key(|info| info.properties.device_type != vk::PhysicalDeviceType::DISCRETE_GPU);

        let selected = candidates
            .into_iter()
            .next()
            .ok_or_else(|| VulkanError::InitializationFailed("No suitable GPU found".to_string()))?;

        log::info!("Selected GPU: {}", unsafe {
            CStr::from_ptr(selected.properties.device_name.as_ptr()).to_string_lossy()
        });
        Ok(selected)
    }

    fn evaluate(
        instance: &Instance,
        device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &Surface,
    ) -> Option<Self> {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        let families = unsafe { instance.get_physical_device_queue_family_properties(device) };

        let required = vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE;
        let queue_family = families.iter().enumerate().find_map(|(index, family)| {
            let index = index as u32;
            let present = unsafe { surface_loader.get_physical_device_surface_support(device, index, surface) }
                .unwrap_or(false);
            (family.queue_flags.contains(required) && present).then_some(index)
        })?;

        let extensions = unsafe { instance.enumerate_device_extension_properties(device) }.ok()?;
        let has_swapchain = extensions
            .iter()
            .any(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) } == SwapchainLoader::name());
        if !has_swapchain {
            return None;
        }

        let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };
        Some(Self { device, properties, memory_properties, queue_family })
    }

    /// Index of a memory type allowed by `type_filter` with all of `properties`
    pub fn find_memory_type(&self, type_filter: u32, properties: vk::MemoryPropertyFlags) -> VulkanResult<u32> {
        (0..self.memory_properties.memory_type_count)
            .find(|&i| {
                type_filter & (1 << i) != 0
                    && self.memory_properties.memory_types[i as usize].property_flags.contains(properties)
            })
            .ok_or(VulkanError::NoSuitableMemoryType)
    }
}

/// Logical device wrapper with RAII cleanup
pub struct LogicalDevice {
    /// Device handle
    pub device: Device,
    /// The single queue used for graphics, compute, transfer and present
    pub queue: vk::Queue,
    /// Swapchain extension loader
    pub swapchain_loader: SwapchainLoader,
}

impl LogicalDevice {
    /// Create the device with one queue
    pub fn new(instance: &Instance, physical: &PhysicalDeviceInfo) -> VulkanResult<Self> {
        let priorities = [1.0];
        let queue_info = [vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(physical.queue_family)
            .queue_priorities(&priorities)
            .build()];
        let extensions = [SwapchainLoader::name().as_ptr()];
        let features = vk::PhysicalDeviceFeatures::builder();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_info)
            .enabled_extension_names(&extensions)
            .enabled_features(&features);

        let device = unsafe { instance.create_device(physical.device, &create_info, None) }
            .map_err(|e| VulkanError::InitializationFailed(format!("Device creation: {:?}", e)))?;
        let queue = unsafe { device.get_device_queue(physical.queue_family, 0) };
        let swapchain_loader = SwapchainLoader::new(instance, &device);

        Ok(Self { device, queue, swapchain_loader })
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
    }
}

/// Surface wrapper with RAII cleanup
pub struct VulkanSurface {
    /// Surface handle
    pub surface: vk::SurfaceKHR,
    /// Surface extension loader
    pub loader: Surface,
}

impl VulkanSurface {
    /// Create a surface for a window
    pub fn new<W>(instance: &VulkanInstance, window: &W) -> VulkanResult<Self>
    where
        W: HasRawWindowHandle + HasRawDisplayHandle + ?Sized,
    {
        let loader = Surface::new(&instance.entry, &instance.instance);
        let surface = unsafe {
            ash_window::create_surface(
                &instance.entry,
                &instance.instance,
                window.raw_display_handle(),
                window.raw_window_handle(),
                None,
            )
        }
        .map_err(|e| VulkanError::InitializationFailed(format!("Surface creation: {:?}", e)))?;
        Ok(Self { surface, loader })
    }
}

impl Drop for VulkanSurface {
    fn drop(&mut self) {
        unsafe { self.loader.destroy_surface(self.surface, None) };
    }
}

/// Instance, surface, GPU and device. Fields drop in declaration order.
pub struct VulkanContext {
    /// Logical device
    pub device: LogicalDevice,
    /// Selected GPU
    pub physical: PhysicalDeviceInfo,
    /// Presentation surface
    pub surface: VulkanSurface,
    /// Instance and debug messenger
    pub instance: VulkanInstance,
}

impl VulkanContext {
    /// Create everything up to the logical device
    pub fn new<W>(app_name: &str, window: &W, enable_validation: bool) -> VulkanResult<Self>
    where
        W: HasRawWindowHandle + HasRawDisplayHandle + ?Sized,
    {
        let instance = VulkanInstance::new(app_name, window, enable_validation)?;
        let surface = VulkanSurface::new(&instance, window)?;
        let physical = PhysicalDeviceInfo::select(&instance.instance, surface.surface, &surface.loader)?;
        let device = LogicalDevice::new(&instance.instance, &physical)?;
        log::debug!("Vulkan device ready, queue family {}", physical.queue_family);
        Ok(Self { device, physical, surface, instance })
    }

    /// The raw device handle
    pub fn raw_device(&self) -> &Device {
        &self.device.device
    }

    /// Pick the first format in `candidates` usable as a depth attachment
    pub fn find_depth_format(&self, candidates: &[vk::Format]) -> VulkanResult<vk::Format> {
        candidates
            .iter()
            .copied()
            .find(|&format| {
                let props = unsafe {
                    self.instance
                        .instance
                        .get_physical_device_format_properties(self.physical.device, format)
                };
                props
                    .optimal_tiling_features
                    .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
            })
            .ok_or(VulkanError::UnsupportedFormat("depth"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_results() {
        assert!(matches!(
            VulkanError::Api(vk::Result::ERROR_OUT_OF_DATE_KHR).recoverable(),
            Some(RenderError::SurfaceOutOfDate)
        ));
        assert!(matches!(
            VulkanError::Api(vk::Result::TIMEOUT).recoverable(),
            Some(RenderError::DeviceLost { .. })
        ));
        assert!(VulkanError::Api(vk::Result::ERROR_OUT_OF_HOST_MEMORY).recoverable().is_none());
    }

    #[test]
    fn test_error_conversion() {
        let err: RenderError = VulkanError::NoSuitableMemoryType.into();
        assert!(matches!(err, RenderError::ResourceCreationFailed(_)));
        let err: RenderError = VulkanError::InitializationFailed("no gpu".into()).into();
        assert!(matches!(err, RenderError::InitializationFailed(_)));
        let err: RenderError = VulkanError::Api(vk::Result::ERROR_DEVICE_LOST).into();
        assert!(err.is_recoverable());
    }
}
