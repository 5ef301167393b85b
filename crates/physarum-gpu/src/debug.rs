//! Validation layer messages routed into `tracing`.

use std::ffi::CStr;

use ash::vk;

use crate::error::Result;

/// Severity and type filter shared by the messenger and the instance `pNext` chain.
pub fn messenger_create_info() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
    vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback))
}

/// Create a messenger that forwards validation output to `tracing`.
///
/// # Safety
/// The debug utils loader must belong to a live instance created with
/// `VK_EXT_debug_utils` enabled.
pub unsafe fn create_debug_messenger(
    debug_utils: &ash::ext::debug_utils::Instance,
) -> Result<vk::DebugUtilsMessengerEXT> {
    let create_info = messenger_create_info();
    let messenger = debug_utils.create_debug_utils_messenger(&create_info, None)?;
    Ok(messenger)
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    // SAFETY: the driver passes either null or a valid callback struct.
    let message = match unsafe { callback_data.as_ref() } {
        Some(data) if !data.p_message.is_null() => {
            // SAFETY: p_message is a NUL-terminated string owned by the driver.
            unsafe { CStr::from_ptr(data.p_message) }.to_string_lossy()
        }
        _ => "(no message)".into(),
    };

    let kind = match message_type {
        vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION => "validation",
        vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE => "performance",
        _ => "general",
    };

    match severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => tracing::error!(kind, "{message}"),
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => tracing::warn!(kind, "{message}"),
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => tracing::debug!(kind, "{message}"),
        _ => tracing::trace!(kind, "{message}"),
    }

    vk::FALSE
}
