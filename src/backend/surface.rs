// Surface - connects the winit window to Vulkan
//
// Picks the platform surface extension from the window's raw handles and
// creates the matching VkSurfaceKHR.

use anyhow::{Context, Result};
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle};
use std::ffi::c_char;
use winit::window::Window;

/// Instance extensions needed to present to a display of this kind
pub fn required_instance_extensions(display: RawDisplayHandle) -> Result<Vec<*const c_char>> {
    let platform = match display {
        RawDisplayHandle::Windows(_) => ash::extensions::khr::Win32Surface::name(),
        RawDisplayHandle::Xlib(_) => ash::extensions::khr::XlibSurface::name(),
        RawDisplayHandle::Xcb(_) => ash::extensions::khr::XcbSurface::name(),
        RawDisplayHandle::Wayland(_) => ash::extensions::khr::WaylandSurface::name(),
        other => anyhow::bail!("Unsupported display type: {:?}", other),
    };

    Ok(vec![
        ash::extensions::khr::Surface::name().as_ptr(),
        platform.as_ptr(),
    ])
}

/// Raw display handle of a window, for instance creation
pub fn display_handle(window: &Window) -> Result<RawDisplayHandle> {
    Ok(window
        .display_handle()
        .context("Failed to get display handle")?
        .as_raw())
}

/// Create a presentable surface for `window`
pub fn create_surface(
    entry: &ash::Entry,
    instance: &ash::Instance,
    window: &Window,
) -> Result<vk::SurfaceKHR> {
    let window_handle = window
        .window_handle()
        .context("Failed to get window handle")?
        .as_raw();
    let display_handle = display_handle(window)?;

    let surface = unsafe {
        match (display_handle, window_handle) {
            (RawDisplayHandle::Windows(_), RawWindowHandle::Win32(handle)) => {
                let hinstance = handle.hinstance.map(|h| h.get()).unwrap_or(0) as *const std::ffi::c_void;
                let hwnd = handle.hwnd.get() as *const std::ffi::c_void;
                let create_info = vk::Win32SurfaceCreateInfoKHR::builder()
                    .hinstance(hinstance)
                    .hwnd(hwnd);
                let loader = ash::extensions::khr::Win32Surface::new(entry, instance);
                loader.create_win32_surface(&create_info, None)?
            }
            (RawDisplayHandle::Xlib(display), RawWindowHandle::Xlib(handle)) => {
                let dpy = display
                    .display
                    .context("Xlib display handle is null")?
                    .as_ptr();
                let create_info = vk::XlibSurfaceCreateInfoKHR::builder()
                    .dpy(dpy.cast())
                    .window(handle.window);
                let loader = ash::extensions::khr::XlibSurface::new(entry, instance);
                loader.create_xlib_surface(&create_info, None)?
            }
            (RawDisplayHandle::Xcb(display), RawWindowHandle::Xcb(handle)) => {
                let connection = display
                    .connection
                    .context("XCB connection handle is null")?
                    .as_ptr();
                let create_info = vk::XcbSurfaceCreateInfoKHR::builder()
                    .connection(connection.cast())
                    .window(handle.window.get());
                let loader = ash::extensions::khr::XcbSurface::new(entry, instance);
                loader.create_xcb_surface(&create_info, None)?
            }
            (RawDisplayHandle::Wayland(display), RawWindowHandle::Wayland(handle)) => {
                let create_info = vk::WaylandSurfaceCreateInfoKHR::builder()
                    .display(display.display.as_ptr().cast())
                    .surface(handle.surface.as_ptr().cast());
                let loader = ash::extensions::khr::WaylandSurface::new(entry, instance);
                loader.create_wayland_surface(&create_info, None)?
            }
            _ => anyhow::bail!("Unsupported window handle type"),
        }
    };

    Ok(surface)
}
