// Backend module - Vulkan abstraction layer
//
// Design: Thin wrapper around ash with safety and ergonomics.
// `DeviceProvider` is the only type the rest of the app talks to.

pub mod buffer;
pub mod device;
pub mod pipeline;
pub mod provider;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use device::VulkanDevice;
pub use provider::DeviceProvider;
pub use swapchain::Swapchain;
