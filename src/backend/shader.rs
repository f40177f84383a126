// Shader module loading
//
// Vulkan consumes SPIR-V. build.rs compiles shaders/*.vert|frag with glslc;
// the resulting .spv files are read at startup.

use anyhow::{Context, Result};
use ash::vk;
use std::path::Path;

use super::VulkanDevice;

/// Read a SPIR-V file and create a shader module
pub fn load_shader_module(device: &VulkanDevice, path: &Path) -> Result<vk::ShaderModule> {
    let mut file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open shader {:?} (is glslc installed?)", path))?;

    // read_spv checks the length and handles alignment for us
    let code = ash::util::read_spv(&mut file)
        .with_context(|| format!("Failed to read SPIR-V from {:?}", path))?;

    create_shader_module(device, &code)
}

pub fn create_shader_module(device: &VulkanDevice, code: &[u32]) -> Result<vk::ShaderModule> {
    let create_info = vk::ShaderModuleCreateInfo::builder().code(code);

    unsafe {
        device
            .device
            .create_shader_module(&create_info, None)
            .context("Failed to create shader module")
    }
}

