// Device Provider - everything the frame loop needs from Vulkan
//
// Owns the surface, swapchain, render pass, pipeline, the mapped geometry and
// transform buffers, a single command buffer and the frame sync objects, and
// exposes them to the frame synchronizer through `FrameBackend`.
//
// Creation order (destroyed in reverse):
//   device -> surface -> render pass -> buffers -> descriptors -> pipeline
//          -> command pool -> sync -> swapchain, depth, framebuffers

use anyhow::{Context, Result};
use ash::prelude::VkResult;
use ash::vk;
use std::sync::Arc;
use winit::window::Window;

use super::buffer::{DepthBuffer, GeometryBuffer, TransformBuffer};
use super::swapchain::query_surface_format;
use super::sync::FrameSync;
use super::{pipeline, shader, surface, Swapchain, VulkanDevice};
use crate::config::Config;
use crate::frame::{FrameBackend, RecordError};
use crate::scene::SceneFrame;

const VERTEX_SHADER: &str = "quad.vert.spv";
const FRAGMENT_SHADER: &str = "quad.frag.spv";

pub struct DeviceProvider {
    // ─────────────────────────────────────────────────────────────────────────
    // SWAPCHAIN-DEPENDENT (rebuilt on resize)
    // ─────────────────────────────────────────────────────────────────────────
    framebuffers: Vec<vk::Framebuffer>,
    depth: Option<DepthBuffer>,
    swapchain: Option<Swapchain>,

    // ─────────────────────────────────────────────────────────────────────────
    // PIPELINE
    // ─────────────────────────────────────────────────────────────────────────
    pipeline: vk::Pipeline,
    pipeline_layout: vk::PipelineLayout,
    render_pass: vk::RenderPass,
    surface_format: vk::Format,
    descriptor_set_layout: vk::DescriptorSetLayout,
    descriptor_pool: vk::DescriptorPool,
    descriptor_set: vk::DescriptorSet,

    // ─────────────────────────────────────────────────────────────────────────
    // PER-FRAME
    // ─────────────────────────────────────────────────────────────────────────
    command_pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    sync: FrameSync,
    geometry: GeometryBuffer,
    transforms: TransformBuffer,

    // ─────────────────────────────────────────────────────────────────────────
    // SURFACE
    // ─────────────────────────────────────────────────────────────────────────
    surface: vk::SurfaceKHR,
    surface_loader: ash::extensions::khr::Surface,
    /// Latest window size reported by the windowing system
    surface_extent: vk::Extent2D,
    swapchain_stale: bool,

    clear_color: [f32; 4],
    present_mode: vk::PresentModeKHR,
    depth_test: bool,

    device: Arc<VulkanDevice>,
}

impl DeviceProvider {
    /// Bring up the device and every resource that does not depend on the
    /// window size. The swapchain is built too unless the window has no area.
    pub fn new(window: &Window, config: &Config) -> Result<Self> {
        log::info!("Initializing Vulkan...");

        let enable_validation = cfg!(debug_assertions) && config.debug.validation_layers;
        let device = VulkanDevice::new(
            &config.window.title,
            enable_validation,
            surface::display_handle(window)?,
        )?;

        let surface_loader = ash::extensions::khr::Surface::new(&device.entry, &device.instance);
        let surface = surface::create_surface(&device.entry, &device.instance, window)?;

        // Verify the GPU supports presenting to this surface
        let surface_support = unsafe {
            surface_loader.get_physical_device_surface_support(
                device.physical_device,
                device.graphics_queue_family,
                surface,
            )?
        };
        if !surface_support {
            anyhow::bail!("GPU doesn't support presenting to this surface");
        }

        let surface_format = query_surface_format(&device, surface, &surface_loader)?.format;
        let depth_test = config.graphics.depth_test;
        let render_pass = pipeline::create_render_pass(&device, surface_format, depth_test)?;

        let max_quads = config.graphics.max_quads;
        let geometry = GeometryBuffer::new(device.clone(), max_quads)?;
        let transforms = TransformBuffer::new(device.clone(), max_quads)?;

        let descriptor_set_layout = pipeline::create_descriptor_set_layout(&device)?;
        let (descriptor_pool, descriptor_set) = pipeline::create_descriptor_set(
            &device,
            descriptor_set_layout,
            transforms.buffer(),
            transforms.range(),
        )?;

        // ─────────────────────────────────────────────────────────────────────
        // Shaders only live until the pipeline is built
        // ─────────────────────────────────────────────────────────────────────
        let shader_dir = &config.graphics.shader_dir;
        let vert = shader::load_shader_module(&device, &shader_dir.join(VERTEX_SHADER))?;
        let frag = match shader::load_shader_module(&device, &shader_dir.join(FRAGMENT_SHADER)) {
            Ok(frag) => frag,
            Err(e) => {
                unsafe { device.device.destroy_shader_module(vert, None) };
                return Err(e);
            }
        };

        let built = pipeline::create_graphics_pipeline(
            &device,
            render_pass,
            descriptor_set_layout,
            vert,
            frag,
            depth_test,
        );
        unsafe {
            device.device.destroy_shader_module(vert, None);
            device.device.destroy_shader_module(frag, None);
        }
        let (pipeline, pipeline_layout) = built?;

        // ─────────────────────────────────────────────────────────────────────
        // One command buffer, re-recorded every frame
        // ─────────────────────────────────────────────────────────────────────
        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(device.graphics_queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let command_pool = unsafe { device.device.create_command_pool(&pool_info, None) }
            .context("Failed to create command pool")?;

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let command_buffer = unsafe { device.device.allocate_command_buffers(&alloc_info) }
            .context("Failed to allocate command buffer")?
            .first()
            .copied()
            .context("No command buffer allocated")?;

        let sync = FrameSync::new(&device.device)?;

        let size = window.inner_size();
        let mut provider = Self {
            framebuffers: Vec::new(),
            depth: None,
            swapchain: None,
            pipeline,
            pipeline_layout,
            render_pass,
            surface_format,
            descriptor_set_layout,
            descriptor_pool,
            descriptor_set,
            command_pool,
            command_buffer,
            sync,
            geometry,
            transforms,
            surface,
            surface_loader,
            surface_extent: vk::Extent2D {
                width: size.width,
                height: size.height,
            },
            swapchain_stale: true,
            clear_color: config.graphics.clear_color,
            present_mode: config.get_present_mode(),
            depth_test,
            device,
        };

        provider.prepare_frame()?;

        log::info!("Vulkan initialized successfully!");
        Ok(provider)
    }

    /// Record the new window size. A change marks the swapchain stale.
    pub fn set_surface_extent(&mut self, width: u32, height: u32) {
        let extent = vk::Extent2D { width, height };
        if extent != self.surface_extent {
            log::debug!("Surface extent {}x{}", width, height);
            self.surface_extent = extent;
            self.swapchain_stale = true;
        }
    }

    pub fn mark_swapchain_stale(&mut self) {
        self.swapchain_stale = true;
    }

    /// Rebuild the swapchain if it is stale and the surface has area.
    ///
    /// With a zero-area surface this does nothing; the synchronizer skips
    /// those frames anyway.
    pub fn prepare_frame(&mut self) -> Result<()> {
        let has_area = self.surface_extent.width > 0 && self.surface_extent.height > 0;
        if has_area && (self.swapchain_stale || self.swapchain.is_none()) {
            self.recreate_swapchain()?;
        }
        Ok(())
    }

    /// Recreate swapchain, depth buffer and framebuffers at the current extent.
    fn recreate_swapchain(&mut self) -> Result<()> {
        // Wait for GPU to finish all work before destroying resources
        self.device.wait_idle()?;
        self.destroy_swapchain_resources();

        let swapchain = Swapchain::new(
            self.device.clone(),
            self.surface,
            &self.surface_loader,
            self.surface_extent.width,
            self.surface_extent.height,
            self.present_mode,
        )?;

        if swapchain.format != self.surface_format {
            anyhow::bail!(
                "Surface format changed from {:?} to {:?}",
                self.surface_format,
                swapchain.format
            );
        }

        let depth = if self.depth_test {
            Some(DepthBuffer::new(self.device.clone(), swapchain.extent)?)
        } else {
            None
        };

        self.framebuffers = pipeline::create_framebuffers(
            &self.device,
            &swapchain.image_views,
            depth.as_ref().map(|d| d.view),
            self.render_pass,
            swapchain.extent,
        )?;
        self.depth = depth;
        self.swapchain = Some(swapchain);
        self.swapchain_stale = false;

        Ok(())
    }

    fn destroy_swapchain_resources(&mut self) {
        unsafe {
            for framebuffer in self.framebuffers.drain(..) {
                self.device.device.destroy_framebuffer(framebuffer, None);
            }
        }
        self.depth = None;
        // The surface can only have one swapchain at a time
        self.swapchain = None;
    }
}

impl FrameBackend for DeviceProvider {
    fn wait_for_frame_fence(&mut self, timeout_ns: u64) -> VkResult<()> {
        self.sync.wait(&self.device.device, timeout_ns)
    }

    fn surface_extent(&self) -> vk::Extent2D {
        self.surface_extent
    }

    fn acquire_next_image(&mut self, timeout_ns: u64) -> VkResult<(u32, bool)> {
        match self.swapchain {
            Some(ref swapchain) => swapchain.acquire_next_image(timeout_ns, self.sync.image_acquired),
            // Not built yet; same recovery as an outdated one
            None => Err(vk::Result::ERROR_OUT_OF_DATE_KHR),
        }
    }

    fn reset_frame_fence(&mut self) -> VkResult<()> {
        self.sync.reset(&self.device.device)
    }

    fn upload_scene(&mut self, scene: &SceneFrame) -> Result<(), RecordError> {
        self.geometry.write(&scene.vertices)?;
        self.transforms.write(&scene.offsets)
    }

    fn record_commands(&mut self, image_index: u32, vertex_count: u32) -> VkResult<()> {
        let extent = match self.swapchain {
            Some(ref swapchain) => swapchain.extent,
            None => return Err(vk::Result::ERROR_OUT_OF_DATE_KHR),
        };
        let framebuffer = self
            .framebuffers
            .get(image_index as usize)
            .copied()
            .ok_or(vk::Result::ERROR_UNKNOWN)?;

        let device = &self.device.device;
        let cmd = self.command_buffer;

        let mut clear_values = vec![vk::ClearValue {
            color: vk::ClearColorValue {
                float32: self.clear_color,
            },
        }];
        if self.depth.is_some() {
            clear_values.push(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            });
        }

        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };

        unsafe {
            device.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?;

            let begin_info = vk::CommandBufferBeginInfo::builder()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            device.begin_command_buffer(cmd, &begin_info)?;

            let render_pass_info = vk::RenderPassBeginInfo::builder()
                .render_pass(self.render_pass)
                .framebuffer(framebuffer)
                .render_area(scissor)
                .clear_values(&clear_values);
            device.cmd_begin_render_pass(cmd, &render_pass_info, vk::SubpassContents::INLINE);

            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline);
            device.cmd_set_viewport(cmd, 0, &[viewport]);
            device.cmd_set_scissor(cmd, 0, &[scissor]);
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline_layout,
                0,
                &[self.descriptor_set],
                &[],
            );
            device.cmd_bind_vertex_buffers(cmd, 0, &[self.geometry.buffer()], &[0]);
            device.cmd_draw(cmd, vertex_count, 1, 0, 0);

            device.cmd_end_render_pass(cmd);
            device.end_command_buffer(cmd)
        }
    }

    fn submit(&mut self) -> VkResult<()> {
        let wait_semaphores = [self.sync.image_acquired];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [self.command_buffer];
        let signal_semaphores = [self.sync.render_complete];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device.device.queue_submit(
                self.device.graphics_queue,
                &[submit_info.build()],
                self.sync.frame_fence,
            )
        }
    }

    fn present(&mut self, image_index: u32) -> VkResult<bool> {
        match self.swapchain {
            Some(ref swapchain) => swapchain.present(
                self.device.graphics_queue,
                image_index,
                &[self.sync.render_complete],
            ),
            None => Err(vk::Result::ERROR_OUT_OF_DATE_KHR),
        }
    }
}

impl Drop for DeviceProvider {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");

        // Wait for GPU to finish before destroying anything
        if let Err(e) = self.device.wait_idle() {
            log::warn!("wait_idle failed during cleanup: {:?}", e);
        }

        self.destroy_swapchain_resources();

        unsafe {
            let device = &self.device.device;
            self.sync.destroy(device);
            // Also frees the command buffer
            device.destroy_command_pool(self.command_pool, None);
            device.destroy_pipeline(self.pipeline, None);
            device.destroy_pipeline_layout(self.pipeline_layout, None);
            device.destroy_descriptor_pool(self.descriptor_pool, None);
            device.destroy_descriptor_set_layout(self.descriptor_set_layout, None);
            device.destroy_render_pass(self.render_pass, None);
            self.surface_loader.destroy_surface(self.surface, None);
        }

        // Buffers and the device go with the remaining fields
        log::info!("Cleanup complete");
    }
}
