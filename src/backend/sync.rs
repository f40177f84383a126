// Synchronization primitives
//
// One fence and two semaphores: a single frame in flight.
// - frame_fence:     GPU -> CPU, signaled when the submitted frame finishes
// - image_acquired:  acquire -> submit (waited at COLOR_ATTACHMENT_OUTPUT)
// - render_complete: submit -> present

use anyhow::{Context, Result};
use ash::prelude::VkResult;
use ash::vk;

pub struct FrameSync {
    pub image_acquired: vk::Semaphore,
    pub render_complete: vk::Semaphore,
    pub frame_fence: vk::Fence,
}

impl FrameSync {
    pub fn new(device: &ash::Device) -> Result<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        // Start signaled so the very first wait returns immediately
        let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);

        unsafe {
            Ok(Self {
                image_acquired: device
                    .create_semaphore(&semaphore_info, None)
                    .context("Failed to create image-acquired semaphore")?,
                render_complete: device
                    .create_semaphore(&semaphore_info, None)
                    .context("Failed to create render-complete semaphore")?,
                frame_fence: device
                    .create_fence(&fence_info, None)
                    .context("Failed to create frame fence")?,
            })
        }
    }

    pub fn wait(&self, device: &ash::Device, timeout_ns: u64) -> VkResult<()> {
        unsafe { device.wait_for_fences(&[self.frame_fence], true, timeout_ns) }
    }

    pub fn reset(&self, device: &ash::Device) -> VkResult<()> {
        unsafe { device.reset_fences(&[self.frame_fence]) }
    }

    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_semaphore(self.image_acquired, None);
            device.destroy_semaphore(self.render_complete, None);
            device.destroy_fence(self.frame_fence, None);
        }
    }
}
