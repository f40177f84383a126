// Buffers and images backed by gpu-allocator
//
// The vertex and transform buffers live in host-visible, host-coherent memory
// that stays mapped for the lifetime of the buffer. They are only written
// after the frame fence wait, when the GPU is guaranteed to be done with them.

use anyhow::{Context, Result};
use ash::vk;
use glam::Vec4;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use std::sync::Arc;

use super::VulkanDevice;
use crate::frame::RecordError;
use crate::scene::{Vertex, MAX_QUADS, VERTICES_PER_QUAD};

pub const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

/// Bytes needed to hold `max_quads` triangulated quads
pub fn vertex_buffer_size(max_quads: usize) -> vk::DeviceSize {
    (max_quads * VERTICES_PER_QUAD * std::mem::size_of::<Vertex>()) as vk::DeviceSize
}

/// Bytes of the shader's transform block (vec4 offsets[MAX_QUADS])
pub fn transform_buffer_size() -> vk::DeviceSize {
    (MAX_QUADS * std::mem::size_of::<Vec4>()) as vk::DeviceSize
}

/// A buffer with persistently mapped host-visible memory
pub struct MappedBuffer {
    pub buffer: vk::Buffer,
    allocation: Option<Allocation>,
    size: usize,
    name: &'static str,
    device: Arc<VulkanDevice>,
}

impl MappedBuffer {
    pub fn new(
        device: Arc<VulkanDevice>,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        name: &'static str,
    ) -> Result<Self> {
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe {
            device
                .device
                .create_buffer(&buffer_info, None)
                .with_context(|| format!("Failed to create {} buffer", name))?
        };

        let requirements = unsafe { device.device.get_buffer_memory_requirements(buffer) };

        let allocation = device.allocator.lock().allocate(&AllocationCreateDesc {
            name,
            requirements,
            location: MemoryLocation::CpuToGpu,
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        });

        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.device.destroy_buffer(buffer, None) };
                return Err(e).with_context(|| format!("Failed to allocate {} memory", name));
            }
        };

        // From here on Drop cleans up
        let mapped = Self {
            buffer,
            allocation: Some(allocation),
            size: size as usize,
            name,
            device,
        };

        let allocation = mapped.allocation.as_ref().context("allocation missing")?;
        unsafe {
            mapped
                .device
                .device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
                .with_context(|| format!("Failed to bind {} memory", name))?;
        }

        if allocation.mapped_ptr().is_none() {
            anyhow::bail!("{} memory is not host visible", name);
        }

        log::debug!("Created mapped {} buffer ({} bytes)", name, size);
        Ok(mapped)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Copy `bytes` to the start of the buffer. Caller checks the size.
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), RecordError> {
        debug_assert!(bytes.len() <= self.size);
        let mapped = self.allocation.as_mut().and_then(|a| a.mapped_slice_mut());
        copy_to_mapped(mapped, bytes, self.name)
    }
}

fn copy_to_mapped(
    mapped: Option<&mut [u8]>,
    bytes: &[u8],
    name: &'static str,
) -> Result<(), RecordError> {
    let slice = mapped.ok_or(RecordError::Unmapped(name))?;
    let needed = bytes.len();
    let capacity = slice.len();
    let dst = slice.get_mut(..needed).ok_or(RecordError::GeometryOverflow {
        needed,
        capacity,
    })?;
    dst.copy_from_slice(bytes);
    Ok(())
}

impl Drop for MappedBuffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            if let Err(e) = self.device.allocator.lock().free(allocation) {
                log::warn!("Failed to free buffer memory: {}", e);
            }
        }
        unsafe { self.device.device.destroy_buffer(self.buffer, None) };
    }
}

/// Geometry Upload Buffer - the vertex stream drawn every frame
pub struct GeometryBuffer {
    inner: MappedBuffer,
    capacity: usize,
}

impl GeometryBuffer {
    pub fn new(device: Arc<VulkanDevice>, max_quads: usize) -> Result<Self> {
        let inner = MappedBuffer::new(
            device,
            vertex_buffer_size(max_quads),
            vk::BufferUsageFlags::VERTEX_BUFFER,
            "geometry",
        )?;
        Ok(Self {
            inner,
            capacity: max_quads * VERTICES_PER_QUAD,
        })
    }

    pub fn buffer(&self) -> vk::Buffer {
        self.inner.buffer
    }

    pub fn write(&mut self, vertices: &[Vertex]) -> Result<(), RecordError> {
        if vertices.len() > self.capacity {
            return Err(RecordError::GeometryOverflow {
                needed: vertices.len(),
                capacity: self.capacity,
            });
        }
        self.inner.write_bytes(bytemuck::cast_slice(vertices))
    }
}

/// Uniform buffer with one translation per quad
pub struct TransformBuffer {
    inner: MappedBuffer,
    capacity: usize,
}

impl TransformBuffer {
    pub fn new(device: Arc<VulkanDevice>, max_quads: usize) -> Result<Self> {
        let inner = MappedBuffer::new(
            device,
            transform_buffer_size(),
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            "transform",
        )?;
        Ok(Self {
            inner,
            capacity: max_quads.min(MAX_QUADS),
        })
    }

    pub fn buffer(&self) -> vk::Buffer {
        self.inner.buffer
    }

    pub fn range(&self) -> vk::DeviceSize {
        self.inner.size() as vk::DeviceSize
    }

    pub fn write(&mut self, offsets: &[Vec4]) -> Result<(), RecordError> {
        if offsets.len() > self.capacity {
            return Err(RecordError::TooManyQuads {
                needed: offsets.len(),
                capacity: self.capacity,
            });
        }
        self.inner.write_bytes(bytemuck::cast_slice(offsets))
    }
}

/// Depth attachment image + view
pub struct DepthBuffer {
    pub image: vk::Image,
    pub view: vk::ImageView,
    allocation: Option<Allocation>,
    device: Arc<VulkanDevice>,
}

impl DepthBuffer {
    pub fn new(device: Arc<VulkanDevice>, extent: vk::Extent2D) -> Result<Self> {
        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(DEPTH_FORMAT)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
            .samples(vk::SampleCountFlags::TYPE_1)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let image = unsafe {
            device
                .device
                .create_image(&image_info, None)
                .context("Failed to create depth image")?
        };

        let requirements = unsafe { device.device.get_image_memory_requirements(image) };

        let allocation = device.allocator.lock().allocate(&AllocationCreateDesc {
            name: "depth",
            requirements,
            location: MemoryLocation::GpuOnly,
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        });

        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.device.destroy_image(image, None) };
                return Err(e).context("Failed to allocate depth image memory");
            }
        };

        let mut depth = Self {
            image,
            view: vk::ImageView::null(),
            allocation: Some(allocation),
            device,
        };

        let allocation = depth.allocation.as_ref().context("allocation missing")?;
        unsafe {
            depth
                .device
                .device
                .bind_image_memory(image, allocation.memory(), allocation.offset())
                .context("Failed to bind depth image memory")?;
        }

        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(DEPTH_FORMAT)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::DEPTH,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        depth.view = unsafe {
            depth
                .device
                .device
                .create_image_view(&view_info, None)
                .context("Failed to create depth image view")?
        };

        Ok(depth)
    }
}

impl Drop for DepthBuffer {
    fn drop(&mut self) {
        unsafe {
            if self.view != vk::ImageView::null() {
                self.device.device.destroy_image_view(self.view, None);
            }
        }
        if let Some(allocation) = self.allocation.take() {
            if let Err(e) = self.device.allocator.lock().free(allocation) {
                log::warn!("Failed to free depth image memory: {}", e);
            }
        }
        unsafe { self.device.device.destroy_image(self.image, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_sizes() {
        // 6 vertices * 24 bytes per quad
        assert_eq!(vertex_buffer_size(1), 144);
        assert_eq!(vertex_buffer_size(64), 64 * 144);
        // std140 vec4 array
        assert_eq!(transform_buffer_size(), (MAX_QUADS * 16) as vk::DeviceSize);
    }

    #[test]
    fn test_unmapped_write_is_an_error() {
        let result = copy_to_mapped(None, &[1, 2, 3], "geometry");
        assert!(matches!(result, Err(RecordError::Unmapped("geometry"))));
    }

    #[test]
    fn test_mapped_write_copies_prefix() {
        let mut memory = [0u8; 8];
        copy_to_mapped(Some(&mut memory), &[7, 8, 9], "transform").unwrap();
        assert_eq!(memory, [7, 8, 9, 0, 0, 0, 0, 0]);

        let mut small = [0u8; 2];
        assert!(copy_to_mapped(Some(&mut small), &[1, 2, 3], "transform").is_err());
    }
}
