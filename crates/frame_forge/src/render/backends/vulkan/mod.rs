//! Vulkan backend
//!
//! [`VulkanDevice`] implements [`GpuDevice`] on top of `ash`. Buffers are backed by
//! raw `vkAllocateMemory` allocations chosen through a memory-type search; device to
//! device copies are recorded into a one-shot command buffer and waited on before
//! returning.

mod convert;

use std::ffi::{c_char, c_void, CStr, CString};

use ash::extensions::ext::DebugUtils;
use ash::vk::{self, Handle};
use ash::{Device, Entry, Instance};
use thiserror::Error;

use crate::config::GpuCoreConfig;
use crate::render::api::{
    BufferUsage, DescriptorBindingDescription, GpuDevice, GraphicsPipelineInfo, MemoryKind, PushConstantRange,
    RenderError, RenderResult,
};

const ENTRY_POINT: &CStr = c"main";
const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Vulkan-specific failures, folded into [`RenderError`] at the API boundary
#[derive(Error, Debug)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// The Vulkan loader could not be found
    #[error("Failed to load Vulkan: {0}")]
    Loading(String),

    /// No physical device with a graphics queue
    #[error("No suitable GPU found")]
    NoSuitableDevice,

    /// No memory type satisfies the requested properties
    #[error("No suitable memory type found")]
    NoSuitableMemoryType,
}

impl VulkanError {
    fn creation(self, object: &'static str) -> RenderError {
        RenderError::creation_failed(object, self.to_string())
    }

    fn allocation(self, size: u64) -> RenderError {
        RenderError::DeviceAllocationFailure {
            size,
            reason: self.to_string(),
        }
    }
}

fn api_error(object: &'static str) -> impl FnOnce(vk::Result) -> RenderError {
    move |result| {
        log::error!("[VULKAN] Failed to create {}: {:?}", object, result);
        VulkanError::Api(result).creation(object)
    }
}

/// Buffer plus dedicated device memory
#[derive(Debug)]
pub struct VulkanAllocation {
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: u64,
    memory_kind: MemoryKind,
}

impl VulkanAllocation {
    /// Buffer handle for binding
    pub const fn buffer(&self) -> vk::Buffer {
        self.buffer
    }

    /// Size in bytes
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Memory placement
    pub const fn memory_kind(&self) -> MemoryKind {
        self.memory_kind
    }
}

struct DebugMessenger {
    loader: DebugUtils,
    messenger: vk::DebugUtilsMessengerEXT,
}

/// Instance and device created by [`VulkanDevice::new`]
struct OwnedHandles {
    _entry: Entry,
    debug: Option<DebugMessenger>,
}

/// Vulkan implementation of [`GpuDevice`]
pub struct VulkanDevice {
    instance: Instance,
    device: Device,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    queue: vk::Queue,
    command_pool: vk::CommandPool,
    owned: Option<OwnedHandles>,
}

impl VulkanDevice {
    /// Create an instance and a logical device with a single graphics queue
    ///
    /// No surface is created; presentation belongs to the windowing layer.
    pub fn new(config: &GpuCoreConfig) -> RenderResult<Self> {
        let entry = unsafe { Entry::load() }
            .map_err(|e| VulkanError::Loading(e.to_string()).creation("instance"))?;

        let app_name = CString::new(config.application_name.as_str())
            .map_err(|e| RenderError::invalid_usage(format!("application name: {e}")))?;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(c"frame_forge")
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        let validation = config.validation_enabled();
        let layers: Vec<*const c_char> = if validation { vec![VALIDATION_LAYER.as_ptr()] } else { Vec::new() };
        let extensions: Vec<*const c_char> = if validation { vec![DebugUtils::name().as_ptr()] } else { Vec::new() };

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_layer_names(&layers)
            .enabled_extension_names(&extensions);
        let instance = unsafe { entry.create_instance(&create_info, None) }.map_err(api_error("instance"))?;

        let debug = if validation {
            match create_debug_messenger(&entry, &instance) {
                Ok(debug) => Some(debug),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            None
        };
        let owned = OwnedHandles { _entry: entry, debug };

        match Self::create_device(&instance) {
            Ok((physical_device, device, queue_family)) => {
                Self::from_parts(instance, physical_device, device, queue_family, Some(owned))
            }
            Err(e) => {
                destroy_instance(&instance, owned);
                Err(e)
            }
        }
    }

    /// Wrap externally created Vulkan objects
    ///
    /// The instance and device stay owned by the caller and must outlive this value;
    /// only the internal command pool is destroyed on drop.
    pub fn from_raw(
        instance: Instance,
        physical_device: vk::PhysicalDevice,
        device: Device,
        queue_family: u32,
    ) -> RenderResult<Self> {
        Self::from_parts(instance, physical_device, device, queue_family, None)
    }

    fn create_device(instance: &Instance) -> RenderResult<(vk::PhysicalDevice, Device, u32)> {
        let physical_devices =
            unsafe { instance.enumerate_physical_devices() }.map_err(api_error("physical device list"))?;

        let (physical_device, queue_family) = physical_devices
            .into_iter()
            .find_map(|physical_device| {
                let families = unsafe { instance.get_physical_device_queue_family_properties(physical_device) };
                (0u32..)
                    .zip(families.iter())
                    .find(|(_, family)| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))
                    .map(|(index, _)| (physical_device, index))
            })
            .ok_or_else(|| VulkanError::NoSuitableDevice.creation("logical device"))?;

        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        log::info!("[VULKAN] Selected GPU: {}", unsafe {
            CStr::from_ptr(properties.device_name.as_ptr()).to_string_lossy()
        });

        let priorities = [1.0];
        let queue_info = vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(queue_family)
            .queue_priorities(&priorities)
            .build();
        let create_info = vk::DeviceCreateInfo::builder().queue_create_infos(std::slice::from_ref(&queue_info));
        let device = unsafe { instance.create_device(physical_device, &create_info, None) }
            .map_err(api_error("logical device"))?;

        Ok((physical_device, device, queue_family))
    }

    fn from_parts(
        instance: Instance,
        physical_device: vk::PhysicalDevice,
        device: Device,
        queue_family: u32,
        owned: Option<OwnedHandles>,
    ) -> RenderResult<Self> {
        let memory_properties = unsafe { instance.get_physical_device_memory_properties(physical_device) };
        let queue = unsafe { device.get_device_queue(queue_family, 0) };

        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(queue_family)
            .flags(vk::CommandPoolCreateFlags::TRANSIENT);
        let command_pool = match unsafe { device.create_command_pool(&pool_info, None) } {
            Ok(pool) => pool,
            Err(result) => {
                if let Some(owned) = owned {
                    unsafe { device.destroy_device(None) };
                    destroy_instance(&instance, owned);
                }
                return Err(api_error("command pool")(result));
            }
        };

        log::debug!("[VULKAN] Device ready, queue family {}", queue_family);
        Ok(Self {
            instance,
            device,
            memory_properties,
            queue,
            command_pool,
            owned,
        })
    }

    /// Logical device
    pub const fn device(&self) -> &Device {
        &self.device
    }

    /// Instance
    pub const fn instance(&self) -> &Instance {
        &self.instance
    }

    fn find_memory_type(&self, type_filter: u32, properties: vk::MemoryPropertyFlags) -> Result<u32, VulkanError> {
        let props = &self.memory_properties;
        (0..props.memory_type_count)
            .find(|&i| {
                (type_filter & (1 << i)) != 0 && props.memory_types[i as usize].property_flags.contains(properties)
            })
            .ok_or(VulkanError::NoSuitableMemoryType)
    }

    /// Record `record` into a one-shot command buffer, submit it and wait for completion
    fn submit_one_shot(&self, record: impl FnOnce(vk::CommandBuffer)) -> RenderResult<()> {
        let allocate_info = vk::CommandBufferAllocateInfo::builder()
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_pool(self.command_pool)
            .command_buffer_count(1);
        let command_buffer = unsafe { self.device.allocate_command_buffers(&allocate_info) }
            .map_err(api_error("command buffer"))?
            .into_iter()
            .next()
            .ok_or_else(|| RenderError::creation_failed("command buffer", "driver returned no buffers"))?;

        let result = unsafe {
            let begin_info =
                vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            self.device
                .begin_command_buffer(command_buffer, &begin_info)
                .and_then(|()| {
                    record(command_buffer);
                    self.device.end_command_buffer(command_buffer)
                })
                .and_then(|()| {
                    let command_buffers = [command_buffer];
                    let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers).build();
                    self.device.queue_submit(self.queue, &[submit_info], vk::Fence::null())
                })
                .and_then(|()| self.device.queue_wait_idle(self.queue))
        };

        unsafe { self.device.free_command_buffers(self.command_pool, &[command_buffer]) };
        result.map_err(api_error("one-shot submission"))
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                log::error!("[VULKAN] Wait idle failed during drop: {:?}", e);
            }
            self.device.destroy_command_pool(self.command_pool, None);
        }
        if let Some(owned) = self.owned.take() {
            unsafe { self.device.destroy_device(None) };
            destroy_instance(&self.instance, owned);
        }
    }
}

fn destroy_instance(instance: &Instance, owned: OwnedHandles) {
    unsafe {
        if let Some(debug) = owned.debug {
            debug.loader.destroy_debug_utils_messenger(debug.messenger, None);
        }
        instance.destroy_instance(None);
    }
}

fn create_debug_messenger(entry: &Entry, instance: &Instance) -> RenderResult<DebugMessenger> {
    let loader = DebugUtils::new(entry, instance);
    let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::WARNING | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback));
    let messenger = unsafe { loader.create_debug_utils_messenger(&create_info, None) }
        .map_err(api_error("debug messenger"))?;
    Ok(DebugMessenger { loader, messenger })
}

unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    let message = CStr::from_ptr((*callback_data).p_message).to_string_lossy();
    if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::ERROR {
        log::error!("[VULKAN] {:?} - {}", message_type, message);
    } else {
        log::warn!("[VULKAN] {:?} - {}", message_type, message);
    }
    vk::FALSE
}

impl GpuDevice for VulkanDevice {
    type Allocation = VulkanAllocation;
    type DescriptorSetLayout = vk::DescriptorSetLayout;
    type PipelineLayout = vk::PipelineLayout;
    type Pipeline = vk::Pipeline;
    type ShaderModule = vk::ShaderModule;

    fn allocate(&self, size: u64, memory: MemoryKind, usage: BufferUsage) -> RenderResult<VulkanAllocation> {
        if size == 0 {
            return Err(RenderError::invalid_usage("zero-sized buffer allocation"));
        }
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(convert::buffer_usage(usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe { self.device.create_buffer(&buffer_info, None) }
            .map_err(|e| VulkanError::Api(e).allocation(size))?;

        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };
        let memory_result = self
            .find_memory_type(requirements.memory_type_bits, convert::memory_properties(memory))
            .and_then(|memory_type_index| {
                let alloc_info = vk::MemoryAllocateInfo::builder()
                    .allocation_size(requirements.size)
                    .memory_type_index(memory_type_index);
                unsafe { self.device.allocate_memory(&alloc_info, None) }.map_err(VulkanError::Api)
            })
            .and_then(|device_memory| {
                match unsafe { self.device.bind_buffer_memory(buffer, device_memory, 0) } {
                    Ok(()) => Ok(device_memory),
                    Err(e) => {
                        unsafe { self.device.free_memory(device_memory, None) };
                        Err(VulkanError::Api(e))
                    }
                }
            });

        match memory_result {
            Ok(device_memory) => {
                log::trace!("[VULKAN] Allocated {} byte {:?} buffer", size, memory);
                Ok(VulkanAllocation {
                    buffer,
                    memory: device_memory,
                    size,
                    memory_kind: memory,
                })
            }
            Err(e) => {
                unsafe { self.device.destroy_buffer(buffer, None) };
                log::error!("[VULKAN] Allocation of {} bytes failed: {}", size, e);
                Err(e.allocation(size))
            }
        }
    }

    fn free(&self, allocation: VulkanAllocation) {
        unsafe {
            self.device.destroy_buffer(allocation.buffer, None);
            self.device.free_memory(allocation.memory, None);
        }
    }

    fn map<'a>(&self, allocation: &'a mut VulkanAllocation) -> RenderResult<&'a mut [u8]> {
        if allocation.memory_kind != MemoryKind::HostVisible {
            return Err(RenderError::invalid_usage("cannot map device-local memory"));
        }
        let len = usize::try_from(allocation.size)
            .map_err(|_| RenderError::invalid_usage("mapping exceeds host address space"))?;
        let ptr = unsafe {
            self.device
                .map_memory(allocation.memory, 0, allocation.size, vk::MemoryMapFlags::empty())
        }
        .map_err(api_error("memory mapping"))?;
        // The mapping stays valid until unmap, which needs the same exclusive borrow.
        Ok(unsafe { std::slice::from_raw_parts_mut(ptr.cast::<u8>(), len) })
    }

    fn unmap(&self, allocation: &mut VulkanAllocation) {
        unsafe { self.device.unmap_memory(allocation.memory) };
    }

    fn flush(&self, allocation: &VulkanAllocation) -> RenderResult<()> {
        let range = vk::MappedMemoryRange::builder()
            .memory(allocation.memory)
            .offset(0)
            .size(vk::WHOLE_SIZE)
            .build();
        unsafe { self.device.flush_mapped_memory_ranges(&[range]) }.map_err(api_error("memory flush"))
    }

    fn copy_device_to_device(&self, src: &VulkanAllocation, dst: &mut VulkanAllocation, size: u64) -> RenderResult<()> {
        if size > src.size || size > dst.size {
            return Err(RenderError::invalid_usage("device copy exceeds allocation size"));
        }
        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size,
        };
        self.submit_one_shot(|command_buffer| unsafe {
            self.device
                .cmd_copy_buffer(command_buffer, src.buffer, dst.buffer, &[region]);
        })
    }

    fn create_descriptor_set_layout(
        &self,
        bindings: &[DescriptorBindingDescription],
    ) -> RenderResult<vk::DescriptorSetLayout> {
        let bindings: Vec<vk::DescriptorSetLayoutBinding> = bindings.iter().map(convert::set_layout_binding).collect();
        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);
        unsafe { self.device.create_descriptor_set_layout(&layout_info, None) }
            .map_err(api_error("descriptor set layout"))
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        unsafe { self.device.destroy_descriptor_set_layout(layout, None) };
    }

    fn create_pipeline_layout(
        &self,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constants: &[PushConstantRange],
    ) -> RenderResult<vk::PipelineLayout> {
        let ranges: Vec<vk::PushConstantRange> = push_constants.iter().map(convert::push_constant_range).collect();
        let layout_info = vk::PipelineLayoutCreateInfo::builder()
            .set_layouts(set_layouts)
            .push_constant_ranges(&ranges);
        unsafe { self.device.create_pipeline_layout(&layout_info, None) }.map_err(api_error("pipeline layout"))
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        unsafe { self.device.destroy_pipeline_layout(layout, None) };
    }

    fn create_shader_module(&self, bytecode: &[u8]) -> RenderResult<vk::ShaderModule> {
        let code = ash::util::read_spv(&mut std::io::Cursor::new(bytecode))
            .map_err(|e| RenderError::creation_failed("shader module", format!("invalid SPIR-V: {e}")))?;
        let create_info = vk::ShaderModuleCreateInfo::builder().code(&code);
        unsafe { self.device.create_shader_module(&create_info, None) }.map_err(api_error("shader module"))
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        unsafe { self.device.destroy_shader_module(module, None) };
    }

    fn create_graphics_pipeline(&self, info: &GraphicsPipelineInfo<'_, Self>) -> RenderResult<vk::Pipeline> {
        let state = info.fixed_function;

        let stages: Vec<vk::PipelineShaderStageCreateInfo> = info
            .stages
            .iter()
            .map(|(stage, module)| {
                vk::PipelineShaderStageCreateInfo::builder()
                    .stage(convert::shader_stage(*stage))
                    .module(*module)
                    .name(ENTRY_POINT)
                    .build()
            })
            .collect();

        let bindings: Vec<_> = info.vertex_input.bindings.iter().map(convert::vertex_binding).collect();
        let attributes: Vec<_> = info.vertex_input.attributes.iter().map(convert::vertex_attribute).collect();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(convert::topology(state.topology))
            .primitive_restart_enable(false);

        let viewports = [convert::viewport(&state.viewport)];
        let scissors = [convert::scissor(&state.scissor)];
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewports(&viewports)
            .scissors(&scissors);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(convert::polygon_mode(state.rasterization.polygon_mode))
            .line_width(state.rasterization.line_width)
            .cull_mode(convert::cull_mode(state.rasterization.cull_mode))
            .front_face(convert::front_face(state.rasterization.front_face))
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(state.depth_stencil.depth_test_enable)
            .depth_write_enable(state.depth_stencil.depth_write_enable)
            .depth_compare_op(convert::compare_op(state.depth_stencil.compare_op))
            .depth_bounds_test_enable(false)
            .min_depth_bounds(state.depth_stencil.min_depth_bounds)
            .max_depth_bounds(state.depth_stencil.max_depth_bounds)
            .stencil_test_enable(false);

        let attachments: Vec<_> = state.color_blend.iter().map(convert::color_blend_attachment).collect();
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&attachments);

        let dynamic_states: Vec<_> = state.dynamic_states.iter().copied().map(convert::dynamic_state).collect();
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(info.layout)
            .render_pass(vk::RenderPass::from_raw(info.render_pass.0))
            .subpass(info.subpass)
            .build();

        let pipelines = unsafe {
            self.device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        }
        .map_err(|(_, result)| api_error("graphics pipeline")(result))?;
        pipelines
            .into_iter()
            .next()
            .ok_or_else(|| RenderError::creation_failed("graphics pipeline", "driver returned no pipeline"))
    }

    fn create_compute_pipeline(&self, layout: vk::PipelineLayout, module: vk::ShaderModule) -> RenderResult<vk::Pipeline> {
        let stage = vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::COMPUTE)
            .module(module)
            .name(ENTRY_POINT)
            .build();
        let pipeline_info = vk::ComputePipelineCreateInfo::builder().stage(stage).layout(layout).build();

        let pipelines = unsafe {
            self.device
                .create_compute_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        }
        .map_err(|(_, result)| api_error("compute pipeline")(result))?;
        pipelines
            .into_iter()
            .next()
            .ok_or_else(|| RenderError::creation_failed("compute pipeline", "driver returned no pipeline"))
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe { self.device.destroy_pipeline(pipeline, None) };
    }

    fn wait_idle(&self) -> RenderResult<()> {
        unsafe { self.device.device_wait_idle() }.map_err(api_error("device idle wait"))
    }
}
