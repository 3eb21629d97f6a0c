/// wgpu compute backend for the color transform
///
/// This module manages all the wgpu boilerplate:
/// - Device and queue initialization
/// - RGBA16Uint surface creation, uploads and read-back
/// - Uniform buffer for transform parameters
/// - Compute pipeline state and dispatch
///
/// wgpu reports validation and out-of-memory errors through a callback;
/// they are parked in a slot and turned into `Result`s after each call.

// Use wgpu from iced to avoid dependency conflicts
use iced_wgpu::wgpu;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::renderer::{ProgramSource, Renderer, SurfaceId, SurfaceUsage};
use super::uniforms::TransformUniforms;
use crate::config::{PipelineConfig, PowerPreference};
use crate::error::{PipelineError, Result};
use crate::state::data::ImageBuffer;

/// Bytes per texel of an RGBA16Uint surface
const BYTES_PER_TEXEL: u32 = 8;
/// Alpha written on upload
const OPAQUE: u16 = u16::MAX;

const SURFACE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Uint;

struct GpuSurface {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
    usage: SurfaceUsage,
}

struct Binding {
    input: SurfaceId,
    output: SurfaceId,
    bind_group: wgpu::BindGroup,
}

/// Renderer backed by a wgpu device
pub struct WgpuRenderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_name: String,
    max_dimension: u32,
    bind_group_layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
    pipeline: Option<wgpu::ComputePipeline>,
    workgroup_size: u32,
    surfaces: HashMap<SurfaceId, GpuSurface>,
    next_id: u64,
    binding: Option<Binding>,
    error_slot: Arc<Mutex<Option<String>>>,
}

// Manual Debug implementation (wgpu types don't implement Debug)
impl std::fmt::Debug for WgpuRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuRenderer")
            .field("adapter", &self.adapter_name)
            .field("surfaces", &self.surfaces.len())
            .finish_non_exhaustive()
    }
}

impl WgpuRenderer {
    /// Request an adapter and device according to `config`
    ///
    /// # Returns
    /// * `BackendInitialization` if no adapter or device is available
    pub async fn new(config: &PipelineConfig) -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let power_preference = match config.power_preference {
            PowerPreference::HighPerformance => wgpu::PowerPreference::HighPerformance,
            PowerPreference::LowPower => wgpu::PowerPreference::LowPower,
        };

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference,
                compatible_surface: None,
                force_fallback_adapter: config.force_fallback_adapter,
            })
            .await
            .ok_or_else(|| {
                PipelineError::BackendInitialization("no suitable GPU adapter".into())
            })?;

        let info = adapter.get_info();
        log::info!(
            "GPU adapter: {} ({:?}, {:?})",
            info.name,
            info.device_type,
            info.backend
        );

        // Large RAW files exceed the default texture and buffer limits
        let adapter_limits = adapter.limits();
        let limits = wgpu::Limits {
            max_texture_dimension_2d: adapter_limits.max_texture_dimension_2d,
            max_buffer_size: adapter_limits.max_buffer_size,
            // Workgroups up to 32x32
            max_compute_invocations_per_workgroup: adapter_limits
                .max_compute_invocations_per_workgroup,
            max_compute_workgroup_size_x: adapter_limits.max_compute_workgroup_size_x,
            max_compute_workgroup_size_y: adapter_limits.max_compute_workgroup_size_y,
            ..wgpu::Limits::downlevel_defaults()
        };

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Color Pipeline Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: limits.clone(),
                },
                None,
            )
            .await
            .map_err(|e| {
                PipelineError::BackendInitialization(format!("failed to create device: {}", e))
            })?;

        let error_slot = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&error_slot);
        device.on_uncaptured_error(Box::new(move |error| {
            log::error!("wgpu error: {}", error);
            if let Ok(mut slot) = slot.lock() {
                slot.get_or_insert_with(|| error.to_string());
            }
        }));

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Transform Bind Group Layout"),
            entries: &[
                // Input surface (integer texture, read with textureLoad)
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Uint,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                // Output surface
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::StorageTexture {
                        access: wgpu::StorageTextureAccess::WriteOnly,
                        format: SURFACE_FORMAT,
                        view_dimension: wgpu::TextureViewDimension::D2,
                    },
                    count: None,
                },
                // Uniform buffer
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Transform Uniform Buffer"),
            size: std::mem::size_of::<TransformUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut renderer = Self {
            device,
            queue,
            adapter_name: info.name,
            max_dimension: limits.max_texture_dimension_2d,
            bind_group_layout,
            uniform_buffer,
            pipeline: None,
            workgroup_size: 16,
            surfaces: HashMap::new(),
            next_id: 1,
            binding: None,
            error_slot,
        };
        renderer.set_parameters(&TransformUniforms::neutral(Default::default()));
        renderer.check("device setup").map_err(|e| PipelineError::BackendInitialization(e.to_string()))?;
        Ok(renderer)
    }

    /// Take the first error wgpu reported since the last check
    fn take_error(&self) -> Option<String> {
        self.error_slot.lock().ok().and_then(|mut slot| slot.take())
    }

    fn check(&self, what: &str) -> Result<()> {
        match self.take_error() {
            Some(message) => Err(PipelineError::Readback(format!("{}: {}", what, message))),
            None => Ok(()),
        }
    }

    fn surface(&self, id: SurfaceId) -> Result<&GpuSurface> {
        self.surfaces
            .get(&id)
            .ok_or_else(|| PipelineError::InvalidInput(format!("unknown {}", id)))
    }
}

impl Renderer for WgpuRenderer {
    fn name(&self) -> &str {
        &self.adapter_name
    }

    fn compile_program(&mut self, program: &ProgramSource) -> Result<()> {
        let shader = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(program.label),
            source: wgpu::ShaderSource::Wgsl(program.wgsl.as_str().into()),
        });

        let pipeline_layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Transform Pipeline Layout"),
            bind_group_layouts: &[&self.bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = self.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(program.label),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: program.entry_point,
        });

        if let Some(message) = self.take_error() {
            return Err(PipelineError::ProgramCompilation(message));
        }

        log::info!(
            "compiled {} (workgroup {}x{})",
            program.label,
            program.workgroup_size,
            program.workgroup_size
        );
        self.pipeline = Some(pipeline);
        self.workgroup_size = program.workgroup_size.max(1);
        Ok(())
    }

    fn create_surface(&mut self, width: u32, height: u32, usage: SurfaceUsage) -> Result<SurfaceId> {
        if width > self.max_dimension || height > self.max_dimension {
            return Err(PipelineError::SurfaceAllocation {
                width,
                height,
                reason: format!("adapter limit is {} per side", self.max_dimension),
            });
        }

        let usages = match usage {
            SurfaceUsage::Input => {
                wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST
            }
            SurfaceUsage::Output => {
                wgpu::TextureUsages::STORAGE_BINDING
                    | wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_SRC
            }
        };

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(match usage {
                SurfaceUsage::Input => "Input Surface (Rgba16Uint)",
                SurfaceUsage::Output => "Output Surface (Rgba16Uint)",
            }),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: SURFACE_FORMAT,
            usage: usages,
            view_formats: &[],
        });

        if let Some(reason) = self.take_error() {
            return Err(PipelineError::SurfaceAllocation { width, height, reason });
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let id = SurfaceId(self.next_id);
        self.next_id += 1;
        self.surfaces.insert(
            id,
            GpuSurface {
                texture,
                view,
                width,
                height,
                usage,
            },
        );
        log::debug!("wgpu: created {} ({}x{}, {:?})", id, width, height, usage);
        Ok(id)
    }

    fn write_surface(&mut self, id: SurfaceId, image: &ImageBuffer) -> Result<()> {
        let surface = self.surface(id)?;
        if (surface.width, surface.height) != image.dimensions() {
            return Err(PipelineError::InvalidInput(format!(
                "{}x{} image does not fit {}x{} {}",
                image.width(),
                image.height(),
                surface.width,
                surface.height,
                id
            )));
        }

        // Pad RGB to RGBA; the GPU has no 3-channel 16-bit format
        let mut texels = Vec::with_capacity(image.data().len() / 3 * 4);
        for rgb in image.data().chunks_exact(3) {
            texels.extend_from_slice(&[rgb[0], rgb[1], rgb[2], OPAQUE]);
        }

        let size = wgpu::Extent3d {
            width: surface.width,
            height: surface.height,
            depth_or_array_layers: 1,
        };
        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &surface.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(&texels),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(BYTES_PER_TEXEL * surface.width),
                rows_per_image: Some(surface.height),
            },
            size,
        );
        log::debug!("wgpu: uploaded {} bytes to {}", texels.len() * 2, id);

        self.check("upload")
    }

    fn read_surface(&mut self, id: SurfaceId) -> Result<ImageBuffer> {
        let surface = self.surface(id)?;
        let (width, height) = (surface.width, surface.height);

        let bytes_per_row = width * BYTES_PER_TEXEL;
        let padded_bytes_per_row = (bytes_per_row + 255) & !255;
        let buffer_size = (padded_bytes_per_row as u64) * height as u64;

        let output_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Buffer"),
            size: buffer_size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Readback Encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &surface.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &output_buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(Some(encoder.finish()));

        let buffer_slice = output_buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|e| PipelineError::Readback(e.to_string()))?
            .map_err(|e| PipelineError::Readback(e.to_string()))?;

        let mut samples = Vec::with_capacity(width as usize * height as usize * 3);
        {
            let data = buffer_slice.get_mapped_range();
            for y in 0..height {
                let start = (y * padded_bytes_per_row) as usize;
                let end = start + bytes_per_row as usize;
                // Mapped rows are not guaranteed to be u16-aligned; decode bytes
                for texel in data[start..end].chunks_exact(BYTES_PER_TEXEL as usize) {
                    for c in 0..3 {
                        samples.push(u16::from_le_bytes([texel[2 * c], texel[2 * c + 1]]));
                    }
                }
            }
        }
        output_buffer.unmap();

        self.check("read-back")?;
        ImageBuffer::new(width, height, samples)
    }

    fn release_surface(&mut self, id: SurfaceId) {
        if let Some(surface) = self.surfaces.remove(&id) {
            surface.texture.destroy();
            log::debug!("wgpu: released {}", id);
        }
        if matches!(&self.binding, Some(b) if b.input == id || b.output == id) {
            self.binding = None;
        }
    }

    fn bind(&mut self, input: SurfaceId, output: SurfaceId) -> Result<()> {
        if input == output {
            return Err(PipelineError::InvalidInput(
                "transform cannot run in place".into(),
            ));
        }
        if matches!(&self.binding, Some(b) if b.input == input && b.output == output) {
            return Ok(());
        }

        let src = self.surface(input)?;
        let dst = self.surface(output)?;
        if (src.width, src.height) != (dst.width, dst.height) {
            return Err(PipelineError::InvalidInput(format!(
                "{} and {} differ in size",
                input, output
            )));
        }
        if dst.usage != SurfaceUsage::Output {
            return Err(PipelineError::InvalidInput(format!(
                "{} is not an output surface",
                output
            )));
        }

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Transform Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&src.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&dst.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: self.uniform_buffer.as_entire_binding(),
                },
            ],
        });

        self.binding = Some(Binding {
            input,
            output,
            bind_group,
        });
        Ok(())
    }

    fn set_parameters(&mut self, uniforms: &TransformUniforms) {
        self.queue
            .write_buffer(&self.uniform_buffer, 0, uniforms.as_bytes());
    }

    fn dispatch(&mut self) -> Result<()> {
        let pipeline = self
            .pipeline
            .as_ref()
            .ok_or(PipelineError::NotReady("transform program not compiled"))?;
        let binding = self
            .binding
            .as_ref()
            .ok_or(PipelineError::NotReady("no surfaces bound"))?;
        let target = self.surface(binding.output)?;

        let groups_x = target.width.div_ceil(self.workgroup_size);
        let groups_y = target.height.div_ceil(self.workgroup_size);

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Transform Encoder"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Transform Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &binding.bind_group, &[]);
            pass.dispatch_workgroups(groups_x, groups_y, 1);
        }
        self.queue.submit(Some(encoder.finish()));
        self.device.poll(wgpu::Maintain::Wait);

        self.check("dispatch")
    }
}
