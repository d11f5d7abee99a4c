use std::{borrow::Cow, mem::size_of};

use futures::executor::block_on;
use glam::Vec4;
use half::f16;
use log::{debug, info};
use wgpu::{util::DeviceExt, Origin3d, TextureDescriptor, TextureFormat, TextureUsages};

use super::{RenderBackend, Source};
use crate::{
    cube::{CubeFace, CUBE_VERTICES},
    error::{IblError, Result},
    mip::nominal_resolution,
    program::{Program, ProgramKind, UNIFORM_SLOTS},
    radiance::RadianceImage,
};

const CUBEMAP_FORMAT: TextureFormat = TextureFormat::Rgba16Float;
const BYTES_PER_TEXEL: u32 = 4 * size_of::<f16>() as u32;
const WORKGROUP_SIZE: u32 = 8;

pub struct GpuProgram {
    pipeline: wgpu::ComputePipeline,
    uniforms: wgpu::Buffer,
}

pub struct GpuPanorama {
    view: wgpu::TextureView,
}

pub struct GpuCubemap {
    label: String,
    texture: wgpu::Texture,
    resolution: u32,
    mip_levels: u32,
}

impl GpuCubemap {
    fn face_view(&self, face: CubeFace, mip: u32) -> wgpu::TextureView {
        self.texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(self.label.as_str()),
            dimension: Some(wgpu::TextureViewDimension::D2),
            base_mip_level: mip,
            mip_level_count: Some(1),
            base_array_layer: face.index() as u32,
            array_layer_count: Some(1),
            ..wgpu::TextureViewDescriptor::default()
        })
    }

    fn cube_view(&self) -> wgpu::TextureView {
        self.texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(self.label.as_str()),
            dimension: Some(wgpu::TextureViewDimension::Cube),
            ..wgpu::TextureViewDescriptor::default()
        })
    }
}

/// Runs the bake programs as compute shaders through wgpu.
pub struct GpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    panorama_sampler: wgpu::Sampler,
    cubemap_sampler: wgpu::Sampler,
    cube_mesh: wgpu::Buffer,
    downsample: Option<Program<GpuProgram>>,
}

impl GpuBackend {
    pub async fn new() -> Result<GpuBackend> {
        // Instantiates instance of WebGPU
        let instance = wgpu::Instance::default();

        // `request_adapter` instantiates the general connection to the GPU
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions::default())
            .await
            .ok_or_else(|| IblError::BackendInit("no suitable adapter found".into()))?;
        info!("Using adapter {}", adapter.get_info().name);

        // `request_device` instantiates the feature specific connection to the GPU
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: None,
                    features: wgpu::Features::empty(),
                    limits: adapter.limits(),
                },
                None,
            )
            .await
            .map_err(|err| IblError::BackendInit(err.to_string()))?;
        debug!("Max texture dimension {}", device.limits().max_texture_dimension_2d);

        let panorama_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Panorama Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..wgpu::SamplerDescriptor::default()
        });
        let cubemap_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Cubemap Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..wgpu::SamplerDescriptor::default()
        });

        // Only the directions are uploaded, the positions are implied by the
        // compute grid covering the face.
        let directions: Vec<Vec4> = CUBE_VERTICES.iter().map(|v| v.direction.extend(0.)).collect();
        let cube_mesh = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Cube Mesh Directions"),
            contents: bytemuck::cast_slice(&directions),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let mut backend = GpuBackend {
            device,
            queue,
            panorama_sampler,
            cubemap_sampler,
            cube_mesh,
            downsample: None,
        };
        backend.downsample = Some(backend.link_program(ProgramKind::Downsample)?);
        Ok(backend)
    }

    /// Runs `f` and turns any validation error it raised into a backend error.
    fn validated<T>(&self, what: &str, f: impl FnOnce(&Self) -> T) -> Result<T> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f(self);
        match block_on(self.device.pop_error_scope()) {
            Some(err) => Err(IblError::Backend(format!("{what}: {err}"))),
            None => Ok(value),
        }
    }

    fn dispatch(&self, label: &str, program: &GpuProgram, bind_group: &wgpu::BindGroup, size: u32) {
        // A command encoder executes one or many pipelines.
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) });
        {
            let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(label),
            });
            cpass.set_pipeline(&program.pipeline);
            cpass.set_bind_group(0, bind_group, &[]);
            cpass.insert_debug_marker(label);
            let groups = size.div_ceil(WORKGROUP_SIZE);
            cpass.dispatch_workgroups(groups, groups, 1);
        }
        self.queue.submit(Some(encoder.finish()));
        // Each pass finishes before the next one starts
        self.device.poll(wgpu::Maintain::Wait);
    }
}

impl RenderBackend for GpuBackend {
    type Panorama = GpuPanorama;
    type Cubemap = GpuCubemap;
    type ProgramHandle = GpuProgram;

    fn link_program(&mut self, kind: ProgramKind) -> Result<Program<GpuProgram>> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        // Loads the shader from WGSL
        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(kind.name()),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(kind.source())),
        });

        // The layout is derived from the bindings the shader declares
        let pipeline = self.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(kind.name()),
            layout: None,
            module: &module,
            entry_point: "main",
        });

        if let Some(err) = block_on(self.device.pop_error_scope()) {
            return Err(IblError::ProgramLink {
                program: kind.name(),
                message: err.to_string(),
            });
        }

        let uniforms = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(kind.name()),
            size: (UNIFORM_SLOTS * size_of::<f32>()) as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        debug!("Linked program {}", kind.name());
        Ok(Program::new(kind, GpuProgram { pipeline, uniforms }))
    }

    fn upload_panorama(&mut self, image: &RadianceImage) -> Result<GpuPanorama> {
        let max = self.device.limits().max_texture_dimension_2d;
        if image.width() > max || image.height() > max {
            return Err(IblError::Backend(format!(
                "panorama of {}x{} exceeds the adapter's {max} texel limit",
                image.width(),
                image.height()
            )));
        }

        let texels: Vec<f16> = image
            .samples()
            .chunks(3)
            .flat_map(|c| [c[0], c[1], c[2], 1.])
            .map(f16::from_f32)
            .collect();

        let texture = self.validated("uploading panorama", |gpu| {
            gpu.device.create_texture_with_data(
                &gpu.queue,
                &TextureDescriptor {
                    label: Some("Panorama"),
                    size: wgpu::Extent3d {
                        width: image.width(),
                        height: image.height(),
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: CUBEMAP_FORMAT,
                    usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
                    view_formats: &[],
                },
                bytemuck::cast_slice(&texels),
            )
        })?;

        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("Panorama"),
            dimension: Some(wgpu::TextureViewDimension::D2),
            ..wgpu::TextureViewDescriptor::default()
        });
        Ok(GpuPanorama { view })
    }

    fn create_cubemap(&mut self, label: &str, resolution: u32, mip_levels: u32) -> Result<GpuCubemap> {
        let texture = self.validated(label, |gpu| {
            gpu.device.create_texture(&TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width: resolution,
                    height: resolution,
                    depth_or_array_layers: 6,
                },
                mip_level_count: mip_levels,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: CUBEMAP_FORMAT,
                usage: TextureUsages::STORAGE_BINDING
                    | TextureUsages::TEXTURE_BINDING
                    | TextureUsages::COPY_SRC,
                view_formats: &[],
            })
        })?;
        Ok(GpuCubemap {
            label: label.to_owned(),
            texture,
            resolution,
            mip_levels,
        })
    }

    fn render_face(
        &mut self,
        program: &mut Program<GpuProgram>,
        source: Source<'_, Self>,
        target: &mut GpuCubemap,
        face: CubeFace,
        mip: u32,
    ) -> Result<()> {
        if mip >= target.mip_levels {
            return Err(IblError::Backend(format!("{} has no mip {mip}", target.label)));
        }
        program.set_uint("face", face.index() as u32)?;
        self.queue
            .write_buffer(&program.handle().uniforms, 0, bytemuck::cast_slice(&program.values()[..]));

        let kind = program.kind();
        let target_view = target.face_view(face, mip);
        let environment_view;
        let (source_view, sampler) = match (kind, source) {
            (ProgramKind::EquirectangularToCubemap, Source::Panorama(panorama)) => {
                (&panorama.view, &self.panorama_sampler)
            }
            (ProgramKind::Irradiance | ProgramKind::Prefilter, Source::Cubemap(environment)) => {
                environment_view = environment.cube_view();
                (&environment_view, &self.cubemap_sampler)
            }
            (kind, _) => {
                return Err(IblError::Backend(format!(
                    "program {} can't render from this source",
                    kind.name()
                )))
            }
        };

        let label = format!("{} {} {:?} mip {}", kind.name(), target.label, face, mip);
        debug!("Rendering {}", label);
        self.validated(&label, |gpu| {
            let handle = program.handle();
            // A bind group defines how buffers are accessed by shaders.
            let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label.as_str()),
                layout: &handle.pipeline.get_bind_group_layout(0),
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: handle.uniforms.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: gpu.cube_mesh.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::TextureView(source_view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: wgpu::BindingResource::Sampler(sampler),
                    },
                    wgpu::BindGroupEntry {
                        binding: 4,
                        resource: wgpu::BindingResource::TextureView(&target_view),
                    },
                ],
            });
            gpu.dispatch(&label, handle, &bind_group, nominal_resolution(target.resolution, mip));
        })
    }

    fn generate_mipmaps(&mut self, cubemap: &mut GpuCubemap) -> Result<()> {
        let Some(downsample) = self.downsample.as_ref() else {
            return Err(IblError::Backend("downsample program isn't linked".into()));
        };
        let handle = downsample.handle();

        for mip in 1..cubemap.mip_levels {
            for face in CubeFace::ALL {
                let label = format!("downsample {} {:?} mip {}", cubemap.label, face, mip);
                let source_view = cubemap.face_view(face, mip - 1);
                let target_view = cubemap.face_view(face, mip);
                self.validated(&label, |gpu| {
                    let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
                        label: Some(label.as_str()),
                        layout: &handle.pipeline.get_bind_group_layout(0),
                        entries: &[
                            wgpu::BindGroupEntry {
                                binding: 0,
                                resource: wgpu::BindingResource::TextureView(&source_view),
                            },
                            wgpu::BindGroupEntry {
                                binding: 1,
                                resource: wgpu::BindingResource::TextureView(&target_view),
                            },
                        ],
                    });
                    gpu.dispatch(&label, handle, &bind_group, nominal_resolution(cubemap.resolution, mip));
                })?;
            }
        }
        Ok(())
    }

    fn read_pixels(&mut self, cubemap: &GpuCubemap, face: CubeFace, mip: u32) -> Result<Vec<f16>> {
        let size = nominal_resolution(cubemap.resolution, mip);
        let unpadded_bytes_per_row = size * BYTES_PER_TEXEL;
        let padded_bytes_per_row = unpadded_bytes_per_row.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
            * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

        let staging_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback"),
            size: padded_bytes_per_row as u64 * size as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
        // Will copy data from the face on GPU to staging buffer on CPU.
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &cubemap.texture,
                mip_level: mip,
                origin: Origin3d {
                    x: 0,
                    y: 0,
                    z: face.index() as u32,
                },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &staging_buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(size),
                },
            },
            wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(Some(encoder.finish()));

        let buffer_slice = staging_buffer.slice(..);
        // Sets the buffer up for mapping, sending over the result of the mapping back to us when it is finished.
        let (sender, receiver) = futures_intrusive::channel::shared::oneshot_channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |v| {
            let _ = sender.send(v);
        });

        // Poll the device in a blocking manner so the mapping resolves.
        self.device.poll(wgpu::Maintain::Wait);

        match block_on(receiver.receive()) {
            Some(Ok(())) => {}
            Some(Err(err)) => return Err(IblError::Backend(format!("mapping readback buffer: {err}"))),
            None => return Err(IblError::Backend("readback buffer was never mapped".into())),
        }

        let data = buffer_slice.get_mapped_range();
        let mut pixels = Vec::with_capacity((size * size * 4) as usize);
        for row in data.chunks(padded_bytes_per_row as usize) {
            pixels.extend_from_slice(bytemuck::cast_slice::<u8, f16>(&row[..unpadded_bytes_per_row as usize]));
        }

        // All mapped views must be dropped before we unmap the buffer.
        drop(data);
        staging_buffer.unmap();
        Ok(pixels)
    }
}
