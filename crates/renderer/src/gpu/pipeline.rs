/// Clip-space corner, fixed per vertex.
const CLIP_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x2];

/// Complex-plane coordinate of the corner, rewritten every draw.
const LOCATION_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![1 => Float32x2];

const VEC2_STRIDE: wgpu::BufferAddress = std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress;

/// Vertex buffer slots of the viewport quad: slot 0 clip positions, slot 1
/// locations.
pub(crate) const QUAD_VERTEX_BUFFERS: [wgpu::VertexBufferLayout<'static>; 2] = [
    wgpu::VertexBufferLayout {
        array_stride: VEC2_STRIDE,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &CLIP_ATTRIBUTES,
    },
    wgpu::VertexBufferLayout {
        array_stride: VEC2_STRIDE,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &LOCATION_ATTRIBUTES,
    },
];

/// Layouts shared by every fractal program: group 0 is the parameter block,
/// group 1 the palette texture and its sampler.
pub(crate) struct ProgramLayouts {
    pub params_layout: wgpu::BindGroupLayout,
    pub palette_layout: wgpu::BindGroupLayout,
    pub pipeline_layout: wgpu::PipelineLayout,
}

impl ProgramLayouts {
    pub fn new(device: &wgpu::Device) -> Self {
        let params_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("fractal params layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let palette_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("palette layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("fractal pipeline layout"),
            bind_group_layouts: &[&params_layout, &palette_layout],
            push_constant_ranges: &[],
        });

        Self {
            params_layout,
            palette_layout,
            pipeline_layout,
        }
    }
}
