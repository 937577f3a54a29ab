//! Fractal shader assembly and program building.
//!
//! Every fractal shares one fragment template. The template owns the uniform
//! block, the palette lookup and the escape loop; a fractal only supplies the
//! bodies of two functions, `setup` and `next`, through [`FractalSnippets`].
//! Snippets are checked against the template's identifier contract before
//! they are spliced in, then both stages go through naga so a broken fractal
//! is reported with a compiler log instead of a device error.
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use wgpu::naga;
use wgpu::naga::ShaderStage;

use crate::gpu::{FractalUniforms, ProgramLayouts, QUAD_VERTEX_BUFFERS};

/// Pass-through vertex stage for the viewport quad.
///
/// `a_position` is the fixed clip-space corner, `a_location` the matching
/// complex-plane coordinate uploaded every frame.
pub const VERTEX_SHADER_GLSL: &str = r"#version 450
layout(location = 0) in vec2 a_position;
layout(location = 1) in vec2 a_location;
layout(location = 0) out vec2 v_loc;

void main() {
    v_loc = a_location;
    gl_Position = vec4(a_position, 0.0, 1.0);
}
";

/// Fragment template. `{{setup}}` and `{{next}}` are the insertion points.
///
/// The uniform block layout must match [`FractalUniforms`].
const FRAGMENT_TEMPLATE: &str = r"#version 450
layout(location = 0) in vec2 v_loc;
layout(location = 0) out vec4 outColor;

layout(std140, set = 0, binding = 0) uniform FractalParams {
    vec2 c;
    vec2 p;
    int maxSteps;
} params;

layout(set = 1, binding = 0) uniform texture2D fractal_palette_texture;
layout(set = 1, binding = 1) uniform sampler fractal_palette_sampler;

int iteration;
vec2 z;
vec2 c;
vec2 _data1;
vec2 _data2;

void next(inout vec2 _z, inout vec2 _c) {
{{next}}
}

void setup(inout vec2 _z, inout vec2 _c, in vec2 _loc, inout vec2 _data1, inout vec2 _data2) {
{{setup}}
}

void main() {
    _data1 = params.c;
    _data2 = params.p;
    setup(z, c, v_loc, _data1, _data2);

    iteration = params.maxSteps;
    for (int i = 0; i < params.maxSteps; i++) {
        next(z, c);
        if (z.x * z.x + z.y * z.y > 4.0) {
            iteration = i;
            break;
        }
    }

    float u = (float(iteration) + 0.5) / float(max(params.maxSteps, 1));
    outColor = texture(sampler2D(fractal_palette_texture, fractal_palette_sampler), vec2(u, 0.5));
}
";

/// Identifiers owned by the template that snippets may not reference.
const RESERVED_IDENTIFIERS: [&str; 4] = ["params", "outColor", "v_loc", "main"];
const RESERVED_PREFIX: &str = "fractal_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStageKind {
    Vertex,
    Fragment,
}

impl ShaderStageKind {
    fn naga_stage(self) -> ShaderStage {
        match self {
            ShaderStageKind::Vertex => ShaderStage::Vertex,
            ShaderStageKind::Fragment => ShaderStage::Fragment,
        }
    }
}

impl fmt::Display for ShaderStageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStageKind::Vertex => f.write_str("vertex"),
            ShaderStageKind::Fragment => f.write_str("fragment"),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum BuildError {
    #[error("{stage} shader failed to compile:\n{log}")]
    ShaderCompile { stage: ShaderStageKind, log: String },
    #[error("shader program failed to link:\n{log}")]
    ProgramLink { log: String },
}

impl BuildError {
    /// Compiler or linker output, verbatim.
    pub fn log(&self) -> &str {
        match self {
            BuildError::ShaderCompile { log, .. } | BuildError::ProgramLink { log } => log,
        }
    }
}

/// Named insertion points of the fragment template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertionPoint {
    /// Body of `setup(inout vec2 _z, inout vec2 _c, in vec2 _loc, inout vec2 _data1, inout vec2 _data2)`.
    Setup,
    /// Body of `next(inout vec2 _z, inout vec2 _c)`.
    Next,
}

impl InsertionPoint {
    fn marker(self) -> &'static str {
        match self {
            InsertionPoint::Setup => "{{setup}}",
            InsertionPoint::Next => "{{next}}",
        }
    }
}

impl fmt::Display for InsertionPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InsertionPoint::Setup => f.write_str("setup"),
            InsertionPoint::Next => f.write_str("next"),
        }
    }
}

/// The two code blocks a fractal contributes to the template.
#[derive(Debug, Clone, Copy)]
pub struct FractalSnippets<'a> {
    pub setup: &'a str,
    pub next: &'a str,
}

impl<'a> FractalSnippets<'a> {
    pub fn new(setup: &'a str, next: &'a str) -> Self {
        Self { setup, next }
    }

    fn get(&self, point: InsertionPoint) -> &'a str {
        match point {
            InsertionPoint::Setup => self.setup,
            InsertionPoint::Next => self.next,
        }
    }
}

/// Checks both snippets and splices them into the fragment template.
pub fn assemble_fragment(snippets: &FractalSnippets<'_>) -> Result<String, BuildError> {
    let mut source = FRAGMENT_TEMPLATE.to_string();
    for point in [InsertionPoint::Setup, InsertionPoint::Next] {
        let code = snippets.get(point);
        validate_snippet(point, code)?;
        source = source.replacen(point.marker(), code.trim_end(), 1);
    }
    Ok(source)
}

fn validate_snippet(point: InsertionPoint, code: &str) -> Result<(), BuildError> {
    let reject = |reason: String| BuildError::ShaderCompile {
        stage: ShaderStageKind::Fragment,
        log: format!("{point} code: {reason}"),
    };

    let code = strip_comments(code);
    if code.trim().is_empty() {
        return Err(reject("code is empty".into()));
    }
    if code.contains('#') {
        return Err(reject("preprocessor directives are not allowed".into()));
    }

    let mut depth = 0i32;
    for ch in code.chars() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth < 0 {
                    return Err(reject("unmatched '}'".into()));
                }
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(reject(format!("{depth} unclosed '{{'")));
    }

    for identifier in identifiers(&code) {
        if RESERVED_IDENTIFIERS.contains(&identifier) || identifier.starts_with(RESERVED_PREFIX) {
            return Err(reject(format!(
                "identifier '{identifier}' is reserved by the fractal template"
            )));
        }
    }
    Ok(())
}

fn strip_comments(code: &str) -> String {
    let mut output = String::with_capacity(code.len());
    let mut chars = code.chars().peekable();
    while let Some(ch) = chars.next() {
        let lookahead = chars.peek().copied();
        match (ch, lookahead) {
            ('/', Some('/')) => {
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        output.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut previous = '\0';
                for skipped in chars.by_ref() {
                    if previous == '*' && skipped == '/' {
                        break;
                    }
                    previous = skipped;
                }
                output.push(' ');
            }
            _ => output.push(ch),
        }
    }
    output
}

fn identifiers(code: &str) -> impl Iterator<Item = &str> {
    let bytes = code.as_bytes();
    let mut index = 0;
    std::iter::from_fn(move || {
        while index < bytes.len() {
            let byte = bytes[index];
            if byte.is_ascii_digit() {
                while index < bytes.len()
                    && (bytes[index].is_ascii_alphanumeric() || bytes[index] == b'.')
                {
                    index += 1;
                }
            } else if byte.is_ascii_alphabetic() || byte == b'_' {
                let start = index;
                while index < bytes.len()
                    && (bytes[index].is_ascii_alphanumeric() || bytes[index] == b'_')
                {
                    index += 1;
                }
                return Some(&code[start..index]);
            } else {
                index += 1;
            }
        }
        None
    })
}

/// A parsed and validated shader stage.
#[derive(Debug)]
pub struct CheckedStage {
    pub stage: ShaderStageKind,
    pub module: naga::Module,
}

/// Parses and validates one GLSL stage with naga.
pub fn compile_stage(stage: ShaderStageKind, source: &str) -> Result<CheckedStage, BuildError> {
    let compile_error = |log: String| BuildError::ShaderCompile { stage, log };

    let mut frontend = naga::front::glsl::Frontend::default();
    let options = naga::front::glsl::Options::from(stage.naga_stage());
    let module = frontend
        .parse(&options, source)
        .map_err(|err| compile_error(err.to_string()))?;

    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::default(),
    )
    .validate(&module)
    .map_err(|err| compile_error(err.to_string()))?;

    if !module
        .entry_points
        .iter()
        .any(|entry| entry.stage == stage.naga_stage() && entry.name == "main")
    {
        return Err(compile_error(format!("no {stage} entry point named 'main'")));
    }

    Ok(CheckedStage { stage, module })
}

/// Compiles both stages and checks that every fragment input is written by
/// the vertex stage with a matching type.
pub fn validate_program(
    vertex_source: &str,
    fragment_source: &str,
) -> Result<(CheckedStage, CheckedStage), BuildError> {
    let vertex = compile_stage(ShaderStageKind::Vertex, vertex_source)?;
    let fragment = compile_stage(ShaderStageKind::Fragment, fragment_source)?;
    link_interfaces(&vertex, &fragment)?;
    Ok((vertex, fragment))
}

fn link_interfaces(vertex: &CheckedStage, fragment: &CheckedStage) -> Result<(), BuildError> {
    let outputs = stage_locations(&vertex.module, ShaderStage::Vertex, Direction::Output);
    let inputs = stage_locations(&fragment.module, ShaderStage::Fragment, Direction::Input);

    let mut problems = Vec::new();
    for (location, input) in &inputs {
        match outputs.get(location) {
            None => problems.push(format!(
                "fragment input at location {location} is not written by the vertex stage"
            )),
            Some(output) if output != input => problems.push(format!(
                "location {location} type mismatch: vertex writes {output:?}, fragment reads {input:?}"
            )),
            Some(_) => {}
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(BuildError::ProgramLink {
            log: problems.join("\n"),
        })
    }
}

#[derive(Clone, Copy)]
enum Direction {
    Input,
    Output,
}

fn stage_locations(
    module: &naga::Module,
    stage: ShaderStage,
    direction: Direction,
) -> BTreeMap<u32, naga::TypeInner> {
    let mut locations = BTreeMap::new();
    for entry in module.entry_points.iter().filter(|entry| entry.stage == stage) {
        match direction {
            Direction::Input => {
                for argument in &entry.function.arguments {
                    collect_locations(module, argument.ty, argument.binding.as_ref(), &mut locations);
                }
            }
            Direction::Output => {
                if let Some(result) = &entry.function.result {
                    collect_locations(module, result.ty, result.binding.as_ref(), &mut locations);
                }
            }
        }
    }
    locations
}

fn collect_locations(
    module: &naga::Module,
    ty: naga::Handle<naga::Type>,
    binding: Option<&naga::Binding>,
    locations: &mut BTreeMap<u32, naga::TypeInner>,
) {
    match binding {
        Some(naga::Binding::Location { location, .. }) => {
            locations.insert(*location, module.types[ty].inner.clone());
        }
        Some(naga::Binding::BuiltIn(_)) => {}
        None => {
            if let naga::TypeInner::Struct { members, .. } = &module.types[ty].inner {
                for member in members {
                    collect_locations(module, member.ty, member.binding.as_ref(), locations);
                }
            }
        }
    }
}

/// GPU objects of one linked fractal program.
///
/// Released together when the owning renderer is dropped.
pub struct CompiledProgram {
    pub(crate) pipeline: wgpu::RenderPipeline,
    pub(crate) params_buffer: wgpu::Buffer,
    pub(crate) params_bind_group: wgpu::BindGroup,
}

/// Turns vertex and fragment sources into a [`CompiledProgram`] for one
/// target format.
pub(crate) struct ShaderProgramBuilder<'a> {
    device: &'a wgpu::Device,
    layouts: &'a ProgramLayouts,
    target_format: wgpu::TextureFormat,
}

impl<'a> ShaderProgramBuilder<'a> {
    pub(crate) fn new(
        device: &'a wgpu::Device,
        layouts: &'a ProgramLayouts,
        target_format: wgpu::TextureFormat,
    ) -> Self {
        Self {
            device,
            layouts,
            target_format,
        }
    }

    pub(crate) fn build(
        &self,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<CompiledProgram, BuildError> {
        validate_program(vertex_source, fragment_source)?;

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let vertex_module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("fractal vertex"),
            source: wgpu::ShaderSource::Glsl {
                shader: Cow::Borrowed(vertex_source),
                stage: ShaderStage::Vertex,
                defines: &[],
            },
        });
        let fragment_module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("fractal fragment"),
            source: wgpu::ShaderSource::Glsl {
                shader: Cow::Borrowed(fragment_source),
                stage: ShaderStage::Fragment,
                defines: &[],
            },
        });

        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("fractal pipeline"),
                layout: Some(&self.layouts.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &vertex_module,
                    entry_point: Some("main"),
                    buffers: &QUAD_VERTEX_BUFFERS,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: &fragment_module,
                    entry_point: Some("main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: self.target_format,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                multiview: None,
                cache: None,
            });

        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(BuildError::ProgramLink {
                log: err.to_string(),
            });
        }

        let params_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("fractal params"),
            size: std::mem::size_of::<FractalUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let params_bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("fractal params bind group"),
            layout: &self.layouts.params_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: params_buffer.as_entire_binding(),
            }],
        });

        Ok(CompiledProgram {
            pipeline,
            params_buffer,
            params_bind_group,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANDELBROT_SETUP: &str = "_z = _data1;\n_c = _loc;";
    const MANDELBROT_NEXT: &str = "vec2 tmp = _z;\n_z.x = tmp.x * tmp.x - tmp.y * tmp.y;\n_z.y = tmp.y * tmp.x * 2.0;\n_z += _c;";

    fn mandelbrot() -> FractalSnippets<'static> {
        FractalSnippets::new(MANDELBROT_SETUP, MANDELBROT_NEXT)
    }

    #[test]
    fn assemble_fills_both_insertion_points() {
        let source = assemble_fragment(&mandelbrot()).unwrap();
        assert!(!source.contains("{{setup}}"));
        assert!(!source.contains("{{next}}"));
        assert!(source.contains("_c = _loc;"));
        assert!(source.contains("_z += _c;"));
        assert!(source.starts_with("#version 450"));
    }

    #[test]
    fn assembled_mandelbrot_validates() {
        let fragment = assemble_fragment(&mandelbrot()).unwrap();
        let (vertex, fragment) = validate_program(VERTEX_SHADER_GLSL, &fragment).unwrap();
        assert_eq!(vertex.stage, ShaderStageKind::Vertex);
        assert_eq!(fragment.stage, ShaderStageKind::Fragment);
    }

    #[test]
    fn snippets_may_use_comments_and_scratch_state() {
        let setup = "// previous z lives in _data1\n_z = _loc.yx; /* swap */ _c = _data1.xy; _data1 = vec2(0.0);";
        let next = "vec2 tmp = _z; _z = vec2(tmp.x * tmp.x - tmp.y * tmp.y, 2.0 * tmp.x * tmp.y) + _c + _data2 * _data1; _data1 = tmp;";
        let fragment = assemble_fragment(&FractalSnippets::new(setup, next)).unwrap();
        assert!(validate_program(VERTEX_SHADER_GLSL, &fragment).is_ok());
    }

    #[test]
    fn rejects_reserved_identifiers() {
        for setup in [
            "_z = _loc; _c = params.c;",
            "_z = v_loc; _c = _loc;",
            "outColor = vec4(1.0); _z = _loc; _c = _loc;",
            "_z = _loc; _c = _loc; float fractal_scale = 2.0;",
        ] {
            let err = assemble_fragment(&FractalSnippets::new(setup, MANDELBROT_NEXT)).unwrap_err();
            match err {
                BuildError::ShaderCompile { stage, log } => {
                    assert_eq!(stage, ShaderStageKind::Fragment);
                    assert!(log.starts_with("setup code:"), "{log}");
                    assert!(log.contains("reserved"), "{log}");
                }
                other => panic!("unexpected error {other:?}"),
            }
        }
    }

    #[test]
    fn reserved_names_inside_comments_are_ignored() {
        let setup = "_z = _data1; // not params.c\n_c = _loc;";
        assert!(assemble_fragment(&FractalSnippets::new(setup, MANDELBROT_NEXT)).is_ok());
    }

    #[test]
    fn rejects_unbalanced_braces_and_directives() {
        let err = assemble_fragment(&FractalSnippets::new(MANDELBROT_SETUP, "} void main() {"))
            .unwrap_err();
        assert!(err.log().starts_with("next code:"));

        let err = assemble_fragment(&FractalSnippets::new(MANDELBROT_SETUP, "if (true) { _z = _c;"))
            .unwrap_err();
        assert!(err.log().contains("unclosed"));

        let err = assemble_fragment(&FractalSnippets::new("#define X 1\n_z = _loc;", MANDELBROT_NEXT))
            .unwrap_err();
        assert!(err.log().contains("preprocessor"));

        let err = assemble_fragment(&FractalSnippets::new("  // nothing\n", MANDELBROT_NEXT))
            .unwrap_err();
        assert!(err.log().contains("empty"));
    }

    #[test]
    fn syntax_errors_are_fragment_compile_errors() {
        let fragment =
            assemble_fragment(&FractalSnippets::new(MANDELBROT_SETUP, "_z = ;")).unwrap();
        let err = validate_program(VERTEX_SHADER_GLSL, &fragment).unwrap_err();
        assert!(matches!(
            err,
            BuildError::ShaderCompile {
                stage: ShaderStageKind::Fragment,
                ..
            }
        ));
        assert!(!err.log().is_empty());
    }

    #[test]
    fn vertex_errors_name_the_vertex_stage() {
        let fragment = assemble_fragment(&mandelbrot()).unwrap();
        let err = validate_program("#version 450\nvoid main() { gl_Position = ; }", &fragment)
            .unwrap_err();
        assert!(matches!(
            err,
            BuildError::ShaderCompile {
                stage: ShaderStageKind::Vertex,
                ..
            }
        ));
    }

    #[test]
    fn unmatched_interface_is_a_link_error() {
        let vertex = r"#version 450
layout(location = 0) in vec2 a_position;
layout(location = 1) out vec2 v_other;

void main() {
    v_other = a_position;
    gl_Position = vec4(a_position, 0.0, 1.0);
}
";
        let fragment = assemble_fragment(&mandelbrot()).unwrap();
        let err = validate_program(vertex, &fragment).unwrap_err();
        match err {
            BuildError::ProgramLink { log } => assert!(log.contains("location 0"), "{log}"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn mismatched_interface_type_is_a_link_error() {
        let vertex = r"#version 450
layout(location = 0) in vec2 a_position;
layout(location = 0) out vec4 v_loc;

void main() {
    v_loc = vec4(a_position, 0.0, 0.0);
    gl_Position = vec4(a_position, 0.0, 1.0);
}
";
        let fragment = assemble_fragment(&mandelbrot()).unwrap();
        let err = validate_program(vertex, &fragment).unwrap_err();
        assert!(matches!(err, BuildError::ProgramLink { .. }));
        assert!(err.log().contains("type mismatch"));
    }
}
