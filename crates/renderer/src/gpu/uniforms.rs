use bytemuck::{Pod, Zeroable};

use crate::types::Configuration;

/// std140 mirror of the fragment template's `FractalParams` block.
///
/// `c` and `p` sit at offsets 0 and 8, `maxSteps` at 16; std140 rounds the
/// block up to 32 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub(crate) struct FractalUniforms {
    pub c: [f32; 2],
    pub p: [f32; 2],
    pub max_steps: i32,
    pub _padding: [i32; 3],
}

impl FractalUniforms {
    pub fn from_config(config: &Configuration) -> Self {
        Self {
            c: config.c.to_f32(),
            p: config.p.to_f32(),
            max_steps: i32::try_from(config.iterations).unwrap_or(i32::MAX),
            _padding: [0; 3],
        }
    }
}
