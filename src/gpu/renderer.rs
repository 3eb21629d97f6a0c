//! Renderer capability interface
//!
//! The resource manager drives the transform through this trait only, so a
//! backend is anything that can hold RGB16 surfaces and run the transform
//! program from one surface into another.

use super::uniforms::TransformUniforms;
use crate::error::Result;
use crate::state::data::ImageBuffer;

/// Opaque surface identifier, unique per renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceId(pub(crate) u64);

impl std::fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "surface#{}", self.0)
    }
}

/// What a surface is going to be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceUsage {
    /// Written from the CPU, read by the kernel
    Input,
    /// Written by the kernel, read back or displayed
    Output,
}

/// Transform program handed to [`Renderer::compile_program`]
#[derive(Debug, Clone)]
pub struct ProgramSource {
    pub label: &'static str,
    /// WGSL source; backends that run the transform natively ignore it
    pub wgsl: String,
    pub entry_point: &'static str,
    /// Square compute tile edge
    pub workgroup_size: u32,
}

impl ProgramSource {
    /// The color transform kernel for the given tile size
    pub fn transform(workgroup_size: u32) -> Self {
        let workgroup_size = workgroup_size.clamp(1, 32);
        Self {
            label: "Color Transform",
            wgsl: super::shaders::transform_shader(workgroup_size),
            entry_point: super::shaders::ENTRY_POINT,
            workgroup_size,
        }
    }
}

/// A backend able to run the color transform
///
/// Call order per frame: `set_parameters`, `bind`, `dispatch`. `dispatch`
/// must read only the bound input and write only the bound output.
pub trait Renderer: Send {
    /// Human-readable backend name for logs
    fn name(&self) -> &str;

    fn compile_program(&mut self, program: &ProgramSource) -> Result<()>;

    fn create_surface(&mut self, width: u32, height: u32, usage: SurfaceUsage) -> Result<SurfaceId>;

    /// Copy `image` into an input surface of the same size
    fn write_surface(&mut self, id: SurfaceId, image: &ImageBuffer) -> Result<()>;

    /// Copy a surface back to the CPU
    fn read_surface(&mut self, id: SurfaceId) -> Result<ImageBuffer>;

    /// Free a surface; unknown ids are ignored
    fn release_surface(&mut self, id: SurfaceId);

    fn bind(&mut self, input: SurfaceId, output: SurfaceId) -> Result<()>;

    fn set_parameters(&mut self, uniforms: &TransformUniforms);

    /// Run the compiled program once over every pixel of the bound output
    fn dispatch(&mut self) -> Result<()>;
}
