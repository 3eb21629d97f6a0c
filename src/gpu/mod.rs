/// GPU-accelerated color transform module
///
/// This module runs the per-pixel transform of `crate::transform` over whole
/// images, on the GPU through wgpu or on the CPU through rayon.
///
/// Architecture:
/// - `uniforms.rs` - parameter block shared by both backends
/// - `shaders.rs` - WGSL compute kernel
/// - `renderer.rs` - backend capability trait
/// - `wgpu_backend.rs` / `cpu_backend.rs` - the two backends
/// - `resources.rs` - surface ownership, reference capture, execution

pub mod cpu_backend;
pub mod renderer;
pub mod resources;
pub mod shaders;
pub mod uniforms;
pub mod wgpu_backend;

pub use cpu_backend::CpuRenderer;
pub use renderer::{ProgramSource, Renderer, SurfaceId, SurfaceUsage};
pub use resources::{DisplayTarget, ResourceManager, SurfaceHandle};
pub use uniforms::{Stages, TransformUniforms};
pub use wgpu_backend::WgpuRenderer;
