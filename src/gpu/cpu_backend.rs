//! CPU backend using rayon for parallelization.
//!
//! Runs the reference transform from [`crate::transform`] row by row. Used
//! when no GPU adapter is available, and by the test suite.

use std::collections::HashMap;

use rayon::prelude::*;

use super::renderer::{ProgramSource, Renderer, SurfaceId, SurfaceUsage};
use super::uniforms::TransformUniforms;
use crate::error::{PipelineError, Result};
use crate::state::data::ImageBuffer;
use crate::transform::{self, SurfaceView};

/// CPU surface - RGB16 samples stored in RAM
struct CpuSurface {
    width: u32,
    height: u32,
    usage: SurfaceUsage,
    data: Vec<u16>,
}

pub struct CpuRenderer {
    surfaces: HashMap<SurfaceId, CpuSurface>,
    next_id: u64,
    compiled: bool,
    binding: Option<(SurfaceId, SurfaceId)>,
    uniforms: TransformUniforms,
}

impl CpuRenderer {
    pub fn new() -> Self {
        log::info!(
            "CPU renderer ready ({} worker threads)",
            rayon::current_num_threads()
        );
        Self {
            surfaces: HashMap::new(),
            next_id: 1,
            compiled: false,
            binding: None,
            uniforms: TransformUniforms::neutral(Default::default()),
        }
    }

    /// Number of live surfaces
    pub fn surface_count(&self) -> usize {
        self.surfaces.len()
    }

    fn surface(&self, id: SurfaceId) -> Result<&CpuSurface> {
        self.surfaces
            .get(&id)
            .ok_or_else(|| PipelineError::InvalidInput(format!("unknown {}", id)))
    }
}

impl Default for CpuRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for CpuRenderer {
    fn name(&self) -> &str {
        "cpu"
    }

    fn compile_program(&mut self, program: &ProgramSource) -> Result<()> {
        // The transform is native code here; only the entry point is checked.
        if program.entry_point.is_empty() {
            return Err(PipelineError::ProgramCompilation(format!(
                "{}: missing entry point",
                program.label
            )));
        }
        self.compiled = true;
        Ok(())
    }

    fn create_surface(&mut self, width: u32, height: u32, usage: SurfaceUsage) -> Result<SurfaceId> {
        let len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(ImageBuffer::CHANNELS))
            .ok_or_else(|| PipelineError::SurfaceAllocation {
                width,
                height,
                reason: "size overflows address space".into(),
            })?;

        let id = SurfaceId(self.next_id);
        self.next_id += 1;
        self.surfaces.insert(
            id,
            CpuSurface {
                width,
                height,
                usage,
                data: vec![0; len],
            },
        );
        log::debug!("cpu: created {} ({}x{}, {:?})", id, width, height, usage);
        Ok(id)
    }

    fn write_surface(&mut self, id: SurfaceId, image: &ImageBuffer) -> Result<()> {
        let surface = self
            .surfaces
            .get_mut(&id)
            .ok_or_else(|| PipelineError::InvalidInput(format!("unknown {}", id)))?;
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
        surface.data.copy_from_slice(image.data());
        Ok(())
    }

    fn read_surface(&mut self, id: SurfaceId) -> Result<ImageBuffer> {
        let surface = self.surface(id)?;
        ImageBuffer::new(surface.width, surface.height, surface.data.clone())
    }

    fn release_surface(&mut self, id: SurfaceId) {
        if self.surfaces.remove(&id).is_some() {
            log::debug!("cpu: released {}", id);
        }
        if matches!(self.binding, Some((i, o)) if i == id || o == id) {
            self.binding = None;
        }
    }

    fn bind(&mut self, input: SurfaceId, output: SurfaceId) -> Result<()> {
        if input == output {
            return Err(PipelineError::InvalidInput(
                "transform cannot run in place".into(),
            ));
        }
        let (src, dst) = (self.surface(input)?, self.surface(output)?);
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
        self.binding = Some((input, output));
        Ok(())
    }

    fn set_parameters(&mut self, uniforms: &TransformUniforms) {
        self.uniforms = *uniforms;
    }

    fn dispatch(&mut self) -> Result<()> {
        if !self.compiled {
            return Err(PipelineError::NotReady("transform program not compiled"));
        }
        let (input, output) = self
            .binding
            .ok_or(PipelineError::NotReady("no surfaces bound"))?;

        // Take the output out of the map so the input can be borrowed alongside it
        let mut dst = self
            .surfaces
            .remove(&output)
            .ok_or_else(|| PipelineError::InvalidInput(format!("unknown {}", output)))?;

        let result = match self.surfaces.get(&input) {
            Some(src) => {
                let view = SurfaceView::new(src.width, src.height, &src.data);
                let row_len = src.width as usize * ImageBuffer::CHANNELS;
                let uniforms = &self.uniforms;
                if row_len > 0 {
                    dst.data
                        .par_chunks_mut(row_len)
                        .enumerate()
                        .for_each(|(y, row)| transform::shade_row(&view, y as u32, uniforms, row));
                }
                Ok(())
            }
            None => Err(PipelineError::InvalidInput(format!("unknown {}", input))),
        };

        self.surfaces.insert(output, dst);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::edit::{AdjustmentParameters, OutputMode};

    fn ready() -> CpuRenderer {
        let mut r = CpuRenderer::new();
        r.compile_program(&ProgramSource::transform(16)).unwrap();
        r
    }

    #[test]
    fn test_dispatch_requires_program_and_binding() {
        let mut r = CpuRenderer::new();
        assert!(matches!(r.dispatch(), Err(PipelineError::NotReady(_))));
        r.compile_program(&ProgramSource::transform(16)).unwrap();
        assert!(matches!(r.dispatch(), Err(PipelineError::NotReady(_))));
    }

    #[test]
    fn test_neutral_dispatch_copies_input() {
        let mut r = ready();
        let image = ImageBuffer::from_fn(5, 3, |x, y| [x as u16 * 1000, y as u16 * 2000, 4242]).unwrap();
        let input = r.create_surface(5, 3, SurfaceUsage::Input).unwrap();
        let output = r.create_surface(5, 3, SurfaceUsage::Output).unwrap();
        r.write_surface(input, &image).unwrap();

        r.set_parameters(&TransformUniforms::neutral(OutputMode::Sdr));
        r.bind(input, output).unwrap();
        r.dispatch().unwrap();

        assert_eq!(r.read_surface(output).unwrap(), image);
    }

    #[test]
    fn test_bind_rejects_mismatch_and_in_place() {
        let mut r = ready();
        let a = r.create_surface(4, 4, SurfaceUsage::Input).unwrap();
        let b = r.create_surface(4, 2, SurfaceUsage::Output).unwrap();
        let c = r.create_surface(4, 4, SurfaceUsage::Input).unwrap();
        assert!(r.bind(a, b).is_err());
        assert!(r.bind(a, a).is_err());
        assert!(r.bind(a, c).is_err());
    }

    #[test]
    fn test_write_checks_dimensions() {
        let mut r = ready();
        let id = r.create_surface(2, 2, SurfaceUsage::Input).unwrap();
        let wrong = ImageBuffer::filled(3, 2, [0, 0, 0]).unwrap();
        assert!(r.write_surface(id, &wrong).is_err());
    }

    #[test]
    fn test_release_drops_surface_and_binding() {
        let mut r = ready();
        let a = r.create_surface(2, 2, SurfaceUsage::Input).unwrap();
        let b = r.create_surface(2, 2, SurfaceUsage::Output).unwrap();
        r.bind(a, b).unwrap();
        r.release_surface(b);
        assert_eq!(r.surface_count(), 1);
        assert!(matches!(r.dispatch(), Err(PipelineError::NotReady(_))));
    }

    #[test]
    fn test_parameters_change_output() {
        let mut r = ready();
        let image = ImageBuffer::filled(2, 2, [20000, 20000, 20000]).unwrap();
        let input = r.create_surface(2, 2, SurfaceUsage::Input).unwrap();
        let output = r.create_surface(2, 2, SurfaceUsage::Output).unwrap();
        r.write_surface(input, &image).unwrap();

        let mut params = AdjustmentParameters::new();
        params.set_exposure(-1.0);
        r.set_parameters(&TransformUniforms::new(&params, OutputMode::Sdr));
        r.bind(input, output).unwrap();
        r.dispatch().unwrap();

        assert_eq!(r.read_surface(output).unwrap().pixel(0, 0), [10000, 10000, 10000]);
    }
}
