//! GPU Resource Manager
//!
//! Owns every surface the transform touches: the input surface, the graded
//! output (double-buffered) and the cached neutral reference. Callers only
//! ever see [`SurfaceHandle`]s.

use super::renderer::{ProgramSource, Renderer, SurfaceId, SurfaceUsage};
use super::uniforms::TransformUniforms;
use crate::error::{PipelineError, Result};
use crate::state::data::ImageBuffer;
use crate::state::edit::{AdjustmentParameters, OutputMode};

/// Which of the two independently rendered outputs to show
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayTarget {
    /// Output of the last successful `execute`
    #[default]
    Graded,
    /// Output for neutral parameters, captured after upload
    Reference,
}

/// Opaque handle to a displayable surface plus its size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceHandle {
    pub id: SurfaceId,
    pub width: u32,
    pub height: u32,
}

/// Surfaces belonging to one uploaded image
#[derive(Debug)]
struct ImageSurfaces {
    width: u32,
    height: u32,
    input: SurfaceId,
    /// Last complete graded frame
    front: SurfaceId,
    /// Render target for the next execute
    back: SurfaceId,
    /// Whether `front` holds a finished frame yet
    graded: bool,
    reference: Option<SurfaceId>,
}

impl ImageSurfaces {
    fn handle(&self, id: SurfaceId) -> SurfaceHandle {
        SurfaceHandle {
            id,
            width: self.width,
            height: self.height,
        }
    }

    fn ids(&self) -> impl Iterator<Item = SurfaceId> {
        [Some(self.input), Some(self.front), Some(self.back), self.reference]
            .into_iter()
            .flatten()
    }
}

pub struct ResourceManager {
    renderer: Box<dyn Renderer>,
    image: Option<ImageSurfaces>,
}

impl std::fmt::Debug for ResourceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceManager")
            .field("renderer", &self.renderer.name())
            .field("image", &self.image)
            .finish()
    }
}

impl ResourceManager {
    /// Take ownership of `renderer` and compile the transform program on it
    pub fn new(mut renderer: Box<dyn Renderer>, workgroup_size: u32) -> Result<Self> {
        renderer.compile_program(&ProgramSource::transform(workgroup_size))?;
        log::info!("resource manager ready on {}", renderer.name());
        Ok(Self {
            renderer,
            image: None,
        })
    }

    pub fn renderer_name(&self) -> &str {
        self.renderer.name()
    }

    /// Size of the current upload
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.image.as_ref().map(|s| (s.width, s.height))
    }

    pub fn has_image(&self) -> bool {
        self.image.is_some()
    }

    pub fn has_reference(&self) -> bool {
        self.image.as_ref().is_some_and(|s| s.reference.is_some())
    }

    /// Copy `image` into a fresh input surface
    ///
    /// All new surfaces are allocated before the previous ones are released,
    /// so a failure leaves the previous upload fully intact. A successful
    /// upload drops the cached reference.
    pub fn upload(&mut self, image: &ImageBuffer) -> Result<SurfaceHandle> {
        if image.is_empty() {
            return Err(PipelineError::InvalidInput(format!(
                "cannot upload a {}x{} image",
                image.width(),
                image.height()
            )));
        }
        let (width, height) = image.dimensions();

        let mut created = Vec::with_capacity(3);
        let result = self.allocate_image(image, &mut created);
        let surfaces = match result {
            Ok(surfaces) => surfaces,
            Err(e) => {
                for id in created {
                    self.renderer.release_surface(id);
                }
                return Err(e);
            }
        };

        let input = surfaces.handle(surfaces.input);
        if let Some(old) = self.image.replace(surfaces) {
            for id in old.ids() {
                self.renderer.release_surface(id);
            }
        }
        log::info!("uploaded {}x{} image to {}", width, height, input.id);
        Ok(input)
    }

    fn allocate_image(
        &mut self,
        image: &ImageBuffer,
        created: &mut Vec<SurfaceId>,
    ) -> Result<ImageSurfaces> {
        let (width, height) = image.dimensions();
        let input = self.renderer.create_surface(width, height, SurfaceUsage::Input)?;
        created.push(input);
        let front = self.renderer.create_surface(width, height, SurfaceUsage::Output)?;
        created.push(front);
        let back = self.renderer.create_surface(width, height, SurfaceUsage::Output)?;
        created.push(back);
        self.renderer.write_surface(input, image)?;

        Ok(ImageSurfaces {
            width,
            height,
            input,
            front,
            back,
            graded: false,
            reference: None,
        })
    }

    /// Reallocate the graded output pair
    ///
    /// The size must match the current upload. Any graded frame is
    /// discarded; the reference is kept.
    pub fn allocate_output(&mut self, width: u32, height: u32) -> Result<SurfaceHandle> {
        let (current_width, current_height) = self
            .dimensions()
            .ok_or(PipelineError::NotReady("no image uploaded"))?;
        if (width, height) != (current_width, current_height) {
            return Err(PipelineError::InvalidInput(format!(
                "output {}x{} does not match input {}x{}",
                width, height, current_width, current_height
            )));
        }

        let front = self.renderer.create_surface(width, height, SurfaceUsage::Output)?;
        let back = match self.renderer.create_surface(width, height, SurfaceUsage::Output) {
            Ok(id) => id,
            Err(e) => {
                self.renderer.release_surface(front);
                return Err(e);
            }
        };

        let surfaces = self
            .image
            .as_mut()
            .ok_or(PipelineError::NotReady("no image uploaded"))?;
        let old = [
            std::mem::replace(&mut surfaces.front, front),
            std::mem::replace(&mut surfaces.back, back),
        ];
        surfaces.graded = false;
        let handle = surfaces.handle(front);
        for id in old {
            self.renderer.release_surface(id);
        }
        Ok(handle)
    }

    /// Render neutral parameters under `mode` into the reference surface
    pub fn capture_reference(&mut self, mode: OutputMode) -> Result<SurfaceHandle> {
        let surfaces = self
            .image
            .as_ref()
            .ok_or(PipelineError::NotReady("no image uploaded"))?;
        let (width, height, input) = (surfaces.width, surfaces.height, surfaces.input);

        let target = match surfaces.reference {
            Some(id) => id,
            None => self.renderer.create_surface(width, height, SurfaceUsage::Output)?,
        };

        let uniforms = TransformUniforms::neutral(mode);
        if let Err(e) = self.run(input, target, &uniforms) {
            // Never keep a half-written reference around
            self.renderer.release_surface(target);
            if let Some(surfaces) = self.image.as_mut() {
                surfaces.reference = None;
            }
            return Err(e);
        }

        let surfaces = self
            .image
            .as_mut()
            .ok_or(PipelineError::NotReady("no image uploaded"))?;
        surfaces.reference = Some(target);
        log::debug!("captured {} reference into {}", mode.as_str(), target);
        Ok(surfaces.handle(target))
    }

    /// Run the full transform into the back buffer and present it
    ///
    /// On failure the previous graded frame stays current.
    pub fn execute(&mut self, params: &AdjustmentParameters, mode: OutputMode) -> Result<SurfaceHandle> {
        let surfaces = self
            .image
            .as_ref()
            .ok_or(PipelineError::NotReady("no image uploaded"))?;
        let (input, back) = (surfaces.input, surfaces.back);

        let uniforms = TransformUniforms::new(params, mode);
        self.run(input, back, &uniforms)?;

        let surfaces = self
            .image
            .as_mut()
            .ok_or(PipelineError::NotReady("no image uploaded"))?;
        std::mem::swap(&mut surfaces.front, &mut surfaces.back);
        surfaces.graded = true;
        Ok(surfaces.handle(surfaces.front))
    }

    fn run(&mut self, input: SurfaceId, output: SurfaceId, uniforms: &TransformUniforms) -> Result<()> {
        self.renderer.set_parameters(uniforms);
        self.renderer.bind(input, output)?;
        self.renderer.dispatch()
    }

    /// Read a graded or reference surface back to the CPU
    pub fn download(&mut self, handle: SurfaceHandle) -> Result<ImageBuffer> {
        let surfaces = self
            .image
            .as_ref()
            .ok_or(PipelineError::NotReady("no image uploaded"))?;
        let owned = (surfaces.graded && handle.id == surfaces.front)
            || surfaces.reference == Some(handle.id);
        if !owned {
            return Err(PipelineError::NotReady("handle does not name a finished output"));
        }

        let image = self.renderer.read_surface(handle.id)?;
        log::debug!("downloaded {}x{} from {}", image.width(), image.height(), handle.id);
        Ok(image)
    }

    /// Handle for display; never runs the transform
    pub fn display_handle(&self, target: DisplayTarget) -> Option<SurfaceHandle> {
        let surfaces = self.image.as_ref()?;
        match target {
            DisplayTarget::Graded => surfaces.graded.then(|| surfaces.handle(surfaces.front)),
            DisplayTarget::Reference => surfaces.reference.map(|id| surfaces.handle(id)),
        }
    }
}

impl Drop for ResourceManager {
    fn drop(&mut self) {
        if let Some(surfaces) = self.image.take() {
            for id in surfaces.ids() {
                self.renderer.release_surface(id);
            }
        }
    }
}
