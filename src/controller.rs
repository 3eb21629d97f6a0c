//! Pipeline Controller
//!
//! Ties the parameter set, the resource manager and the backend together:
//!
//! ```text
//! Uninitialized -> Initialized -> ImageLoaded -> Idle <-> Processing
//! ```
//!
//! Every call is synchronous except backend bring-up. Callers serialize
//! calls; nothing here locks.

use crate::config::{BackendPreference, PipelineConfig};
use crate::error::{PipelineError, Result};
use crate::gpu::cpu_backend::CpuRenderer;
use crate::gpu::renderer::Renderer;
use crate::gpu::resources::{DisplayTarget, ResourceManager, SurfaceHandle};
use crate::gpu::wgpu_backend::WgpuRenderer;
use crate::state::data::ImageBuffer;
use crate::state::edit::{AdjustmentParameters, OutputMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// No backend yet
    Uninitialized,
    /// Backend ready, nothing uploaded
    Initialized,
    /// Image uploaded, not processed yet
    ImageLoaded,
    /// At least one graded frame available
    Idle,
    /// Inside `process`
    Processing,
}

#[derive(Debug)]
pub struct PipelineController {
    config: PipelineConfig,
    state: PipelineState,
    resources: Option<ResourceManager>,
    parameters: AdjustmentParameters,
    output_mode: OutputMode,
    display: DisplayTarget,
}

impl PipelineController {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            state: PipelineState::Uninitialized,
            resources: None,
            parameters: AdjustmentParameters::default(),
            output_mode: OutputMode::default(),
            display: DisplayTarget::Graded,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Bring up the backend named by the config
    ///
    /// On failure the controller stays as it was.
    pub async fn initialize(&mut self) -> Result<()> {
        let renderer: Box<dyn Renderer> = match self.config.backend {
            BackendPreference::Cpu => Box::new(CpuRenderer::new()),
            BackendPreference::Gpu => Box::new(WgpuRenderer::new(&self.config).await?),
            BackendPreference::Auto => match WgpuRenderer::new(&self.config).await {
                Ok(renderer) => Box::new(renderer),
                Err(e) => {
                    log::warn!("GPU backend unavailable ({}), falling back to CPU", e);
                    Box::new(CpuRenderer::new())
                }
            },
        };
        self.initialize_with(renderer)
    }

    /// Use an already constructed backend
    pub fn initialize_with(&mut self, renderer: Box<dyn Renderer>) -> Result<()> {
        let resources = ResourceManager::new(renderer, self.config.workgroup_size)?;
        log::info!("pipeline initialized on {}", resources.renderer_name());
        self.resources = Some(resources);
        self.state = PipelineState::Initialized;
        Ok(())
    }

    /// Name of the active backend
    pub fn backend_name(&self) -> Option<&str> {
        self.resources.as_ref().map(|r| r.renderer_name())
    }

    fn resources(&mut self) -> Result<&mut ResourceManager> {
        self.resources
            .as_mut()
            .ok_or(PipelineError::NotReady("pipeline not initialized"))
    }

    /// Hand a decoded image to the pipeline
    ///
    /// Zero-sized images are rejected before any surface is touched. When
    /// configured, the neutral reference is captured right away; a failed
    /// capture is logged and leaves the upload in place.
    pub fn upload_image(&mut self, image: ImageBuffer) -> Result<()> {
        if image.is_empty() {
            return Err(PipelineError::InvalidInput(format!(
                "cannot upload a {}x{} image",
                image.width(),
                image.height()
            )));
        }

        self.resources()?.upload(&image)?;
        self.state = PipelineState::ImageLoaded;

        if self.config.capture_reference_on_upload {
            if let Err(e) = self.capture_reference() {
                log::warn!("reference capture after upload failed: {}", e);
            }
        }
        Ok(())
    }

    /// Render neutral parameters under the current output mode as the reference
    pub fn capture_reference(&mut self) -> Result<SurfaceHandle> {
        let mode = self.output_mode;
        self.resources()?.capture_reference(mode)
    }

    /// Run the transform with the current parameters
    pub fn process(&mut self) -> Result<SurfaceHandle> {
        if !matches!(self.state, PipelineState::ImageLoaded | PipelineState::Idle) {
            return Err(PipelineError::NotReady("no image uploaded"));
        }

        let previous = self.state;
        self.state = PipelineState::Processing;
        let (params, mode) = (self.parameters, self.output_mode);
        let result = self.resources().and_then(|r| r.execute(&params, mode));

        self.state = match result {
            Ok(_) => PipelineState::Idle,
            Err(_) => previous,
        };
        result
    }

    /// Read the current graded frame back
    pub fn download(&mut self) -> Result<ImageBuffer> {
        let handle = self
            .resources
            .as_ref()
            .and_then(|r| r.display_handle(DisplayTarget::Graded))
            .ok_or(PipelineError::NotReady("nothing processed yet"))?;
        self.resources()?.download(handle)
    }

    /// Read the neutral reference back
    pub fn download_reference(&mut self) -> Result<ImageBuffer> {
        let handle = self
            .resources
            .as_ref()
            .and_then(|r| r.display_handle(DisplayTarget::Reference))
            .ok_or(PipelineError::NotReady("no reference captured"))?;
        self.resources()?.download(handle)
    }

    /// Pick which output `display_handle` returns
    pub fn select_display(&mut self, target: DisplayTarget) {
        self.display = target;
    }

    pub fn display_target(&self) -> DisplayTarget {
        self.display
    }

    /// Handle of the selected output, if it exists
    pub fn display_handle(&self) -> Option<SurfaceHandle> {
        self.resources.as_ref()?.display_handle(self.display)
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.resources.as_ref()?.dimensions()
    }

    pub fn parameters(&self) -> &AdjustmentParameters {
        &self.parameters
    }

    pub fn parameters_mut(&mut self) -> &mut AdjustmentParameters {
        &mut self.parameters
    }

    pub fn set_parameters(&mut self, parameters: AdjustmentParameters) {
        self.parameters = parameters;
    }

    pub fn reset_parameters(&mut self) {
        self.parameters.reset();
    }

    pub fn output_mode(&self) -> OutputMode {
        self.output_mode
    }

    pub fn set_output_mode(&mut self, mode: OutputMode) {
        self.output_mode = mode;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn cpu_config() -> PipelineConfig {
        PipelineConfig {
            backend: BackendPreference::Cpu,
            ..Default::default()
        }
    }

    async fn ready() -> PipelineController {
        init_logging();
        let mut controller = PipelineController::new(cpu_config());
        controller.initialize().await.unwrap();
        controller
    }

    fn sample_image() -> ImageBuffer {
        ImageBuffer::from_fn(8, 6, |x, y| {
            [(x * 7000) as u16, (y * 9000) as u16, ((x + y) * 3000) as u16]
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_initialize_cpu_backend() {
        let controller = ready().await;
        assert_eq!(controller.state(), PipelineState::Initialized);
        assert_eq!(controller.backend_name(), Some("cpu"));
    }

    #[tokio::test]
    async fn test_process_before_upload_is_not_ready() {
        let mut controller = ready().await;
        let err = controller.process().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotReady);
        assert_eq!(controller.download().unwrap_err().kind(), ErrorKind::NotReady);
    }

    #[tokio::test]
    async fn test_upload_before_initialize_is_not_ready() {
        let mut controller = PipelineController::new(cpu_config());
        let err = controller.upload_image(sample_image()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotReady);
        assert_eq!(controller.state(), PipelineState::Uninitialized);
    }

    #[tokio::test]
    async fn test_zero_sized_upload_is_rejected() {
        let mut controller = ready().await;
        let empty = ImageBuffer::new(0, 0, Vec::new()).unwrap();
        let err = controller.upload_image(empty).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(controller.state(), PipelineState::Initialized);
        assert_eq!(controller.dimensions(), None);
    }

    #[tokio::test]
    async fn test_process_is_idempotent() {
        let mut controller = ready().await;
        controller.upload_image(sample_image()).unwrap();
        controller.parameters_mut().set_exposure(0.7);
        controller.parameters_mut().set_vibrance(40.0);
        controller.parameters_mut().set_sharpness(1.0);

        controller.process().unwrap();
        let first = controller.download().unwrap();
        controller.process().unwrap();
        let second = controller.download().unwrap();

        assert_eq!(first, second);
        assert_eq!(controller.state(), PipelineState::Idle);
    }

    #[tokio::test]
    async fn test_reference_is_stable_across_edits() {
        let mut controller = ready().await;
        let image = sample_image();
        controller.upload_image(image.clone()).unwrap();
        let reference = controller.download_reference().unwrap();
        assert_eq!(reference, image);

        controller.parameters_mut().set_contrast(0.9);
        controller.parameters_mut().set_temperature(60.0);
        controller.process().unwrap();
        assert_ne!(controller.download().unwrap(), reference);

        controller.select_display(DisplayTarget::Reference);
        let handle = controller.display_handle().unwrap();
        assert_eq!((handle.width, handle.height), (8, 6));
        assert_eq!(controller.download_reference().unwrap(), reference);
    }

    #[tokio::test]
    async fn test_no_reference_without_auto_capture() {
        init_logging();
        let mut controller = PipelineController::new(PipelineConfig {
            capture_reference_on_upload: false,
            ..cpu_config()
        });
        controller.initialize().await.unwrap();
        controller.upload_image(sample_image()).unwrap();
        assert_eq!(
            controller.download_reference().unwrap_err().kind(),
            ErrorKind::NotReady
        );

        controller.capture_reference().unwrap();
        assert!(controller.download_reference().is_ok());
    }

    #[tokio::test]
    async fn test_reset_parameters_restores_identity() {
        let mut controller = ready().await;
        let image = sample_image();
        controller.upload_image(image.clone()).unwrap();
        controller.parameters_mut().set_saturation(-100.0);
        controller.reset_parameters();
        assert!(controller.parameters().is_neutral());

        controller.process().unwrap();
        assert_eq!(controller.download().unwrap(), image);
    }
}
