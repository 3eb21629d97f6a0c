/// RAW image decoding module
///
/// The pipeline core never decodes files itself; it consumes the
/// [`ImageBuffer`](crate::state::data::ImageBuffer) produced here.

pub mod loader;

pub use loader::{load_raw, load_with, DecodedImage, RawDecoder, RawLoaderDecoder, StandardImageDecoder};
