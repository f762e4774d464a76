//! Portrait collage renderer.
//!
//! Composes a user photo, an optional pattern image, a tilted accent band and a
//! bilingual name label onto a fixed 900×1200 raster, and exposes the pointer
//! plumbing needed to drag the photo directly on the rendered canvas.
//!
//! The pieces, leaf to root:
//!   - [`model`]        transforms, colors and the collage configuration
//!   - [`canvas`]       screen → canvas coordinate mapping
//!   - [`ops`]          pure raster operations (affine drawing, effects, text, hit testing)
//!   - [`interaction`]  pointer/touch drag state machine
//!   - [`compositor`]   the ordered render pipeline
//!   - [`session`]      owns the configuration and redraws after every mutation
#![allow(clippy::too_many_arguments)]

#[macro_use]
pub mod logger;
pub mod canvas;
pub mod compositor;
pub mod error;
pub mod interaction;
pub mod io;
pub mod model;
pub mod ops;
pub mod session;
pub mod settings;

pub use compositor::Compositor;
pub use error::CollageError;
pub use interaction::{CursorHint, DragController, HitTarget, PointerEvent, PointerInput};
pub use io::{DecodeObserver, DecodedImage, ExportedFile, ImageLoader, LayerSlot, decode_image, export_png};
pub use model::{CANVAS_HEIGHT, CANVAS_WIDTH, CollageConfiguration, Color, ImageResource, Transform};
pub use ops::text::FontSet;
pub use session::CollageSession;
pub use settings::RenderSettings;
