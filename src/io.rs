// ============================================================================
// IMAGE I/O: background decoding of selected images and PNG export
// ============================================================================
//
// Decodes run on the rayon pool and report back over an mpsc channel.
// Results are only applied in `ImageLoader::poll` on the owning thread, and
// each carries the generation of the selection that started it: anything
// older than the slot's current generation is dropped unseen.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::mpsc;

use image::codecs::png::PngEncoder;
use image::imageops::{self, FilterType};
use image::{ColorType, ImageEncoder, RgbaImage};

use crate::error::CollageError;
use crate::model::ImageResource;

/// Levels of detail stop once the longest edge would drop below this.
const MIN_LOD_EDGE: u32 = 64;

// ---------------------------------------------------------------------------
//  Decoded images
// ---------------------------------------------------------------------------

/// A fully decoded bitmap plus successively halved copies of it.
///
/// Cloning is cheap; all clones share the same pixel data, which is released
/// when the last clone goes away.
#[derive(Clone)]
pub struct DecodedImage {
    levels: Arc<[RgbaImage]>,
}

impl std::fmt::Debug for DecodedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedImage")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("levels", &self.levels.len())
            .finish()
    }
}

impl DecodedImage {
    pub fn from_rgba(image: RgbaImage) -> Self {
        let mut levels = vec![image];
        loop {
            let Some(prev) = levels.last() else { break };
            let (w, h) = (prev.width(), prev.height());
            if w.max(h) / 2 < MIN_LOD_EDGE {
                break;
            }
            let next = imageops::resize(prev, (w / 2).max(1), (h / 2).max(1), FilterType::Triangle);
            levels.push(next);
        }
        Self { levels: levels.into() }
    }

    /// Natural width in pixels.
    pub fn width(&self) -> u32 {
        self.base().width()
    }

    /// Natural height in pixels.
    pub fn height(&self) -> u32 {
        self.base().height()
    }

    pub fn base(&self) -> &RgbaImage {
        &self.levels[0]
    }

    pub fn levels(&self) -> &[RgbaImage] {
        &self.levels
    }

    /// The smallest level that still has at least one pixel per output pixel
    /// when the image is drawn at `scale` (output pixels per natural pixel).
    pub fn level_for_scale(&self, scale: f32) -> &RgbaImage {
        let needed = self.width() as f32 * scale.abs();
        self.levels
            .iter()
            .rev()
            .find(|lvl| lvl.width() as f32 >= needed)
            .unwrap_or(&self.levels[0])
    }
}

/// Decode encoded image bytes (PNG, JPEG, WebP, BMP) synchronously.
pub fn decode_image(bytes: &[u8]) -> Result<DecodedImage, CollageError> {
    let img = image::load_from_memory(bytes)?.to_rgba8();
    if img.width() == 0 || img.height() == 0 {
        return Err(CollageError::Decode("image has no pixels".to_string()));
    }
    Ok(DecodedImage::from_rgba(img))
}

// ---------------------------------------------------------------------------
//  Background loader
// ---------------------------------------------------------------------------

/// The two image layers of a collage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LayerSlot {
    /// The portrait photo.
    Primary,
    /// The pattern drawn inside the band.
    Secondary,
}

impl LayerSlot {
    pub fn name(&self) -> &'static str {
        match self {
            LayerSlot::Primary => "primary",
            LayerSlot::Secondary => "secondary",
        }
    }

    fn index(&self) -> usize {
        match self {
            LayerSlot::Primary => 0,
            LayerSlot::Secondary => 1,
        }
    }
}

/// Receives decode failures.  A failed layer is simply left absent.
pub trait DecodeObserver {
    fn decode_failed(&self, slot: LayerSlot, label: &str, error: &CollageError);
}

/// Default observer: writes failures to the session log.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogObserver;

impl DecodeObserver for LogObserver {
    fn decode_failed(&self, slot: LayerSlot, label: &str, error: &CollageError) {
        log_warn!("Decoding {} image '{}' failed: {}", slot.name(), label, error);
    }
}

/// Result delivered from a background decode.
enum DecodeResult {
    Decoded {
        slot: LayerSlot,
        generation: u64,
        image: DecodedImage,
    },
    Failed {
        slot: LayerSlot,
        generation: u64,
        label: String,
        error: CollageError,
    },
}

impl DecodeResult {
    fn target(&self) -> (LayerSlot, u64) {
        match self {
            DecodeResult::Decoded { slot, generation, .. } => (*slot, *generation),
            DecodeResult::Failed { slot, generation, .. } => (*slot, *generation),
        }
    }
}

#[derive(Default)]
struct SlotState {
    generation: u64,
    pending: bool,
    decoded: Option<DecodedImage>,
}

pub struct ImageLoader {
    slots: [SlotState; 2],
    next_generation: u64,
    sender: mpsc::Sender<DecodeResult>,
    receiver: mpsc::Receiver<DecodeResult>,
    observer: Box<dyn DecodeObserver>,
}

impl Default for ImageLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageLoader {
    pub fn new() -> Self {
        Self::with_observer(Box::new(LogObserver))
    }

    pub fn with_observer(observer: Box<dyn DecodeObserver>) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            slots: Default::default(),
            next_generation: 1,
            sender,
            receiver,
            observer,
        }
    }

    /// Start decoding `resource` into `slot`.  The slot's previous bitmap is
    /// dropped immediately and any decode still in flight for it is
    /// superseded.
    pub fn select(&mut self, slot: LayerSlot, resource: &ImageResource) {
        let generation = self.bump(slot);
        let state = &mut self.slots[slot.index()];
        state.pending = true;

        let sender = self.sender.clone();
        let bytes = Arc::clone(&resource.bytes);
        let label = resource.label.clone();
        rayon::spawn(move || {
            let outcome = catch_unwind(AssertUnwindSafe(|| decode_image(&bytes)))
                .unwrap_or_else(|_| Err(CollageError::Decode("decoder panicked".to_string())));
            let msg = match outcome {
                Ok(image) => DecodeResult::Decoded { slot, generation, image },
                Err(error) => DecodeResult::Failed { slot, generation, label, error },
            };
            let _ = sender.send(msg);
        });
    }

    /// Forget the slot's image; a decode still in flight will be ignored.
    pub fn clear(&mut self, slot: LayerSlot) {
        self.bump(slot);
    }

    fn bump(&mut self, slot: LayerSlot) -> u64 {
        let generation = self.next_generation;
        self.next_generation += 1;
        let state = &mut self.slots[slot.index()];
        state.generation = generation;
        state.pending = false;
        state.decoded = None;
        generation
    }

    pub fn decoded(&self, slot: LayerSlot) -> Option<&DecodedImage> {
        self.slots[slot.index()].decoded.as_ref()
    }

    pub fn is_pending(&self, slot: LayerSlot) -> bool {
        self.slots[slot.index()].pending
    }

    fn any_pending(&self) -> bool {
        self.slots.iter().any(|s| s.pending)
    }

    /// Apply every completion that has arrived.  Returns whether a slot now
    /// holds a new bitmap.
    pub fn poll(&mut self) -> bool {
        let mut changed = false;
        while let Ok(result) = self.receiver.try_recv() {
            changed |= self.apply(result);
        }
        changed
    }

    /// Block until no slot has a decode in flight, applying completions as
    /// they arrive.  Returns whether a slot now holds a new bitmap.
    pub fn wait_pending(&mut self) -> bool {
        let mut changed = self.poll();
        while self.any_pending() {
            match self.receiver.recv() {
                Ok(result) => changed |= self.apply(result),
                Err(_) => break,
            }
        }
        changed
    }

    fn apply(&mut self, result: DecodeResult) -> bool {
        let (slot, generation) = result.target();
        let state = &mut self.slots[slot.index()];
        if generation != state.generation {
            log_info!(
                "Discarding stale {} decode (generation {}, current {})",
                slot.name(),
                generation,
                state.generation
            );
            return false;
        }
        state.pending = false;
        match result {
            DecodeResult::Decoded { image, .. } => {
                log_info!("Decoded {} image: {}x{}", slot.name(), image.width(), image.height());
                state.decoded = Some(image);
                true
            }
            DecodeResult::Failed { label, error, .. } => {
                self.observer.decode_failed(slot, &label, &error);
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
//  Export
// ---------------------------------------------------------------------------

/// A finished frame encoded for download.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportedFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Encode `frame` as PNG and name it after `fragment` (usually the name label).
pub fn export_png(frame: &RgbaImage, fragment: &str) -> Result<ExportedFile, CollageError> {
    let mut bytes = Vec::new();
    let encoder = PngEncoder::new(&mut bytes);
    encoder.write_image(frame.as_raw(), frame.width(), frame.height(), ColorType::Rgba8)?;
    Ok(ExportedFile { file_name: export_file_name(fragment), bytes })
}

/// `collage_<fragment>.png`, with characters that are unsafe in file names
/// replaced by `_`.  A blank fragment gives `collage.png`.
pub fn export_file_name(fragment: &str) -> String {
    let fragment = fragment.trim();
    if fragment.is_empty() {
        return "collage.png".to_string();
    }
    let safe: String = fragment
        .chars()
        .map(|c| {
            if c.is_control() || c.is_whitespace() || matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') {
                '_'
            } else {
                c
            }
        })
        .collect();
    format!("collage_{}.png", safe)
}
