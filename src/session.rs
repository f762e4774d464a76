// ============================================================================
// SESSION: the single owner of the collage being edited
// ============================================================================
//
// All mutation goes through `CollageSession`: field setters, image selection,
// decode completions and pointer drags.  Each one is followed by a full,
// synchronous redraw into a fresh buffer which replaces the displayed frame
// only once it is complete.

use std::panic::{AssertUnwindSafe, catch_unwind};

use egui::Rect;
use image::RgbaImage;

use crate::canvas::to_canvas_space;
use crate::compositor::Compositor;
use crate::error::CollageError;
use crate::interaction::{CursorHint, DragController, HitTarget, PointerEvent};
use crate::io::{DecodedImage, ExportedFile, ImageLoader, LayerSlot, export_png};
use crate::model::{CANVAS_HEIGHT, CANVAS_WIDTH, CollageConfiguration, Color, ImageResource, Transform};

pub struct CollageSession {
    config: CollageConfiguration,
    /// Incremented on every configuration change.
    version: u64,
    loader: ImageLoader,
    drag: DragController,
    compositor: Compositor,
    /// Where the canvas is displayed; `None` until mounted.
    surface: Option<Rect>,
    frame: Option<RgbaImage>,
}

impl CollageSession {
    pub fn new(compositor: Compositor) -> Self {
        Self::with_loader(compositor, ImageLoader::new())
    }

    pub fn with_loader(compositor: Compositor, loader: ImageLoader) -> Self {
        Self {
            config: CollageConfiguration::default(),
            version: 0,
            loader,
            drag: DragController::new(),
            compositor,
            surface: None,
            frame: None,
        }
    }

    pub fn config(&self) -> &CollageConfiguration {
        &self.config
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// The last successfully rendered frame.
    pub fn frame(&self) -> Option<&RgbaImage> {
        self.frame.as_ref()
    }

    pub fn compositor(&self) -> &Compositor {
        &self.compositor
    }

    pub fn decoded(&self, slot: LayerSlot) -> Option<&DecodedImage> {
        self.loader.decoded(slot)
    }

    pub fn is_decoding(&self, slot: LayerSlot) -> bool {
        self.loader.is_pending(slot)
    }

    pub fn cursor(&self) -> CursorHint {
        self.drag.cursor()
    }

    // -----------------------------------------------------------------------
    //  Surface
    // -----------------------------------------------------------------------

    /// The canvas is now displayed at `bounds` (display space).
    pub fn mount(&mut self, bounds: Rect) {
        self.surface = Some(bounds);
        self.redraw_logged();
    }

    pub fn unmount(&mut self) {
        self.surface = None;
        self.drag.pointer_leave();
    }

    pub fn surface(&self) -> Option<Rect> {
        self.surface
    }

    // -----------------------------------------------------------------------
    //  Configuration
    // -----------------------------------------------------------------------

    pub fn set_name(&mut self, name: impl Into<String>) {
        let name = name.into();
        self.mutate(|c| c.name = name);
    }

    pub fn set_furigana(&mut self, furigana: impl Into<String>) {
        let furigana = furigana.into();
        self.mutate(|c| c.furigana = furigana);
    }

    pub fn set_bg_color1(&mut self, color: Color) {
        self.mutate(|c| c.bg_color1 = color);
    }

    pub fn set_bg_color2(&mut self, color: Color) {
        self.mutate(|c| c.bg_color2 = color);
    }

    /// Hex variants for text inputs.  Invalid strings leave the color as is.
    pub fn set_bg_color1_hex(&mut self, hex: &str) -> Result<(), CollageError> {
        let color = Color::from_hex(hex)?;
        self.set_bg_color1(color);
        Ok(())
    }

    pub fn set_bg_color2_hex(&mut self, hex: &str) -> Result<(), CollageError> {
        let color = Color::from_hex(hex)?;
        self.set_bg_color2(color);
        Ok(())
    }

    pub fn set_primary_transform(&mut self, transform: Transform) {
        self.mutate(|c| c.primary_transform = transform);
    }

    pub fn set_secondary_transform(&mut self, transform: Transform) {
        self.mutate(|c| c.secondary_transform = transform);
    }

    /// Start over with a default configuration and no images.
    pub fn reset(&mut self) {
        self.loader.clear(LayerSlot::Primary);
        self.loader.clear(LayerSlot::Secondary);
        self.drag = DragController::new();
        self.mutate(|c| *c = CollageConfiguration::default());
    }

    // -----------------------------------------------------------------------
    //  Images
    // -----------------------------------------------------------------------

    /// Select a new image for `slot` and start decoding it.  The layer is
    /// absent until the decode lands (see [`Self::poll_decodes`]).
    pub fn select_image(&mut self, slot: LayerSlot, resource: ImageResource) {
        log_info!("Selected {} image '{}' ({} bytes)", slot.name(), resource.label, resource.bytes.len());
        self.loader.select(slot, &resource);
        self.mutate(|c| *image_field(c, slot) = Some(resource));
    }

    pub fn clear_image(&mut self, slot: LayerSlot) {
        self.loader.clear(slot);
        self.mutate(|c| *image_field(c, slot) = None);
    }

    /// Apply finished decodes; redraws if a layer appeared.
    pub fn poll_decodes(&mut self) -> bool {
        let changed = self.loader.poll();
        if changed {
            self.redraw_logged();
        }
        changed
    }

    /// Block until every selected image has finished decoding.
    pub fn wait_for_decodes(&mut self) -> bool {
        let changed = self.loader.wait_pending();
        if changed {
            self.redraw_logged();
        }
        changed
    }

    // -----------------------------------------------------------------------
    //  Pointer
    // -----------------------------------------------------------------------

    /// Feed one display-space pointer event.  A drag that moves the portrait
    /// redraws immediately.
    pub fn handle_pointer(&mut self, event: &PointerEvent) -> CursorHint {
        let surface = self.surface;
        let target = self.loader.decoded(LayerSlot::Primary).map(|img| HitTarget {
            image_w: img.width(),
            image_h: img.height(),
            margin: self.compositor.settings().primary_margin,
        });
        let outcome = self.drag.handle(
            event,
            |p| to_canvas_space(p, surface, CANVAS_WIDTH, CANVAS_HEIGHT),
            &mut self.config.primary_transform,
            target.as_ref(),
        );
        if outcome.moved {
            self.version += 1;
            self.redraw_logged();
        }
        outcome.cursor
    }

    // -----------------------------------------------------------------------
    //  Rendering and export
    // -----------------------------------------------------------------------

    /// Render the current state without touching the displayed frame.
    pub fn render(&self) -> RgbaImage {
        self.compositor.render(
            &self.config,
            self.loader.decoded(LayerSlot::Primary),
            self.loader.decoded(LayerSlot::Secondary),
        )
    }

    /// Re-render into the displayed frame.  The old frame is kept if the
    /// surface is not mounted or the render fails.
    pub fn redraw(&mut self) -> Result<(), CollageError> {
        if self.surface.is_none() {
            return Err(CollageError::SurfaceUnavailable);
        }
        match catch_unwind(AssertUnwindSafe(|| self.render())) {
            Ok(frame) => {
                self.frame = Some(frame);
                Ok(())
            }
            Err(_) => {
                log_err!("Render of version {} panicked; keeping previous frame", self.version);
                Ok(())
            }
        }
    }

    fn redraw_logged(&mut self) {
        if let Err(e) = self.redraw() {
            log_info!("Skipped redraw of version {}: {}", self.version, e);
        }
    }

    /// Encode the collage as PNG, named after the name label.  Uses the
    /// displayed frame when there is one, otherwise renders off-screen.
    pub fn export(&self) -> Result<ExportedFile, CollageError> {
        let file = match &self.frame {
            Some(frame) => export_png(frame, &self.config.name),
            None => export_png(&self.render(), &self.config.name),
        };
        match file {
            Ok(f) => {
                log_info!("Exported {} ({} bytes)", f.file_name, f.bytes.len());
                Ok(f)
            }
            Err(e) => {
                log_err!("Export failed: {}", e);
                Err(e)
            }
        }
    }

    fn mutate<F>(&mut self, change: F)
    where
        F: FnOnce(&mut CollageConfiguration),
    {
        change(&mut self.config);
        self.version += 1;
        self.redraw_logged();
    }
}

fn image_field(config: &mut CollageConfiguration, slot: LayerSlot) -> &mut Option<ImageResource> {
    match slot {
        LayerSlot::Primary => &mut config.primary_image,
        LayerSlot::Secondary => &mut config.secondary_image,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interaction::PointerInput;
    use crate::ops::text::FontSet;
    use crate::settings::RenderSettings;
    use egui::{Pos2, Vec2};
    use image::Rgba;

    fn session() -> CollageSession {
        CollageSession::new(Compositor::new(RenderSettings::default(), FontSet::empty()))
    }

    fn png(w: u32, h: u32) -> Vec<u8> {
        export_png(&RgbaImage::from_pixel(w, h, Rgba([0, 0, 255, 255])), "x").unwrap().bytes
    }

    fn half_size() -> Rect {
        Rect::from_min_size(Pos2::ZERO, Vec2::new(450.0, 600.0))
    }

    #[test]
    fn unmounted_session_skips_redraw_but_records_changes() {
        let mut s = session();
        s.set_name("たろう");
        assert_eq!(s.version(), 1);
        assert!(s.frame().is_none());
        assert!(matches!(s.redraw(), Err(CollageError::SurfaceUnavailable)));

        s.mount(half_size());
        assert_eq!(s.frame().map(|f| f.dimensions()), Some((CANVAS_WIDTH, CANVAS_HEIGHT)));
    }

    #[test]
    fn every_mutation_redraws() {
        let mut s = session();
        s.mount(half_size());
        s.set_bg_color1(Color::rgb(0, 0, 0));
        assert_eq!(*s.frame().unwrap().get_pixel(5, 5), Rgba([0, 0, 0, 255]));
        s.set_bg_color1_hex("#102030").unwrap();
        assert_eq!(*s.frame().unwrap().get_pixel(5, 5), Rgba([0x10, 0x20, 0x30, 255]));
        assert_eq!(s.version(), 2);
    }

    #[test]
    fn invalid_hex_changes_nothing() {
        let mut s = session();
        let before = s.config().bg_color2;
        assert!(matches!(s.set_bg_color2_hex("pink"), Err(CollageError::InvalidColor(_))));
        assert_eq!(s.config().bg_color2, before);
        assert_eq!(s.version(), 0);
    }

    #[test]
    fn dragging_on_a_scaled_surface_moves_the_portrait() {
        let mut s = session();
        s.mount(half_size());
        s.select_image(LayerSlot::Primary, ImageResource::new("me.png", png(74, 104)));
        assert!(s.wait_for_decodes());
        assert!(s.decoded(LayerSlot::Primary).is_some());

        let at = |x: f32, y: f32| PointerInput::Mouse(Pos2::new(x, y));
        assert_eq!(s.handle_pointer(&PointerEvent::Move(at(225.0, 300.0))), CursorHint::Grab);
        assert_eq!(s.handle_pointer(&PointerEvent::Down(at(225.0, 300.0))), CursorHint::Grabbing);
        let v = s.version();
        s.handle_pointer(&PointerEvent::Move(at(235.0, 295.0)));
        assert_eq!(s.version(), v + 1);
        assert_eq!(s.config().primary_transform.offset(), Vec2::new(20.0, -10.0));
        s.handle_pointer(&PointerEvent::Up);

        // The redrawn frame has the portrait centered 20 units to the right.
        let frame = s.frame().unwrap();
        assert_eq!(*frame.get_pixel(470, 590), Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn clearing_an_image_removes_its_layer() {
        let mut s = session();
        s.mount(half_size());
        s.select_image(LayerSlot::Primary, ImageResource::new("me.png", png(10, 10)));
        s.wait_for_decodes();
        s.clear_image(LayerSlot::Primary);
        assert!(s.config().primary_image.is_none());
        assert!(s.decoded(LayerSlot::Primary).is_none());
        assert_eq!(*s.frame().unwrap().get_pixel(450, 300), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn export_uses_name_label() {
        let mut s = session();
        s.set_name("たろう");
        let file = s.export().unwrap();
        assert_eq!(file.file_name, "collage_たろう.png");
        let decoded = image::load_from_memory(&file.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (CANVAS_WIDTH, CANVAS_HEIGHT));
    }

    #[test]
    fn reset_restores_defaults() {
        let mut s = session();
        s.set_name("x");
        s.set_primary_transform(Transform { x: 3.0, ..Transform::IDENTITY });
        s.reset();
        assert_eq!(s.config().name, CollageConfiguration::default().name);
        assert_eq!(s.config().primary_transform, Transform::IDENTITY);
    }
}
