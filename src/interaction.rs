// ============================================================================
// INTERACTION: dragging the primary layer directly on the canvas
// ============================================================================
//
// Two states:
//
//   Idle { hover } --down inside layer--> Dragging(session)
//   Dragging       --move-->             Dragging   (offset = anchor + delta)
//   Dragging       --up | leave-->       Idle
//   Idle           --move-->             Idle       (hover flag refreshed)
//
// Mouse and touch are unified into one logical pointer; with several touches
// only the first counts, so there is never more than one drag.

use egui::{Pos2, Vec2};

use crate::model::{CANVAS_HEIGHT, CANVAS_WIDTH, Transform};
use crate::ops::hit_test::is_inside_primary_layer;

/// Raw pointer sample in display space.
#[derive(Clone, Debug, PartialEq)]
pub enum PointerInput {
    Mouse(Pos2),
    /// All currently active touch points, in the order they went down.
    Touch(Vec<Pos2>),
}

impl PointerInput {
    /// The single logical pointer position, if any.
    pub fn position(&self) -> Option<Pos2> {
        match self {
            PointerInput::Mouse(p) => Some(*p),
            PointerInput::Touch(points) => points.first().copied(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum PointerEvent {
    Down(PointerInput),
    Move(PointerInput),
    Up,
    Leave,
}

/// What the pointer is allowed to grab: the primary image's natural size and
/// the margin the compositor fits it into.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HitTarget {
    pub image_w: u32,
    pub image_h: u32,
    pub margin: f32,
}

impl HitTarget {
    pub fn contains(&self, point: Pos2, transform: &Transform) -> bool {
        is_inside_primary_layer(
            point,
            transform,
            self.image_w,
            self.image_h,
            CANVAS_WIDTH,
            CANVAS_HEIGHT,
            self.margin,
        )
    }
}

/// Cursor affordance for the host UI.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CursorHint {
    #[default]
    Default,
    /// Hovering the draggable layer.
    Grab,
    /// Drag in progress.
    Grabbing,
}

/// Anchors captured when a drag begins.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DragSession {
    /// Canvas-space point where the drag began.
    pub anchor_point: Pos2,
    /// Primary layer offset at drag start.
    pub anchor_offset: Vec2,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DragState {
    Idle { hover: bool },
    Dragging(DragSession),
}

impl Default for DragState {
    fn default() -> Self {
        DragState::Idle { hover: false }
    }
}

/// Result of feeding one event to the controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct DragOutcome {
    /// The transform offset was written.
    pub moved: bool,
    pub cursor: CursorHint,
}

#[derive(Clone, Debug, Default)]
pub struct DragController {
    state: DragState,
}

impl DragController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> DragState {
        self.state
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, DragState::Dragging(_))
    }

    pub fn is_hovering(&self) -> bool {
        matches!(self.state, DragState::Idle { hover: true })
    }

    pub fn cursor(&self) -> CursorHint {
        match self.state {
            DragState::Dragging(_) => CursorHint::Grabbing,
            DragState::Idle { hover: true } => CursorHint::Grab,
            DragState::Idle { hover: false } => CursorHint::Default,
        }
    }

    /// Start a drag if `point` (canvas space) is on the layer.  Ignored while
    /// a drag is already running.  Returns whether a drag started.
    pub fn pointer_down(&mut self, point: Pos2, transform: &Transform, target: Option<&HitTarget>) -> bool {
        if self.is_dragging() {
            return false;
        }
        match target {
            Some(t) if t.contains(point, transform) => {
                self.state = DragState::Dragging(DragSession {
                    anchor_point: point,
                    anchor_offset: transform.offset(),
                });
                true
            }
            _ => false,
        }
    }

    /// While dragging, move the layer so it follows the pointer.  Offsets are
    /// written unclamped.  While idle, refresh the hover flag.
    /// Returns whether the transform was written.
    pub fn pointer_move(&mut self, point: Pos2, transform: &mut Transform, target: Option<&HitTarget>) -> bool {
        match self.state {
            DragState::Dragging(session) => {
                transform.set_offset(session.anchor_offset + (point - session.anchor_point));
                true
            }
            DragState::Idle { .. } => {
                let hover = target.is_some_and(|t| t.contains(point, transform));
                self.state = DragState::Idle { hover };
                false
            }
        }
    }

    pub fn pointer_up(&mut self) {
        // The layer tracked the pointer for the whole drag, so it is still under it.
        let hover = self.is_dragging() || self.is_hovering();
        self.state = DragState::Idle { hover };
    }

    pub fn pointer_leave(&mut self) {
        self.state = DragState::Idle { hover: false };
    }

    /// Feed one display-space event.  `to_canvas` maps display positions to
    /// canvas space (see [`crate::canvas::to_canvas_space`]).
    pub fn handle<F>(
        &mut self,
        event: &PointerEvent,
        to_canvas: F,
        transform: &mut Transform,
        target: Option<&HitTarget>,
    ) -> DragOutcome
    where
        F: Fn(Pos2) -> Pos2,
    {
        let moved = match event {
            PointerEvent::Down(input) => {
                if let Some(p) = input.position() {
                    self.pointer_down(to_canvas(p), transform, target);
                }
                false
            }
            PointerEvent::Move(input) => match input.position() {
                Some(p) => self.pointer_move(to_canvas(p), transform, target),
                None => false,
            },
            PointerEvent::Up => {
                self.pointer_up();
                false
            }
            PointerEvent::Leave => {
                self.pointer_leave();
                false
            }
        };
        DragOutcome { moved, cursor: self.cursor() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 740×1040 fits the 80-unit margin exactly: the layer box is [80,820]×[80,1120].
    const TARGET: HitTarget = HitTarget { image_w: 740, image_h: 1040, margin: 80.0 };

    fn identity_map(p: Pos2) -> Pos2 {
        p
    }

    #[test]
    fn touch_uses_first_point_and_ignores_empty() {
        let t = PointerInput::Touch(vec![Pos2::new(1.0, 2.0), Pos2::new(9.0, 9.0)]);
        assert_eq!(t.position(), Some(Pos2::new(1.0, 2.0)));
        assert_eq!(PointerInput::Touch(vec![]).position(), None);
    }

    #[test]
    fn drag_moves_by_pointer_delta() {
        let mut c = DragController::new();
        let mut t = Transform { x: 10.0, y: -20.0, ..Transform::IDENTITY };
        assert!(c.pointer_down(Pos2::new(460.0, 580.0), &t, Some(&TARGET)));
        assert!(c.pointer_move(Pos2::new(500.0, 600.0), &mut t, Some(&TARGET)));
        assert_eq!((t.x, t.y), (50.0, 0.0));
        // Deltas are measured from the anchor, not from the previous move.
        c.pointer_move(Pos2::new(470.0, 590.0), &mut t, Some(&TARGET));
        assert_eq!((t.x, t.y), (20.0, -10.0));
    }

    #[test]
    fn down_outside_stays_idle() {
        let mut c = DragController::new();
        let mut t = Transform::IDENTITY;
        assert!(!c.pointer_down(Pos2::new(10.0, 10.0), &t, Some(&TARGET)));
        assert!(!c.pointer_move(Pos2::new(500.0, 500.0), &mut t, Some(&TARGET)));
        assert_eq!(t, Transform::IDENTITY);
    }

    #[test]
    fn no_image_means_nothing_to_grab() {
        let mut c = DragController::new();
        assert!(!c.pointer_down(Pos2::new(450.0, 600.0), &Transform::IDENTITY, None));
        assert_eq!(c.cursor(), CursorHint::Default);
    }

    #[test]
    fn offsets_are_not_clamped() {
        let mut c = DragController::new();
        let mut t = Transform::IDENTITY;
        c.pointer_down(Pos2::new(450.0, 600.0), &t, Some(&TARGET));
        c.pointer_move(Pos2::new(5450.0, -3400.0), &mut t, Some(&TARGET));
        assert_eq!((t.x, t.y), (5000.0, -4000.0));
    }

    #[test]
    fn second_down_during_drag_is_ignored() {
        let mut c = DragController::new();
        let mut t = Transform::IDENTITY;
        c.pointer_down(Pos2::new(450.0, 600.0), &t, Some(&TARGET));
        assert!(!c.pointer_down(Pos2::new(300.0, 300.0), &t, Some(&TARGET)));
        c.pointer_move(Pos2::new(460.0, 600.0), &mut t, Some(&TARGET));
        assert_eq!(t.x, 10.0);
    }

    #[test]
    fn leave_and_up_end_the_drag() {
        let mut c = DragController::new();
        let mut t = Transform::IDENTITY;
        c.pointer_down(Pos2::new(450.0, 600.0), &t, Some(&TARGET));
        c.pointer_leave();
        assert!(!c.is_dragging());
        assert!(!c.pointer_move(Pos2::new(0.0, 0.0), &mut t, Some(&TARGET)));
        assert_eq!(t, Transform::IDENTITY);

        c.pointer_down(Pos2::new(450.0, 600.0), &t, Some(&TARGET));
        c.pointer_up();
        assert_eq!(c.cursor(), CursorHint::Grab);
    }

    #[test]
    fn release_keeps_hover_until_the_next_move() {
        let mut c = DragController::new();
        let mut t = Transform::IDENTITY;
        c.pointer_down(Pos2::new(450.0, 600.0), &t, Some(&TARGET));
        c.pointer_move(Pos2::new(460.0, 600.0), &mut t, Some(&TARGET));
        c.pointer_up();
        assert!(c.is_hovering());
        assert_eq!(c.cursor(), CursorHint::Grab);

        c.pointer_move(Pos2::new(10.0, 10.0), &mut t, Some(&TARGET));
        assert!(!c.is_hovering());
        assert_eq!(c.cursor(), CursorHint::Default);
        assert_eq!((t.x, t.y), (10.0, 0.0));

        // A press that grabbed nothing does not leave a hover behind.
        c.pointer_down(Pos2::new(10.0, 10.0), &t, Some(&TARGET));
        c.pointer_up();
        assert!(!c.is_hovering());
    }

    #[test]
    fn hover_drives_cursor_hint() {
        let mut c = DragController::new();
        let mut t = Transform::IDENTITY;
        let ev = |p: Pos2| PointerEvent::Move(PointerInput::Mouse(p));

        let out = c.handle(&ev(Pos2::new(450.0, 600.0)), identity_map, &mut t, Some(&TARGET));
        assert_eq!(out, DragOutcome { moved: false, cursor: CursorHint::Grab });

        let out = c.handle(&ev(Pos2::new(10.0, 10.0)), identity_map, &mut t, Some(&TARGET));
        assert_eq!(out.cursor, CursorHint::Default);

        let down = PointerEvent::Down(PointerInput::Mouse(Pos2::new(450.0, 600.0)));
        assert_eq!(c.handle(&down, identity_map, &mut t, Some(&TARGET)).cursor, CursorHint::Grabbing);

        let out = c.handle(&ev(Pos2::new(455.0, 600.0)), identity_map, &mut t, Some(&TARGET));
        assert_eq!(out, DragOutcome { moved: true, cursor: CursorHint::Grabbing });
    }

    #[test]
    fn handle_maps_display_space_first() {
        let mut c = DragController::new();
        let mut t = Transform::IDENTITY;
        // Display at half resolution: every display unit is two canvas units.
        let half = |p: Pos2| Pos2::new(p.x * 2.0, p.y * 2.0);
        let down = PointerEvent::Down(PointerInput::Touch(vec![Pos2::new(225.0, 300.0)]));
        c.handle(&down, half, &mut t, Some(&TARGET));
        let mv = PointerEvent::Move(PointerInput::Touch(vec![Pos2::new(235.0, 300.0), Pos2::new(0.0, 0.0)]));
        c.handle(&mv, half, &mut t, Some(&TARGET));
        assert_eq!((t.x, t.y), (20.0, 0.0));
    }
}
