//! Pointer gesture state machine.
//!
//! Every platform source (mouse, touch, wheel) is translated into
//! [`PointerEvent`]s first, so the machine itself never touches Bevy input
//! resources and can be driven directly from tests.

use bevy::prelude::*;
use std::time::Duration;

// =============================================================================
// Constants
// =============================================================================

/// Movement past this many screen pixels turns a press into a drag.
pub const DRAG_THRESHOLD_PX: f32 = 5.0;
pub const LONG_PRESS: Duration = Duration::from_millis(500);
/// Zoom factor per wheel notch.
pub const WHEEL_ZOOM_STEP: f32 = 1.1;

pub type PointerId = u64;

// =============================================================================
// Events and Intents
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PointerEvent {
    Down {
        id: PointerId,
        position: Vec2,
        shift: bool,
    },
    Move {
        id: PointerId,
        position: Vec2,
    },
    Up {
        id: PointerId,
        position: Vec2,
    },
    /// Capture lost: the pointer left the window or touches were cancelled.
    Cancel,
    /// Positive notches scroll up.
    Wheel { position: Vec2, notches: f32 },
    /// Secondary (right) button press.
    Secondary { position: Vec2 },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GestureIntent {
    Hover { position: Vec2 },
    Pan { delta: Vec2 },
    ZoomAbout { anchor: Vec2, factor: f32 },
    Tap { position: Vec2, shift: bool },
    LongPress { position: Vec2 },
    ContextMenu { position: Vec2 },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GesturePhase {
    Idle,
    Pressed {
        pointer: PointerId,
        origin: Vec2,
        last: Vec2,
        pressed_at: Duration,
        shift: bool,
    },
    Dragging {
        pointer: PointerId,
        last: Vec2,
    },
    LongPressFired {
        pointer: PointerId,
    },
    Pinching,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CursorAffordance {
    Pointer,
    Grab,
    Grabbing,
}

// =============================================================================
// Controller
// =============================================================================

#[derive(Resource, Debug, Clone)]
pub struct GestureController {
    phase: GesturePhase,
    contacts: Vec<(PointerId, Vec2)>,
    pinch_distance: Option<f32>,
}

impl Default for GestureController {
    fn default() -> Self {
        Self {
            phase: GesturePhase::Idle,
            contacts: Vec::new(),
            pinch_distance: None,
        }
    }
}

impl GestureController {
    pub fn cursor(&self, hovering_system: bool) -> CursorAffordance {
        match self.phase {
            GesturePhase::Dragging { .. } | GesturePhase::Pinching => CursorAffordance::Grabbing,
            _ if hovering_system => CursorAffordance::Pointer,
            _ => CursorAffordance::Grab,
        }
    }

    pub fn handle(&mut self, event: PointerEvent, now: Duration) -> Vec<GestureIntent> {
        match event {
            PointerEvent::Down { id, position, shift } => {
                self.pointer_down(id, position, shift, now)
            }
            PointerEvent::Move { id, position } => self.pointer_move(id, position),
            PointerEvent::Up { id, position } => self.pointer_up(id, position, now),
            PointerEvent::Cancel => {
                self.reset();
                Vec::new()
            }
            PointerEvent::Wheel { position, notches } => {
                if notches == 0.0 || !notches.is_finite() {
                    return Vec::new();
                }
                vec![GestureIntent::ZoomAbout {
                    anchor: position,
                    factor: WHEEL_ZOOM_STEP.powf(notches),
                }]
            }
            PointerEvent::Secondary { position } => {
                vec![GestureIntent::ContextMenu { position }]
            }
        }
    }

    /// Fires the long-press once its timer has elapsed without movement.
    pub fn tick(&mut self, now: Duration) -> Option<GestureIntent> {
        match self.phase {
            GesturePhase::Pressed {
                pointer,
                last,
                pressed_at,
                ..
            } if now.saturating_sub(pressed_at) >= LONG_PRESS => {
                self.phase = GesturePhase::LongPressFired { pointer };
                Some(GestureIntent::LongPress { position: last })
            }
            _ => None,
        }
    }

    fn reset(&mut self) {
        self.phase = GesturePhase::Idle;
        self.contacts.clear();
        self.pinch_distance = None;
    }

    fn contact_distance(&self) -> Option<(f32, Vec2)> {
        match self.contacts.as_slice() {
            [(_, a), (_, b), ..] => Some((a.distance(*b), (*a + *b) * 0.5)),
            _ => None,
        }
    }

    fn pointer_down(
        &mut self,
        id: PointerId,
        position: Vec2,
        shift: bool,
        now: Duration,
    ) -> Vec<GestureIntent> {
        match self.contacts.iter_mut().find(|(contact, _)| *contact == id) {
            Some(contact) => contact.1 = position,
            None => self.contacts.push((id, position)),
        }

        if self.contacts.len() >= 2 {
            // A second finger always takes over from pan and long-press.
            self.phase = GesturePhase::Pinching;
            self.pinch_distance = self.contact_distance().map(|(distance, _)| distance);
            return Vec::new();
        }

        self.phase = GesturePhase::Pressed {
            pointer: id,
            origin: position,
            last: position,
            pressed_at: now,
            shift,
        };
        Vec::new()
    }

    fn pointer_move(&mut self, id: PointerId, position: Vec2) -> Vec<GestureIntent> {
        if let Some(contact) = self.contacts.iter_mut().find(|(contact, _)| *contact == id) {
            contact.1 = position;
        }

        if matches!(self.phase, GesturePhase::Pinching) {
            let mut intents = Vec::new();
            if let Some((distance, midpoint)) = self.contact_distance() {
                if let Some(previous) = self.pinch_distance.filter(|previous| *previous > 0.0) {
                    if distance > 0.0 && distance != previous {
                        intents.push(GestureIntent::ZoomAbout {
                            anchor: midpoint,
                            factor: distance / previous,
                        });
                    }
                }
                self.pinch_distance = Some(distance);
            }
            return intents;
        }

        let mut intents = vec![GestureIntent::Hover { position }];

        match self.phase {
            GesturePhase::Pressed {
                pointer,
                origin,
                pressed_at,
                shift,
                ..
            } if pointer == id => {
                if origin.distance(position) > DRAG_THRESHOLD_PX {
                    self.phase = GesturePhase::Dragging {
                        pointer,
                        last: position,
                    };
                    // The first pan covers the sub-threshold travel too, so the
                    // grabbed point stays under the pointer.
                    intents.push(GestureIntent::Pan { delta: position - origin });
                } else {
                    self.phase = GesturePhase::Pressed {
                        pointer,
                        origin,
                        last: position,
                        pressed_at,
                        shift,
                    };
                }
            }
            GesturePhase::Dragging { pointer, last } if pointer == id => {
                self.phase = GesturePhase::Dragging {
                    pointer,
                    last: position,
                };
                intents.push(GestureIntent::Pan { delta: position - last });
            }
            _ => {}
        }

        intents
    }

    fn pointer_up(&mut self, id: PointerId, position: Vec2, now: Duration) -> Vec<GestureIntent> {
        self.contacts.retain(|(contact, _)| *contact != id);

        match self.phase {
            GesturePhase::Pinching => {
                // Dropping below two fingers ends the gesture outright.
                if self.contacts.len() < 2 {
                    self.reset();
                }
                Vec::new()
            }
            GesturePhase::Pressed {
                pointer,
                pressed_at,
                shift,
                ..
            } if pointer == id => {
                self.phase = GesturePhase::Idle;
                if now.saturating_sub(pressed_at) >= LONG_PRESS {
                    vec![GestureIntent::LongPress { position }]
                } else {
                    vec![GestureIntent::Tap { position, shift }]
                }
            }
            GesturePhase::Dragging { pointer, .. } | GesturePhase::LongPressFired { pointer }
                if pointer == id =>
            {
                self.phase = GesturePhase::Idle;
                Vec::new()
            }
            _ => Vec::new(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
