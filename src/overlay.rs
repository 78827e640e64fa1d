//! Position and drag handling for the text box on top of the background.

use std::ops::Sub;

/// Image-pixel coordinates. Signed: the box may leave the image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl Sub for Position {
    type Output = Position;

    fn sub(self, rhs: Position) -> Position {
        Position::new(self.x - rhs.x, self.y - rhs.y)
    }
}

pub const DEFAULT_POSITION: Position = Position::new(20, 40);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DragState {
    #[default]
    Idle,
    Dragging {
        grab_offset: Position,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overlay {
    pub position: Position,
    pub drag: DragState,
}

impl Default for Overlay {
    fn default() -> Self {
        Self {
            position: DEFAULT_POSITION,
            drag: DragState::Idle,
        }
    }
}

impl Overlay {
    pub fn is_dragging(&self) -> bool {
        matches!(self.drag, DragState::Dragging { .. })
    }

    /// Starts a drag only when the press lands on the handle, so clicks into
    /// the text area stay with the editor.
    pub fn pointer_down(&mut self, pointer: Position, on_handle: bool) {
        if !on_handle {
            return;
        }
        self.drag = DragState::Dragging {
            grab_offset: pointer - self.position,
        };
    }

    pub fn pointer_move(&mut self, pointer: Position) {
        if let DragState::Dragging { grab_offset } = self.drag {
            self.position = pointer - grab_offset;
        }
    }

    /// Ends any drag, wherever the pointer is.
    pub fn pointer_up(&mut self) {
        self.drag = DragState::Idle;
    }

    pub fn nudge(&mut self, dx: i32, dy: i32) {
        self.position = Position::new(self.position.x + dx, self.position.y + dy);
    }
}

/// Maps terminal cells of the preview panel onto image pixels and back.
/// The image is stretched over the whole panel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub left: u16,
    pub top: u16,
    pub cols: u16,
    pub rows: u16,
    pub image_width: u32,
    pub image_height: u32,
}

impl Viewport {
    fn px_per_col(&self) -> f64 {
        self.image_width as f64 / self.cols.max(1) as f64
    }

    fn px_per_row(&self) -> f64 {
        self.image_height as f64 / self.rows.max(1) as f64
    }

    /// Cells left of or above the panel map to negative pixels.
    pub fn to_image(&self, col: u16, row: u16) -> Position {
        let dx = col as i32 - self.left as i32;
        let dy = row as i32 - self.top as i32;
        Position::new(
            (dx as f64 * self.px_per_col()).round() as i32,
            (dy as f64 * self.px_per_row()).round() as i32,
        )
    }

    /// Cell containing `pos`, relative to the terminal (may be negative).
    pub fn to_cell(&self, pos: Position) -> (i32, i32) {
        (
            self.left as i32 + (pos.x as f64 / self.px_per_col()).floor() as i32,
            self.top as i32 + (pos.y as f64 / self.px_per_row()).floor() as i32,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_idle_at_default_position() {
        let overlay = Overlay::default();
        assert_eq!(overlay.position, Position::new(20, 40));
        assert!(!overlay.is_dragging());
    }

    #[test]
    fn press_outside_handle_does_not_drag() {
        let mut overlay = Overlay::default();
        overlay.pointer_down(Position::new(30, 60), false);
        overlay.pointer_move(Position::new(300, 300));
        assert_eq!(overlay.position, DEFAULT_POSITION);
        assert!(!overlay.is_dragging());
    }

    #[test]
    fn drag_keeps_grab_offset() {
        let mut overlay = Overlay::default();
        overlay.pointer_down(Position::new(25, 45), true);
        overlay.pointer_move(Position::new(100, 100));
        overlay.pointer_move(Position::new(205, 145));
        overlay.pointer_up();
        // end pointer minus the (5, 5) grabbed at start
        assert_eq!(overlay.position, Position::new(200, 140));
        assert!(!overlay.is_dragging());

        overlay.pointer_move(Position::new(0, 0));
        assert_eq!(overlay.position, Position::new(200, 140));
    }

    #[test]
    fn release_anywhere_ends_drag_and_no_clamping() {
        let mut overlay = Overlay::default();
        overlay.pointer_down(Position::new(20, 40), true);
        overlay.pointer_move(Position::new(-500, -20));
        assert_eq!(overlay.position, Position::new(-500, -20));
        overlay.pointer_up();
        assert_eq!(overlay.drag, DragState::Idle);
    }

    #[test]
    fn viewport_maps_cells_to_pixels() {
        let vp = Viewport {
            left: 10,
            top: 2,
            cols: 100,
            rows: 50,
            image_width: 1000,
            image_height: 1000,
        };
        assert_eq!(vp.to_image(10, 2), Position::new(0, 0));
        assert_eq!(vp.to_image(20, 7), Position::new(100, 100));
        assert_eq!(vp.to_image(5, 0), Position::new(-50, -40));
        assert_eq!(vp.to_cell(Position::new(100, 100)), (20, 7));
        assert_eq!(vp.to_cell(Position::new(-5, -5)), (9, 1));
    }
}
