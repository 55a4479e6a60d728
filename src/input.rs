use std::collections::HashSet;

use glam::{Vec2, Vec4};
use winit::event::{ElementState, MouseButton, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

use crate::render_graph::mouse_uniform;

/// Keyboard and mouse state for the host window.
///
/// Besides plain key tracking this keeps the `iMouse` position, which only
/// follows the cursor while the left button is held and otherwise stays
/// where the last drag ended.
#[derive(Debug, Default)]
pub struct Input {
    keys_down: HashSet<KeyCode>,
    keys_pressed: HashSet<KeyCode>,
    mouse_buttons_down: HashSet<MouseButton>,
    cursor: Vec2,
    drag: Vec2,
}

impl Input {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call at the start of each frame to reset per-frame state.
    pub fn begin_frame(&mut self) {
        self.keys_pressed.clear();
    }

    /// Process a window event and update input state.
    pub fn handle_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(key) = event.physical_key {
                    match event.state {
                        ElementState::Pressed => {
                            if self.keys_down.insert(key) {
                                self.keys_pressed.insert(key);
                            }
                        }
                        ElementState::Released => {
                            self.keys_down.remove(&key);
                        }
                    }
                }
            }
            WindowEvent::MouseInput { state, button, .. } => match state {
                ElementState::Pressed => {
                    self.mouse_buttons_down.insert(*button);
                    if *button == MouseButton::Left {
                        self.drag = self.cursor;
                    }
                }
                ElementState::Released => {
                    self.mouse_buttons_down.remove(button);
                }
            },
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor_moved(Vec2::new(position.x as f32, position.y as f32));
            }
            WindowEvent::Focused(false) => {
                self.keys_down.clear();
                self.mouse_buttons_down.clear();
            }
            _ => {}
        }
    }

    fn cursor_moved(&mut self, position: Vec2) {
        self.cursor = position;
        if self.mouse_down(MouseButton::Left) {
            self.drag = position;
        }
    }

    pub fn key_down(&self, key: KeyCode) -> bool {
        self.keys_down.contains(&key)
    }

    /// Returns true if the key was pressed this frame.
    pub fn key_pressed(&self, key: KeyCode) -> bool {
        self.keys_pressed.contains(&key)
    }

    pub fn mouse_down(&self, button: MouseButton) -> bool {
        self.mouse_buttons_down.contains(&button)
    }

    /// Current cursor position in window pixels.
    pub fn mouse_position(&self) -> Vec2 {
        self.cursor
    }

    /// `iMouse` for a preview of `preview` pixels shown in a window of
    /// `window` pixels. Positions are in preview pixels, top-left origin.
    pub fn mouse(&self, window: Vec2, preview: Vec2) -> Vec4 {
        let scale = if window.x > 0.0 && window.y > 0.0 {
            preview / window
        } else {
            Vec2::ONE
        };
        let position = self.drag * scale;
        mouse_uniform(
            position.x,
            position.y,
            self.mouse_down(MouseButton::Left),
            self.mouse_down(MouseButton::Right),
        )
    }
}
