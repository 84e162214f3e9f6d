use std::collections::HashSet;

use glam::Vec2;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Identifier for a physical keyboard key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyCode {
    Named(NamedKey),
    Character(char),
    Digit(u8),
    Function(u8),
}

impl KeyCode {
    /// Parses names such as `"W"`, `"Escape"`, `"Up"` or `"F5"`.
    pub fn from_name(name: &str) -> Option<Self> {
        if let Some(key) = parse_named_key(name) {
            return Some(key);
        }
        let mut chars = name.chars();
        if let (Some(ch), None) = (chars.next(), chars.next()) {
            if ch.is_ascii_alphabetic() {
                return Some(Self::Character(ch.to_ascii_uppercase()));
            }
            if ch.is_ascii_digit() {
                return Some(Self::Digit(ch as u8 - b'0'));
            }
        }
        if let Some(function) = name.strip_prefix('F').or_else(|| name.strip_prefix('f')) {
            if let Ok(index) = function.parse::<u8>() {
                if (1..=25).contains(&index) {
                    return Some(Self::Function(index));
                }
            }
        }
        None
    }
}

fn parse_named_key(name: &str) -> Option<KeyCode> {
    use NamedKey::*;
    let key = match name {
        "Space" => Space,
        "Enter" | "Return" => Enter,
        "Tab" => Tab,
        "Left" => Left,
        "Right" => Right,
        "Up" => Up,
        "Down" => Down,
        "Escape" | "Esc" => Escape,
        "Backspace" => Backspace,
        "PageUp" => PageUp,
        "PageDown" => PageDown,
        "LeftShift" | "LShift" => LeftShift,
        "RightShift" | "RShift" => RightShift,
        "LeftCtrl" | "LControl" => LeftCtrl,
        "RightCtrl" | "RControl" => RightCtrl,
        _ => return None,
    };
    Some(KeyCode::Named(key))
}

/// Friendly names for the non-character keys the camera can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NamedKey {
    Space,
    Enter,
    Tab,
    Left,
    Right,
    Up,
    Down,
    Escape,
    Backspace,
    PageUp,
    PageDown,
    LeftShift,
    RightShift,
    LeftCtrl,
    RightCtrl,
}

/// Everything the frame loop needs from one frame's worth of input events.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameInput {
    pub held: HashSet<KeyCode>,
    /// Pointer motion since the previous frame; +y means "look up".
    pub pointer_delta: Vec2,
    pub scroll: f32,
    pub close_requested: bool,
}

impl FrameInput {
    pub fn is_held(&self, key: KeyCode) -> bool {
        self.held.contains(&key)
    }
}

#[derive(Debug, Default)]
struct PointerState {
    last_position: Option<Vec2>,
    delta: Vec2,
}

/// Input snapshot written by the window event handler and drained once per frame.
#[derive(Debug, Default)]
pub struct InputState {
    keys: RwLock<HashSet<KeyCode>>,
    pointer: RwLock<PointerState>,
    scroll: RwLock<f32>,
    close_requested: RwLock<bool>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_key_down(&self, key: KeyCode) {
        self.keys.write().insert(key);
    }

    pub fn set_key_up(&self, key: KeyCode) {
        self.keys.write().remove(&key);
    }

    pub fn is_key_down(&self, key: KeyCode) -> bool {
        self.keys.read().contains(&key)
    }

    /// Records an absolute cursor position in window pixels.
    ///
    /// The first position after startup only seeds the tracker so the
    /// camera does not jump.
    pub fn set_mouse_position(&self, position: Vec2) {
        let mut pointer = self.pointer.write();
        if let Some(last) = pointer.last_position {
            // Window y grows downwards.
            pointer.delta += Vec2::new(position.x - last.x, last.y - position.y);
        }
        pointer.last_position = Some(position);
    }

    pub fn add_scroll(&self, amount: f32) {
        *self.scroll.write() += amount;
    }

    pub fn request_close(&self) {
        *self.close_requested.write() = true;
    }

    /// Drains accumulated deltas; held keys and the close flag persist.
    pub fn take_frame(&self) -> FrameInput {
        let held = self.keys.read().clone();
        let pointer_delta = std::mem::take(&mut self.pointer.write().delta);
        let scroll = std::mem::take(&mut *self.scroll.write());
        FrameInput {
            held,
            pointer_delta,
            scroll,
            close_requested: *self.close_requested.read(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_named_and_character_keys() {
        assert_eq!(
            KeyCode::from_name("Escape"),
            Some(KeyCode::Named(NamedKey::Escape))
        );
        assert_eq!(KeyCode::from_name("w"), Some(KeyCode::Character('W')));
        assert_eq!(KeyCode::from_name("7"), Some(KeyCode::Digit(7)));
        assert_eq!(KeyCode::from_name("F12"), Some(KeyCode::Function(12)));
        assert_eq!(KeyCode::from_name("F30"), None);
        assert_eq!(KeyCode::from_name("Banana"), None);
    }

    #[test]
    fn first_cursor_position_only_seeds_tracker() {
        let state = InputState::new();
        state.set_mouse_position(Vec2::new(100.0, 100.0));
        assert_eq!(state.take_frame().pointer_delta, Vec2::ZERO);

        state.set_mouse_position(Vec2::new(110.0, 95.0));
        state.set_mouse_position(Vec2::new(115.0, 90.0));
        assert_eq!(state.take_frame().pointer_delta, Vec2::new(15.0, 10.0));
    }

    #[test]
    fn take_frame_drains_deltas_but_keeps_held_keys() {
        let state = InputState::new();
        let w = KeyCode::Character('W');
        state.set_key_down(w);
        state.add_scroll(2.0);

        let first = state.take_frame();
        assert!(first.is_held(w));
        assert_eq!(first.scroll, 2.0);

        let second = state.take_frame();
        assert!(second.is_held(w));
        assert_eq!(second.scroll, 0.0);

        state.set_key_up(w);
        assert!(!state.is_key_down(w));
    }

    #[test]
    fn close_request_is_sticky() {
        let state = InputState::new();
        state.request_close();
        assert!(state.take_frame().close_requested);
        assert!(state.take_frame().close_requested);
    }
}
