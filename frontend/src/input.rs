use std::collections::HashMap;

use gba_core::machine::InputButton;
use sdl2::keyboard::Scancode;

/// Maps SDL scancodes to GBA buttons.
pub struct KeyMap {
    map: HashMap<Scancode, InputButton>,
}

impl KeyMap {
    pub fn new() -> Self {
        Self { map: HashMap::new() }
    }

    pub fn bind(&mut self, scancode: Scancode, button: InputButton) {
        self.map.insert(scancode, button);
    }

    pub fn get(&self, scancode: Scancode) -> Option<InputButton> {
        self.map.get(&scancode).copied()
    }
}

/// Default bindings: arrow keys for D-pad, Z/X for A/B, Enter/RShift for
/// Start/Select, Q/W for the shoulder buttons.
pub fn default_key_map() -> KeyMap {
    let mut km = KeyMap::new();
    km.bind(Scancode::Up, InputButton::Up);
    km.bind(Scancode::Down, InputButton::Down);
    km.bind(Scancode::Left, InputButton::Left);
    km.bind(Scancode::Right, InputButton::Right);
    km.bind(Scancode::Z, InputButton::A);
    km.bind(Scancode::X, InputButton::B);
    km.bind(Scancode::Return, InputButton::Start);
    km.bind(Scancode::RShift, InputButton::Select);
    km.bind(Scancode::Q, InputButton::L);
    km.bind(Scancode::W, InputButton::R);
    km
}
