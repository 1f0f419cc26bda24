use crate::error::SyntaxError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Virtual keys the send/hold/release commands can address. Names resolve
/// case-insensitively; the common aliases match what macro authors type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VirtualKey {
    Control,
    Shift,
    Menu,
    Return,
    Escape,
    Space,
    Tab,
    Back,
    Up,
    Down,
    Left,
    Right,
    Key0,
    Key1,
    Key2,
    Key3,
    Key4,
    Key5,
    Key6,
    Key7,
    Key8,
    Key9,
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
    I,
    J,
    K,
    L,
    M,
    N,
    O,
    P,
    Q,
    R,
    S,
    T,
    U,
    V,
    W,
    X,
    Y,
    Z,
    F1,
    F2,
    F3,
    F4,
    F5,
    F6,
    F7,
    F8,
    F9,
    F10,
    F11,
    F12,
    Numpad0,
    Numpad1,
    Numpad2,
    Numpad3,
    Numpad4,
    Numpad5,
    Numpad6,
    Numpad7,
    Numpad8,
    Numpad9,
}

impl FromStr for VirtualKey {
    type Err = SyntaxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = match s.to_ascii_uppercase().as_str() {
            "CTRL" | "CONTROL" => VirtualKey::Control,
            "SHIFT" => VirtualKey::Shift,
            "ALT" | "MENU" => VirtualKey::Menu,
            "ENTER" | "RETURN" => VirtualKey::Return,
            "ESC" | "ESCAPE" => VirtualKey::Escape,
            "SPACE" => VirtualKey::Space,
            "TAB" => VirtualKey::Tab,
            "BACK" | "BACKSPACE" => VirtualKey::Back,
            "UP" => VirtualKey::Up,
            "DOWN" => VirtualKey::Down,
            "LEFT" => VirtualKey::Left,
            "RIGHT" => VirtualKey::Right,
            "0" => VirtualKey::Key0,
            "1" => VirtualKey::Key1,
            "2" => VirtualKey::Key2,
            "3" => VirtualKey::Key3,
            "4" => VirtualKey::Key4,
            "5" => VirtualKey::Key5,
            "6" => VirtualKey::Key6,
            "7" => VirtualKey::Key7,
            "8" => VirtualKey::Key8,
            "9" => VirtualKey::Key9,
            "A" => VirtualKey::A,
            "B" => VirtualKey::B,
            "C" => VirtualKey::C,
            "D" => VirtualKey::D,
            "E" => VirtualKey::E,
            "F" => VirtualKey::F,
            "G" => VirtualKey::G,
            "H" => VirtualKey::H,
            "I" => VirtualKey::I,
            "J" => VirtualKey::J,
            "K" => VirtualKey::K,
            "L" => VirtualKey::L,
            "M" => VirtualKey::M,
            "N" => VirtualKey::N,
            "O" => VirtualKey::O,
            "P" => VirtualKey::P,
            "Q" => VirtualKey::Q,
            "R" => VirtualKey::R,
            "S" => VirtualKey::S,
            "T" => VirtualKey::T,
            "U" => VirtualKey::U,
            "V" => VirtualKey::V,
            "W" => VirtualKey::W,
            "X" => VirtualKey::X,
            "Y" => VirtualKey::Y,
            "Z" => VirtualKey::Z,
            "F1" => VirtualKey::F1,
            "F2" => VirtualKey::F2,
            "F3" => VirtualKey::F3,
            "F4" => VirtualKey::F4,
            "F5" => VirtualKey::F5,
            "F6" => VirtualKey::F6,
            "F7" => VirtualKey::F7,
            "F8" => VirtualKey::F8,
            "F9" => VirtualKey::F9,
            "F10" => VirtualKey::F10,
            "F11" => VirtualKey::F11,
            "F12" => VirtualKey::F12,
            "NUMPAD0" => VirtualKey::Numpad0,
            "NUMPAD1" => VirtualKey::Numpad1,
            "NUMPAD2" => VirtualKey::Numpad2,
            "NUMPAD3" => VirtualKey::Numpad3,
            "NUMPAD4" => VirtualKey::Numpad4,
            "NUMPAD5" => VirtualKey::Numpad5,
            "NUMPAD6" => VirtualKey::Numpad6,
            "NUMPAD7" => VirtualKey::Numpad7,
            "NUMPAD8" => VirtualKey::Numpad8,
            "NUMPAD9" => VirtualKey::Numpad9,
            other => return Err(SyntaxError::UnknownKey(other.to_string())),
        };
        Ok(key)
    }
}

/// A composite key chord like `ctrl+shift+p`. The last token is the primary
/// key, everything before it is held as a modifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyChord {
    pub modifiers: Vec<VirtualKey>,
    pub key: VirtualKey,
}

impl KeyChord {
    pub fn parse(text: &str) -> Result<Self, SyntaxError> {
        let mut keys = text
            .split('+')
            .map(|part| part.trim().parse::<VirtualKey>())
            .collect::<Result<Vec<_>, _>>()?;
        match keys.pop() {
            Some(key) => Ok(Self {
                modifiers: keys,
                key,
            }),
            None => Err(SyntaxError::UnknownKey(text.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_key() {
        let chord = KeyChord::parse("enter").unwrap();
        assert_eq!(chord.key, VirtualKey::Return);
        assert!(chord.modifiers.is_empty());
    }

    #[test]
    fn test_chord_last_token_is_primary() {
        let chord = KeyChord::parse("ctrl+shift+P").unwrap();
        assert_eq!(chord.key, VirtualKey::P);
        assert_eq!(chord.modifiers, vec![VirtualKey::Control, VirtualKey::Shift]);
    }

    #[test]
    fn test_unknown_key_is_syntax_error() {
        assert!(matches!(
            KeyChord::parse("ctrl+bogus"),
            Err(SyntaxError::UnknownKey(_))
        ));
    }
}
