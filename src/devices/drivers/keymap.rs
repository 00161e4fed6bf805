//! US keyboard layout, scancode set 1.
//!
//! Three tables: plain, shifted and alt-gr (US-International dead-key free
//! variant). Special keys (Enter, Backspace, Tab, Escape) are handled by the
//! decoder and have no entry here.
//!
//! Caps lock only affects letters: the effective case of a letter is
//! `shift XOR caps_lock`, while digits and punctuation follow shift alone.

/// Modifier keys as tracked by the IRQ1 handler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModifierState {
    pub left_shift: bool,
    pub right_shift: bool,
    pub caps_lock: bool,
    pub alt_gr: bool,
}

impl ModifierState {
    pub const fn new() -> Self {
        Self {
            left_shift: false,
            right_shift: false,
            caps_lock: false,
            alt_gr: false,
        }
    }

    pub const fn shift(&self) -> bool {
        self.left_shift || self.right_shift
    }

    /// Case for letters.
    pub const fn uppercase(&self) -> bool {
        self.shift() ^ self.caps_lock
    }
}

// Indexed by make code, 0x00..=0x39. Zero means unmapped.
static PLAIN: &[u8] = b"\0\01234567890-=\0\0qwertyuiop[]\0\0asdfghjkl;'`\0\\zxcvbnm,./\0*\0 ";
static SHIFTED: &[u8] = b"\0\0!@#$%^&*()_+\0\0QWERTYUIOP{}\0\0ASDFGHJKL:\"~\0|ZXCVBNM<>?\0*\0 ";

fn alt_gr(code: u8) -> Option<char> {
    let c = match code {
        0x02 => '¡',
        0x03 => '²',
        0x04 => '³',
        0x05 => '¤',
        0x06 => '€',
        0x07 => '¼',
        0x08 => '½',
        0x09 => '¾',
        0x0A => '‘',
        0x0B => '’',
        0x0C => '¥',
        0x0D => '×',
        0x10 => 'ä',
        0x11 => 'å',
        0x12 => 'é',
        0x13 => '®',
        0x14 => 'þ',
        0x15 => 'ü',
        0x16 => 'ú',
        0x17 => 'í',
        0x18 => 'ó',
        0x19 => 'ö',
        0x1A => '«',
        0x1B => '»',
        0x1E => 'á',
        0x1F => 'ß',
        0x20 => 'ð',
        0x26 => 'ø',
        0x27 => '¶',
        0x28 => '´',
        0x2B => '¬',
        0x2C => 'æ',
        0x2E => '©',
        0x31 => 'ñ',
        0x32 => 'µ',
        0x33 => 'ç',
        0x35 => '¿',
        0x39 => ' ',
        _ => return None,
    };
    Some(c)
}

fn lookup(table: &[u8], code: u8) -> Option<char> {
    match table.get(code as usize) {
        Some(&byte) if byte != 0 => Some(byte as char),
        _ => None,
    }
}

fn to_upper(c: char) -> char {
    let mut upper = c.to_uppercase();
    match (upper.next(), upper.next()) {
        (Some(u), None) => u,
        _ => c,
    }
}

/// Character for a make code under `modifiers`, if the layout has one.
pub fn translate(code: u8, modifiers: &ModifierState) -> Option<char> {
    if modifiers.alt_gr {
        let c = alt_gr(code)?;
        return Some(if c.is_alphabetic() && modifiers.uppercase() { to_upper(c) } else { c });
    }

    let plain = lookup(PLAIN, code)?;
    let shifted = if plain.is_ascii_lowercase() {
        modifiers.uppercase()
    } else {
        modifiers.shift()
    };

    if shifted {
        lookup(SHIFTED, code)
    } else {
        Some(plain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mods(shift: bool, caps: bool, alt_gr: bool) -> ModifierState {
        ModifierState {
            left_shift: shift,
            caps_lock: caps,
            alt_gr,
            ..ModifierState::new()
        }
    }

    #[test]
    fn tables_cover_the_same_codes() {
        assert_eq!(PLAIN.len(), 0x3A);
        assert_eq!(SHIFTED.len(), 0x3A);
        for code in 0..0x3Au8 {
            assert_eq!(lookup(PLAIN, code).is_some(), lookup(SHIFTED, code).is_some(), "code {:#x}", code);
        }
    }

    #[test]
    fn letters_follow_shift_xor_caps() {
        assert_eq!(translate(0x1E, &mods(false, false, false)), Some('a'));
        assert_eq!(translate(0x1E, &mods(true, false, false)), Some('A'));
        assert_eq!(translate(0x1E, &mods(false, true, false)), Some('A'));
        assert_eq!(translate(0x1E, &mods(true, true, false)), Some('a'));
    }

    #[test]
    fn caps_lock_leaves_digits_and_punctuation_alone() {
        assert_eq!(translate(0x02, &mods(false, true, false)), Some('1'));
        assert_eq!(translate(0x02, &mods(true, true, false)), Some('!'));
        assert_eq!(translate(0x35, &mods(false, true, false)), Some('/'));
        assert_eq!(translate(0x28, &mods(true, false, false)), Some('"'));
    }

    #[test]
    fn alt_gr_table() {
        assert_eq!(translate(0x12, &mods(false, false, true)), Some('é'));
        assert_eq!(translate(0x12, &mods(true, false, true)), Some('É'));
        assert_eq!(translate(0x06, &mods(false, false, true)), Some('€'));
        assert_eq!(translate(0x1F, &mods(true, false, true)), Some('ß'));
        assert_eq!(translate(0x21, &mods(false, false, true)), None);
    }

    #[test]
    fn unmapped_codes() {
        let none = ModifierState::new();
        assert_eq!(translate(0x00, &none), None);
        assert_eq!(translate(0x1D, &none), None);
        assert_eq!(translate(0x3B, &none), None);
        assert_eq!(translate(0x39, &none), Some(' '));
    }
}
