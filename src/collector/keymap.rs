//! Virtual keycode to key identifier mapping (ANSI US layout).

use crate::collector::types::{KEY_BACKSPACE, KEY_DELETE, KEY_ENTER, KEY_SPACE, KEY_TAB};

/// Printable keys: (keycode, unshifted, shifted).
const PRINTABLE: &[(i64, char, char)] = &[
    (0, 'a', 'A'),
    (1, 's', 'S'),
    (2, 'd', 'D'),
    (3, 'f', 'F'),
    (4, 'h', 'H'),
    (5, 'g', 'G'),
    (6, 'z', 'Z'),
    (7, 'x', 'X'),
    (8, 'c', 'C'),
    (9, 'v', 'V'),
    (11, 'b', 'B'),
    (12, 'q', 'Q'),
    (13, 'w', 'W'),
    (14, 'e', 'E'),
    (15, 'r', 'R'),
    (16, 'y', 'Y'),
    (17, 't', 'T'),
    (18, '1', '!'),
    (19, '2', '@'),
    (20, '3', '#'),
    (21, '4', '$'),
    (22, '6', '^'),
    (23, '5', '%'),
    (24, '=', '+'),
    (25, '9', '('),
    (26, '7', '&'),
    (27, '-', '_'),
    (28, '8', '*'),
    (29, '0', ')'),
    (30, ']', '}'),
    (31, 'o', 'O'),
    (32, 'u', 'U'),
    (33, '[', '{'),
    (34, 'i', 'I'),
    (35, 'p', 'P'),
    (37, 'l', 'L'),
    (38, 'j', 'J'),
    (39, '\'', '"'),
    (40, 'k', 'K'),
    (41, ';', ':'),
    (42, '\\', '|'),
    (43, ',', '<'),
    (44, '/', '?'),
    (45, 'n', 'N'),
    (46, 'm', 'M'),
    (47, '.', '>'),
    (50, '`', '~'),
];

/// Non-printable keys.
const NAMED: &[(i64, &str)] = &[
    (36, KEY_ENTER),
    (48, KEY_TAB),
    (49, KEY_SPACE),
    (51, KEY_BACKSPACE),
    (53, "Key.esc"),
    (55, "Key.cmd"),
    (56, "Key.shift"),
    (57, "Key.caps_lock"),
    (58, "Key.alt"),
    (59, "Key.ctrl"),
    (60, "Key.shift_r"),
    (61, "Key.alt_r"),
    (62, "Key.ctrl_r"),
    (76, KEY_ENTER),
    (96, "Key.f5"),
    (97, "Key.f6"),
    (98, "Key.f7"),
    (99, "Key.f3"),
    (100, "Key.f8"),
    (101, "Key.f9"),
    (103, "Key.f11"),
    (109, "Key.f10"),
    (111, "Key.f12"),
    (115, "Key.home"),
    (116, "Key.page_up"),
    (117, KEY_DELETE),
    (118, "Key.f4"),
    (119, "Key.end"),
    (120, "Key.f2"),
    (121, "Key.page_down"),
    (122, "Key.f1"),
    (123, "Key.left"),
    (124, "Key.right"),
    (125, "Key.down"),
    (126, "Key.up"),
];

/// Identifier for a keycode, or `None` for keys with no mapping.
pub fn key_identifier(keycode: i64, shift: bool) -> Option<String> {
    if let Some(&(_, plain, shifted)) = PRINTABLE.iter().find(|(code, _, _)| *code == keycode) {
        let c = if shift { shifted } else { plain };
        return Some(c.to_string());
    }
    NAMED
        .iter()
        .find(|(code, _)| *code == keycode)
        .map(|(_, name)| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::keystrokes::reconstruct;

    #[test]
    fn test_letters_and_shift() {
        assert_eq!(key_identifier(4, false).as_deref(), Some("h"));
        assert_eq!(key_identifier(4, true).as_deref(), Some("H"));
        assert_eq!(key_identifier(18, true).as_deref(), Some("!"));
    }

    #[test]
    fn test_named_keys() {
        assert_eq!(key_identifier(36, false).as_deref(), Some(KEY_ENTER));
        assert_eq!(key_identifier(51, true).as_deref(), Some(KEY_BACKSPACE));
        assert_eq!(key_identifier(126, false).as_deref(), Some("Key.up"));
        assert_eq!(key_identifier(10_000, false), None);
    }

    #[test]
    fn test_typed_sequence_reconstructs() {
        let presses = [
            (4, false),
            (34, false),
            (49, false),
            (56, false),
            (13, true),
            (36, false),
        ];
        let keys: Vec<String> = presses
            .iter()
            .filter_map(|&(code, shift)| key_identifier(code, shift))
            .collect();
        assert_eq!(reconstruct(&keys), "hi W\n");
    }
}
