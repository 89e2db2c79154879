//! Named keys accepted by `Input.dispatchKeyEvent`.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyDefinition {
    pub key: &'static str,
    pub code: &'static str,
    pub key_code: u32,
    pub text: Option<&'static str>,
}

const KEYS: &[KeyDefinition] = &[
    KeyDefinition { key: "Enter", code: "Enter", key_code: 13, text: Some("\r") },
    KeyDefinition { key: "Tab", code: "Tab", key_code: 9, text: None },
    KeyDefinition { key: "Escape", code: "Escape", key_code: 27, text: None },
    KeyDefinition { key: "Backspace", code: "Backspace", key_code: 8, text: None },
    KeyDefinition { key: "Delete", code: "Delete", key_code: 46, text: None },
    KeyDefinition { key: " ", code: "Space", key_code: 32, text: Some(" ") },
    KeyDefinition { key: "ArrowUp", code: "ArrowUp", key_code: 38, text: None },
    KeyDefinition { key: "ArrowDown", code: "ArrowDown", key_code: 40, text: None },
    KeyDefinition { key: "ArrowLeft", code: "ArrowLeft", key_code: 37, text: None },
    KeyDefinition { key: "ArrowRight", code: "ArrowRight", key_code: 39, text: None },
    KeyDefinition { key: "PageUp", code: "PageUp", key_code: 33, text: None },
    KeyDefinition { key: "PageDown", code: "PageDown", key_code: 34, text: None },
    KeyDefinition { key: "Home", code: "Home", key_code: 36, text: None },
    KeyDefinition { key: "End", code: "End", key_code: 35, text: None },
];

/// Look up a key by name. Matching is case-insensitive and accepts a few
/// common aliases (`Return`, `Esc`, `Space`).
pub fn lookup(name: &str) -> Option<KeyDefinition> {
    let trimmed = if name == " " { name } else { name.trim() };
    let canonical = match trimmed.to_ascii_lowercase().as_str() {
        "return" => "Enter",
        "esc" => "Escape",
        "space" => " ",
        "up" => "ArrowUp",
        "down" => "ArrowDown",
        "left" => "ArrowLeft",
        "right" => "ArrowRight",
        _ => trimmed,
    };
    if canonical == " " {
        return KEYS.iter().copied().find(|def| def.key == " ");
    }
    KEYS.iter()
        .copied()
        .find(|def| def.key.eq_ignore_ascii_case(canonical))
}

pub fn is_supported(name: &str) -> bool {
    lookup(name).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_aliases() {
        assert_eq!(lookup("return").map(|def| def.key_code), Some(13));
        assert_eq!(lookup("ESC").map(|def| def.key), Some("Escape"));
        assert_eq!(lookup("space").map(|def| def.code), Some("Space"));
        assert!(lookup("F13").is_none());
    }
}
