//! Parser for `SendKeys` strings.
//!
//! Three shapes are recognized: a modifier chord (`CTRL+V`), a single named
//! key (`ENTER`), or literal text as the fallback. The grammar is
//! deliberately small and predictable; anything that is not a chord and not
//! a known key token is typed as-is.

/// Keyboard modifiers usable in chords.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    Ctrl,
    Shift,
    Alt,
    Meta,
}

/// Non-modifier keys addressable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    /// `A`..`Z`, `0`..`9` (stored uppercase).
    Char(char),
    Enter,
    Tab,
    Escape,
    Backspace,
    Delete,
    Space,
    Up,
    Down,
    Left,
    Right,
    /// `F1`..`F12` (1-based).
    Function(u8),
}

/// Parsed form of a `SendKeys` string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedKeys {
    Text(String),
    Key(Key),
    Chord { modifiers: Vec<Modifier>, key: Key },
}

/// Parse a keys string. Errors are plain strings surfaced to the caller as
/// `InvalidArgument` details.
pub fn parse_keys(input: &str) -> Result<ParsedKeys, String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err("keys must be non-empty".to_string());
    }

    if trimmed.contains('+') {
        return parse_chord(trimmed);
    }

    if let Some(key) = parse_key_token(trimmed) {
        return Ok(ParsedKeys::Key(key));
    }

    Ok(ParsedKeys::Text(trimmed.to_string()))
}

fn parse_chord(input: &str) -> Result<ParsedKeys, String> {
    let parts: Vec<&str> = input
        .split('+')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    if parts.len() < 2 {
        return Err("invalid chord".to_string());
    }

    let mut modifiers = Vec::new();
    let mut key = None;

    for part in parts {
        if let Some(modifier) = parse_modifier(part) {
            modifiers.push(modifier);
            continue;
        }
        if key.is_some() {
            return Err("chord must contain exactly one non-modifier key".to_string());
        }
        match parse_key_token(part) {
            Some(k) => key = Some(k),
            None => return Err(format!("unsupported key token: {part}")),
        }
    }

    match key {
        Some(key) => Ok(ParsedKeys::Chord { modifiers, key }),
        None => Err("chord must contain a non-modifier key".to_string()),
    }
}

fn parse_modifier(token: &str) -> Option<Modifier> {
    match token.to_uppercase().as_str() {
        "CTRL" | "CONTROL" => Some(Modifier::Ctrl),
        "SHIFT" => Some(Modifier::Shift),
        "ALT" => Some(Modifier::Alt),
        "WIN" | "META" => Some(Modifier::Meta),
        _ => None,
    }
}

fn parse_key_token(token: &str) -> Option<Key> {
    let t = token.trim();
    if t.len() == 1 {
        let c = t.chars().next()?.to_ascii_uppercase();
        if c.is_ascii_uppercase() || c.is_ascii_digit() {
            return Some(Key::Char(c));
        }
    }

    let upper = t.to_uppercase();
    let key = match upper.as_str() {
        "ENTER" | "RETURN" => Key::Enter,
        "TAB" => Key::Tab,
        "ESC" | "ESCAPE" => Key::Escape,
        "BACKSPACE" | "BS" => Key::Backspace,
        "DEL" | "DELETE" => Key::Delete,
        "SPACE" => Key::Space,
        "UP" => Key::Up,
        "DOWN" => Key::Down,
        "LEFT" => Key::Left,
        "RIGHT" => Key::Right,
        _ => {
            // F1-F12
            if let Some(rest) = upper.strip_prefix('F') {
                if (2..=3).contains(&upper.len()) {
                    if let Ok(f) = rest.parse::<u8>() {
                        if (1..=12).contains(&f) {
                            return Some(Key::Function(f));
                        }
                    }
                }
            }
            return None;
        }
    };
    Some(key)
}
