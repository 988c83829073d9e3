//! `send_keys` token grammar.
//!
//! A comma-separated list where each token is a named virtual key
//! (`Enter`, `Tab`, `Esc`, ...) or a chord (`Ctrl+X`, `Alt+F4`,
//! `Shift+A`). Emission order per token: press all modifiers, press and
//! release the main key, release all modifiers.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyToken {
    /// Canonical lowercase modifier names: "ctrl", "alt", "shift", "win".
    pub modifiers: Vec<String>,
    /// Canonical main key: a named key ("enter", "f4") or a single
    /// character ("a", "1").
    pub key: String,
}

const NAMED_KEYS: &[(&str, &str)] = &[
    ("enter", "enter"),
    ("return", "enter"),
    ("tab", "tab"),
    ("esc", "escape"),
    ("escape", "escape"),
    ("space", "space"),
    ("up", "up"),
    ("down", "down"),
    ("left", "left"),
    ("right", "right"),
    ("backspace", "backspace"),
    ("delete", "delete"),
    ("del", "delete"),
    ("home", "home"),
    ("end", "end"),
    ("pageup", "pageup"),
    ("pagedown", "pagedown"),
    ("insert", "insert"),
];

fn canonical_modifier(part: &str) -> Option<&'static str> {
    match part.to_ascii_lowercase().as_str() {
        "ctrl" | "control" => Some("ctrl"),
        "alt" => Some("alt"),
        "shift" => Some("shift"),
        "win" | "meta" => Some("win"),
        _ => None,
    }
}

fn canonical_key(part: &str) -> Option<String> {
    let lower = part.to_ascii_lowercase();
    if let Some((_, canon)) = NAMED_KEYS.iter().find(|(alias, _)| *alias == lower) {
        return Some((*canon).to_string());
    }
    // Function keys: F1..F24.
    if let Some(n) = lower.strip_prefix('f') {
        if let Ok(num) = n.parse::<u8>() {
            if (1..=24).contains(&num) {
                return Some(lower);
            }
        }
    }
    let mut chars = part.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if !c.is_whitespace() => Some(c.to_ascii_lowercase().to_string()),
        _ => None,
    }
}

/// Parse the full comma-separated key list.
pub fn parse_keys(keys: &str) -> anyhow::Result<Vec<KeyToken>> {
    let mut tokens = Vec::new();
    for raw in keys.split(',') {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        tokens.push(parse_token(raw)?);
    }
    if tokens.is_empty() {
        anyhow::bail!("no key tokens in '{keys}'");
    }
    Ok(tokens)
}

fn parse_token(raw: &str) -> anyhow::Result<KeyToken> {
    let parts: Vec<&str> = raw.split('+').map(str::trim).collect();
    let (main, modifier_parts) = parts
        .split_last()
        .ok_or_else(|| anyhow::anyhow!("empty key token"))?;

    let mut modifiers = Vec::new();
    for part in modifier_parts {
        let m = canonical_modifier(part)
            .ok_or_else(|| anyhow::anyhow!("unknown modifier '{part}' in '{raw}'"))?;
        modifiers.push(m.to_string());
    }
    let key = canonical_key(main)
        .ok_or_else(|| anyhow::anyhow!("unknown key '{main}' in '{raw}'"))?;
    Ok(KeyToken { modifiers, key })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_keys_and_aliases() {
        let tokens = parse_keys("Enter, Tab, Esc").unwrap();
        assert_eq!(
            tokens.iter().map(|t| t.key.as_str()).collect::<Vec<_>>(),
            vec!["enter", "tab", "escape"]
        );
        assert!(tokens.iter().all(|t| t.modifiers.is_empty()));
    }

    #[test]
    fn chords() {
        let tokens = parse_keys("Ctrl+X, Alt+F4, Shift+A").unwrap();
        assert_eq!(tokens[0].modifiers, vec!["ctrl"]);
        assert_eq!(tokens[0].key, "x");
        assert_eq!(tokens[1].modifiers, vec!["alt"]);
        assert_eq!(tokens[1].key, "f4");
        assert_eq!(tokens[2].modifiers, vec!["shift"]);
        assert_eq!(tokens[2].key, "a");
    }

    #[test]
    fn multi_modifier_chord() {
        let tokens = parse_keys("Ctrl+Shift+S").unwrap();
        assert_eq!(tokens[0].modifiers, vec!["ctrl", "shift"]);
        assert_eq!(tokens[0].key, "s");
    }

    #[test]
    fn unknown_tokens_are_rejected() {
        assert!(parse_keys("Bogus").is_err());
        assert!(parse_keys("Hyper+X").is_err());
        assert!(parse_keys("").is_err());
    }
}
