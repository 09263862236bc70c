//! Key definitions and the built-in QWERTY eye-typing layout.
//!
//! Key identity is opaque to the engine; everything downstream refers to
//! keys by `KeyId` or by layout index. The renderer owns real geometry;
//! `qwerty_geometry` is only a stand-in used by simulation and tests.

use std::fmt;

use super::geometry::Rect;

// ── KeyId ───────────────────────────────────────────────────

/// Opaque key identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyId(pub String);

impl KeyId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for KeyId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ── KeyRole ─────────────────────────────────────────────────

/// What a key does when selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyRole {
    /// Character key.
    Ordinary,
    Backspace,
    Enter,
    /// The main space bar.
    SpacePrimary,
    /// Space key that also accepts the current suggestion.
    SpaceSuggestion,
}

impl KeyRole {
    /// String representation for IPC and logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ordinary => "ordinary",
            Self::Backspace => "backspace",
            Self::Enter => "enter",
            Self::SpacePrimary => "space-primary",
            Self::SpaceSuggestion => "space-suggestion",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "ordinary" => Some(Self::Ordinary),
            "backspace" => Some(Self::Backspace),
            "enter" => Some(Self::Enter),
            "space-primary" => Some(Self::SpacePrimary),
            "space-suggestion" => Some(Self::SpaceSuggestion),
            _ => None,
        }
    }
}

// ── KeyDefinition ───────────────────────────────────────────

/// Immutable definition of a single key, created at layout load.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyDefinition {
    pub id: KeyId,
    /// Display label (e.g. "A", "⌫").
    pub label: String,
    /// Literal text the key produces, if any.
    pub value: Option<String>,
    pub role: KeyRole,
    /// Non-character key; receives the likelihood boost and prior floor.
    pub special: bool,
    /// Rendered wider than a standard key.
    pub wide: bool,
    /// Spans the full keyboard width.
    pub full_width: bool,
}

impl KeyDefinition {
    /// Ordinary character key whose id and value are `ch`.
    pub fn character(ch: &str) -> Self {
        Self {
            id: KeyId::from(ch),
            label: ch.to_uppercase(),
            value: Some(ch.to_string()),
            role: KeyRole::Ordinary,
            special: false,
            wide: false,
            full_width: false,
        }
    }

    /// Non-character key with the given role.
    pub fn special(id: &str, label: &str, role: KeyRole) -> Self {
        let value = match role {
            KeyRole::SpacePrimary | KeyRole::SpaceSuggestion => Some(" ".to_string()),
            KeyRole::Enter => Some("\n".to_string()),
            _ => None,
        };
        Self {
            id: KeyId::from(id),
            label: label.to_string(),
            value,
            role,
            special: true,
            wide: false,
            full_width: false,
        }
    }

    pub fn with_wide(mut self) -> Self {
        self.wide = true;
        self
    }

    pub fn with_full_width(mut self) -> Self {
        self.full_width = true;
        self
    }

    /// Special keys are flagged explicitly or carry a non-ordinary role.
    pub fn is_special(&self) -> bool {
        self.special || self.role != KeyRole::Ordinary
    }

    /// Whether selecting this key types `ch`.
    pub fn produces(&self, ch: char) -> bool {
        let mut buf = [0u8; 4];
        let s: &str = ch.encode_utf8(&mut buf);
        self.value
            .as_deref()
            .is_some_and(|v| v.eq_ignore_ascii_case(s))
    }
}

// ── Built-in layout ─────────────────────────────────────────

const QWERTY_ROWS: [&str; 3] = ["qwertyuiop", "asdfghjkl", "zxcvbnm"];

/// The 28-key eye-typing layout: 26 letters, backspace, space.
pub fn qwerty_layout() -> Vec<KeyDefinition> {
    let mut keys: Vec<KeyDefinition> = QWERTY_ROWS
        .iter()
        .flat_map(|row| row.chars())
        .map(|c| KeyDefinition::character(&c.to_string()))
        .collect();
    keys.push(KeyDefinition::special("backspace", "⌫", KeyRole::Backspace).with_wide());
    keys.push(KeyDefinition::special("space", "Space", KeyRole::SpacePrimary).with_full_width());
    keys
}

/// Screen rectangles for `qwerty_layout`, standing in for the renderer.
///
/// Keys are `key_size` squares separated by a 10% gap, rows staggered like
/// a physical keyboard. Backspace closes the third row; space spans the
/// bottom row.
pub fn qwerty_geometry(origin_x: f64, origin_y: f64, key_size: f64) -> Vec<(KeyId, Rect)> {
    let gap = key_size * 0.1;
    let pitch = key_size + gap;
    let mut out = Vec::with_capacity(28);

    for (row_idx, row) in QWERTY_ROWS.iter().enumerate() {
        let y = origin_y + row_idx as f64 * pitch;
        let x_offset = row_idx as f64 * key_size * 0.5;
        for (col_idx, c) in row.chars().enumerate() {
            let x = origin_x + x_offset + col_idx as f64 * pitch;
            out.push((KeyId(c.to_string()), Rect::new(x, y, key_size, key_size)));
        }
    }

    // Backspace after "m": row 2 offset + 7 keys
    let y2 = origin_y + 2.0 * pitch;
    let bksp_x = origin_x + key_size + 7.0 * pitch;
    out.push((
        KeyId::from("backspace"),
        Rect::new(bksp_x, y2, key_size * 2.0, key_size),
    ));

    let y3 = origin_y + 3.0 * pitch;
    out.push((
        KeyId::from("space"),
        Rect::new(origin_x, y3, 10.0 * pitch - gap, key_size),
    ));

    out
}

// ── Tests ───────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qwerty_has_28_keys() {
        let keys = qwerty_layout();
        assert_eq!(keys.len(), 28);
        assert_eq!(keys.iter().filter(|k| k.is_special()).count(), 2);
        assert_eq!(keys[0].id, KeyId::from("q"));
        assert_eq!(keys[0].label, "Q");
    }

    #[test]
    fn test_geometry_covers_every_key() {
        let keys = qwerty_layout();
        let rects = qwerty_geometry(0.0, 0.0, 50.0);
        assert_eq!(rects.len(), keys.len());
        for key in &keys {
            assert!(
                rects.iter().any(|(id, _)| id == &key.id),
                "Missing geometry for {}",
                key.id
            );
        }
    }

    #[test]
    fn test_geometry_keys_do_not_overlap() {
        let rects = qwerty_geometry(0.0, 0.0, 50.0);
        for (i, (a_id, a)) in rects.iter().enumerate() {
            for (b_id, b) in rects.iter().skip(i + 1) {
                let overlap_x = a.x < b.x + b.width && b.x < a.x + a.width;
                let overlap_y = a.y < b.y + b.height && b.y < a.y + a.height;
                assert!(!(overlap_x && overlap_y), "{} overlaps {}", a_id, b_id);
            }
        }
    }

    #[test]
    fn test_special_roles() {
        let space = KeyDefinition::special("space", "Space", KeyRole::SpacePrimary);
        assert!(space.is_special());
        assert!(space.produces(' '));

        let bksp = KeyDefinition::special("backspace", "⌫", KeyRole::Backspace);
        assert!(bksp.value.is_none());
        assert!(!bksp.produces('b'));

        let a = KeyDefinition::character("a");
        assert!(!a.is_special());
        assert!(a.produces('a'));
        assert!(a.produces('A'));
    }

    #[test]
    fn test_role_roundtrip() {
        for role in [
            KeyRole::Ordinary,
            KeyRole::Backspace,
            KeyRole::Enter,
            KeyRole::SpacePrimary,
            KeyRole::SpaceSuggestion,
        ] {
            assert_eq!(KeyRole::from_str(role.as_str()), Some(role));
        }
        assert_eq!(KeyRole::from_str("shift"), None);
    }
}
