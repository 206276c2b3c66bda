//! Repository naming rules for imported file and folder names.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;

/// Characters the target repository refuses in file and folder names.
pub const FORBIDDEN_CHARACTERS: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

static FORBIDDEN: Lazy<Regex> = Lazy::new(|| {
    let class: String = FORBIDDEN_CHARACTERS
        .iter()
        .map(|ch| regex::escape(&ch.to_string()))
        .collect();
    Regex::new(&format!("[{class}]")).expect("forbidden character class is a valid pattern")
});

/// Result of checking a name against the naming rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameClass {
    Clean,
    /// Contains at least one forbidden character. A decision point, not an error.
    Irregular,
}

/// How irregular names in one import batch are rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SanitizeMode {
    /// Substitute each forbidden character with `-`.
    Replace,
    /// Delete each forbidden character.
    Strip,
}

pub fn classify(name: &str) -> NameClass {
    if FORBIDDEN.is_match(name) {
        NameClass::Irregular
    } else {
        NameClass::Clean
    }
}

pub fn is_irregular(name: &str) -> bool {
    classify(name) == NameClass::Irregular
}

pub fn replace(name: &str) -> String {
    FORBIDDEN.replace_all(name, "-").into_owned()
}

/// Deletes forbidden characters. Falls back to [`replace`] when nothing would remain.
pub fn strip(name: &str) -> String {
    let stripped = FORBIDDEN.replace_all(name, "");
    if stripped.is_empty() {
        return replace(name);
    }
    stripped.into_owned()
}

/// Applies `mode` to `name`, borrowing when the name is already clean.
pub fn sanitize(name: &str, mode: SanitizeMode) -> Cow<'_, str> {
    if classify(name) == NameClass::Clean {
        return Cow::Borrowed(name);
    }
    match mode {
        SanitizeMode::Replace => Cow::Owned(replace(name)),
        SanitizeMode::Strip => Cow::Owned(strip(name)),
    }
}
