//! Serde helpers for optional source paths in the serialized tree.
//!
//! UTF-8 paths are written verbatim so the persisted session stays readable
//! and interoperable; anything else is prefixed with `b64:` and stored as
//! base64 of the platform's raw path bytes.

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serializer};

const B64_PREFIX: &str = "b64:";

pub fn serialize<S>(value: &Option<PathBuf>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(path) => serializer.serialize_some(&encode(path)),
        None => serializer.serialize_none(),
    }
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<PathBuf>, D::Error>
where
    D: Deserializer<'de>,
{
    let text = Option::<String>::deserialize(deserializer)?;
    match text {
        Some(text) if text.is_empty() => Ok(None),
        Some(text) => decode(&text).map(Some).map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

pub fn encode(path: &Path) -> String {
    match path.to_str() {
        Some(text) => text.to_string(),
        None => format!("{B64_PREFIX}{}", BASE64.encode(raw_bytes(path))),
    }
}

pub fn decode(text: &str) -> Result<PathBuf, String> {
    let Some(rest) = text.strip_prefix(B64_PREFIX) else {
        return Ok(PathBuf::from(text));
    };
    let bytes = BASE64
        .decode(rest.as_bytes())
        .map_err(|err| format!("invalid base64 source path: {err}"))?;
    from_raw_bytes(bytes)
}

#[cfg(unix)]
fn raw_bytes(path: &Path) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    path.as_os_str().as_bytes().to_vec()
}

#[cfg(unix)]
fn from_raw_bytes(bytes: Vec<u8>) -> Result<PathBuf, String> {
    use std::ffi::OsString;
    use std::os::unix::ffi::OsStringExt;
    Ok(PathBuf::from(OsString::from_vec(bytes)))
}

#[cfg(windows)]
fn raw_bytes(path: &Path) -> Vec<u8> {
    use std::os::windows::ffi::OsStrExt;
    path.as_os_str()
        .encode_wide()
        .flat_map(|unit| unit.to_le_bytes())
        .collect()
}

#[cfg(windows)]
fn from_raw_bytes(bytes: Vec<u8>) -> Result<PathBuf, String> {
    use std::ffi::OsString;
    use std::os::windows::ffi::OsStringExt;
    if bytes.len() % 2 != 0 {
        return Err("encoded Windows source path has odd byte length".to_string());
    }
    let wide: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    Ok(PathBuf::from(OsString::from_wide(&wide)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_paths_are_written_verbatim() {
        assert_eq!(encode(Path::new("/data/run 1/a.csv")), "/data/run 1/a.csv");
        assert_eq!(decode("/data/a.csv").unwrap(), PathBuf::from("/data/a.csv"));
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_paths_use_base64_prefix() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let path = Path::new(OsStr::from_bytes(b"/data/\xff.bin"));
        let encoded = encode(path);
        assert!(encoded.starts_with(B64_PREFIX));
        assert_eq!(decode(&encoded).unwrap(), path);
    }

    #[test]
    fn bad_base64_is_reported() {
        assert!(decode("b64:***").is_err());
    }
}
