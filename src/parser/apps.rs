use std::fs;
use std::path::Path;

use crate::error::{DebuggerError, Result};

/// Offset of the 8-byte application name in an `.8xk` file.
const APP_NAME_OFFSET: usize = 17;
const APP_NAME_LEN: usize = 8;

/// Read the application name stored in an app file's header.
pub fn read_app_name(path: &Path) -> Result<String> {
    let contents = fs::read(path)?;
    parse_app_name(&contents)
        .ok_or_else(|| DebuggerError::AppNotFound(path.display().to_string()))
}

pub fn parse_app_name(contents: &[u8]) -> Option<String> {
    let raw = contents.get(APP_NAME_OFFSET..APP_NAME_OFFSET + APP_NAME_LEN)?;
    let name: String = raw.iter().map(|&b| b as char).collect();
    let name = name.trim_end_matches(|c: char| c == '\0' || c == ' ');
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_follows_the_header() {
        let mut file = b"**TIFL**\x01\x00\x01\x88\x11\x00\x00\x00\x00".to_vec();
        assert_eq!(file.len(), APP_NAME_OFFSET);
        file.extend_from_slice(b"DOORS\0\0\0rest");
        assert_eq!(parse_app_name(&file).as_deref(), Some("DOORS"));
        assert_eq!(parse_app_name(&file[..20]), None);
    }
}
