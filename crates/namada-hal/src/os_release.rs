//! Parsing helpers for `/etc/os-release`.

use crate::hal::OsReleaseInfo;

fn unquote(value: &str) -> String {
    value.trim().trim_matches('"').trim_matches('\'').to_string()
}

/// Parses `os-release` content. `id` is lowercased; missing keys stay `None`.
pub fn parse_os_release(content: &str) -> OsReleaseInfo {
    let mut info = OsReleaseInfo::default();
    for line in content.lines() {
        let line = line.trim();
        if line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        match key {
            "ID" => info.id = Some(unquote(value).to_lowercase()),
            "VERSION_ID" => info.version_id = Some(unquote(value)),
            "VERSION_CODENAME" => info.version_codename = Some(unquote(value)),
            "PRETTY_NAME" => info.pretty_name = Some(unquote(value)),
            _ => {}
        }
    }
    info
}
