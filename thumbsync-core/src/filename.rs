//! Thumbnail filename convention: `{bomIndex}_{partNumber}_{itemName}.{ext}`.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

/// Fields captured from a thumbnail filename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedFilename {
    pub bom_index: String,
    pub part_number: String,
    pub item_name: String,
    /// Lower-cased extension.
    pub extension: String,
    pub full_match: String,
}

fn pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^(\d+)_([A-Za-z0-9\-]+)_(.+)\.(png|jpg|jpeg|gif|webp)$")
            .expect("thumbnail filename pattern is valid")
    })
}

/// Parse an archive entry name. Any folder prefix is ignored; `None` means the name
/// does not follow the convention.
pub fn parse_filename(name: &str) -> Option<ParsedFilename> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let caps = pattern().captures(base)?;
    Some(ParsedFilename {
        bom_index: caps[1].to_string(),
        part_number: caps[2].to_string(),
        item_name: caps[3].to_string(),
        extension: caps[4].to_ascii_lowercase(),
        full_match: caps[0].to_string(),
    })
}

/// MIME type for an image filename. Unknown extensions fall back to `image/png`.
pub fn content_type_for(filename: &str) -> &'static str {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "image/png",
    }
}
