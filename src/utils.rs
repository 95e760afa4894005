use std::{path::Path, time::Duration};

use time::OffsetDateTime;

pub fn duration_to_sec_string(duration: &Duration) -> String {
    let sec = duration.as_secs_f32();
    format!("{sec:.1}s")
}

pub fn timestamp_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// First three words of a prompt, lowercased and joined by underscores.
pub fn prompt_slug(prompt: &str) -> String {
    let slug = prompt
        .to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|word| !word.is_empty())
        .take(3)
        .collect::<Vec<_>>()
        .join("_");
    if slug.is_empty() {
        "generated".to_string()
    } else {
        slug
    }
}

/// File stem of a path or URL reference, without query or extension.
pub fn reference_stem(reference: &str) -> String {
    let without_query = reference
        .split(['?', '#'])
        .next()
        .unwrap_or(reference)
        .trim_end_matches('/');
    let last_segment = without_query.rsplit(['/', '\\']).next().unwrap_or("");
    Path::new(last_segment)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| "input".to_string())
}

pub fn extension_for_content_type(content_type: &str) -> Option<&'static str> {
    let essence = content_type.split(';').next().unwrap_or("").trim();
    match essence.to_ascii_lowercase().as_str() {
        "image/png" => Some("png"),
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        "video/mp4" => Some("mp4"),
        "video/webm" => Some("webm"),
        "video/quicktime" => Some("mov"),
        "audio/wav" | "audio/x-wav" => Some("wav"),
        "audio/mpeg" => Some("mp3"),
        _ => None,
    }
}

/// Content type for an upload, sniffed from the bytes first, then the name.
pub fn guess_content_type(file_name: &str, bytes: &[u8]) -> String {
    if let Ok(format) = image::guess_format(bytes) {
        return format.to_mime_type().to_string();
    }
    let extension = Path::new(file_name)
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        _ => "application/octet-stream",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_takes_three_words() {
        assert_eq!(prompt_slug("A beautiful sunset over the sea"), "a_beautiful_sunset");
        assert_eq!(prompt_slug("Marketing banner, with TEXT!"), "marketing_banner_with");
        assert_eq!(prompt_slug("日本語"), "generated");
    }

    #[test]
    fn stem_strips_directories_queries_and_extensions() {
        assert_eq!(reference_stem("inputs/winter_dusk.png"), "winter_dusk");
        assert_eq!(
            reference_stem("https://cdn.example.com/a/b/photo.jpg?token=1"),
            "photo"
        );
        assert_eq!(reference_stem("https://cdn.example.com/"), "cdn.example");
        assert_eq!(reference_stem(""), "input");
    }

    #[test]
    fn content_type_prefers_magic_bytes() {
        let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];
        assert_eq!(guess_content_type("photo.jpg", &png), "image/png");
        assert_eq!(guess_content_type("clip.mp4", b"not an image"), "video/mp4");
        assert_eq!(
            guess_content_type("blob", b"????"),
            "application/octet-stream"
        );
    }

    #[test]
    fn extension_ignores_parameters() {
        assert_eq!(extension_for_content_type("image/jpeg; charset=binary"), Some("jpg"));
        assert_eq!(extension_for_content_type("application/json"), None);
    }
}
