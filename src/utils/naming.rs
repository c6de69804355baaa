//! Filename derivation and caption escaping.

/// Sanitize a video title for use in a filename.
///
/// Filesystem-illegal characters collapse to `_`; the result is capped at
/// 100 characters.
pub fn sanitize_title(title: &str) -> String {
    let sanitized: String = title
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let trimmed = sanitized.trim();
    if trimmed.is_empty() {
        return "video".to_string();
    }
    trimmed.chars().take(100).collect()
}

/// Extract a file extension from a URL path.
///
/// Only accepted when it looks like a real extension (starts with a dot,
/// at most 5 alphanumeric characters after it). Everything else falls back
/// to `.mp4`.
pub fn extension_from_url(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    if let Some(segment) = path.rsplit('/').next() {
        if let Some(dot) = segment.rfind('.') {
            let ext = &segment[dot + 1..];
            if !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()) {
                return format!(".{}", ext.to_lowercase());
            }
        }
    }
    ".mp4".to_string()
}

/// Derive the on-disk filename for a video: `<safe_title>_<post_id><ext>`.
pub fn video_file_name(title: &str, post_id: &str, media_url: &str) -> String {
    format!(
        "{}_{}{}",
        sanitize_title(title),
        post_id,
        extension_from_url(media_url)
    )
}

/// Escape Markdown control characters for the delivery caption.
pub fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '_' | '*' | '[' | ']' | '(' | ')' | '`' => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_title_special_chars() {
        assert_eq!(sanitize_title("clip/with:bad*chars?"), "clip_with_bad_chars_");
    }

    #[test]
    fn test_sanitize_title_empty() {
        assert_eq!(sanitize_title("   "), "video");
    }

    #[test]
    fn test_sanitize_title_caps_length() {
        let long = "a".repeat(200);
        assert_eq!(sanitize_title(&long).chars().count(), 100);
    }

    #[test]
    fn test_extension_from_url() {
        assert_eq!(extension_from_url("https://cdn.example/v/X1.vid"), ".vid");
        assert_eq!(extension_from_url("https://cdn.example/v/X1.vid?tok=abc"), ".vid");
        assert_eq!(extension_from_url("https://cdn.example/stream/X1"), ".mp4");
        // Too long to be a real extension.
        assert_eq!(extension_from_url("https://cdn.example/v/X1.manifest"), ".mp4");
    }

    #[test]
    fn test_video_file_name() {
        assert_eq!(
            video_file_name("A", "X1", "https://cdn.example/X1.vid"),
            "A_X1.vid"
        );
    }

    #[test]
    fn test_escape_markdown() {
        assert_eq!(escape_markdown("a_b*c[d](e)`f"), "a\\_b\\*c\\[d\\]\\(e\\)\\`f");
    }
}
