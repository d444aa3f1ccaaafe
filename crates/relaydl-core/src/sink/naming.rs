//! Artifact file naming: sanitization, extension hints, clash numbering.

const NAME_MAX: usize = 255;
const FALLBACK_STEM: &str = "download";

/// Makes a remote-supplied filename safe as a single path component on Linux.
///
/// - Replaces NUL, `/`, `\` and control characters with `_`
/// - Trims leading/trailing spaces and dots (no hidden or relative names)
/// - Keeps the extension when shortening to 255 bytes
pub fn sanitize_artifact_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| {
            if c == '\0' || c == '/' || c == '\\' || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();
    let trimmed = replaced.trim_matches(|c: char| c == '.' || c.is_whitespace());
    if trimmed.is_empty() {
        return FALLBACK_STEM.to_string();
    }
    fit_name_max(trimmed)
}

fn fit_name_max(name: &str) -> String {
    if name.len() <= NAME_MAX {
        return name.to_string();
    }
    let (stem, ext) = split_name(name);
    let ext_len = ext.map_or(0, |e| e.len() + 1);
    let mut take = NAME_MAX.saturating_sub(ext_len);
    while take > 0 && !stem.is_char_boundary(take) {
        take -= 1;
    }
    match ext {
        // An empty stem would leave a hidden `.ext` name.
        Some(ext) if take > 0 => format!("{}.{}", &stem[..take], ext),
        _ => {
            let mut take = NAME_MAX;
            while !name.is_char_boundary(take) {
                take -= 1;
            }
            name[..take].trim_end_matches(['.', ' ']).to_string()
        }
    }
}

/// Splits `clip.final.mp4` into (`clip.final`, Some(`mp4`)). A leading dot is not an extension.
pub fn split_name(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(i) if i > 0 && i + 1 < name.len() => (&name[..i], Some(&name[i + 1..])),
        _ => (name, None),
    }
}

/// Extension for the mime hints the orchestrator passes.
pub fn extension_for_mime(mime: &str) -> Option<&'static str> {
    match mime.trim().to_ascii_lowercase().as_str() {
        "audio/mpeg" | "audio/mp3" => Some("mp3"),
        "audio/mp4" | "audio/x-m4a" => Some("m4a"),
        "audio/ogg" => Some("ogg"),
        "audio/webm" | "video/webm" => Some("webm"),
        "video/mp4" => Some("mp4"),
        "video/x-matroska" => Some("mkv"),
        _ => None,
    }
}

/// Sanitized name, with an extension derived from `mime_hint` when it has none.
pub fn artifact_file_name(remote_name: &str, mime_hint: &str) -> String {
    let name = sanitize_artifact_name(remote_name);
    if split_name(&name).1.is_some() {
        return name;
    }
    match extension_for_mime(mime_hint) {
        Some(ext) => fit_name_max(&format!("{}.{}", name, ext)),
        None => name,
    }
}

/// `name (n).ext` for the n-th clash.
pub fn numbered_name(name: &str, n: u32) -> String {
    let (stem, ext) = split_name(name);
    let candidate = match ext {
        Some(ext) => format!("{} ({}).{}", stem, n, ext),
        None => format!("{} ({})", stem, n),
    };
    fit_name_max(&candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_separators_and_controls() {
        assert_eq!(sanitize_artifact_name("a/b\\c\x00d.mp4"), "a_b_c_d.mp4");
        assert_eq!(sanitize_artifact_name("My Song - Live.mp3"), "My Song - Live.mp3");
    }

    #[test]
    fn long_extension_never_yields_hidden_name() {
        // Multibyte stem leaves no char boundary inside the one spare byte.
        let name = format!("{}.{}", "é".repeat(10), "x".repeat(253));
        let fitted = sanitize_artifact_name(&name);
        assert!(fitted.len() <= NAME_MAX);
        assert!(fitted.starts_with('é'));
        assert!(!fitted.ends_with('.'));

        let name = format!("a.{}", "x".repeat(254));
        let fitted = sanitize_artifact_name(&name);
        assert!(fitted.len() <= NAME_MAX);
        assert!(fitted.starts_with("a."));
    }

    #[test]
    fn no_hidden_or_empty_names() {
        assert_eq!(sanitize_artifact_name(" ..clip.mp4. "), "clip.mp4");
        assert_eq!(sanitize_artifact_name("..."), "download");
        assert_eq!(sanitize_artifact_name(""), "download");
    }

    #[test]
    fn long_names_keep_extension() {
        let long = format!("{}.mp4", "é".repeat(300));
        let out = sanitize_artifact_name(&long);
        assert!(out.len() <= 255);
        assert!(out.ends_with(".mp4"));
    }

    #[test]
    fn extension_from_mime_when_missing() {
        assert_eq!(artifact_file_name("clip", "video/mp4"), "clip.mp4");
        assert_eq!(artifact_file_name("song", "audio/mpeg"), "song.mp3");
        assert_eq!(artifact_file_name("song.opus", "audio/mpeg"), "song.opus");
        assert_eq!(artifact_file_name("blob", "application/x-unknown"), "blob");
    }

    #[test]
    fn numbering() {
        assert_eq!(numbered_name("clip.mp4", 1), "clip (1).mp4");
        assert_eq!(numbered_name("a.b.webm", 2), "a.b (2).webm");
        assert_eq!(numbered_name("noext", 3), "noext (3)");
    }
}
