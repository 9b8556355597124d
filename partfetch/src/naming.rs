//! File naming helpers.
//!
//! Resolves the on-disk name of a remote resource from its response headers
//! and URL, and formats byte counts for logs and the CLI.

/// Characters that cannot appear in a file name on common filesystems.
const INVALID_FILENAME_CHARS: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// Extension used when a MIME type is unknown.
pub const FALLBACK_EXTENSION: &str = "bin";

/// MIME type to preferred extension.
const MIME_EXTENSIONS: &[(&str, &str)] = &[
    ("application/vnd.rar", "rar"),
    ("application/x-rar-compressed", "rar"),
    ("application/x-rar", "rar"),
    ("application/zip", "zip"),
    ("application/x-zip-compressed", "zip"),
    ("application/x-7z-compressed", "7z"),
    ("application/gzip", "gz"),
    ("application/x-gzip", "gz"),
    ("application/x-tar", "tar"),
    ("application/x-bzip2", "bz2"),
    ("application/x-xz", "xz"),
    ("application/zstd", "zst"),
    ("application/sql", "sql"),
    ("application/pdf", "pdf"),
    ("application/json", "json"),
    ("application/xml", "xml"),
    ("application/octet-stream", "bin"),
    ("text/plain", "txt"),
    ("text/html", "html"),
    ("text/csv", "csv"),
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
];

/// Replace characters that are invalid in file names with `_`.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| if INVALID_FILENAME_CHARS.contains(&c) { '_' } else { c })
        .collect()
}

/// Look up the file extension for a `Content-Type` value.
///
/// Parameters such as `; charset=utf-8` are ignored. Unknown types map to
/// [`FALLBACK_EXTENSION`].
pub fn extension_for_mime(content_type: &str) -> &'static str {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    MIME_EXTENSIONS
        .iter()
        .find(|(mime, _)| *mime == essence)
        .map(|(_, ext)| *ext)
        .unwrap_or(FALLBACK_EXTENSION)
}

/// Extract the file name from a `Content-Disposition` header value.
///
/// Prefers the RFC 5987 `filename*` parameter over plain `filename`.
pub fn content_disposition_filename(value: &str) -> Option<String> {
    let mut plain = None;
    let mut extended = None;

    for param in value.split(';').skip(1) {
        let Some((key, raw)) = param.split_once('=') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let raw = raw.trim();
        match key.as_str() {
            "filename*" => {
                // charset'language'percent-encoded
                let encoded = raw.rsplit('\'').next().unwrap_or(raw);
                extended = urlencoding::decode(encoded).ok().map(|s| s.into_owned());
            }
            "filename" => {
                plain = Some(raw.trim_matches('"').to_string());
            }
            _ => {}
        }
    }

    extended.or(plain).filter(|name| !name.is_empty())
}

/// Split a URL into host and path, dropping scheme, query and fragment.
fn split_url(url: &str) -> (&str, &str) {
    let rest = url.split_once("://").map(|(_, r)| r).unwrap_or(url);
    let rest = rest.split(['?', '#']).next().unwrap_or_default();
    match rest.find('/') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, ""),
    }
}

/// Last non-empty path segment of `url`, percent-decoded.
pub fn name_from_url(url: &str) -> Option<String> {
    let (_, path) = split_url(url);
    let segment = path.trim_matches('/').rsplit('/').next()?;
    if segment.is_empty() {
        return None;
    }
    let decoded = urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string());
    Some(decoded)
}

/// Name derived from the host when the URL has no usable path.
///
/// `downloads.example.com` yields `example`; `example.com` yields `example`.
pub fn name_from_host(url: &str) -> Option<String> {
    let (authority, _) = split_url(url);
    let host = authority.rsplit('@').next().unwrap_or(authority);
    let host = host.split(':').next().unwrap_or(host);

    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
    let label = match labels.len() {
        0 => return None,
        1 => labels[0],
        n => labels[n - 2],
    };
    Some(label.to_string())
}

/// Resolve the file name for a download.
///
/// Order of preference:
/// 1. the `Content-Disposition` file name
/// 2. the URL path, then the host name, with the MIME-derived extension
///    appended when `content_type` is known and the name lacks it
pub fn resolve_filename(
    url: &str,
    content_disposition: Option<&str>,
    content_type: Option<&str>,
) -> String {
    if let Some(name) = content_disposition.and_then(content_disposition_filename) {
        return sanitize_filename(&name);
    }

    let mut name = name_from_url(url)
        .or_else(|| name_from_host(url))
        .unwrap_or_else(|| "download".to_string());

    if let Some(content_type) = content_type {
        let ext = extension_for_mime(content_type);
        if extension_of(&name) != Some(ext) {
            name = format!("{}.{}", name, ext);
        }
    }

    sanitize_filename(&name)
}

/// Extension of `name` without the dot, if any.
pub fn extension_of(name: &str) -> Option<&str> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        None
    } else {
        Some(ext)
    }
}

/// Split `name` into `(base, extension)`; the extension excludes the dot.
pub fn split_extension(name: &str) -> (&str, Option<&str>) {
    match extension_of(name) {
        Some(ext) => (&name[..name.len() - ext.len() - 1], Some(ext)),
        None => (name, None),
    }
}

/// Format a byte count with binary units, e.g. `20.0 MB`.
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    const TB: u64 = GB * 1024;

    if bytes >= TB {
        format!("{:.2} TB", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename(r#"a\b/c:d*e?f"g<h>i|j"#), "a_b_c_d_e_f_g_h_i_j");
        assert_eq!(sanitize_filename("libgen_2024-01-01.rar"), "libgen_2024-01-01.rar");
    }

    #[test]
    fn test_extension_for_mime() {
        assert_eq!(extension_for_mime("application/x-rar-compressed"), "rar");
        assert_eq!(extension_for_mime("text/plain; charset=utf-8"), "txt");
        assert_eq!(extension_for_mime("Application/ZIP"), "zip");
        assert_eq!(extension_for_mime("application/x-unknown"), "bin");
    }

    #[test]
    fn test_content_disposition_filename() {
        assert_eq!(
            content_disposition_filename(r#"attachment; filename="dump.rar""#),
            Some("dump.rar".to_string())
        );
        assert_eq!(
            content_disposition_filename("attachment; filename=dump.rar"),
            Some("dump.rar".to_string())
        );
        assert_eq!(
            content_disposition_filename(
                r#"attachment; filename="fallback.rar"; filename*=UTF-8''caf%C3%A9.rar"#
            ),
            Some("café.rar".to_string())
        );
        assert_eq!(content_disposition_filename("inline"), None);
    }

    #[test]
    fn test_name_from_url() {
        assert_eq!(
            name_from_url("https://example.com/dbdumps/libgen_2024.rar?x=1#top"),
            Some("libgen_2024.rar".to_string())
        );
        assert_eq!(
            name_from_url("https://example.com/files/my%20file.zip/"),
            Some("my file.zip".to_string())
        );
        assert_eq!(name_from_url("https://example.com/"), None);
        assert_eq!(name_from_url("https://example.com"), None);
    }

    #[test]
    fn test_name_from_host() {
        assert_eq!(name_from_host("https://downloads.example.com/"), Some("example".to_string()));
        assert_eq!(name_from_host("http://example.com:8080"), Some("example".to_string()));
        assert_eq!(name_from_host("http://localhost/"), Some("localhost".to_string()));
    }

    #[test]
    fn test_resolve_filename_prefers_content_disposition() {
        let name = resolve_filename(
            "https://example.com/get?id=1",
            Some(r#"attachment; filename="a:b.rar""#),
            Some("application/zip"),
        );
        assert_eq!(name, "a_b.rar");
    }

    #[test]
    fn test_resolve_filename_appends_mime_extension() {
        assert_eq!(
            resolve_filename("https://example.com/dump", None, Some("application/zip")),
            "dump.zip"
        );
        assert_eq!(
            resolve_filename("https://example.com/dump.zip", None, Some("application/zip")),
            "dump.zip"
        );
        assert_eq!(
            resolve_filename("https://www.example.com/", None, Some("text/html")),
            "example.html"
        );
        assert_eq!(resolve_filename("https://example.com/a.rar", None, None), "a.rar");
    }

    #[test]
    fn test_split_extension() {
        assert_eq!(split_extension("dump.rar"), ("dump", Some("rar")));
        assert_eq!(split_extension("dump.tar.gz"), ("dump.tar", Some("gz")));
        assert_eq!(split_extension("dump"), ("dump", None));
        assert_eq!(split_extension(".hidden"), (".hidden", None));
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(20 * 1024 * 1024), "20.0 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.00 GB");
    }
}
