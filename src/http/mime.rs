use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::path::Path;

const OCTET_STREAM: &str = "application/octet-stream";

/// Extension to MIME type, the standard nginx mapping.
static EXTENSION_TO_MIME: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("html", "text/html"),
        ("htm", "text/html"),
        ("shtml", "text/html"),
        ("css", "text/css"),
        ("xml", "text/xml"),
        ("txt", "text/plain"),
        ("mml", "text/mathml"),
        ("htc", "text/x-component"),
        ("gif", "image/gif"),
        ("jpeg", "image/jpeg"),
        ("jpg", "image/jpeg"),
        ("png", "image/png"),
        ("tif", "image/tiff"),
        ("tiff", "image/tiff"),
        ("ico", "image/x-icon"),
        ("bmp", "image/x-ms-bmp"),
        ("svg", "image/svg+xml"),
        ("svgz", "image/svg+xml"),
        ("webp", "image/webp"),
        ("js", "application/javascript"),
        ("atom", "application/atom+xml"),
        ("rss", "application/rss+xml"),
        ("woff", "application/font-woff"),
        ("jar", "application/java-archive"),
        ("json", "application/json"),
        ("doc", "application/msword"),
        ("pdf", "application/pdf"),
        ("ps", "application/postscript"),
        ("rtf", "application/rtf"),
        ("m3u8", "application/vnd.apple.mpegurl"),
        ("xls", "application/vnd.ms-excel"),
        ("eot", "application/vnd.ms-fontobject"),
        ("ppt", "application/vnd.ms-powerpoint"),
        ("7z", "application/x-7z-compressed"),
        ("pl", "application/x-perl"),
        ("pm", "application/x-perl"),
        ("rar", "application/x-rar-compressed"),
        ("swf", "application/x-shockwave-flash"),
        ("tcl", "application/x-tcl"),
        ("tk", "application/x-tcl"),
        ("der", "application/x-x509-ca-cert"),
        ("pem", "application/x-x509-ca-cert"),
        ("crt", "application/x-x509-ca-cert"),
        ("xhtml", "application/xhtml+xml"),
        ("zip", "application/zip"),
        ("tar", "application/x-tar"),
        (
            "docx",
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        ),
        (
            "xlsx",
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        ),
        (
            "pptx",
            "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        ),
        ("mid", "audio/midi"),
        ("midi", "audio/midi"),
        ("mp3", "audio/mpeg"),
        ("ogg", "audio/ogg"),
        ("m4a", "audio/x-m4a"),
        ("3gp", "video/3gpp"),
        ("ts", "video/mp2t"),
        ("mp4", "video/mp4"),
        ("mpeg", "video/mpeg"),
        ("mpg", "video/mpeg"),
        ("mov", "video/quicktime"),
        ("webm", "video/webm"),
        ("flv", "video/x-flv"),
        ("m4v", "video/x-m4v"),
        ("wmv", "video/x-ms-wmv"),
        ("avi", "video/x-msvideo"),
        ("bin", OCTET_STREAM),
        ("exe", OCTET_STREAM),
        ("dll", OCTET_STREAM),
        ("deb", OCTET_STREAM),
        ("dmg", OCTET_STREAM),
        ("iso", OCTET_STREAM),
        ("img", OCTET_STREAM),
    ])
});

/// MIME type back to the preferred extension, used to name uploaded bodies.
static MIME_TO_EXTENSION: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("text/html", "html"),
        ("text/css", "css"),
        ("text/xml", "xml"),
        ("text/plain", "txt"),
        ("image/gif", "gif"),
        ("image/jpeg", "jpeg"),
        ("image/png", "png"),
        ("image/tiff", "tiff"),
        ("image/x-icon", "ico"),
        ("image/x-ms-bmp", "bmp"),
        ("image/svg+xml", "svg"),
        ("image/webp", "webp"),
        ("application/javascript", "js"),
        ("application/java-archive", "jar"),
        ("application/json", "json"),
        ("application/msword", "doc"),
        ("application/pdf", "pdf"),
        ("application/postscript", "ps"),
        ("application/rtf", "rtf"),
        ("application/vnd.ms-excel", "xls"),
        ("application/vnd.ms-powerpoint", "ppt"),
        ("application/x-7z-compressed", "7z"),
        ("application/x-perl", "pl"),
        ("application/x-rar-compressed", "rar"),
        ("application/x-shockwave-flash", "swf"),
        ("application/x-tcl", "tcl"),
        ("application/x-x509-ca-cert", "crt"),
        ("application/xhtml+xml", "xhtml"),
        ("application/zip", "zip"),
        ("application/x-tar", "tar"),
        (
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            "docx",
        ),
        (
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            "xlsx",
        ),
        (
            "application/vnd.openxmlformats-officedocument.presentationml.presentation",
            "pptx",
        ),
        ("audio/midi", "midi"),
        ("audio/mpeg", "mp3"),
        ("audio/ogg", "ogg"),
        ("video/3gpp", "3gp"),
        ("video/mp2t", "ts"),
        ("video/mp4", "mp4"),
        ("video/mpeg", "mpeg"),
        ("video/quicktime", "mov"),
        ("video/webm", "webm"),
        ("video/x-msvideo", "avi"),
        (OCTET_STREAM, "bin"),
    ])
});

/// MIME type for a filesystem path, keyed on the lowercased extension.
#[must_use]
pub fn mime_type(path: &Path) -> &'static str {
    let ext = match path.extension().and_then(|e| e.to_str()) {
        Some(e) => e.to_ascii_lowercase(),
        None => return OCTET_STREAM,
    };
    EXTENSION_TO_MIME.get(ext.as_str()).copied().unwrap_or(OCTET_STREAM)
}

/// Preferred file extension for a MIME type, or `None` when unmapped.
#[must_use]
pub fn extension_for(content_type: &str) -> Option<&'static str> {
    MIME_TO_EXTENSION
        .get(content_type.trim().to_ascii_lowercase().as_str())
        .copied()
}
