//! Content type inference and filename hygiene for served documents.

pub const OCTET_STREAM: &str = "application/octet-stream";

/// Content type for a decrypted document.
///
/// Order of precedence:
/// 1. Magic bytes (via `infer`)
/// 2. File extension
/// 3. `application/octet-stream`
pub fn detect_content_type(filename: &str, data: &[u8]) -> String {
    if let Some(kind) = infer::get(data) {
        return kind.mime_type().to_string();
    }

    filename
        .rsplit_once('.')
        .and_then(|(_, ext)| mime_from_extension(ext))
        .unwrap_or(OCTET_STREAM)
        .to_string()
}

/// Extension fallback for formats without reliable magic bytes.
fn mime_from_extension(ext: &str) -> Option<&'static str> {
    match ext.to_ascii_lowercase().as_str() {
        "pdf" => Some("application/pdf"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "txt" => Some("text/plain"),
        "doc" => Some("application/msword"),
        "docx" => Some("application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
        _ => None,
    }
}

/// Strip path components and control characters from an uploaded filename.
pub fn sanitize_filename(filename: &str) -> String {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);

    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '|' | '?' | '*' | '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let sanitized = sanitized.trim();
    if sanitized.is_empty() || sanitized == "." || sanitized == ".." {
        return "unnamed_file".to_string();
    }

    truncate_preserving_extension(sanitized, 255)
}

fn truncate_preserving_extension(name: &str, max: usize) -> String {
    if name.len() <= max {
        return name.to_string();
    }
    let floor = |s: &str, mut at: usize| {
        while !s.is_char_boundary(at) {
            at -= 1;
        }
        at
    };
    match name.rfind('.') {
        Some(dot) if name.len() - dot < max => {
            let ext = &name[dot..];
            let stem_end = floor(name, max - ext.len());
            format!("{}{}", &name[..stem_end], ext)
        }
        _ => name[..floor(name, max)].to_string(),
    }
}
