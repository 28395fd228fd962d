/// Resource classification and size formatting
use crate::resource_store::ResourceCategory;

const DOCUMENT_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "text/markdown",
    "text/x-markdown",
    "text/plain",
];

const DOCUMENT_EXTENSIONS: &[&str] = &["md", "txt"];

const CODE_MIME_TYPES: &[&str] = &[
    "text/javascript",
    "application/javascript",
    "application/x-javascript",
    "text/jsx",
    "text/typescript",
    "application/typescript",
    "text/tsx",
    "text/x-python",
    "application/x-python",
    "text/x-java",
    "text/x-java-source",
    "text/x-c",
    "text/x-csrc",
    "text/x-c++",
    "text/x-c++src",
    "text/x-csharp",
    "text/x-go",
    "text/x-rust",
];

const CODE_EXTENSIONS: &[&str] = &[
    "js", "ts", "jsx", "tsx", "py", "java", "c", "cpp", "cs", "go", "rs",
];

const ARCHIVE_MIME_TYPES: &[&str] = &[
    "application/zip",
    "application/x-zip-compressed",
    "application/x-rar-compressed",
    "application/vnd.rar",
    "application/x-7z-compressed",
    "application/x-tar",
    "application/gzip",
    "application/x-gzip",
];

const SIZE_UNITS: &[&str] = &["Bytes", "KB", "MB", "GB", "TB"];

/// Map a MIME type and file name to a category
///
/// Total and deterministic: unknown or malformed input maps to `Other`.
pub fn classify(mime_type: &str, name: &str) -> ResourceCategory {
    let mime = essence(mime_type);
    let extension = extension(name);
    let has_extension = |candidates: &[&str]| {
        extension
            .as_deref()
            .map(|ext| candidates.contains(&ext))
            .unwrap_or(false)
    };

    if mime.starts_with("image/") {
        ResourceCategory::Image
    } else if DOCUMENT_MIME_TYPES.contains(&mime.as_str()) || has_extension(DOCUMENT_EXTENSIONS) {
        ResourceCategory::Document
    } else if CODE_MIME_TYPES.contains(&mime.as_str()) || has_extension(CODE_EXTENSIONS) {
        ResourceCategory::Code
    } else if ARCHIVE_MIME_TYPES.contains(&mime.as_str()) {
        ResourceCategory::Archive
    } else {
        ResourceCategory::Other
    }
}

/// Human-readable byte count, e.g. `1536 -> "1.5 KB"`
pub fn format_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut unit = 0;
    let mut scaled = bytes as f64;
    while scaled >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        scaled /= 1024.0;
        unit += 1;
    }

    let rounded = (scaled * 100.0).round() / 100.0;
    format!("{} {}", rounded, SIZE_UNITS[unit])
}

/// Lowercased MIME type without parameters (`text/plain; charset=utf-8` -> `text/plain`)
fn essence(mime_type: &str) -> String {
    mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn extension(name: &str) -> Option<String> {
    name.rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
}
