use std::path::Path;

/// Extracts the file extension from a filename and converts it to lowercase.
pub fn get_file_extension(filename: &str) -> Option<String> {
    Path::new(filename) // treats string as filesystem path.
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}

/// Returns the trimmed value, or `None` when nothing but whitespace is left.
pub fn trimmed(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}

/// Prepends `https://` to a service URL that has no scheme.
pub fn ensure_https_prefix(url: &str) -> String {
    let url = url.trim();
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}

/// Joins object-key segments with `/`, skipping empty ones.
/// Backslashes are normalized so Windows-style destinations still produce valid keys.
pub fn join_key<S: AsRef<str>>(segments: &[S]) -> String {
    segments
        .iter()
        .map(|s| s.as_ref().replace('\\', "/"))
        .map(|s| s.trim_matches('/').to_string())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Final path component of a storage key.
pub fn basename(key: &str) -> &str {
    key.rsplit(['/', '\\']).next().unwrap_or(key)
}
