pub mod source;
pub mod status;
pub mod target;

/// Render the title that ties a target item to its source item.
pub fn correlation_title(source_id: &str, name: &str) -> String {
    format!("[{source_id}] {name}")
}

/// Extract the source id embedded in a title produced by [`correlation_title`].
///
/// Returns `None` for titles that were not created by the bridge.
pub fn correlation_key(title: &str) -> Option<&str> {
    let rest = title.strip_prefix('[')?;
    let end = rest.find(']')?;
    let key = rest[..end].trim();
    if key.is_empty() {
        None
    } else {
        Some(key)
    }
}
