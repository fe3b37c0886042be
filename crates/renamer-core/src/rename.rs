//! Rename policy: extracted identifier → proposed output name.

/// Compute the output name for an extracted identifier.
///
/// The identifier is trimmed; an empty result means the extraction found
/// nothing usable and the caller must settle the item as failed, so `None`
/// is returned. Otherwise the name is `<trimmed>.<ext>` where `ext` comes
/// from the original name, defaulting to `pdf` when undetermined.
///
/// Two items may legitimately resolve to the same output name; no
/// collision handling happens here.
pub fn output_name(extracted: &str, original_name: &str) -> Option<String> {
    let trimmed = extracted.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(format!("{}.{}", trimmed, extension_of(original_name)))
}

/// Extension of the original name, without the dot. Defaults to `pdf` for
/// names with no usable extension.
fn extension_of(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => ext,
        _ => "pdf",
    }
}
