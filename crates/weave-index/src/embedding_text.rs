// embedding_text.rs — The text that represents a fragment in vector space.
//
// Built from metadata only (no source body): kind + name, package,
// signature, definition and documentation. Each field is capped on its own
// so a long definition cannot crowd out the docstring.

use crate::inventory::FragmentInfo;

/// Build the embedding text for one fragment.
///
/// Signature and definition are capped at `max_len / 3` characters, the
/// documentation at `max_len`; a cut field gets a trailing `"..."`.
pub fn embedding_text(id: &str, info: &FragmentInfo, max_len: usize) -> String {
    let meta_len = max_len / 3;
    let identifier = non_blank(info.identifier.as_deref());
    let kind = non_blank(info.fragment_type.as_deref());

    let mut parts: Vec<String> = Vec::new();
    match (kind, identifier) {
        (Some(kind), Some(name)) => parts.push(format!("{} Name: {}", capitalize(kind), name)),
        (None, Some(name)) => parts.push(format!("Identifier: {}", name)),
        (kind, None) => parts.push(format!("Fragment Type: {}", kind.unwrap_or("UnknownType"))),
    }
    if let Some(package) = non_blank(info.package_name.as_deref()) {
        parts.push(format!("Package: {}", package));
    }
    if let Some(signature) = non_blank(info.signature.as_deref()) {
        parts.push(format!("Signature: {}", truncate(signature, meta_len)));
    }
    if let Some(definition) = non_blank(info.definition.as_deref()) {
        parts.push(format!("Definition: {}", truncate(definition, meta_len)));
    }
    if let Some(doc) = non_blank(info.docstring.as_deref()) {
        parts.push(format!("Documentation: {}", truncate(doc.trim(), max_len)));
    }

    let text = parts.join(". ");
    if text.trim().is_empty() {
        return fallback_text(id, info);
    }
    text
}

/// Minimal text used when nothing else describes the fragment.
pub fn fallback_text(id: &str, info: &FragmentInfo) -> String {
    format!(
        "{}: {}",
        non_blank(info.fragment_type.as_deref()).unwrap_or("Fragment"),
        non_blank(info.identifier.as_deref()).unwrap_or(id)
    )
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
        None => String::new(),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let mut cut: String = text.chars().take(max_chars).collect();
        cut.push_str("...");
        cut
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn method_fragment() -> FragmentInfo {
        FragmentInfo {
            fragment_type: Some("method".into()),
            identifier: Some("Save".into()),
            package_name: Some("store".into()),
            signature: Some("func (s *Store) Save(u User) error".into()),
            docstring: Some("  Save persists a user.  ".into()),
            ..Default::default()
        }
    }

    #[test]
    fn joins_metadata_parts() {
        let text = embedding_text("id", &method_fragment(), 512);
        assert_eq!(
            text,
            "Method Name: Save. Package: store. \
             Signature: func (s *Store) Save(u User) error. \
             Documentation: Save persists a user."
        );
    }

    #[test]
    fn fields_are_capped_independently() {
        let mut info = method_fragment();
        info.definition = Some("x".repeat(100));
        info.docstring = Some("d".repeat(40));
        let text = embedding_text("id", &info, 30);
        // Definition: 30 / 3 = 10 characters, then "...".
        assert!(text.contains(&format!("Definition: {}...", "x".repeat(10))));
        // Documentation: 30 characters, then "...".
        assert!(text.ends_with(&format!("Documentation: {}...", "d".repeat(30))));
    }

    #[test]
    fn identifier_without_kind() {
        let info = FragmentInfo {
            identifier: Some("MaxUsers".into()),
            ..Default::default()
        };
        assert_eq!(embedding_text("id", &info, 512), "Identifier: MaxUsers");
    }

    #[test]
    fn bare_fragment_still_has_text() {
        let text = embedding_text("pkg/file.go:x", &FragmentInfo::default(), 512);
        assert_eq!(text, "Fragment Type: UnknownType");
    }

    #[test]
    fn fallback_uses_id_when_identifier_missing() {
        assert_eq!(
            fallback_text("views/page.templ", &FragmentInfo::default()),
            "Fragment: views/page.templ"
        );
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        assert_eq!(truncate("héllo", 2), "hé...");
        assert_eq!(truncate("héllo", 5), "héllo");
    }
}
