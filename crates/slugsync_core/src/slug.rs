/// Normalize arbitrary text into slug form: lowercase, Unicode letters and
/// digits kept, whitespace and hyphen runs collapsed to a single hyphen,
/// underscores kept, every other character dropped. May return an empty
/// string; callers treat empty as invalid.
pub fn sanitize_slug(raw: &str) -> String {
    let mut slug = String::with_capacity(raw.len());
    let mut pending_hyphen = false;

    for ch in raw.trim().chars() {
        if ch.is_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            for lowered in ch.to_lowercase() {
                slug.push(lowered);
            }
        } else if ch == '_' {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push('_');
        } else if ch == '-' || ch.is_whitespace() {
            pending_hyphen = true;
        }
        // Any other character is dropped without acting as a separator.
    }

    slug
}
