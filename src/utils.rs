/// Convert a document title to a sanitized filename
pub fn sanitize_filename(title: &str) -> String {
    let name = title.replace(['/', '\\', ':', '?', '&', '=', '#', '%'], "_");

    // Limit filename length, without splitting a multi-byte character
    match name.char_indices().nth(100) {
        Some((idx, _)) => name[..idx].to_string(),
        None => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_replaces_path_characters() {
        assert_eq!(sanitize_filename("a/b:c?d"), "a_b_c_d");
    }

    #[test]
    fn test_sanitize_limits_length() {
        let long = "x".repeat(250);
        assert_eq!(sanitize_filename(&long).len(), 100);
    }
}
