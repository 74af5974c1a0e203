//! Name normalization
//!
//! One function shared by sanctions ingestion and screening. The two sides
//! must agree byte-for-byte or similarity scores stop being comparable, so
//! the behavior is pinned by test:
//!
//! - Uppercase
//! - Punctuation stripped (anything neither alphanumeric nor whitespace)
//! - Whitespace collapsed to single spaces, trimmed

/// Normalize a party or sanctions name for matching
pub fn normalize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_space = false;
    for c in name.chars() {
        if c.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if !c.is_alphanumeric() {
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        for upper in c.to_uppercase() {
            out.push(upper);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pinned_normalization() {
        // Pinned: ingestion and screening depend on these exact bytes.
        assert_eq!(normalize("Osama bin Laden"), "OSAMA BIN LADEN");
        assert_eq!(normalize("  al-Qaida   Network "), "ALQAIDA NETWORK");
        assert_eq!(normalize("O'Neill, John P."), "ONEILL JOHN P");
        assert_eq!(normalize("ACME  GmbH & Co. KG"), "ACME GMBH CO KG");
        assert_eq!(normalize("----"), "");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn test_idempotent() {
        let once = normalize("Crédit  Lyonnais S.A.");
        assert_eq!(normalize(&once), once);
    }

    #[test]
    fn test_unicode_uppercasing() {
        assert_eq!(normalize("straße"), "STRASSE");
        assert_eq!(normalize("crédit"), "CRÉDIT");
    }
}
