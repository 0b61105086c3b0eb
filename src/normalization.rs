use serde::{Deserialize, Deserializer};

/// Normalizes a name by stripping surrounding whitespace and composing
/// it into Unicode Normalization Form C.
///
/// ```
/// use bloodbank::normalization::normalize_name;
/// assert_eq!(normalize_name(" Zoë "), "Zoë");
/// ```
pub fn normalize_name(name: impl AsRef<str>) -> String {
    use unicode_normalization::UnicodeNormalization;

    name.as_ref().trim().nfc().collect()
}

/// Normalizes an email address for storage and comparison.
///
/// ```
/// use bloodbank::normalization::normalize_email;
/// assert_eq!(normalize_email(" Jane.Doe@Example.org"), "jane.doe@example.org");
/// ```
pub fn normalize_email(email: impl AsRef<str>) -> String {
    normalize_name(email).to_lowercase()
}

/// Deserializes a `String` after running it through `normalize_name`.
pub fn deserialize<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Ok(normalize_name(s))
}

/// Deserializes an optional `String` after running it through
/// `normalize_name`. Blank strings count as absent.
pub fn deserialize_option<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let o: Option<String> = Deserialize::deserialize(deserializer)?;
    Ok(o.map(normalize_name).filter(|s| !s.is_empty()))
}

/// Deserializes a `String` after running it through `normalize_email`.
pub fn deserialize_email<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Ok(normalize_email(s))
}

/// Deserializes an optional `String` after running it through
/// `normalize_email`. Blank strings count as absent.
pub fn deserialize_email_option<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let o: Option<String> = Deserialize::deserialize(deserializer)?;
    Ok(o.map(normalize_email).filter(|s| !s.is_empty()))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use unicode_normalization::is_nfc;

    use super::{normalize_email, normalize_name};

    fn count_whitespace(s: impl AsRef<str>) -> usize {
        s.as_ref().chars().filter(|c| c.is_whitespace()).count()
    }

    #[test]
    fn decomposed_names_are_composed() {
        assert_eq!(normalize_name("Zoe\u{0308}"), "Zo\u{00eb}");
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 2000, ..ProptestConfig::default()
        })]

        #[test]
        fn normalization_works(string in "(\\S.*\\S|\\S+)", space_before in "\\s*", space_after in "\\s*") {
            let normalized = normalize_name(format!("{}{}{}", space_before, string, space_after));

            prop_assert!(is_nfc(&normalized), "{:?} (normalized form of {:?}) is in NFC", normalized, string);

            prop_assert!(!normalized.starts_with(char::is_whitespace) && !normalized.ends_with(char::is_whitespace), "{:?} (normalized form of {:?}) has no leading or trailing whitespace", normalized, string);

            let trimmed = normalized.trim();

            prop_assert_eq!(count_whitespace(&normalized), count_whitespace(&trimmed), "{:?} (normalized form of {:?}) preserves inner whitespace", normalized, string);
        }

        #[test]
        fn emails_compare_case_insensitively(local in "[a-zA-Z0-9.]{1,10}", domain in "[a-zA-Z]{1,10}") {
            let email = format!("{}@{}.org", local, domain);

            prop_assert_eq!(normalize_email(&email), normalize_email(email.to_uppercase()));
        }
    }
}
