//! URL slug generation
//!
//! Two flavours exist: titles (blogs, threads, tags) keep only `[a-z0-9]`,
//! while category slugs keep word characters and hyphens from the name.

use once_cell::sync::Lazy;
use regex::Regex;

/// Longest blog or thread title accepted. Matches the title columns and keeps
/// the derived slug plus its uniqueness suffix inside the slug columns.
pub const MAX_TITLE_CHARS: usize = 255;

static NON_ALNUM_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("valid regex"));
static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9_\s-]").expect("valid regex"));
static SEPARATOR_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s_-]+").expect("valid regex"));

/// Lowercase, turn every run of characters outside `[a-z0-9]` into one `-`
/// and trim hyphens from both ends. May return an empty string.
pub fn slugify(text: &str) -> String {
    let lowered = text.to_lowercase();
    NON_ALNUM_RUN
        .replace_all(&lowered, "-")
        .trim_matches('-')
        .to_string()
}

/// [`slugify`] with a fallback for titles that contain no usable characters
pub fn slugify_or(text: &str, fallback: &str) -> String {
    let slug = slugify(text);
    if slug.is_empty() {
        fallback.to_string()
    } else {
        slug
    }
}

/// Error message for a title over [`MAX_TITLE_CHARS`], `None` when it fits
pub fn check_title_length(title: &str) -> Option<String> {
    (title.chars().count() > MAX_TITLE_CHARS)
        .then(|| format!("Title must be at most {} characters", MAX_TITLE_CHARS))
}

/// Category slug from a name.
///
/// Punctuation is dropped rather than replaced, so `"C++ & Rust"` becomes
/// `"c-rust"`.
pub fn generate_slug(name: &str) -> String {
    let lowered = name.to_lowercase();
    let stripped = NON_WORD.replace_all(lowered.trim(), "");
    SEPARATOR_RUN
        .replace_all(&stripped, "-")
        .trim_matches('-')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_slugify_titles() {
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("  Rust 2024: what's new?  "), "rust-2024-what-s-new");
        assert_eq!(slugify("Über café"), "ber-caf");
        assert_eq!(slugify("!!!"), "");
        assert_eq!(slugify_or("!!!", "blog"), "blog");
        assert_eq!(slugify_or("Post", "blog"), "post");
    }

    #[test]
    fn test_title_length_limit() {
        assert_eq!(check_title_length(&"a".repeat(MAX_TITLE_CHARS)), None);
        assert_eq!(check_title_length(&"é".repeat(MAX_TITLE_CHARS)), None);
        assert_eq!(
            check_title_length(&"a".repeat(MAX_TITLE_CHARS + 1)).as_deref(),
            Some("Title must be at most 255 characters")
        );
    }

    #[test]
    fn test_generate_category_slug() {
        assert_eq!(generate_slug("Web Development"), "web-development");
        assert_eq!(generate_slug("  C++ & Rust  "), "c-rust");
        assert_eq!(generate_slug("snake_case__name"), "snake-case-name");
        assert_eq!(generate_slug("--Edge--"), "edge");
        assert_eq!(generate_slug("???"), "");
    }

    proptest! {
        #[test]
        fn slugify_output_is_url_safe(text in "\\PC{0,60}") {
            let slug = slugify(&text);
            prop_assert!(slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
            prop_assert!(!slug.starts_with('-') && !slug.ends_with('-'));
            prop_assert!(!slug.contains("--"));
        }

        #[test]
        fn accepted_title_slug_fits_column(title in "\\PC{0,255}") {
            prop_assume!(check_title_length(&title).is_none());
            // 300-character column, minus "-" and a 13-digit millisecond suffix
            prop_assert!(slugify(&title).len() + 14 <= 300);
        }

        #[test]
        fn slugify_is_idempotent(text in "\\PC{0,60}") {
            let once = slugify(&text);
            prop_assert_eq!(slugify(&once), once.clone());
        }

        #[test]
        fn category_slug_has_no_separator_runs(name in "[A-Za-z0-9 _&!-]{0,40}") {
            let slug = generate_slug(&name);
            prop_assert!(!slug.contains("--"));
            prop_assert!(!slug.starts_with('-') && !slug.ends_with('-'));
            prop_assert!(!slug.contains(' ') && !slug.contains('_'));
        }
    }
}
