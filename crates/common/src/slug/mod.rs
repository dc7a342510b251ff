//! URL slugs for cases

use crate::db::Repository;
use crate::errors::{AppError, Result};
use rand::Rng;
use regex_lite::Regex;
use std::sync::OnceLock;
use uuid::Uuid;

const SUFFIX_LEN: usize = 6;
const SUFFIX_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const MAX_ATTEMPTS: usize = 8;

fn separator() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("[^a-z0-9]+").expect("valid slug pattern"))
}

/// Lowercase, collapse runs of anything outside `[a-z0-9]` into `-`,
/// trim leading and trailing dashes.
pub fn slugify(title: &str) -> String {
    let lowered = title.to_lowercase();
    let slug = separator().replace_all(&lowered, "-");
    let slug = slug.trim_matches('-');

    if slug.is_empty() {
        "case".to_string()
    } else {
        slug.to_string()
    }
}

/// Random `[a-z0-9]` suffix
pub fn random_suffix() -> String {
    let mut rng = rand::thread_rng();
    (0..SUFFIX_LEN)
        .map(|_| SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())] as char)
        .collect()
}

/// Slug for `title` not used by any case other than `exclude`
pub async fn unique_slug(repo: &Repository, title: &str, exclude: Option<Uuid>) -> Result<String> {
    let base = slugify(title);
    if !repo.slug_exists(&base, exclude).await? {
        return Ok(base);
    }

    for _ in 0..MAX_ATTEMPTS {
        let candidate = format!("{}-{}", base, random_suffix());
        if !repo.slug_exists(&candidate, exclude).await? {
            return Ok(candidate);
        }
    }

    Err(AppError::Internal {
        message: format!("Could not find a free slug for '{}'", base),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("Missing Funds in Ward 12"), "missing-funds-in-ward-12");
    }

    #[test]
    fn test_slugify_collapses_and_trims() {
        assert_eq!(slugify("  --Hello,   World!!  "), "hello-world");
        assert_eq!(slugify("a__b..c"), "a-b-c");
    }

    #[test]
    fn test_slugify_non_ascii() {
        assert_eq!(slugify("Café Déjà vu"), "caf-d-j-vu");
    }

    #[test]
    fn test_slugify_empty_falls_back() {
        assert_eq!(slugify("!!!"), "case");
        assert_eq!(slugify(""), "case");
    }

    #[test]
    fn test_random_suffix_shape() {
        let suffix = random_suffix();
        assert_eq!(suffix.len(), SUFFIX_LEN);
        assert!(suffix.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit()));
    }
}
