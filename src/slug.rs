//! Slug rule validation.
//!
//! A slug is a short, human-chosen, globally unique alias for a document.
//! The rule check is pure; uniqueness is delegated to the store adapter by
//! the controller.

use thiserror::Error;

use crate::store::DocStore;

/// Reserved for the dev node and normal web functioning.
const RESERVED: &[&str] = &["www", "dev", "smart-api"];

const MIN_LEN: usize = 4;
const MAX_LEN: usize = 50;
const VALID_EXTRA: &[char] = &['-', '_', '~'];

/// A slug rule violation. Checks run in declaration order and stop at the
/// first failure; each variant carries its own user-facing reason.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SlugError {
    #[error("slug name '{0}' is reserved, please choose another")]
    Reserved(String),
    #[error("slug name must be between {MIN_LEN} and {MAX_LEN} chars")]
    Length,
    #[error("slug name contains invalid characters; valid characters are letters, digits, '-', '_' and '~'")]
    InvalidChars,
    #[error("slug name '{0}' already exists, please choose another")]
    Taken(String),
}

/// Pure rule check over a candidate slug. Slugs compare and store
/// lowercased.
pub fn validate_slug(candidate: &str) -> Result<(), SlugError> {
    let slug = candidate.to_lowercase();

    if RESERVED.contains(&slug.as_str()) {
        return Err(SlugError::Reserved(slug));
    }
    let char_count = slug.chars().count();
    if char_count < MIN_LEN || char_count > MAX_LEN {
        return Err(SlugError::Length);
    }
    if !slug
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || VALID_EXTRA.contains(&c))
    {
        return Err(SlugError::InvalidChars);
    }
    Ok(())
}

/// Full check: rules first, then uniqueness against the store, excluding
/// the document being updated. Never cached; reads current store state.
pub async fn check_slug_available(
    store: &DocStore,
    candidate: &str,
    updating_id: &str,
) -> Result<Result<String, SlugError>, sqlx::Error> {
    let slug = candidate.to_lowercase();
    if let Err(e) = validate_slug(&slug) {
        return Ok(Err(e));
    }
    match store.slug_owner(&slug).await? {
        Some(owner_id) if owner_id != updating_id => Ok(Err(SlugError::Taken(slug))),
        _ => Ok(Ok(slug)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved() {
        assert_eq!(
            validate_slug("www"),
            Err(SlugError::Reserved("www".into()))
        );
        // case-insensitive
        assert_eq!(
            validate_slug("Smart-API"),
            Err(SlugError::Reserved("smart-api".into()))
        );
    }

    #[test]
    fn test_length_bounds() {
        assert_eq!(validate_slug("ab"), Err(SlugError::Length));
        assert_eq!(validate_slug(&"a".repeat(51)), Err(SlugError::Length));
        assert!(validate_slug("abcd").is_ok());
        assert!(validate_slug(&"a".repeat(50)).is_ok());
    }

    #[test]
    fn test_length_counts_chars_not_bytes() {
        // Three chars, six bytes: too short, not invalid-characters.
        assert_eq!(validate_slug("ééé"), Err(SlugError::Length));
    }

    #[test]
    fn test_charset() {
        assert_eq!(validate_slug("bad slug!"), Err(SlugError::InvalidChars));
        assert!(validate_slug("my-api_v2~beta").is_ok());
        assert!(validate_slug("validname").is_ok());
    }

    #[test]
    fn test_check_order_reserved_before_length() {
        // "www" is both reserved and too short; reserved must win.
        assert!(matches!(validate_slug("www"), Err(SlugError::Reserved(_))));
    }
}
