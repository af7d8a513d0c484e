//! Slug derivation for article URLs.
//!
//! Titles are transliterated to ASCII (Chinese via the `pinyin` crate) and
//! slugified, so “缓存与计数” becomes `huan-cun-yu-ji-shu`. Uniqueness is not
//! checked here: callers walk [`SlugCandidates`] and let the store's unique
//! constraint decide which candidate wins.

use pinyin::{Pinyin, ToPinyin};
use slug::slugify;
use thiserror::Error;

/// Number of suffixed candidates tried after the bare base slug.
pub const MAX_SUFFIX_ATTEMPTS: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlugError {
    #[error("slug source text is empty")]
    EmptyInput,
    #[error("failed to derive slug from `{input}`")]
    Unrepresentable { input: String },
}

/// Derive a base slug from the provided human-readable text.
pub fn derive_slug(input: &str) -> Result<String, SlugError> {
    if input.trim().is_empty() {
        return Err(SlugError::EmptyInput);
    }

    let candidate = slugify(transliterate_to_ascii(input));
    if candidate.is_empty() {
        return Err(SlugError::Unrepresentable {
            input: input.to_string(),
        });
    }

    Ok(candidate)
}

/// Yields `base`, `base-2`, `base-3`, … up to [`MAX_SUFFIX_ATTEMPTS`] suffixes.
#[derive(Debug, Clone)]
pub struct SlugCandidates {
    base: String,
    next: usize,
}

impl SlugCandidates {
    pub fn from_title(title: &str) -> Result<Self, SlugError> {
        derive_slug(title).map(|base| Self { base, next: 1 })
    }

    pub fn base(&self) -> &str {
        &self.base
    }
}

impl Iterator for SlugCandidates {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        let attempt = self.next;
        if attempt > MAX_SUFFIX_ATTEMPTS + 1 {
            return None;
        }
        self.next += 1;

        if attempt == 1 {
            Some(self.base.clone())
        } else {
            Some(format!("{}-{attempt}", self.base))
        }
    }
}

fn transliterate_to_ascii(input: &str) -> String {
    let mut output = String::with_capacity(input.len());

    for ch in input.chars() {
        if ch.is_ascii() {
            output.push(ch);
            continue;
        }

        match ch.to_pinyin() {
            Some(py) => push_syllable(&mut output, py),
            None if ch.is_whitespace() => output.push(' '),
            // slugify decides what to do with anything else
            None => output.push(ch),
        }
    }

    output
}

fn push_syllable(buffer: &mut String, pinyin: Pinyin) {
    if !buffer.is_empty() && !buffer.ends_with(' ') {
        buffer.push(' ');
    }
    buffer.push_str(pinyin.plain());
}
