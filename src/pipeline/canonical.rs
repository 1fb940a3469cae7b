//! Canonical image identity.
//!
//! CMSes publish one upload at several resolutions (`photo-300x200.jpg`,
//! `photo-1024x683.jpg`, `photo-scaled.jpg`). All of those share the base
//! filename `photo.jpg` and are treated as the same visual asset. Numeric
//! suffixes that are not dimension pairs (`photo-1.jpg`) denote different
//! uploads and are kept.

use std::sync::LazyLock;

use regex::Regex;

static SIZE_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:-\d+x\d+|-scaled)+$").expect("size suffix regex"));

/// Last path segment of a URL, without query string or fragment.
pub fn file_name(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/').next().unwrap_or(path)
}

/// File name with trailing size/scale suffixes removed from the stem.
pub fn base_filename(url: &str) -> String {
    let name = file_name(url);
    let (stem, extension) = match name.rfind('.') {
        Some(dot) if dot > 0 => name.split_at(dot),
        _ => (name, ""),
    };
    let stem = SIZE_SUFFIX_RE.replace(stem, "");
    format!("{}{}", stem, extension)
}
