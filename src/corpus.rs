//! Source-document resolution.
//!
//! Chunks reference their origin by chapter title; the corpus directory holds
//! one document per file. Matching is by sanitized-title substring against
//! filenames, with candidates sorted lexicographically so the same corpus
//! always resolves the same way regardless of filesystem listing order.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Sanitize a chapter title for filename matching.
///
/// Every character outside `[A-Za-z0-9_-]` becomes `_`; the character count
/// is preserved.
pub fn sanitize_title(title: &str) -> String {
    title
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Find the source document for a chapter title.
///
/// Returns the path of the lexicographically first file whose name contains
/// the sanitized title as a substring, or `None` when nothing matches. An
/// unreadable corpus directory degrades to `None` with a warning; a missing
/// document is an expected condition, not an error.
pub fn find_document(corpus_dir: &Path, chapter_title: &str) -> Option<PathBuf> {
    let needle = sanitize_title(chapter_title);

    let entries = match std::fs::read_dir(corpus_dir) {
        Ok(entries) => entries,
        Err(e) => {
            eprintln!(
                "Warning: could not read corpus directory {}: {}",
                corpus_dir.display(),
                e
            );
            return None;
        }
    };

    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect();

    // Sort for deterministic matching
    names.sort();

    names
        .into_iter()
        .find(|name| name.contains(&needle))
        .map(|name| corpus_dir.join(name))
}

/// Read a matched document fully as UTF-8 text.
pub fn read_document(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read document: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_maps_everything_outside_the_class_to_underscore() {
        assert_eq!(sanitize_title("Ch. 1: Ādi Parva!"), "Ch__1___di_Parva_");
    }

    #[test]
    fn sanitize_preserves_character_count() {
        let title = "Ch. 1: Ādi Parva!";
        assert_eq!(
            sanitize_title(title).chars().count(),
            title.chars().count()
        );
    }

    #[test]
    fn sanitize_keeps_hyphen_and_underscore() {
        assert_eq!(sanitize_title("a-b_c9"), "a-b_c9");
    }

    #[test]
    fn find_document_matches_by_substring() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("01_Adi_Parva.txt"), "doc").unwrap();
        std::fs::write(dir.path().join("02_Sabha_Parva.txt"), "doc").unwrap();

        let found = find_document(dir.path(), "Adi Parva").unwrap();
        assert_eq!(found, dir.path().join("01_Adi_Parva.txt"));
    }

    #[test]
    fn find_document_prefers_lexicographically_first_match() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b_Adi_Parva.txt"), "doc").unwrap();
        std::fs::write(dir.path().join("a_Adi_Parva.txt"), "doc").unwrap();

        let found = find_document(dir.path(), "Adi Parva").unwrap();
        assert_eq!(found, dir.path().join("a_Adi_Parva.txt"));
    }

    #[test]
    fn find_document_returns_none_without_a_match() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("01_Sabha_Parva.txt"), "doc").unwrap();
        assert!(find_document(dir.path(), "Adi Parva").is_none());
    }

    #[test]
    fn find_document_ignores_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("Adi_Parva")).unwrap();
        std::fs::write(dir.path().join("z_Adi_Parva.txt"), "doc").unwrap();

        let found = find_document(dir.path(), "Adi Parva").unwrap();
        assert_eq!(found, dir.path().join("z_Adi_Parva.txt"));
    }

    #[test]
    fn find_document_degrades_on_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let absent = dir.path().join("no_such_corpus");
        assert!(find_document(&absent, "Adi Parva").is_none());
    }
}
