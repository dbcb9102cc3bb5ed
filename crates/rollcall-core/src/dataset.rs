//! Builds a [`Gallery`] from a directory of labelled reference photos.
//!
//! Layout: `<root>/<group>/<name>[ (n)].<ext>`. Each group directory holds
//! one or more photos per person; `john.jpg` and `john (2).jpg` both become
//! reference records for `john`.

use crate::gallery::{Gallery, GalleryError};
use crate::processor::FaceEmbedder;
use crate::types::IdentityRecord;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("cannot read dataset directory {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Gallery(#[from] GalleryError),
}

/// Why a single reference photo was left out of the gallery.
#[derive(Error, Debug)]
pub enum DatasetLoadError {
    #[error("cannot derive a person name from the file name")]
    NoName,
    #[error("cannot load image: {0}")]
    Image(#[from] image::ImageError),
    #[error("face embedding failed: {0}")]
    Embedder(String),
    #[error("no face detected")]
    NoFaceDetected,
}

/// Derive the identity name from a reference photo's file name.
///
/// Drops the final extension, then everything from the first `(` onwards,
/// then surrounding whitespace. Returns `None` when nothing is left.
pub fn derive_name(file_name: &str) -> Option<String> {
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);
    let name = stem.split('(').next().unwrap_or(stem).trim();

    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Walk `root` and embed the first face of every reference photo.
///
/// Groups and files are visited in lexicographic order so that gallery
/// insertion order is reproducible. Photos that fail to load or contain no
/// face are skipped with a warning.
pub fn load_gallery<E: FaceEmbedder>(root: &Path, embedder: &mut E) -> Result<Gallery, DatasetError> {
    let mut records = Vec::new();
    let mut skipped = 0usize;

    for group_dir in sorted_entries(root)? {
        if !group_dir.is_dir() {
            continue;
        }
        let Some(group) = group_dir.file_name().and_then(|s| s.to_str()).map(str::to_string) else {
            tracing::warn!(path = %group_dir.display(), "skipping group directory with non-UTF-8 name");
            continue;
        };

        for file in sorted_entries(&group_dir)? {
            if !file.is_file() {
                continue;
            }
            match load_record(&file, &group, embedder) {
                Ok(record) => {
                    tracing::debug!(name = %record.name, group = %record.group, path = %file.display(), "reference loaded");
                    records.push(record);
                }
                Err(e) => {
                    tracing::warn!(path = %file.display(), error = %e, "skipping reference photo");
                    skipped += 1;
                }
            }
        }
    }

    let gallery = Gallery::new(records)?;
    tracing::info!(
        root = %root.display(),
        records = gallery.len(),
        identities = gallery.names().len(),
        skipped,
        "gallery built"
    );
    Ok(gallery)
}

fn load_record<E: FaceEmbedder>(
    path: &Path,
    group: &str,
    embedder: &mut E,
) -> Result<IdentityRecord, DatasetLoadError> {
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .and_then(derive_name)
        .ok_or(DatasetLoadError::NoName)?;

    let image = image::open(path)?.to_rgb8();
    let detection = embedder
        .detect_faces(&image)
        .map_err(|e| DatasetLoadError::Embedder(e.to_string()))?
        .into_iter()
        .next()
        .ok_or(DatasetLoadError::NoFaceDetected)?;

    Ok(IdentityRecord {
        name,
        group: group.to_string(),
        embedding: detection.embedding,
    })
}

/// Non-hidden entries of `dir`, sorted by file name.
fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, DatasetError> {
    let unreadable = |source| DatasetError::Unreadable {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).map_err(unreadable)? {
        let entry = entry.map_err(unreadable)?;
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        entries.push(entry.path());
    }
    entries.sort();
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::tests::detection;
    use crate::types::Detection;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_derive_name_plain() {
        assert_eq!(derive_name("john.jpg").as_deref(), Some("john"));
    }

    #[test]
    fn test_derive_name_parenthetical_suffix() {
        assert_eq!(derive_name("john (2).jpg").as_deref(), Some("john"));
        assert_eq!(derive_name("john(2).png").as_deref(), Some("john"));
    }

    #[test]
    fn test_derive_name_only_last_extension() {
        assert_eq!(derive_name("mary.ann.jpeg").as_deref(), Some("mary.ann"));
    }

    #[test]
    fn test_derive_name_keeps_inner_spaces() {
        assert_eq!(derive_name("  Aksh Garg (office).jpg").as_deref(), Some("Aksh Garg"));
    }

    #[test]
    fn test_derive_name_empty() {
        assert_eq!(derive_name("(1).jpg"), None);
        assert_eq!(derive_name(""), None);
    }

    /// Uses the first pixel as the embedding; a black image has no face.
    struct PixelEmbedder;

    impl FaceEmbedder for PixelEmbedder {
        type Error = std::convert::Infallible;

        fn detect_faces(&mut self, image: &RgbImage) -> Result<Vec<Detection>, Self::Error> {
            let Rgb([r, g, b]) = *image.get_pixel(0, 0);
            if (r, g, b) == (0, 0, 0) {
                return Ok(Vec::new());
            }
            Ok(vec![detection(&[r as f32, g as f32, b as f32])])
        }
    }

    fn save(path: &Path, color: [u8; 3]) {
        RgbImage::from_pixel(2, 2, Rgb(color)).save(path).unwrap();
    }

    #[test]
    fn test_load_gallery_orders_and_skips() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("dev")).unwrap();
        fs::create_dir_all(root.join("design")).unwrap();

        save(&root.join("dev/john.png"), [10, 0, 0]);
        save(&root.join("dev/john (2).png"), [11, 0, 0]);
        save(&root.join("dev/ghost.png"), [0, 0, 0]);
        fs::write(root.join("dev/notes.txt"), "not an image").unwrap();
        fs::write(root.join("dev/.hidden.png"), "ignored").unwrap();
        save(&root.join("design/yasha.png"), [0, 20, 0]);
        fs::write(root.join("README"), "top-level files are ignored").unwrap();
        // Nested directories are not walked; a file named only "(1)" has no name.
        fs::create_dir_all(root.join("dev/sub")).unwrap();
        save(&root.join("dev/sub/nested.png"), [30, 0, 0]);
        save(&root.join("dev/(1).png"), [40, 0, 0]);

        let gallery = load_gallery(root, &mut PixelEmbedder).unwrap();
        let summary: Vec<(&str, &str, f32)> = gallery
            .records()
            .iter()
            .map(|r| (r.name.as_str(), r.group.as_str(), r.embedding.values[0] + r.embedding.values[1]))
            .collect();

        assert_eq!(
            summary,
            vec![
                ("yasha", "design", 20.0),
                ("john", "dev", 11.0),
                ("john", "dev", 10.0),
            ]
        );
        assert_eq!(gallery.names(), vec!["yasha", "john"]);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_load_gallery_skips_non_utf8_group() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let odd = root.join(OsStr::from_bytes(b"gr\xffup"));
        fs::create_dir_all(&odd).unwrap();
        save(&odd.join("mallory.png"), [50, 0, 0]);
        fs::create_dir_all(root.join("dev")).unwrap();
        save(&root.join("dev/john.png"), [10, 0, 0]);

        let gallery = load_gallery(root, &mut PixelEmbedder).unwrap();
        assert_eq!(gallery.names(), vec!["john"]);
    }

    #[test]
    fn test_load_gallery_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_gallery(&dir.path().join("nope"), &mut PixelEmbedder).unwrap_err();
        assert!(matches!(err, DatasetError::Unreadable { .. }));
    }
}
