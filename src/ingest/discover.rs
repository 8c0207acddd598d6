//! Image folder discovery.
//!
//! Discovery returns paths only. No image is opened here; decoding happens
//! one frame at a time in `PathListSource`.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};

/// Recognized image extensions (compared case-insensitively).
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif"];

#[derive(Clone, Copy, Debug, Default)]
pub struct DiscoverOptions {
    /// Sort paths lexicographically instead of keeping directory order.
    pub sorted: bool,
}

/// True when `path` has one of `IMAGE_EXTENSIONS`.
pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

/// List image files directly inside `folder`.
///
/// A missing folder is not an error: a warning is logged and the list is
/// empty. A path that exists but is not a directory is an error.
pub fn discover_image_paths(folder: impl AsRef<Path>, options: DiscoverOptions) -> Result<Vec<PathBuf>> {
    let folder = folder.as_ref();
    if !folder.exists() {
        log::warn!("discover: folder '{}' does not exist", folder.display());
        return Ok(Vec::new());
    }
    if !folder.is_dir() {
        return Err(anyhow!(
            "image source '{}' is not a directory",
            folder.display()
        ));
    }

    let entries = std::fs::read_dir(folder)
        .with_context(|| format!("read image folder {}", folder.display()))?;

    let mut paths = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                log::warn!("discover: skipping unreadable entry in {}: {}", folder.display(), err);
                continue;
            }
        };
        let path = entry.path();
        if path.is_file() && is_image_path(&path) {
            paths.push(path);
        }
    }

    if options.sorted {
        paths.sort();
    }

    log::debug!("discover: {} image(s) in {}", paths.len(), folder.display());
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn extension_match_is_case_insensitive() {
        assert!(is_image_path(Path::new("a/b/frame.JPG")));
        assert!(is_image_path(Path::new("frame.Tiff")));
        assert!(is_image_path(Path::new("frame.bmp")));
        assert!(!is_image_path(Path::new("frame.gif")));
        assert!(!is_image_path(Path::new("jpg")));
        assert!(!is_image_path(Path::new("notes.txt")));
    }

    #[test]
    fn missing_folder_yields_empty_list() -> Result<()> {
        let dir = TempDir::new()?;
        let paths = discover_image_paths(dir.path().join("nope"), DiscoverOptions::default())?;
        assert!(paths.is_empty());
        Ok(())
    }

    #[test]
    fn file_instead_of_folder_is_an_error() -> Result<()> {
        let dir = TempDir::new()?;
        let file = dir.path().join("single.png");
        std::fs::write(&file, b"x")?;
        assert!(discover_image_paths(&file, DiscoverOptions::default()).is_err());
        Ok(())
    }

    #[test]
    fn filters_by_extension_and_skips_directories() -> Result<()> {
        let dir = TempDir::new()?;
        for name in ["b.png", "a.JPEG", "c.txt", "d.tiff"] {
            std::fs::write(dir.path().join(name), b"x")?;
        }
        std::fs::create_dir(dir.path().join("nested.png"))?;

        let paths = discover_image_paths(dir.path(), DiscoverOptions { sorted: true })?;
        let names: Vec<_> = paths
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
            .collect();
        assert_eq!(names, vec!["a.JPEG", "b.png", "d.tiff"]);
        Ok(())
    }
}
