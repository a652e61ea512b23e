// Image-bearing directory helpers

use std::path::{Path, PathBuf};

use crate::video::has_extension;

/// Extensions recognised in every image directory (case-insensitive)
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "webp"];

pub fn is_image_file(path: &Path) -> bool {
    path.is_file() && has_extension(path, IMAGE_EXTENSIONS)
}

/// Recognised images directly inside `dir`, sorted by file name
///
/// A missing directory yields an empty list.
pub fn list_images(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut images: Vec<PathBuf> = std::fs::read_dir(dir)?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| is_image_file(path))
        .collect();
    images.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(images)
}

/// Delete recognised images inside `dir`, creating the directory if absent
///
/// Other files are left alone. Returns the number of images removed.
pub fn clear_images(dir: &Path) -> std::io::Result<usize> {
    std::fs::create_dir_all(dir)?;
    let images = list_images(dir)?;
    for image in &images {
        std::fs::remove_file(image)?;
    }
    Ok(images.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        std::fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_list_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.PNG", "a.jpg", "c.webp", "notes.txt", "d.jpeg", "e.bmp", "clip.mp4"] {
            touch(&dir.path().join(name));
        }
        std::fs::create_dir(dir.path().join("sub.png")).unwrap();

        let names: Vec<String> = list_images(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.jpg", "b.PNG", "c.webp", "d.jpeg", "e.bmp"]);
    }

    #[test]
    fn test_list_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_images(&dir.path().join("nope")).unwrap().is_empty());
    }

    #[test]
    fn test_clear_keeps_other_files() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("00000.png"));
        touch(&dir.path().join("00001.jpg"));
        touch(&dir.path().join("keep.json"));

        assert_eq!(clear_images(dir.path()).unwrap(), 2);
        assert!(list_images(dir.path()).unwrap().is_empty());
        assert!(dir.path().join("keep.json").exists());
    }

    #[test]
    fn test_clear_creates_dir() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("modified");
        assert_eq!(clear_images(&target).unwrap(), 0);
        assert!(target.is_dir());
    }
}
