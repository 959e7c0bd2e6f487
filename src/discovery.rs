use crate::config::ImagesConfig;
use crate::error::{PredictionError, Result};
use std::{
    fs::{read_dir, DirEntry},
    path::{Path, PathBuf},
};

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    if extensions.is_empty() {
        return true;
    }
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| {
            extensions
                .iter()
                .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(&ext))
        })
}

fn visible_entries(dir: &Path) -> Result<Vec<DirEntry>> {
    let to_error = |source| PredictionError::Discovery {
        path: dir.to_path_buf(),
        source,
    };
    let mut entries = Vec::new();
    for entry in read_dir(dir).map_err(to_error)? {
        let entry = entry.map_err(to_error)?;
        if !is_hidden(&entry) {
            entries.push(entry);
        }
    }
    Ok(entries)
}

/// Every regular file exactly two levels below `images_dir` (`images_dir/*/*`),
/// in lexicographic path order.
pub fn discover_images(images_cfg: &ImagesConfig) -> Result<Vec<PathBuf>> {
    let mut image_files = Vec::new();

    for group in visible_entries(&images_cfg.images_dir)? {
        if !group.path().is_dir() {
            continue;
        }
        for entry in visible_entries(&group.path())? {
            let path = entry.path();
            if path.is_file() && has_extension(&path, &images_cfg.extensions) {
                image_files.push(path);
            }
        }
    }

    image_files.sort();
    tracing::info!(
        "Found {} images under {:?}",
        image_files.len(),
        images_cfg.images_dir
    );

    Ok(image_files)
}
