use std::{
    fs,
    path::{Component, Path},
};
use tracing::warn;

use super::{identifier::sample_id, SampleEntry};

/// Extensiones reconocidas como audio (sin distinguir mayúsculas)
pub const AUDIO_EXTENSIONS: [&str; 6] = ["mp3", "wav", "ogg", "flac", "m4a", "aiff"];

pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| AUDIO_EXTENSIONS.iter().any(|known| known.eq_ignore_ascii_case(ext)))
}

/// Walks `root` and returns every audio file below it.
///
/// Uses an explicit stack of pending directories instead of recursion.
/// Unreadable directories and entries are skipped with a warning, symlinks
/// are not followed, and the result order is whatever the filesystem yields.
pub fn scan(root: &Path) -> Vec<SampleEntry> {
    let mut samples = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(dir = %dir.display(), error = %err, "Failed to read directory during scan");
                continue;
            }
        };

        for entry_result in entries {
            let entry = match entry_result {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(dir = %dir.display(), error = %err, "Failed to read directory entry during scan");
                    continue;
                }
            };

            let path = entry.path();
            let file_type = match entry.file_type() {
                Ok(file_type) => file_type,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "Failed to read file type during scan");
                    continue;
                }
            };

            if file_type.is_symlink() {
                continue;
            }
            if file_type.is_dir() {
                stack.push(path);
                continue;
            }
            if file_type.is_file() && is_audio_file(&path) {
                if let Some(sample) = build_entry(root, &path) {
                    samples.push(sample);
                }
            }
        }
    }

    samples
}

fn build_entry(root: &Path, path: &Path) -> Option<SampleEntry> {
    let basename = path.file_name()?.to_string_lossy();
    let relative = path.strip_prefix(root).ok()?;

    // Si el stat falla, el tamaño queda en 0 y el escaneo sigue
    let size = match fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Failed to stat sample, recording size 0");
            0
        }
    };

    Some(SampleEntry {
        id: sample_id(&basename),
        relative_path: to_slash_path(relative),
        absolute_path: path.to_path_buf(),
        size,
    })
}

/// Ruta relativa con separadores `/` en cualquier plataforma
pub(crate) fn to_slash_path(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
