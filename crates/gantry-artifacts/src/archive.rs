//! Tar packing and unpacking for artifact blobs.

use gantry_core::{Error, Result};
use std::path::{Path, PathBuf};

/// Pack files (paths relative to `base_dir`) into an in-memory tar archive.
pub fn create_archive(paths: &[PathBuf], base_dir: &Path) -> Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());

    for relative in paths {
        let abs_path = base_dir.join(relative);
        if abs_path.is_dir() {
            builder
                .append_dir_all(relative, &abs_path)
                .map_err(|e| Error::Internal(format!("Failed to pack dir: {}", e)))?;
        } else {
            builder
                .append_path_with_name(&abs_path, relative)
                .map_err(|e| Error::Internal(format!("Failed to pack file: {}", e)))?;
        }
    }

    builder
        .into_inner()
        .map_err(|e| Error::Internal(format!("Failed to finish tar: {}", e)))
}

/// Extract an archive blob into a destination directory.
pub fn extract_archive(bytes: &[u8], dest: &Path) -> Result<()> {
    let mut archive = tar::Archive::new(bytes);
    archive
        .unpack(dest)
        .map_err(|e| Error::Internal(format!("Failed to unpack archive: {}", e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_unpack_preserves_bytes() {
        let src = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(src.path().join("dist")).unwrap();
        std::fs::write(src.path().join("dist/app.bin"), b"\x00\x01binary\xff").unwrap();
        std::fs::write(src.path().join("notes.txt"), "hello").unwrap();

        let blob = create_archive(
            &[PathBuf::from("dist/app.bin"), PathBuf::from("notes.txt")],
            src.path(),
        )
        .unwrap();

        let dest = tempfile::tempdir().unwrap();
        extract_archive(&blob, dest.path()).unwrap();

        assert_eq!(
            std::fs::read(dest.path().join("dist/app.bin")).unwrap(),
            b"\x00\x01binary\xff"
        );
        assert_eq!(
            std::fs::read_to_string(dest.path().join("notes.txt")).unwrap(),
            "hello"
        );
    }
}
