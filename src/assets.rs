//! Optional branding shown next to the reports.

use crate::error::AssetError;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrandingAsset {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
}

/// Reads the branding image. A missing file is reported as
/// [`AssetError::NotFound`] so the caller can decide to go on without it.
pub fn load_branding(path: &Path) -> Result<BrandingAsset, AssetError> {
    if !path.is_file() {
        return Err(AssetError::NotFound {
            path: path.to_path_buf(),
        });
    }

    let bytes = fs::read(path).map_err(|source| AssetError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(BrandingAsset {
        path: path.to_path_buf(),
        bytes,
    })
}

impl BrandingAsset {
    /// Copies the asset into `dir` as `logo.<ext>` and returns the new path.
    pub fn copy_to(&self, dir: &Path) -> std::io::Result<PathBuf> {
        let extension = self
            .path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("png");
        let target = dir.join(format!("{}.{}", crate::report::LOGO_STEM, extension));
        fs::write(&target, &self.bytes)?;
        Ok(target)
    }
}
