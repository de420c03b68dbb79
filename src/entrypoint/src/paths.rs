//! Storage root initialization and the permission helpers shared by the provisioners.
use crate::config::PathsConfig;
use crate::error::Result;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

/// Group and other permission bits
const GROUP_OTHER_MASK: u32 = 0o077;

/// Ensure the storage root is world-traversable and its private subdirectories exist.
pub fn init_storage_root(config: &PathsConfig) -> Result<()> {
    let root = &config.storage_root;
    tracing::info!("[Paths] initialize {}", root.display());

    if !root.exists() {
        tracing::warn!(
            "[Paths] WARNING: container data will be EPHEMERAL -- in {}",
            root.display()
        );
        fs::create_dir_all(root)?;
    }
    // users must be able to see their own home directories
    allow_world_read(root)?;

    for dir in &config.private_dirs {
        let full_path = root.join(dir);
        if !full_path.exists() {
            tracing::info!("[Paths] creating {}", full_path.display());
            fs::create_dir_all(&full_path)?;
            restrict_to_owner(&full_path)?;
        }
    }
    Ok(())
}

/// `chmod a+rx`
pub fn allow_world_read(path: &Path) -> Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(perms.mode() | 0o555);
    fs::set_permissions(path, perms)?;
    Ok(())
}

/// `chmod og-rwx`
pub fn restrict_to_owner(path: &Path) -> Result<()> {
    let mut perms = fs::symlink_metadata(path)?.permissions();
    perms.set_mode(perms.mode() & !GROUP_OTHER_MASK);
    fs::set_permissions(path, perms)?;
    Ok(())
}

/// `chmod -R og-rwx`. Symlinks are neither followed nor changed.
pub fn restrict_to_owner_recursive(path: &Path) -> Result<()> {
    let metadata = fs::symlink_metadata(path)?;
    if metadata.file_type().is_symlink() {
        return Ok(());
    }
    restrict_to_owner(path)?;
    if metadata.is_dir() {
        for entry in fs::read_dir(path)? {
            restrict_to_owner_recursive(&entry?.path())?;
        }
    }
    Ok(())
}
