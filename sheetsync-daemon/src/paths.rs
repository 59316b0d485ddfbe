use std::path::{Path, PathBuf};

use sheetsync_core::registry::registry_path_at;
use sheetsync_engine::store_path_at;

pub const DATA_DIR_ENV: &str = "SHEETSYNC_DATA_DIR";
pub const DATA_DIR_NAME: &str = ".sheetsync";

pub fn data_dir(home: &Path) -> PathBuf {
    home.join(DATA_DIR_NAME)
}

pub fn registry_path(data_dir: &Path) -> PathBuf {
    registry_path_at(data_dir)
}

pub fn checksum_path(data_dir: &Path) -> PathBuf {
    store_path_at(data_dir)
}
