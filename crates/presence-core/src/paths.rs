use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const PRESENCE_DIR: &str = ".presence";
pub const CONFIG_FILE: &str = ".presence/config.yaml";
pub const LEDGER_FILE: &str = ".presence/ledger.redb";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn presence_dir(root: &Path) -> PathBuf {
    root.join(PRESENCE_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn ledger_path(root: &Path) -> PathBuf {
    root.join(LEDGER_FILE)
}
