use anyhow::Context;
use presence_core::{config::Config, io, ledger::Ledger, paths};
use std::path::Path;

pub fn run(root: &Path, name: Option<&str>, utc_offset: Option<i32>) -> anyhow::Result<()> {
    let org_name = name
        .map(str::to_string)
        .or_else(|| root.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "organization".to_string());

    println!("Initializing presence in: {}", root.display());

    let dir = paths::presence_dir(root);
    io::ensure_dir(&dir).with_context(|| format!("failed to create {}", dir.display()))?;

    let config_path = paths::config_path(root);
    if !config_path.exists() {
        let mut cfg = Config::new(org_name);
        if let Some(minutes) = utc_offset {
            cfg.organization.utc_offset_minutes = minutes;
            cfg.offset().context("invalid --utc-offset")?;
        }
        cfg.save(root).context("failed to write config.yaml")?;
        println!("  created: {}", paths::CONFIG_FILE);
    } else {
        println!("  exists:  {}", paths::CONFIG_FILE);
    }

    let ledger_path = paths::ledger_path(root);
    let existed = ledger_path.exists();
    Ledger::open(&ledger_path).context("failed to open ledger")?;
    if existed {
        println!("  exists:  {}", paths::LEDGER_FILE);
    } else {
        println!("  created: {}", paths::LEDGER_FILE);
    }

    println!("\nAdd sites and roster entries to {} before serving.", paths::CONFIG_FILE);
    Ok(())
}
