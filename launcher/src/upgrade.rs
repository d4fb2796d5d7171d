use anyhow::{bail, Context};
use std::path::Path;

use crate::prefs::{PreferenceStore, Preferences};

/// Migrate a legacy `swarmd.conf` (INI-style `key=value`) next to the
/// preference file. The legacy file is renamed to `*.bak` once its values
/// are saved, so this runs at most once per profile.
pub fn run(store: &PreferenceStore, legacy: &Path, interactive: bool) -> anyhow::Result<()> {
    if !legacy.exists() {
        return Ok(());
    }
    let s = std::fs::read_to_string(legacy)
        .with_context(|| format!("read legacy preferences {}", legacy.display()))?;

    let mut prefs = store.load()?;
    apply_legacy(&s, &mut prefs)
        .with_context(|| format!("parse legacy preferences {}", legacy.display()))?;
    store.save(&prefs)?;

    let backup = legacy.with_extension("conf.bak");
    std::fs::rename(legacy, &backup)
        .with_context(|| format!("rename {} -> {}", legacy.display(), backup.display()))?;

    log::info!(
        "upgrade: migrated {} into {}",
        legacy.display(),
        store.path().display()
    );
    if interactive {
        println!(
            "Migrated old settings from {} (backup kept as {}).",
            legacy.display(),
            backup.display()
        );
    }
    Ok(())
}

fn apply_legacy(s: &str, prefs: &mut Preferences) -> anyhow::Result<()> {
    for (n, raw) in s.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') || line.starts_with('[') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            bail!("line {}: expected key=value, got {:?}", n + 1, line);
        };
        let key = key.trim();
        let value = value.trim();
        match key {
            "AcceptedLegal" => prefs.legal_notice_accepted |= parse_bool(value, n + 1)?,
            "SplashDisabled" => prefs.splash_disabled = parse_bool(value, n + 1)?,
            other => log::debug!("upgrade: ignoring legacy key {other}"),
        }
    }
    Ok(())
}

fn parse_bool(v: &str, line: usize) -> anyhow::Result<bool> {
    match v.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => bail!("line {line}: {other:?} is not a boolean"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nothing_to_do_without_legacy_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = PreferenceStore::new(dir.path().join("preferences.toml"));
        run(&store, &dir.path().join("swarmd.conf"), false).unwrap();
        assert!(!store.path().exists());
    }

    #[test]
    fn legacy_values_are_migrated_once() {
        let dir = tempfile::tempdir().unwrap();
        let legacy = dir.path().join("swarmd.conf");
        std::fs::write(
            &legacy,
            "[Preferences]\n# old\nAcceptedLegal=true\nSplashDisabled = 1\nGeneral\\Locale=en\n",
        )
        .unwrap();
        let store = PreferenceStore::new(dir.path().join("preferences.toml"));

        run(&store, &legacy, false).unwrap();

        let p = store.load().unwrap();
        assert!(p.legal_notice_accepted);
        assert!(p.splash_disabled);
        assert!(!legacy.exists());
        assert!(dir.path().join("swarmd.conf.bak").exists());

        // Second run is a no-op.
        run(&store, &legacy, false).unwrap();
    }

    #[test]
    fn malformed_legacy_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let legacy = dir.path().join("swarmd.conf");
        std::fs::write(&legacy, "AcceptedLegal=perhaps\n").unwrap();
        let store = PreferenceStore::new(dir.path().join("preferences.toml"));
        assert!(run(&store, &legacy, false).is_err());
        assert!(legacy.exists(), "failed migration must leave the legacy file alone");

        std::fs::write(&legacy, "just garbage\n").unwrap();
        assert!(run(&store, &legacy, false).is_err());
    }
}
