use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::db::SessionMode;

/// Work/break lengths for fixed-cycle runs, in minutes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CyclePrefs {
    pub work_minutes: u32,
    pub short_break_minutes: u32,
    pub long_break_minutes: u32,
    pub cycles: u32,
}

impl Default for CyclePrefs {
    fn default() -> Self {
        Self {
            work_minutes: 25,
            short_break_minutes: 5,
            long_break_minutes: 15,
            cycles: 4,
        }
    }
}

impl CyclePrefs {
    /// Cycle count used for long-break and end-of-set decisions. Never zero.
    pub fn cycles_per_set(&self) -> u32 {
        self.cycles.max(1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FreeformPrefs {
    pub length_minutes: u32,
    pub tag: Option<String>,
}

impl Default for FreeformPrefs {
    fn default() -> Self {
        Self {
            length_minutes: 50,
            tag: None,
        }
    }
}

impl FreeformPrefs {
    /// Blank tags are treated as no tag.
    pub fn normalized_tag(&self) -> Option<String> {
        self.tag
            .as_deref()
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(str::to_string)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Preferences {
    pub default_mode: SessionMode,
    pub fixed_cycle: CyclePrefs,
    pub freeform: FreeformPrefs,
    pub chime_enabled: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            default_mode: SessionMode::FixedCycle,
            fixed_cycle: CyclePrefs::default(),
            freeform: FreeformPrefs::default(),
            chime_enabled: true,
        }
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<Preferences>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("Ignoring unreadable settings at {}: {err}", path.display());
                Preferences::default()
            })
        } else {
            Preferences::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn preferences(&self) -> Preferences {
        self.read().clone()
    }

    /// Apply `change` to the current preferences and persist the result.
    pub fn update<F>(&self, change: F) -> Result<Preferences>
    where
        F: FnOnce(&mut Preferences),
    {
        let mut guard = self.write();
        change(&mut guard);
        self.persist(&guard)?;
        Ok(guard.clone())
    }

    fn persist(&self, data: &Preferences) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create settings directory {}", parent.display())
            })?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    fn read(&self) -> RwLockReadGuard<'_, Preferences> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Preferences> {
        self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_when_missing() -> Result<()> {
        let dir = tempdir()?;
        let store = SettingsStore::new(dir.path().join("settings.json"))?;
        let prefs = store.preferences();

        assert_eq!(prefs.fixed_cycle, CyclePrefs::default());
        assert_eq!(prefs.freeform.length_minutes, 50);
        assert_eq!(prefs.default_mode, SessionMode::FixedCycle);
        assert!(prefs.chime_enabled);
        Ok(())
    }

    #[test]
    fn test_update_persists() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("settings.json");
        let store = SettingsStore::new(path.clone())?;

        store.update(|prefs| {
            prefs.fixed_cycle.work_minutes = 50;
            prefs.freeform.tag = Some("reading".into());
        })?;

        let reloaded = SettingsStore::new(path)?.preferences();
        assert_eq!(reloaded.fixed_cycle.work_minutes, 50);
        assert_eq!(reloaded.freeform.tag.as_deref(), Some("reading"));
        Ok(())
    }

    #[test]
    fn test_corrupt_file_falls_back_to_defaults() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json")?;

        let store = SettingsStore::new(path)?;
        assert_eq!(store.preferences(), Preferences::default());
        Ok(())
    }

    #[test]
    fn test_zero_cycles_and_blank_tag_are_normalized() {
        let cycle = CyclePrefs {
            cycles: 0,
            ..CyclePrefs::default()
        };
        assert_eq!(cycle.cycles_per_set(), 1);

        let freeform = FreeformPrefs {
            length_minutes: 10,
            tag: Some("   ".into()),
        };
        assert_eq!(freeform.normalized_tag(), None);
    }
}
