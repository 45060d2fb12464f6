//! Interfaces to the embedding application: migration confirmation and
//! read-only status handling.
use std::path::PathBuf;

use log::warn;

use crate::storage::provider::StorageProvider;

/// Asked before an older on-disk format is migrated
pub trait MigrationHandler {
    /// True to back up `files` and proceed; false leaves everything untouched
    fn confirm(&self, files: &[PathBuf], from: u32, to: u32) -> bool;
}

impl<F> MigrationHandler for F
where
    F: Fn(&[PathBuf], u32, u32) -> bool,
{
    fn confirm(&self, files: &[PathBuf], from: u32, to: u32) -> bool {
        self(files, from, to)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptMigration;

impl MigrationHandler for AcceptMigration {
    fn confirm(&self, _files: &[PathBuf], _from: u32, _to: u32) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DeclineMigration;

impl MigrationHandler for DeclineMigration {
    fn confirm(&self, _files: &[PathBuf], _from: u32, _to: u32) -> bool {
        false
    }
}

/// Invoked before a save that would touch read-only files
pub trait ReadonlyStatusHandler {
    /// Try to make `files` writable; returns those that are still read-only
    fn ensure_writable(&self, provider: &dyn StorageProvider, files: &[PathBuf]) -> Vec<PathBuf>;
}

/// Changes nothing; every read-only file aborts the save
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportReadonly;

impl ReadonlyStatusHandler for ReportReadonly {
    fn ensure_writable(&self, _provider: &dyn StorageProvider, files: &[PathBuf]) -> Vec<PathBuf> {
        files.to_vec()
    }
}

/// Clears the read-only flag of every file it is handed
#[derive(Debug, Clone, Copy, Default)]
pub struct ClearReadonlyFlag;

impl ReadonlyStatusHandler for ClearReadonlyFlag {
    fn ensure_writable(&self, provider: &dyn StorageProvider, files: &[PathBuf]) -> Vec<PathBuf> {
        files
            .iter()
            .filter(|file| {
                if let Err(e) = provider.set_readonly(file, false) {
                    warn!("Could not make {} writable: {}", file.display(), e);
                }
                !provider.is_writable(file)
            })
            .cloned()
            .collect()
    }
}
