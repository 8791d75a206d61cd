//! Archive Inspector: structural checks on the zip container

use std::io::{Read, Seek};

use crate::archive::DwcArchive;
use crate::diagnostics::{Diagnostics, Stage, StageOutcome};
use crate::pipeline::ValidationRules;

pub const DESCRIPTOR_NAME: &str = "meta.xml";

/// What the inspector learned about the archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveInventory {
    pub outcome: StageOutcome,
    /// Entry names in archive order; empty when the count check failed
    pub entry_names: Vec<String>,
    /// Raw `meta.xml` bytes, when present and readable
    pub descriptor: Option<Vec<u8>>,
}

impl ArchiveInventory {
    /// Inventory for an archive that could not be opened at all
    pub fn unreadable(diags: &mut Diagnostics, reason: impl std::fmt::Display) -> Self {
        Self {
            outcome: diags.failure(
                Stage::Archive,
                format!("Could not open DwC-A archive, ZIP open error: {}", reason),
            ),
            entry_names: Vec::new(),
            descriptor: None,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entry_names.iter().any(|n| n == name)
    }
}

pub fn inspect<R: Read + Seek>(
    archive: &mut DwcArchive<R>,
    rules: &ValidationRules,
    diags: &mut Diagnostics,
) -> ArchiveInventory {
    const STAGE: Stage = Stage::Archive;

    let entries = match archive.entries() {
        Ok(entries) => entries,
        Err(e) => return ArchiveInventory::unreadable(diags, e),
    };

    if entries.len() < rules.min_entries {
        return ArchiveInventory {
            outcome: diags.failure(
                STAGE,
                format!(
                    "DwC-A archive has to have at least {} files, found {}",
                    rules.min_entries,
                    entries.len()
                ),
            ),
            entry_names: Vec::new(),
            descriptor: None,
        };
    }
    diags.success(
        STAGE,
        format!(
            "DwC-A archive has at least {} files ({})",
            rules.min_entries,
            entries.len()
        ),
    );

    let mut outcome = StageOutcome::Passed;
    let mut data_file_present = false;

    for entry in &entries {
        let ext = entry.extension();
        if rules.allows_extension(ext) {
            diags.info(STAGE, format!("Found valid extension of DwC-A file: {}", ext));
            if rules.is_data_extension(ext) {
                data_file_present = true;
            }
        } else {
            outcome = outcome.and(diags.failure(
                STAGE,
                format!(
                    "Invalid extension of DwC-A file: {} ({})",
                    ext, entry.name
                ),
            ));
        }

        if entry.size == 0 {
            outcome = outcome.and(
                diags.failure(STAGE, format!("Empty DwC-A file: {}", entry.name)),
            );
        } else {
            diags.info(STAGE, format!("Found non-empty DwC-A file: {}", entry.name));
        }
    }

    let entry_names: Vec<String> = entries.into_iter().map(|e| e.name).collect();

    let descriptor = if entry_names.iter().any(|n| n == DESCRIPTOR_NAME) {
        match archive.read_entry(DESCRIPTOR_NAME) {
            Ok(bytes) => {
                diags.success(STAGE, "Found meta.xml in DwC-A archive");
                Some(bytes)
            }
            Err(e) => {
                outcome = outcome.and(
                    diags.failure(STAGE, format!("Could not read meta.xml: {}", e)),
                );
                None
            }
        }
    } else {
        outcome = outcome.and(diags.failure(STAGE, "Missing meta.xml"));
        None
    };

    if data_file_present {
        diags.success(STAGE, "Found a data file in DwC-A archive");
    } else {
        outcome = outcome.and(diags.failure(STAGE, "Missing data file in DwC-A archive"));
    }

    ArchiveInventory {
        outcome,
        entry_names,
        descriptor,
    }
}
