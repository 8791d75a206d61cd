//! Read-only access to a zipped Darwin Core Archive

use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek};
use std::path::Path;

use zip::ZipArchive;

use crate::error::{DwcaError, Result};

/// One member of the zip container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    /// Uncompressed size in bytes
    pub size: u64,
}

impl ArchiveEntry {
    /// Text after the last `.`; the whole name when there is no dot
    pub fn extension(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }
}

/// An opened DwC-A container
///
/// Entries are never modified. Reading needs `&mut self` because the zip
/// reader seeks the underlying source.
pub struct DwcArchive<R: Read + Seek> {
    zip: ZipArchive<R>,
}

impl DwcArchive<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }
}

impl DwcArchive<Cursor<Vec<u8>>> {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::from_reader(Cursor::new(bytes))
    }
}

impl<R: Read + Seek> DwcArchive<R> {
    pub fn from_reader(reader: R) -> Result<Self> {
        Ok(Self {
            zip: ZipArchive::new(reader)?,
        })
    }

    pub fn len(&self) -> usize {
        self.zip.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zip.len() == 0
    }

    /// Entries in archive order
    pub fn entries(&mut self) -> Result<Vec<ArchiveEntry>> {
        let mut entries = Vec::with_capacity(self.zip.len());
        for index in 0..self.zip.len() {
            let file = self.zip.by_index(index)?;
            entries.push(ArchiveEntry {
                name: file.name().to_string(),
                size: file.size(),
            });
        }
        Ok(entries)
    }

    pub fn read_entry(&mut self, name: &str) -> Result<Vec<u8>> {
        let mut file = match self.zip.by_name(name) {
            Ok(file) => file,
            Err(zip::result::ZipError::FileNotFound) => {
                return Err(DwcaError::EntryNotFound {
                    name: name.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        let mut buf = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn build(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_entries_in_archive_order() {
        let bytes = build(&[("meta.xml", "<archive/>"), ("occurrence.csv", "id\n1\n")]);
        let mut archive = DwcArchive::from_bytes(bytes).unwrap();

        let entries = archive.entries().unwrap();
        assert_eq!(archive.len(), 2);
        assert_eq!(entries[0].name, "meta.xml");
        assert_eq!(entries[0].size, 10);
        assert_eq!(entries[1].name, "occurrence.csv");
        assert_eq!(entries[1].extension(), "csv");
    }

    #[test]
    fn test_read_entry() {
        let bytes = build(&[("eml.xml", "<eml/>")]);
        let mut archive = DwcArchive::from_bytes(bytes).unwrap();

        assert_eq!(archive.read_entry("eml.xml").unwrap(), b"<eml/>");
        match archive.read_entry("missing.xml") {
            Err(DwcaError::EntryNotFound { name }) => assert_eq!(name, "missing.xml"),
            other => panic!("Expected EntryNotFound, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_not_a_zip() {
        let result = DwcArchive::from_bytes(b"definitely not a zip".to_vec());
        assert!(matches!(result, Err(DwcaError::Zip(_))));
    }

    #[test]
    fn test_extension_without_dot() {
        let entry = ArchiveEntry {
            name: "README".to_string(),
            size: 1,
        };
        assert_eq!(entry.extension(), "README");
    }
}
