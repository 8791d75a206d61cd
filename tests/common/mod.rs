//! Shared fixtures: in-memory DwC-A archives and a small EML schema
#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use zip::write::SimpleFileOptions;

pub const FIELDS: [&str; 6] = [
    "occurrenceID",
    "basisOfRecord",
    "scientificName",
    "eventDate",
    "decimalLatitude",
    "decimalLongitude",
];

pub const EML_XSD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
           targetNamespace="eml://ecoinformatics.org/eml-2.1.1"
           xmlns="eml://ecoinformatics.org/eml-2.1.1"
           elementFormDefault="unqualified">
  <xs:element name="eml">
    <xs:complexType>
      <xs:sequence>
        <xs:element name="dataset">
          <xs:complexType>
            <xs:sequence>
              <xs:element name="title" type="xs:string"/>
            </xs:sequence>
          </xs:complexType>
        </xs:element>
      </xs:sequence>
      <xs:attribute name="packageId" type="xs:string" use="required"/>
      <xs:attribute name="system" type="xs:string"/>
    </xs:complexType>
  </xs:element>
</xs:schema>"#;

pub const VALID_EML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<eml:eml xmlns:eml="eml://ecoinformatics.org/eml-2.1.1" packageId="dataset-1" system="http://gbif.org">
  <dataset><title>Birds of the Upper Rhine</title></dataset>
</eml:eml>"#;

/// Well-formed EML with an element the schema does not allow
pub const DRIFTED_EML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<eml:eml xmlns:eml="eml://ecoinformatics.org/eml-2.1.1" packageId="dataset-1">
  <dataset><title>Birds</title><abstract>not in schema</abstract></dataset>
</eml:eml>"#;

/// `meta.xml` declaring `fields` for `location`, with the given delimiter token
pub fn meta_xml(location: &str, delimiter: &str, fields: &[&str]) -> String {
    let mut xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<archive xmlns="http://rs.tdwg.org/dwc/text/" metadata="eml.xml">
  <core encoding="UTF-8" fieldsTerminatedBy="{delimiter}" linesTerminatedBy="\n" fieldsEnclosedBy="&quot;" ignoreHeaderLines="1" rowType="http://rs.tdwg.org/dwc/terms/Occurrence">
    <files>
      <location>{location}</location>
    </files>
    <id index="0"/>
"#
    );
    for (index, field) in fields.iter().enumerate() {
        xml.push_str(&format!(
            "    <field index=\"{}\" term=\"http://rs.tdwg.org/dwc/terms/{}\"/>\n",
            index + 1,
            field
        ));
    }
    xml.push_str("  </core>\n</archive>\n");
    xml
}

/// Occurrence table with an `id` column, one row per `(lat, lon)` pair
pub fn occurrence_csv(delimiter: char, coordinates: &[(&str, &str)]) -> String {
    let sep = delimiter.to_string();
    let mut header = vec!["id"];
    header.extend(FIELDS);
    let mut text = header.join(&sep);
    text.push('\n');
    for (row, (lat, lon)) in coordinates.iter().enumerate() {
        let id = (row + 1).to_string();
        let occurrence = format!("urn:occ:{}", row + 1);
        let cells = [
            id.as_str(),
            occurrence.as_str(),
            "HumanObservation",
            "Parus major",
            "2024-05-01",
            lat,
            lon,
        ];
        text.push_str(&cells.join(&sep));
        text.push('\n');
    }
    text
}

/// Builds zip archives in memory
#[derive(Default)]
pub struct ArchiveBuilder {
    entries: Vec<(String, Vec<u8>)>,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(mut self, name: &str, content: impl AsRef<[u8]>) -> Self {
        self.entries
            .push((name.to_string(), content.as_ref().to_vec()));
        self
    }

    pub fn without(mut self, name: &str) -> Self {
        self.entries.retain(|(n, _)| n != name);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in &self.entries {
            writer
                .start_file(name.as_str(), SimpleFileOptions::default())
                .unwrap();
            writer.write_all(content).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    pub fn write_to(&self, dir: &Path, file_name: &str) -> PathBuf {
        let path = dir.join(file_name);
        std::fs::write(&path, self.build()).unwrap();
        path
    }
}

/// Scenario A: `meta.xml`, `occurrence.csv` and `eml.xml`, all consistent
pub fn scenario_a() -> ArchiveBuilder {
    scenario_with_coordinates("45.0", "10.0")
}

pub fn scenario_with_coordinates(lat: &str, lon: &str) -> ArchiveBuilder {
    ArchiveBuilder::new()
        .entry("meta.xml", meta_xml("occurrence.csv", ",", &FIELDS))
        .entry("occurrence.csv", occurrence_csv(',', &[(lat, lon)]))
        .entry("eml.xml", VALID_EML)
}

/// Write the EML schema into `dir` and return its path
pub fn write_schema(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("eml.xsd");
    std::fs::write(&path, EML_XSD).unwrap();
    path
}
