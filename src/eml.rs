//! Metadata (EML) Validator
//!
//! Schema violations are reported as warnings. The stage fails only when
//! the document is missing or unreadable, or is not rooted at an `eml`
//! element.

use std::io::{Read, Seek};
use std::path::{Path, PathBuf};

use crate::archive::DwcArchive;
use crate::descriptor::{self, DescriptorConfig};
use crate::diagnostics::{Diagnostics, Stage, StageOutcome};
use crate::error::{DwcaError, Result};
use crate::inspector::ArchiveInventory;
use crate::libxml2::{LibXml2Wrapper, ValidationResult, XmlSchemaPtr};

/// Diagnostics show at most this many schema messages
const MAX_SCHEMA_ERRORS: usize = 10;

/// The external EML schema, loaded once per validator
#[derive(Clone)]
pub enum EmlSchema {
    Loaded { path: PathBuf, schema: XmlSchemaPtr },
    Unavailable { path: PathBuf, reason: String },
}

impl EmlSchema {
    /// Load the XSD at `path`; failures are kept, not raised
    pub fn load(wrapper: &LibXml2Wrapper, path: &Path) -> Self {
        match Self::try_load(wrapper, path) {
            Ok(schema) => {
                tracing::info!(path = %path.display(), "loaded EML schema");
                EmlSchema::Loaded {
                    path: path.to_path_buf(),
                    schema,
                }
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "EML schema unavailable");
                EmlSchema::Unavailable {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                }
            }
        }
    }

    fn try_load(wrapper: &LibXml2Wrapper, path: &Path) -> Result<XmlSchemaPtr> {
        if !path.is_file() {
            return Err(DwcaError::SchemaNotFound {
                path: path.to_path_buf(),
            });
        }
        Ok(wrapper.parse_schema_from_file(path)?)
    }

    pub fn path(&self) -> &Path {
        match self {
            EmlSchema::Loaded { path, .. } | EmlSchema::Unavailable { path, .. } => path,
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, EmlSchema::Loaded { .. })
    }
}

impl std::fmt::Debug for EmlSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmlSchema::Loaded { path, .. } => f.debug_struct("Loaded").field("path", path).finish(),
            EmlSchema::Unavailable { path, reason } => f
                .debug_struct("Unavailable")
                .field("path", path)
                .field("reason", reason)
                .finish(),
        }
    }
}

fn check_against_schema(
    wrapper: &LibXml2Wrapper,
    schema: &EmlSchema,
    name: &str,
    bytes: &[u8],
    diags: &mut Diagnostics,
) {
    const STAGE: Stage = Stage::Metadata;

    let compiled = match schema {
        EmlSchema::Loaded { schema, .. } => schema,
        EmlSchema::Unavailable { path, reason } => {
            diags.warning(
                STAGE,
                format!(
                    "EML XML validation error: schema {} unavailable ({})",
                    path.display(),
                    reason
                ),
            );
            return;
        }
    };

    match wrapper.validate_memory(compiled, bytes, name) {
        Ok(ValidationResult::Valid) => {
            diags.success(STAGE, format!("EML file {} is valid against the EML schema", name));
        }
        Ok(ValidationResult::Invalid {
            error_count,
            errors,
        }) => {
            let mut message = format!(
                "EML XML validation error: {} schema violation(s) in {}",
                error_count, name
            );
            for error in errors.iter().take(MAX_SCHEMA_ERRORS) {
                message.push_str("\n  ");
                message.push_str(error);
            }
            if errors.len() > MAX_SCHEMA_ERRORS {
                message.push_str(&format!(
                    "\n  ... and {} more",
                    errors.len() - MAX_SCHEMA_ERRORS
                ));
            }
            diags.warning(STAGE, message);
        }
        Ok(ValidationResult::InternalError { code }) => {
            diags.warning(
                STAGE,
                format!("EML XML validation error: libxml2 internal error {}", code),
            );
        }
        Err(e) => diags.warning(STAGE, format!("EML XML validation error: {}", e)),
    }
}

/// Metadata stage
pub fn validate_metadata<R: Read + Seek>(
    config: Option<&DescriptorConfig>,
    inventory: &ArchiveInventory,
    archive: Option<&mut DwcArchive<R>>,
    wrapper: &LibXml2Wrapper,
    schema: &EmlSchema,
    diags: &mut Diagnostics,
) -> StageOutcome {
    const STAGE: Stage = Stage::Metadata;

    let Some(name) = config.and_then(|c| c.metadata_location.as_deref()) else {
        return diags.failure(STAGE, "No metadata (EML) file name available from meta.xml");
    };
    if !inventory.contains(name) {
        return diags.failure(
            STAGE,
            format!("Failed to identify metadata EML file in the DwC-A archive: {}", name),
        );
    }
    let Some(archive) = archive else {
        return diags.failure(STAGE, "DwC-A archive is not readable");
    };

    let bytes = match archive.read_entry(name) {
        Ok(bytes) => bytes,
        Err(e) => return diags.failure(STAGE, format!("Failed to open EML file: {}", e)),
    };

    let text = match std::str::from_utf8(&bytes) {
        Ok(text) => text,
        Err(_) => {
            let e = DwcaError::Encoding {
                name: name.to_string(),
            };
            return diags.failure(STAGE, format!("Failed to open EML file: {}", e));
        }
    };
    let doc = match descriptor::parse_xml(text) {
        Ok(doc) => doc,
        Err(e) => return diags.failure(STAGE, format!("Failed to open EML file: {}", e)),
    };
    diags.success(
        STAGE,
        "Could find and open metadata EML file as indicated in meta.xml of the DwC-A archive",
    );

    check_against_schema(wrapper, schema, name, &bytes, diags);

    let root = doc.root_element();
    let local = root.tag_name().name();
    if local == "eml" {
        diags.success(
            STAGE,
            format!("EML file seems to be valid based on the root tag: {}", local),
        );
        StageOutcome::Passed
    } else {
        diags.failure(STAGE, format!("Invalid root tag in EML: {}", local))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Severity;
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;

    const EML_XSD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
           targetNamespace="eml://ecoinformatics.org/eml-2.1.1"
           xmlns="eml://ecoinformatics.org/eml-2.1.1"
           elementFormDefault="unqualified">
  <xs:element name="eml">
    <xs:complexType>
      <xs:sequence>
        <xs:element name="dataset" type="xs:string"/>
      </xs:sequence>
      <xs:attribute name="packageId" type="xs:string" use="required"/>
    </xs:complexType>
  </xs:element>
</xs:schema>"#;

    const VALID_EML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<eml:eml xmlns:eml="eml://ecoinformatics.org/eml-2.1.1" packageId="p1"><dataset>Birds</dataset></eml:eml>"#;

    const DRIFTED_EML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<eml:eml xmlns:eml="eml://ecoinformatics.org/eml-2.1.1"><dataset>Birds</dataset><extra/></eml:eml>"#;

    fn fixture(eml: impl AsRef<[u8]>) -> (DwcArchive<Cursor<Vec<u8>>>, ArchiveInventory, DescriptorConfig) {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("eml.xml", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(eml.as_ref()).unwrap();
        let archive = DwcArchive::from_bytes(writer.finish().unwrap().into_inner()).unwrap();
        let inventory = ArchiveInventory {
            outcome: StageOutcome::Passed,
            entry_names: vec!["eml.xml".to_string()],
            descriptor: None,
        };
        let config = DescriptorConfig {
            core: None,
            metadata_location: Some("eml.xml".to_string()),
        };
        (archive, inventory, config)
    }

    fn loaded_schema(wrapper: &LibXml2Wrapper) -> EmlSchema {
        EmlSchema::Loaded {
            path: PathBuf::from("eml.xsd"),
            schema: wrapper.parse_schema_from_memory(EML_XSD.as_bytes()).unwrap(),
        }
    }

    #[test]
    fn test_valid_eml_passes() {
        let wrapper = LibXml2Wrapper::new();
        let schema = loaded_schema(&wrapper);
        let (mut archive, inventory, config) = fixture(VALID_EML);
        let mut diags = Diagnostics::new();

        let outcome = validate_metadata(
            Some(&config),
            &inventory,
            Some(&mut archive),
            &wrapper,
            &schema,
            &mut diags,
        );
        assert!(outcome.is_passed());
        assert_eq!(diags.at_least(Severity::Warning).count(), 0);
    }

    #[test]
    fn test_schema_violation_is_only_a_warning() {
        let wrapper = LibXml2Wrapper::new();
        let schema = loaded_schema(&wrapper);
        let (mut archive, inventory, config) = fixture(DRIFTED_EML);
        let mut diags = Diagnostics::new();

        let outcome = validate_metadata(
            Some(&config),
            &inventory,
            Some(&mut archive),
            &wrapper,
            &schema,
            &mut diags,
        );
        assert!(outcome.is_passed());
        let warnings: Vec<_> = diags.at_least(Severity::Warning).collect();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.starts_with("EML XML validation error"));
    }

    #[test]
    fn test_unavailable_schema_warns() {
        let wrapper = LibXml2Wrapper::new();
        let schema = EmlSchema::load(&wrapper, Path::new("/nonexistent/eml.xsd"));
        assert!(!schema.is_loaded());

        let (mut archive, inventory, config) = fixture(VALID_EML);
        let mut diags = Diagnostics::new();
        let outcome = validate_metadata(
            Some(&config),
            &inventory,
            Some(&mut archive),
            &wrapper,
            &schema,
            &mut diags,
        );
        assert!(outcome.is_passed());
        assert!(
            diags
                .events()
                .iter()
                .any(|d| d.severity == Severity::Warning && d.message.contains("unavailable"))
        );
    }

    #[test]
    fn test_wrong_root_fails() {
        let wrapper = LibXml2Wrapper::new();
        let schema = loaded_schema(&wrapper);
        let (mut archive, inventory, config) = fixture("<metadata><title>x</title></metadata>");
        let mut diags = Diagnostics::new();

        let outcome = validate_metadata(
            Some(&config),
            &inventory,
            Some(&mut archive),
            &wrapper,
            &schema,
            &mut diags,
        );
        assert_eq!(outcome, StageOutcome::failed("Invalid root tag in EML: metadata"));
    }

    #[test]
    fn test_missing_name_or_entry_fails() {
        let wrapper = LibXml2Wrapper::new();
        let schema = loaded_schema(&wrapper);
        let (mut archive, inventory, _) = fixture(VALID_EML);
        let mut diags = Diagnostics::new();

        let outcome = validate_metadata(
            None,
            &inventory,
            Some(&mut archive),
            &wrapper,
            &schema,
            &mut diags,
        );
        assert!(!outcome.is_passed());

        let other = DescriptorConfig {
            core: None,
            metadata_location: Some("metadata.xml".to_string()),
        };
        let outcome = validate_metadata(
            Some(&other),
            &inventory,
            Some(&mut archive),
            &wrapper,
            &schema,
            &mut diags,
        );
        assert!(!outcome.is_passed());
        assert!(
            diags
                .events()
                .last()
                .unwrap()
                .message
                .ends_with("metadata.xml")
        );
    }

    #[test]
    fn test_malformed_eml_fails() {
        let wrapper = LibXml2Wrapper::new();
        let schema = loaded_schema(&wrapper);
        let (mut archive, inventory, config) = fixture("<eml:eml");
        let mut diags = Diagnostics::new();

        let outcome = validate_metadata(
            Some(&config),
            &inventory,
            Some(&mut archive),
            &wrapper,
            &schema,
            &mut diags,
        );
        assert!(!outcome.is_passed());
        assert!(diags.events()[0].message.starts_with("Failed to open EML file"));
    }

    #[test]
    fn test_eml_with_doctype_passes() {
        let wrapper = LibXml2Wrapper::new();
        let schema = loaded_schema(&wrapper);
        let eml = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE eml>
<eml:eml xmlns:eml="eml://ecoinformatics.org/eml-2.1.1" packageId="p1"><dataset>Birds</dataset></eml:eml>"#;
        let (mut archive, inventory, config) = fixture(eml);
        let mut diags = Diagnostics::new();

        let outcome = validate_metadata(
            Some(&config),
            &inventory,
            Some(&mut archive),
            &wrapper,
            &schema,
            &mut diags,
        );
        assert!(outcome.is_passed(), "{:?}", diags.events());
    }

    #[test]
    fn test_non_utf8_eml_fails() {
        let wrapper = LibXml2Wrapper::new();
        let schema = loaded_schema(&wrapper);
        let mut eml = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?>\n<eml:eml xmlns:eml=\"eml://ecoinformatics.org/eml-2.1.1\" packageId=\"p1\"><dataset>".to_vec();
        eml.extend_from_slice(b"M\xfcller</dataset></eml:eml>");
        let (mut archive, inventory, config) = fixture(eml);
        let mut diags = Diagnostics::new();

        let outcome = validate_metadata(
            Some(&config),
            &inventory,
            Some(&mut archive),
            &wrapper,
            &schema,
            &mut diags,
        );
        assert!(!outcome.is_passed());
        let message = &diags.events()[0].message;
        assert!(message.starts_with("Failed to open EML file"));
        assert!(message.contains("not valid UTF-8"));
    }
}
