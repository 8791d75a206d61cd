//! Descriptor Parser: reads `meta.xml` into a [`DescriptorConfig`]
//!
//! Element lookups compare local names only, so `<archive>`,
//! `<dwc:archive>` and `<archive xmlns="http://rs.tdwg.org/dwc/text/">` are
//! all accepted.

use roxmltree::{Document, Node, ParsingOptions};
use serde::Serialize;

use crate::diagnostics::{Diagnostics, Stage, StageOutcome};
use crate::error::{DescriptorError, DwcaError};

/// Field mapping of the `core` element
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct CoreMapping {
    /// Text of `files/location`
    pub location: Option<String>,
    /// `fieldsTerminatedBy`, verbatim (e.g. the two characters `\t`)
    pub fields_terminated_by: Option<String>,
    /// `linesTerminatedBy`, verbatim
    pub lines_terminated_by: Option<String>,
    /// `fieldsEnclosedBy`, verbatim
    pub fields_enclosed_by: Option<String>,
    pub ignore_header_lines: Option<String>,
    pub encoding: Option<String>,
    pub row_type: Option<String>,
    /// Short names of the declared `field` terms, in document order
    pub fields: Vec<String>,
}

/// Parsed `meta.xml`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct DescriptorConfig {
    pub core: Option<CoreMapping>,
    /// `metadata` attribute of the root element (the EML file name)
    pub metadata_location: Option<String>,
}

impl DescriptorConfig {
    /// Core file name, when the descriptor declared a non-empty one
    pub fn core_file(&self) -> Option<&str> {
        self.core
            .as_ref()
            .and_then(|c| c.location.as_deref())
            .filter(|s| !s.is_empty())
    }

    pub fn declared_fields(&self) -> &[String] {
        self.core.as_ref().map(|c| c.fields.as_slice()).unwrap_or(&[])
    }
}

/// Outcome of the descriptor stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorReport {
    pub outcome: StageOutcome,
    /// Present whenever the XML parsed with an `archive` root, even if
    /// some required pieces were missing
    pub config: Option<DescriptorConfig>,
}

/// Last `/`-separated segment of a term URI
pub fn short_term(term: &str) -> &str {
    term.rsplit('/').next().unwrap_or(term)
}

fn is_element(node: &Node, local: &str) -> bool {
    node.is_element() && node.tag_name().name() == local
}

fn child<'a, 'input>(node: Node<'a, 'input>, local: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| is_element(n, local))
}

fn qualified_tag(node: &Node) -> String {
    match node.tag_name().namespace() {
        Some(ns) => format!("{{{}}}{}", ns, node.tag_name().name()),
        None => node.tag_name().name().to_string(),
    }
}

fn read_core(core: Node) -> CoreMapping {
    let location = child(core, "files")
        .and_then(|files| child(files, "location"))
        .and_then(|loc| loc.text())
        .map(|text| text.trim().to_string());

    let fields = core
        .children()
        .filter(|n| is_element(n, "field"))
        .map(|field| short_term(field.attribute("term").unwrap_or_default()).to_string())
        .collect();

    CoreMapping {
        location,
        fields_terminated_by: core.attribute("fieldsTerminatedBy").map(str::to_string),
        lines_terminated_by: core.attribute("linesTerminatedBy").map(str::to_string),
        fields_enclosed_by: core.attribute("fieldsEnclosedBy").map(str::to_string),
        ignore_header_lines: core.attribute("ignoreHeaderLines").map(str::to_string),
        encoding: core.attribute("encoding").map(str::to_string),
        row_type: core.attribute("rowType").map(str::to_string),
        fields,
    }
}

/// Parse an XML document, accepting a DOCTYPE declaration
pub(crate) fn parse_xml(text: &str) -> Result<Document<'_>, roxmltree::Error> {
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    Document::parse_with_options(text, options)
}

/// Parse descriptor bytes into a config plus every problem found
///
/// Each missing piece is reported on its own; the config is returned
/// whenever the document itself is usable.
pub fn parse_descriptor(
    bytes: &[u8],
) -> Result<(DescriptorConfig, Vec<DescriptorError>), DwcaError> {
    let text = std::str::from_utf8(bytes).map_err(|_| DwcaError::Encoding {
        name: "meta.xml".to_string(),
    })?;
    let doc = parse_xml(text)?;
    let root = doc.root_element();

    if !is_element(&root, "archive") {
        return Err(DescriptorError::InvalidRoot {
            tag: qualified_tag(&root),
        }
        .into());
    }

    let mut problems = Vec::new();

    let core = child(root, "core").map(read_core);
    match &core {
        None => problems.push(DescriptorError::MissingCore),
        Some(mapping) if mapping.location.as_deref().is_none_or(str::is_empty) => {
            problems.push(DescriptorError::MissingCoreLocation)
        }
        Some(_) => {}
    }

    let metadata_location = root
        .attribute("metadata")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    if metadata_location.is_none() {
        problems.push(DescriptorError::MissingMetadata);
    }

    Ok((
        DescriptorConfig {
            core,
            metadata_location,
        },
        problems,
    ))
}

/// Descriptor stage: parse and report
pub fn validate_descriptor(descriptor: Option<&[u8]>, diags: &mut Diagnostics) -> DescriptorReport {
    const STAGE: Stage = Stage::Descriptor;

    let Some(bytes) = descriptor else {
        return DescriptorReport {
            outcome: diags.failure(STAGE, "No meta.xml content available in DwC-A archive"),
            config: None,
        };
    };

    let (config, problems) = match parse_descriptor(bytes) {
        Ok(parsed) => parsed,
        Err(e) => {
            return DescriptorReport {
                outcome: diags.failure(STAGE, format!("Failed to parse meta.xml: {}", e)),
                config: None,
            };
        }
    };
    diags.success(STAGE, "Found valid root tag 'archive' in meta.xml");

    let mut outcome = StageOutcome::Passed;
    for problem in &problems {
        outcome = outcome.and(diags.failure(STAGE, problem.to_string()));
    }

    if let Some(core_file) = config.core_file() {
        diags.info(
            STAGE,
            format!("Found core data file name in 'files' element of meta.xml: {}", core_file),
        );
    }
    if let Some(core) = &config.core {
        diags.info(
            STAGE,
            format!("Declared {} field(s) in core: {}", core.fields.len(), core.fields.join(", ")),
        );
    }
    if let Some(eml) = &config.metadata_location {
        diags.success(
            STAGE,
            format!(
                "Found metadata (EML) file location in 'metadata' attribute of root element in meta.xml: {}",
                eml
            ),
        );
    }

    DescriptorReport {
        outcome,
        config: Some(config),
    }
}
