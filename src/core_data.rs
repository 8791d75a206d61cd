//! Core Data Validator
//!
//! Loads the core data file named by the descriptor and cross-checks its
//! header against the declared fields, the mandatory Darwin Core terms and
//! the coordinate bounds.

use std::collections::BTreeSet;
use std::fmt;
use std::io::{Read, Seek};
use std::str::FromStr;

use csv::{ReaderBuilder, StringRecord, Terminator};
use serde::{Deserialize, Serialize};

use crate::archive::DwcArchive;
use crate::descriptor::{CoreMapping, DescriptorConfig};
use crate::diagnostics::{Diagnostics, Stage, StageOutcome};
use crate::error::CoreDataError;
use crate::inspector::ArchiveInventory;
use crate::pipeline::ValidationRules;

pub const MANDATORY_FIELDS: [&str; 6] = [
    "occurrenceID",
    "basisOfRecord",
    "scientificName",
    "eventDate",
    "decimalLatitude",
    "decimalLongitude",
];

pub const LATITUDE: &str = "decimalLatitude";
pub const LONGITUDE: &str = "decimalLongitude";

/// Cell values treated as missing in numeric columns
const MISSING_VALUES: [&str; 7] = ["", "NA", "N/A", "NaN", "nan", "null", "NULL"];

/// How the coordinate check combines with the column checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CoreResultPolicy {
    /// Stage passes only if column checks and coordinate check both pass
    #[default]
    Combine,
    /// The coordinate check alone decides the stage result
    CoordinatesOnly,
}

impl FromStr for CoreResultPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "combine" => Ok(CoreResultPolicy::Combine),
            "coordinates-only" => Ok(CoreResultPolicy::CoordinatesOnly),
            other => Err(format!(
                "unknown core result policy '{}' (expected 'combine' or 'coordinates-only')",
                other
            )),
        }
    }
}

impl fmt::Display for CoreResultPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreResultPolicy::Combine => f.write_str("combine"),
            CoreResultPolicy::CoordinatesOnly => f.write_str("coordinates-only"),
        }
    }
}

/// Decode `\t`, `\n`, `\r` and `\\` in a descriptor token
pub fn unescape_token(token: &str) -> String {
    let mut out = String::with_capacity(token.len());
    let mut chars = token.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Reader settings derived from the descriptor's `core` attributes
#[derive(Debug, Clone, Copy)]
pub struct TableFormat {
    pub delimiter: u8,
    pub quote: Option<u8>,
    pub terminator: Terminator,
}

impl Default for TableFormat {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: Some(b'"'),
            terminator: Terminator::CRLF,
        }
    }
}

impl TableFormat {
    pub fn from_mapping(mapping: &CoreMapping) -> Result<Self, CoreDataError> {
        let mut format = TableFormat::default();

        if let Some(token) = &mapping.fields_terminated_by {
            match unescape_token(token).as_bytes() {
                [b] => format.delimiter = *b,
                _ => {
                    return Err(CoreDataError::UnsupportedDelimiter {
                        token: token.clone(),
                    });
                }
            }
        }

        if let Some(token) = &mapping.fields_enclosed_by {
            format.quote = match unescape_token(token).as_bytes() {
                [] => None,
                [b] => Some(*b),
                _ => {
                    return Err(CoreDataError::UnsupportedEnclosure {
                        token: token.clone(),
                    });
                }
            };
        }

        if let Some(token) = &mapping.lines_terminated_by {
            let decoded = unescape_token(token);
            format.terminator = match decoded.as_bytes() {
                b"\n" | b"\r\n" | b"\r" => Terminator::CRLF,
                [b] => Terminator::Any(*b),
                _ => Terminator::CRLF,
            };
        }

        Ok(format)
    }
}

/// The loaded core data file
#[derive(Debug, Clone)]
pub struct CoreTable {
    columns: Vec<String>,
    rows: Vec<StringRecord>,
}

impl CoreTable {
    /// Parse delimited text; the first record is the header
    pub fn parse(bytes: &[u8], format: &TableFormat) -> Result<Self, CoreDataError> {
        let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);

        let mut reader = ReaderBuilder::new()
            .delimiter(format.delimiter)
            .quote(format.quote.unwrap_or(b'"'))
            .quoting(format.quote.is_some())
            .terminator(format.terminator)
            .has_headers(true)
            .flexible(true)
            .from_reader(bytes);

        let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

        let mut rows = Vec::new();
        for (index, record) in reader.records().enumerate() {
            let record = record?;
            if record.len() > columns.len() {
                return Err(CoreDataError::RaggedRow {
                    row: index + 1,
                    expected: columns.len(),
                    actual: record.len(),
                });
            }
            rows.push(record);
        }

        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Values of one column; short rows yield empty strings
    pub fn column_values(&self, name: &str) -> Option<Vec<&str>> {
        let index = self.column_index(name)?;
        Some(
            self.rows
                .iter()
                .map(|row| row.get(index).unwrap_or(""))
                .collect(),
        )
    }

    /// Columns with the first occurrence of `id_column` removed
    pub fn cleaned_columns(&self, id_column: &str) -> Result<Vec<String>, CoreDataError> {
        let index = self
            .column_index(id_column)
            .ok_or_else(|| CoreDataError::MissingIdColumn {
                column: id_column.to_string(),
            })?;
        let mut cleaned = self.columns.clone();
        cleaned.remove(index);
        Ok(cleaned)
    }

    /// Minimum and maximum of a numeric column, `None` when it holds no values
    pub fn numeric_range(&self, name: &str) -> Result<Option<(f64, f64)>, CoreDataError> {
        let values = self
            .column_values(name)
            .ok_or_else(|| CoreDataError::MissingColumn {
                column: name.to_string(),
            })?;

        let mut range: Option<(f64, f64)> = None;
        for (index, raw) in values.into_iter().enumerate() {
            let value = raw.trim();
            if MISSING_VALUES.contains(&value) {
                continue;
            }
            let number: f64 = value.parse().map_err(|_| CoreDataError::NonNumeric {
                column: name.to_string(),
                row: index + 1,
                value: raw.to_string(),
            })?;
            if number.is_nan() {
                continue;
            }
            range = Some(match range {
                None => (number, number),
                Some((min, max)) => (min.min(number), max.max(number)),
            });
        }
        Ok(range)
    }
}

/// Coordinate bounds check
///
/// Each violated bound is reported on its own. Missing or non-numeric
/// coordinate columns fail the check.
pub fn check_coordinates(table: &CoreTable, diags: &mut Diagnostics) -> StageOutcome {
    const STAGE: Stage = Stage::CoreData;

    let ranges = table
        .numeric_range(LATITUDE)
        .and_then(|lat| table.numeric_range(LONGITUDE).map(|lon| (lat, lon)));
    let (latitude, longitude) = match ranges {
        Ok(ranges) => ranges,
        Err(e) => return diags.failure(STAGE, format!("Coordinate validation failed: {}", e)),
    };

    let mut outcome = StageOutcome::Passed;

    if let Some((min, max)) = latitude {
        if min < -90.0 {
            outcome = outcome.and(
                diags.failure(STAGE, format!("Latitude min value error: {} < -90", min)),
            );
        }
        if max > 90.0 {
            outcome = outcome.and(
                diags.failure(STAGE, format!("Latitude max value error: {} > 90", max)),
            );
        }
    }
    if let Some((min, max)) = longitude {
        if min < -180.0 {
            outcome = outcome.and(
                diags.failure(STAGE, format!("Longitude min value error: {} < -180", min)),
            );
        }
        if max > 180.0 {
            outcome = outcome.and(
                diags.failure(STAGE, format!("Longitude max value error: {} > 180", max)),
            );
        }
    }

    if outcome.is_passed() {
        if latitude.is_none() || longitude.is_none() {
            diags.info(STAGE, "Coordinate columns hold no values");
        }
        diags.success(STAGE, "Coordinates in data file are valid");
    }
    outcome
}

/// Column checks against the declared fields: positional, count, set and
/// mandatory-field checks
fn check_columns(
    cleaned: &[String],
    declared: &[String],
    rules: &ValidationRules,
    diags: &mut Diagnostics,
) -> StageOutcome {
    const STAGE: Stage = Stage::CoreData;
    let mut outcome = StageOutcome::Passed;

    for (index, field) in declared.iter().enumerate() {
        match cleaned.get(index) {
            Some(column) if column == field => {}
            Some(column) => diags.warning(
                STAGE,
                format!(
                    "Missing data column '{}' at index {} which was defined there in meta.xml (found '{}')",
                    field, index, column
                ),
            ),
            None => diags.warning(
                STAGE,
                format!("Missing data column which was defined in meta.xml: {}", field),
            ),
        }
    }

    if cleaned.len() == declared.len() {
        diags.info(
            STAGE,
            "Number of data columns equals number of DwC field elements given in meta.xml",
        );
    } else {
        outcome = outcome.and(diags.failure(
            STAGE,
            format!(
                "Number of data columns ({}) does not equal number of DwC field elements given in meta.xml ({})",
                cleaned.len(),
                declared.len()
            ),
        ));
    }

    let mut sorted_columns = cleaned.to_vec();
    sorted_columns.sort();
    let mut sorted_fields = declared.to_vec();
    sorted_fields.sort();
    if sorted_columns == sorted_fields {
        diags.success(STAGE, "Found data columns equal DwC field elements in meta.xml");
    } else {
        let columns: BTreeSet<&str> = cleaned.iter().map(String::as_str).collect();
        let fields: BTreeSet<&str> = declared.iter().map(String::as_str).collect();
        let undeclared: Vec<&str> = columns.difference(&fields).copied().collect();
        let absent: Vec<&str> = fields.difference(&columns).copied().collect();
        outcome = outcome.and(diags.failure(
            STAGE,
            format!(
                "Data columns differ from DwC field elements in meta.xml (not declared: [{}]; not in data: [{}])",
                undeclared.join(", "),
                absent.join(", ")
            ),
        ));
    }

    let fields: BTreeSet<&str> = declared.iter().map(String::as_str).collect();
    let missing: BTreeSet<&str> = rules
        .mandatory_fields
        .iter()
        .map(String::as_str)
        .filter(|m| !fields.contains(m))
        .collect();
    if missing.is_empty() {
        diags.success(STAGE, "Found all mandatory DwC field elements in the data");
    } else {
        outcome = outcome.and(diags.failure(
            STAGE,
            format!(
                "Could not find all mandatory DwC field elements in the data, missing: {}",
                missing.into_iter().collect::<Vec<_>>().join(", ")
            ),
        ));
    }

    outcome
}

/// Core data stage
pub fn validate_core_data<R: Read + Seek>(
    config: Option<&DescriptorConfig>,
    inventory: &ArchiveInventory,
    archive: Option<&mut DwcArchive<R>>,
    rules: &ValidationRules,
    diags: &mut Diagnostics,
) -> StageOutcome {
    const STAGE: Stage = Stage::CoreData;

    let Some((config, core_file)) = config.and_then(|c| c.core_file().map(|f| (c, f))) else {
        return diags.failure(STAGE, "No core data file name available from meta.xml");
    };
    if !inventory.contains(core_file) {
        return diags.failure(
            STAGE,
            format!("Core data file {} not found in DwC-A archive", core_file),
        );
    }
    let Some(archive) = archive else {
        return diags.failure(STAGE, "DwC-A archive is not readable");
    };

    let bytes = match archive.read_entry(core_file) {
        Ok(bytes) => bytes,
        Err(e) => {
            return diags.failure(
                STAGE,
                format!("Could not read core data file {}: {}", core_file, e),
            );
        }
    };

    let mapping = config.core.clone().unwrap_or_default();
    let table = match TableFormat::from_mapping(&mapping)
        .and_then(|format| CoreTable::parse(&bytes, &format))
    {
        Ok(table) => table,
        Err(e) => {
            return diags.failure(
                STAGE,
                format!("Could not read core data file {}: {}", core_file, e),
            );
        }
    };
    diags.success(
        STAGE,
        format!(
            "Could load and parse data from core data file {} ({} rows)",
            core_file,
            table.row_count()
        ),
    );

    let cleaned = match table.cleaned_columns(&rules.id_column) {
        Ok(cleaned) => cleaned,
        Err(e) => {
            return diags.failure(
                STAGE,
                format!("Could not read core data file {}: {}", core_file, e),
            );
        }
    };

    let columns_outcome = check_columns(&cleaned, config.declared_fields(), rules, diags);
    let coordinates_outcome = check_coordinates(&table, diags);

    match rules.core_result {
        CoreResultPolicy::Combine => columns_outcome.and(coordinates_outcome),
        CoreResultPolicy::CoordinatesOnly => {
            if !columns_outcome.is_passed() && coordinates_outcome.is_passed() {
                diags.info(
                    STAGE,
                    "Column check failures are overridden by the coordinate check (core result policy: coordinates-only)",
                );
            }
            coordinates_outcome
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Severity;

    const HEADER: &str = "id,occurrenceID,basisOfRecord,scientificName,eventDate,decimalLatitude,decimalLongitude";

    fn declared() -> Vec<String> {
        MANDATORY_FIELDS.iter().map(|s| s.to_string()).collect()
    }

    fn table(body: &str) -> CoreTable {
        CoreTable::parse(body.as_bytes(), &TableFormat::default()).unwrap()
    }

    fn failures(diags: &Diagnostics) -> Vec<String> {
        diags
            .at_least(Severity::Failure)
            .map(|d| d.message.clone())
            .collect()
    }

    #[test]
    fn test_unescape_token() {
        assert_eq!(unescape_token("\\t"), "\t");
        assert_eq!(unescape_token("\\r\\n"), "\r\n");
        assert_eq!(unescape_token(","), ",");
        assert_eq!(unescape_token("\\\\"), "\\");
        assert_eq!(unescape_token("\\x"), "\\x");
        assert_eq!(unescape_token("\t"), "\t");
    }

    #[test]
    fn test_table_format_from_mapping() {
        let mapping = CoreMapping {
            fields_terminated_by: Some("\\t".to_string()),
            lines_terminated_by: Some("\\n".to_string()),
            fields_enclosed_by: Some(String::new()),
            ..CoreMapping::default()
        };
        let format = TableFormat::from_mapping(&mapping).unwrap();
        assert_eq!(format.delimiter, b'\t');
        assert_eq!(format.quote, None);

        let defaults = TableFormat::from_mapping(&CoreMapping::default()).unwrap();
        assert_eq!(defaults.delimiter, b',');
        assert_eq!(defaults.quote, Some(b'"'));

        let bad = CoreMapping {
            fields_terminated_by: Some("::".to_string()),
            ..CoreMapping::default()
        };
        assert!(matches!(
            TableFormat::from_mapping(&bad),
            Err(CoreDataError::UnsupportedDelimiter { .. })
        ));
    }

    #[test]
    fn test_parse_tab_delimited() {
        let format = TableFormat {
            delimiter: b'\t',
            quote: None,
            ..TableFormat::default()
        };
        let table =
            CoreTable::parse(b"\xEF\xBB\xBFid\tname\n1\t\"quoted\n2\tplain\n", &format).unwrap();
        assert_eq!(table.columns(), ["id", "name"]);
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.column_values("name").unwrap(), vec!["\"quoted", "plain"]);
    }

    #[test]
    fn test_ragged_row_is_an_error() {
        let result = CoreTable::parse(b"id,a\n1,x,extra\n", &TableFormat::default());
        assert!(matches!(
            result,
            Err(CoreDataError::RaggedRow {
                row: 1,
                expected: 2,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_cleaned_columns() {
        let table = table("occurrenceID,id,scientificName\n");
        assert_eq!(
            table.cleaned_columns("id").unwrap(),
            vec!["occurrenceID", "scientificName"]
        );
        assert!(matches!(
            table.cleaned_columns("ID"),
            Err(CoreDataError::MissingIdColumn { .. })
        ));
    }

    #[test]
    fn test_numeric_range_skips_missing() {
        let table = table("id,decimalLatitude\n1,10.5\n2,\n3,NA\n4,-3\n");
        assert_eq!(
            table.numeric_range("decimalLatitude").unwrap(),
            Some((-3.0, 10.5))
        );
    }

    #[test]
    fn test_null_spellings_are_missing() {
        let mixed = table("id,decimalLatitude\n1,null\n2,NULL\n3,N/A\n4,12\n");
        assert_eq!(
            mixed.numeric_range("decimalLatitude").unwrap(),
            Some((12.0, 12.0))
        );

        let only_null = table("id,decimalLatitude\n1,null\n");
        assert_eq!(only_null.numeric_range("decimalLatitude").unwrap(), None);

        let worded = table("id,decimalLatitude\n1,north\n");
        assert!(matches!(
            worded.numeric_range("decimalLatitude"),
            Err(CoreDataError::NonNumeric { .. })
        ));
    }

    #[test]
    fn test_coordinates_valid() {
        let table = table(&format!("{}\n1,o1,HumanObservation,Abies alba,2020-01-01,45.0,10.0\n", HEADER));
        let mut diags = Diagnostics::new();
        assert!(check_coordinates(&table, &mut diags).is_passed());
    }

    #[test]
    fn test_each_bound_reported() {
        let table = table(&format!(
            "{}\n1,o1,H,A,2020,95.0,181\n2,o2,H,A,2020,-91,-181\n",
            HEADER
        ));
        let mut diags = Diagnostics::new();
        let outcome = check_coordinates(&table, &mut diags);

        assert!(!outcome.is_passed());
        let failures = failures(&diags);
        assert_eq!(failures.len(), 4);
        assert!(failures[0].starts_with("Latitude min value error"));
        assert!(failures[1].starts_with("Latitude max value error"));
        assert!(failures[2].starts_with("Longitude min value error"));
        assert!(failures[3].starts_with("Longitude max value error"));
    }

    #[test]
    fn test_coordinates_non_numeric_or_absent() {
        let mut diags = Diagnostics::new();
        let worded = table("id,decimalLatitude,decimalLongitude\n1,north,10\n");
        assert!(!check_coordinates(&worded, &mut diags).is_passed());
        assert!(failures(&diags)[0].contains("Non-numeric value \"north\""));

        let mut diags = Diagnostics::new();
        let latitude_only = table("id,decimalLatitude\n1,10\n");
        assert!(!check_coordinates(&latitude_only, &mut diags).is_passed());
        assert!(failures(&diags)[0].contains("Missing column 'decimalLongitude'"));
    }

    #[test]
    fn test_column_checks_pass() {
        let cleaned = declared();
        let mut diags = Diagnostics::new();
        let outcome = check_columns(&cleaned, &declared(), &ValidationRules::default(), &mut diags);
        assert!(outcome.is_passed());
        assert_eq!(diags.at_least(Severity::Warning).count(), 0);
    }

    #[test]
    fn test_reordered_columns_only_warn() {
        let mut cleaned = declared();
        cleaned.swap(0, 1);
        let mut diags = Diagnostics::new();
        let outcome = check_columns(&cleaned, &declared(), &ValidationRules::default(), &mut diags);

        assert!(outcome.is_passed());
        let warnings: Vec<_> = diags
            .events()
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .collect();
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].message.contains("'occurrenceID' at index 0"));
    }

    #[test]
    fn test_count_mismatch_fails() {
        let mut cleaned = declared();
        cleaned.push("recordedBy".to_string());
        let mut diags = Diagnostics::new();
        let outcome = check_columns(&cleaned, &declared(), &ValidationRules::default(), &mut diags);

        assert!(!outcome.is_passed());
        let failures = failures(&diags);
        assert!(failures[0].starts_with("Number of data columns (7)"));
        assert!(failures[1].contains("not declared: [recordedBy]"));
    }

    #[test]
    fn test_missing_mandatory_field_is_named() {
        let fields: Vec<String> = declared().into_iter().skip(1).collect();
        let mut diags = Diagnostics::new();
        let outcome = check_columns(&fields, &fields, &ValidationRules::default(), &mut diags);

        assert!(!outcome.is_passed());
        assert_eq!(
            failures(&diags),
            vec!["Could not find all mandatory DwC field elements in the data, missing: occurrenceID"]
        );
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("combine".parse::<CoreResultPolicy>(), Ok(CoreResultPolicy::Combine));
        assert_eq!(
            "Coordinates-Only".parse::<CoreResultPolicy>(),
            Ok(CoreResultPolicy::CoordinatesOnly)
        );
        assert!("override".parse::<CoreResultPolicy>().is_err());
        assert_eq!(CoreResultPolicy::CoordinatesOnly.to_string(), "coordinates-only");
    }
}
