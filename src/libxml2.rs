//! LibXML2 FFI Wrapper Module
//!
//! This module provides a safe wrapper around the libxml2 calls needed for XML Schema
//! validation of EML documents.
//!
//! ## Why libxml2
//!
//! No mature pure Rust library performs XML Schema (XSD) validation. `roxmltree` and
//! `quick-xml` parse XML well (this crate uses `roxmltree` for `meta.xml` and the EML
//! root check) but neither validates against a schema. The GBIF EML schema is a
//! multi-file XSD with `xs:import`/`xs:include`, so it is loaded from its path on disk,
//! letting libxml2 resolve the referenced files relative to it.
//!
//! ## Memory management
//!
//! - Parsed schemas are owned by [`XmlSchemaPtr`] (Arc + Drop), freed exactly once
//! - Parser and validation contexts are freed before each call returns
//! - Documents parsed for validation are freed before [`LibXml2Wrapper::validate_memory`] returns

use std::ffi::CString;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::{Arc, Once};

use libc::{c_char, c_int};

use crate::error::{LibXml2Error, LibXml2Result};

/// Global initialization flag for libxml2
///
/// libxml2's initialization functions are not thread-safe, so they run
/// exactly once behind `std::sync::Once`.
static LIBXML2_INIT: Once = Once::new();

/// Parser options: no network access, no error/warning output on stderr
const XML_PARSE_NOERROR: c_int = 1 << 5;
const XML_PARSE_NOWARNING: c_int = 1 << 6;
const XML_PARSE_NONET: c_int = 1 << 11;
const PARSE_OPTIONS: c_int = XML_PARSE_NOERROR | XML_PARSE_NOWARNING | XML_PARSE_NONET;

// Opaque libxml2 structures
#[repr(C)]
pub struct XmlSchema {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlSchemaParserCtxt {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlSchemaValidCtxt {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlDoc {
    _private: [u8; 0],
}

// External libxml2 FFI declarations
#[cfg_attr(target_os = "windows", link(name = "libxml2"))]
#[cfg_attr(not(target_os = "windows"), link(name = "xml2"))]
unsafe extern "C" {
    pub fn xmlInitParser();
    pub fn xmlInitGlobals();

    // Document parsing
    pub fn xmlReadMemory(
        buffer: *const c_char,
        size: c_int,
        url: *const c_char,
        encoding: *const c_char,
        options: c_int,
    ) -> *mut XmlDoc;
    pub fn xmlFreeDoc(doc: *mut XmlDoc);

    // Schema parsing functions
    pub fn xmlSchemaNewParserCtxt(url: *const c_char) -> *mut XmlSchemaParserCtxt;
    pub fn xmlSchemaNewMemParserCtxt(
        buffer: *const c_char,
        size: c_int,
    ) -> *mut XmlSchemaParserCtxt;
    pub fn xmlSchemaSetParserStructuredErrors(
        ctxt: *mut XmlSchemaParserCtxt,
        serror: XmlStructuredErrorFunc,
        ctx: *mut libc::c_void,
    );
    pub fn xmlSchemaParse(ctxt: *const XmlSchemaParserCtxt) -> *mut XmlSchema;
    pub fn xmlSchemaFreeParserCtxt(ctxt: *mut XmlSchemaParserCtxt);
    pub fn xmlSchemaFree(schema: *mut XmlSchema);

    // Schema validation functions
    pub fn xmlSchemaNewValidCtxt(schema: *const XmlSchema) -> *mut XmlSchemaValidCtxt;
    pub fn xmlSchemaFreeValidCtxt(ctxt: *mut XmlSchemaValidCtxt);
    pub fn xmlSchemaValidateDoc(ctxt: *mut XmlSchemaValidCtxt, doc: *mut XmlDoc) -> c_int;

    pub fn xmlSchemaSetValidStructuredErrors(
        ctxt: *mut XmlSchemaValidCtxt,
        serror: XmlStructuredErrorFunc,
        ctx: *mut libc::c_void,
    );
}

#[repr(C)]
pub struct xmlError {
    pub domain: c_int,
    pub code: c_int,
    pub message: *const c_char,
    pub level: c_int,
    pub file: *const c_char,
    pub line: c_int,
    pub str1: *const c_char,
    pub str2: *const c_char,
    pub str3: *const c_char,
    pub int1: c_int,
    pub int2: c_int,
    pub ctxt: *mut libc::c_void,
    pub node: *mut libc::c_void,
}

pub type XmlStructuredErrorFunc =
    Option<unsafe extern "C" fn(user_data: *mut libc::c_void, error: *mut xmlError)>;

/// Callback for libxml2 to report errors (structured)
///
/// Messages are prefixed with their line number when libxml2 knows it.
unsafe extern "C" fn structured_error_callback(user_data: *mut libc::c_void, error: *mut xmlError) {
    let errors = unsafe { &mut *(user_data as *mut Vec<String>) };

    if !error.is_null() {
        let msg_ptr = unsafe { (*error).message };
        let line = unsafe { (*error).line };
        if !msg_ptr.is_null() {
            let c_str = unsafe { std::ffi::CStr::from_ptr(msg_ptr) };
            if let Ok(s) = c_str.to_str() {
                if line > 0 {
                    errors.push(format!("line {}: {}", line, s.trim()));
                } else {
                    errors.push(s.trim().to_string());
                }
            }
        }
    }
}

/// Shareable owner of a parsed libxml2 schema
#[derive(Debug)]
pub struct XmlSchemaPtr {
    inner: Arc<XmlSchemaInner>,
}

#[derive(Debug)]
struct XmlSchemaInner {
    ptr: *mut XmlSchema,
    _phantom: PhantomData<XmlSchema>,
}

// Safety: libxml2 documentation states that xmlSchema structures are thread-safe for reading
// See: http://xmlsoft.org/threads.html
unsafe impl Send for XmlSchemaInner {}
unsafe impl Sync for XmlSchemaInner {}

impl XmlSchemaPtr {
    /// Create a new XmlSchemaPtr from a raw pointer
    ///
    /// # Safety
    ///
    /// The pointer must have been returned by `xmlSchemaParse` and must not
    /// be freed by anyone else.
    pub(crate) unsafe fn from_raw(ptr: *mut XmlSchema) -> LibXml2Result<Self> {
        if ptr.is_null() {
            return Err(LibXml2Error::SchemaParseFailed);
        }

        Ok(XmlSchemaPtr {
            inner: Arc::new(XmlSchemaInner {
                ptr,
                _phantom: PhantomData,
            }),
        })
    }

    pub(crate) fn as_ptr(&self) -> *const XmlSchema {
        self.inner.ptr
    }

    pub fn is_valid(&self) -> bool {
        !self.inner.ptr.is_null()
    }
}

impl Clone for XmlSchemaPtr {
    fn clone(&self) -> Self {
        XmlSchemaPtr {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Drop for XmlSchemaInner {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe {
                xmlSchemaFree(self.ptr);
            }
            self.ptr = std::ptr::null_mut();
        }
    }
}

/// Validation result from libxml2
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    /// Validation succeeded (return code 0)
    Valid,
    /// Validation failed with errors (return code > 0)
    Invalid {
        error_count: i32,
        errors: Vec<String>,
    },
    /// Internal error occurred (return code < 0)
    InternalError { code: i32 },
}

impl ValidationResult {
    /// Create ValidationResult from libxml2 return code and captured errors
    pub fn from_code(code: c_int, errors: Vec<String>) -> Self {
        match code {
            0 => ValidationResult::Valid,
            n if n > 0 => ValidationResult::Invalid {
                error_count: n,
                errors,
            },
            n => ValidationResult::InternalError { code: n },
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, ValidationResult::Invalid { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ValidationResult::InternalError { .. })
    }
}

/// Safe access to libxml2 schema parsing and validation
pub struct LibXml2Wrapper {
    _phantom: PhantomData<()>,
}

impl LibXml2Wrapper {
    /// Create a new wrapper; libxml2 is initialized on first use only
    pub fn new() -> Self {
        LIBXML2_INIT.call_once(|| unsafe {
            xmlInitParser();
            xmlInitGlobals();
        });

        LibXml2Wrapper {
            _phantom: PhantomData,
        }
    }

    /// Parse an XML schema from a file, resolving imports relative to it
    ///
    /// # Errors
    ///
    /// Returns `LibXml2Error::InvalidPath` if the path cannot be passed to libxml2.
    /// Returns `LibXml2Error::SchemaParseFailed` if the schema cannot be parsed.
    pub fn parse_schema_from_file(&self, path: &Path) -> LibXml2Result<XmlSchemaPtr> {
        let c_path = path
            .to_str()
            .and_then(|s| CString::new(s).ok())
            .ok_or_else(|| LibXml2Error::InvalidPath {
                path: path.to_path_buf(),
            })?;

        unsafe {
            let parser_ctxt = xmlSchemaNewParserCtxt(c_path.as_ptr());
            if parser_ctxt.is_null() {
                return Err(LibXml2Error::MemoryAllocation);
            }
            Self::parse_with_context(parser_ctxt)
        }
    }

    /// Parse an XML schema from a memory buffer
    ///
    /// Relative `xs:import`/`xs:include` locations cannot be resolved this way;
    /// use [`parse_schema_from_file`](Self::parse_schema_from_file) for multi-file schemas.
    pub fn parse_schema_from_memory(&self, schema_data: &[u8]) -> LibXml2Result<XmlSchemaPtr> {
        unsafe {
            let parser_ctxt = xmlSchemaNewMemParserCtxt(
                schema_data.as_ptr() as *const c_char,
                schema_data.len() as c_int,
            );
            if parser_ctxt.is_null() {
                return Err(LibXml2Error::MemoryAllocation);
            }
            Self::parse_with_context(parser_ctxt)
        }
    }

    /// Parse and free the given parser context
    unsafe fn parse_with_context(
        parser_ctxt: *mut XmlSchemaParserCtxt,
    ) -> LibXml2Result<XmlSchemaPtr> {
        let mut errors: Vec<String> = Vec::new();
        let errors_ptr = &mut errors as *mut Vec<String> as *mut libc::c_void;

        let schema_ptr = unsafe {
            xmlSchemaSetParserStructuredErrors(
                parser_ctxt,
                Some(structured_error_callback),
                errors_ptr,
            );
            let schema_ptr = xmlSchemaParse(parser_ctxt);
            xmlSchemaFreeParserCtxt(parser_ctxt);
            schema_ptr
        };

        if schema_ptr.is_null() {
            for error in &errors {
                tracing::debug!(error = %error, "schema parse error");
            }
            return Err(LibXml2Error::SchemaParseFailed);
        }

        unsafe { XmlSchemaPtr::from_raw(schema_ptr) }
    }

    /// Validate XML content held in memory against a schema
    ///
    /// `name` is used as the document URL for error reporting.
    ///
    /// # Errors
    ///
    /// Returns `LibXml2Error::InvalidXml` if libxml2 cannot parse the content.
    /// Returns `LibXml2Error::ValidationContextCreationFailed` if the context cannot be created.
    /// Returns `LibXml2Error::ValidationFailed` on an internal libxml2 error.
    pub fn validate_memory(
        &self,
        schema: &XmlSchemaPtr,
        xml_content: &[u8],
        name: &str,
    ) -> LibXml2Result<ValidationResult> {
        let c_name = CString::new(name).unwrap_or_default();
        let size = c_int::try_from(xml_content.len()).map_err(|_| LibXml2Error::InvalidXml {
            details: format!("{} is too large to parse", name),
        })?;

        unsafe {
            let doc = xmlReadMemory(
                xml_content.as_ptr() as *const c_char,
                size,
                c_name.as_ptr(),
                std::ptr::null(),
                PARSE_OPTIONS,
            );
            if doc.is_null() {
                return Err(LibXml2Error::InvalidXml {
                    details: format!("libxml2 could not parse {}", name),
                });
            }

            let valid_ctxt = xmlSchemaNewValidCtxt(schema.as_ptr());
            if valid_ctxt.is_null() {
                xmlFreeDoc(doc);
                return Err(LibXml2Error::ValidationContextCreationFailed);
            }

            let mut errors: Vec<String> = Vec::new();
            let errors_ptr = &mut errors as *mut Vec<String> as *mut libc::c_void;
            xmlSchemaSetValidStructuredErrors(
                valid_ctxt,
                Some(structured_error_callback),
                errors_ptr,
            );

            let result_code = xmlSchemaValidateDoc(valid_ctxt, doc);

            xmlSchemaFreeValidCtxt(valid_ctxt);
            xmlFreeDoc(doc);

            match ValidationResult::from_code(result_code, errors) {
                ValidationResult::InternalError { code } => Err(LibXml2Error::ValidationFailed {
                    code,
                    name: name.to_string(),
                }),
                result => Ok(result),
            }
        }
    }
}

impl Default for LibXml2Wrapper {
    fn default() -> Self {
        Self::new()
    }
}
