//! LibXML2 FFI wrapper for XML Schema validation.
//!
//! There is no mature pure Rust XSD validator, so schema compilation and
//! validation go straight to libxml2 through a small FFI surface.
//!
//! ## Thread Safety
//!
//! - **Schema parsing** is not thread-safe in libxml2 and is serialized behind
//!   a process-wide lock.
//! - **Validation** is safe for different documents. Each call creates its own
//!   validation context; compiled schemas are shared read-only through `Arc`.
//! - The parser's structured error handler is a per-thread global. It is
//!   installed for the duration of one call and reset afterwards.
//!
//! ## Streaming
//!
//! [`LibXml2Wrapper::validate_stream`] feeds libxml2 from any `std::io::Read`
//! through an I/O callback, so the document is never held in memory as a
//! whole. It must run on a thread that may block.

use std::ffi::{CStr, CString};
use std::io::{self, Read};
use std::marker::PhantomData;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;
use std::sync::{Arc, Mutex, Once};

use libc::{c_char, c_int, c_uint, c_void};

use crate::error::{LibXml2Error, LibXml2Result};

/// Global initialization flag for libxml2.
///
/// libxml2's initialization functions are not thread-safe.
static LIBXML2_INIT: Once = Once::new();

/// Serializes `xmlSchemaParse`.
static SCHEMA_PARSE_LOCK: Mutex<()> = Mutex::new(());

/// `XML_ERR_WARNING`; anything above it is reported.
const XML_ERR_WARNING: c_int = 1;

/// `XML_CHAR_ENCODING_NONE`: let the parser detect the encoding.
const XML_CHAR_ENCODING_NONE: c_int = 0;

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
pub struct XmlParserInputBuffer {
    _private: [u8; 0],
}

pub type XmlInputReadCallback =
    Option<unsafe extern "C" fn(context: *mut c_void, buffer: *mut c_char, len: c_int) -> c_int>;

pub type XmlInputCloseCallback = Option<unsafe extern "C" fn(context: *mut c_void) -> c_int>;

pub type XmlStructuredErrorFunc =
    Option<unsafe extern "C" fn(user_data: *mut c_void, error: *mut xmlError)>;

// External libxml2 FFI declarations
#[cfg_attr(target_os = "windows", link(name = "libxml2"))]
#[cfg_attr(not(target_os = "windows"), link(name = "xml2"))]
unsafe extern "C" {
    pub fn xmlInitParser();
    pub fn xmlInitGlobals();

    // Schema parsing functions
    pub fn xmlSchemaNewMemParserCtxt(
        buffer: *const c_char,
        size: c_int,
    ) -> *mut XmlSchemaParserCtxt;

    pub fn xmlSchemaParse(ctxt: *const XmlSchemaParserCtxt) -> *mut XmlSchema;
    pub fn xmlSchemaFreeParserCtxt(ctxt: *mut XmlSchemaParserCtxt);
    pub fn xmlSchemaFree(schema: *mut XmlSchema);

    pub fn xmlSchemaSetParserStructuredErrors(
        ctxt: *mut XmlSchemaParserCtxt,
        serror: XmlStructuredErrorFunc,
        ctx: *mut c_void,
    );

    // Schema validation functions
    pub fn xmlSchemaNewValidCtxt(schema: *const XmlSchema) -> *mut XmlSchemaValidCtxt;
    pub fn xmlSchemaFreeValidCtxt(ctxt: *mut XmlSchemaValidCtxt);
    pub fn xmlSchemaValidateFile(
        ctxt: *const XmlSchemaValidCtxt,
        file_name: *const c_char,
        options: c_uint,
    ) -> c_int;

    /// Takes ownership of `input` in every case.
    pub fn xmlSchemaValidateStream(
        ctxt: *mut XmlSchemaValidCtxt,
        input: *mut XmlParserInputBuffer,
        enc: c_int,
        sax: *mut c_void,
        user_data: *mut c_void,
    ) -> c_int;

    pub fn xmlSchemaSetValidStructuredErrors(
        ctxt: *mut XmlSchemaValidCtxt,
        serror: XmlStructuredErrorFunc,
        ctx: *mut c_void,
    );

    // Streaming input
    pub fn xmlParserInputBufferCreateIO(
        ioread: XmlInputReadCallback,
        ioclose: XmlInputCloseCallback,
        ioctx: *mut c_void,
        enc: c_int,
    ) -> *mut XmlParserInputBuffer;

    /// Per-thread handler for parser (well-formedness) errors.
    pub fn xmlSetStructuredErrorFunc(ctx: *mut c_void, handler: XmlStructuredErrorFunc);
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
    /// Column number, when known.
    pub int2: c_int,
    pub ctxt: *mut c_void,
    pub node: *mut c_void,
}

/// One error reported by libxml2, in report order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDiagnostic {
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub message: String,
}

fn positive(value: c_int) -> Option<u32> {
    u32::try_from(value).ok().filter(|v| *v > 0)
}

/// Callback for libxml2 to report errors (structured).
///
/// `user_data` must point at a live `Vec<RawDiagnostic>`.
unsafe extern "C" fn structured_error_callback(user_data: *mut c_void, error: *mut xmlError) {
    if user_data.is_null() || error.is_null() {
        return;
    }
    let diagnostics = unsafe { &mut *(user_data as *mut Vec<RawDiagnostic>) };
    let error = unsafe { &*error };

    if error.level <= XML_ERR_WARNING {
        return;
    }

    let message = if error.message.is_null() {
        String::from("unknown libxml2 error")
    } else {
        let c_str = unsafe { CStr::from_ptr(error.message) };
        c_str.to_string_lossy().trim().to_string()
    };

    diagnostics.push(RawDiagnostic {
        line: positive(error.line),
        column: positive(error.int2),
        message,
    });
}

/// Installs the per-thread parser error handler; resets it on drop.
struct ParserErrorHandlerGuard;

impl ParserErrorHandlerGuard {
    /// # Safety
    ///
    /// `diagnostics` must outlive the guard.
    unsafe fn install(diagnostics: *mut Vec<RawDiagnostic>) -> Self {
        unsafe {
            xmlSetStructuredErrorFunc(diagnostics as *mut c_void, Some(structured_error_callback));
        }
        ParserErrorHandlerGuard
    }
}

impl Drop for ParserErrorHandlerGuard {
    fn drop(&mut self) {
        unsafe {
            xmlSetStructuredErrorFunc(std::ptr::null_mut(), None);
        }
    }
}

/// State shared with the libxml2 read callback.
struct StreamReadContext<'a> {
    reader: &'a mut dyn Read,
    failure: Option<io::Error>,
}

unsafe extern "C" fn stream_read_callback(
    context: *mut c_void,
    buffer: *mut c_char,
    len: c_int,
) -> c_int {
    if context.is_null() || buffer.is_null() || len <= 0 {
        return 0;
    }
    let ctx = unsafe { &mut *(context as *mut StreamReadContext<'_>) };
    if ctx.failure.is_some() {
        return -1;
    }
    let out = unsafe { std::slice::from_raw_parts_mut(buffer as *mut u8, len as usize) };

    // libxml2 treats a short count from the push buffer as end of input, so
    // fill `out` until it is full or the reader hits EOF.
    let read = catch_unwind(AssertUnwindSafe(|| {
        let mut filled = 0;
        while filled < out.len() {
            match ctx.reader.read(&mut out[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }));

    match read {
        Ok(Ok(n)) => n as c_int,
        Ok(Err(e)) => {
            ctx.failure = Some(e);
            -1
        }
        Err(_) => {
            ctx.failure = Some(io::Error::other("message body reader panicked"));
            -1
        }
    }
}

unsafe extern "C" fn stream_close_callback(_context: *mut c_void) -> c_int {
    0
}

/// Thread-safe wrapper for libxml2 schema pointer with proper resource management
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
    /// The pointer must come from `xmlSchemaParse` and must not be freed elsewhere.
    pub(crate) unsafe fn from_raw(ptr: *mut XmlSchema) -> LibXml2Result<Self> {
        if ptr.is_null() {
            return Err(LibXml2Error::SchemaParseFailed {
                details: "libxml2 returned a null schema".to_string(),
            });
        }

        Ok(XmlSchemaPtr {
            inner: Arc::new(XmlSchemaInner {
                ptr,
                _phantom: PhantomData,
            }),
        })
    }

    /// Only valid while this `XmlSchemaPtr` is alive.
    pub(crate) fn as_ptr(&self) -> *const XmlSchema {
        self.inner.ptr
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

/// What libxml2 reported for one document.
#[derive(Debug)]
pub struct RawValidation {
    /// 0 valid, > 0 invalid, < 0 internal or API error.
    pub code: c_int,
    pub diagnostics: Vec<RawDiagnostic>,
    /// Set when the document source failed mid-read.
    pub read_failure: Option<io::Error>,
}

impl RawValidation {
    pub fn is_valid(&self) -> bool {
        self.code == 0 && self.diagnostics.is_empty() && self.read_failure.is_none()
    }

    pub fn is_internal_error(&self) -> bool {
        self.read_failure.is_some() || (self.code < 0 && self.diagnostics.is_empty())
    }
}

/// Safe access to the libxml2 operations the validator needs.
pub struct LibXml2Wrapper {
    _phantom: PhantomData<()>,
}

impl LibXml2Wrapper {
    /// Initializes libxml2 on first use; cheap afterwards.
    pub fn new() -> Self {
        LIBXML2_INIT.call_once(|| unsafe {
            xmlInitParser();
            xmlInitGlobals();
        });

        LibXml2Wrapper {
            _phantom: PhantomData,
        }
    }

    /// Compile an XML schema held in memory.
    ///
    /// Calls are serialized process-wide. The error carries every message
    /// libxml2 reported while compiling.
    pub fn parse_schema_from_memory(&self, schema_data: &[u8]) -> LibXml2Result<XmlSchemaPtr> {
        let size = c_int::try_from(schema_data.len()).map_err(|_| LibXml2Error::SchemaParseFailed {
            details: "schema document too large".to_string(),
        })?;
        if size == 0 {
            return Err(LibXml2Error::SchemaParseFailed {
                details: "schema document is empty".to_string(),
            });
        }

        let _guard = SCHEMA_PARSE_LOCK
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut diagnostics: Vec<RawDiagnostic> = Vec::new();
        let diagnostics_ptr = &mut diagnostics as *mut Vec<RawDiagnostic>;

        unsafe {
            let _handler = ParserErrorHandlerGuard::install(diagnostics_ptr);

            let parser_ctxt =
                xmlSchemaNewMemParserCtxt(schema_data.as_ptr() as *const c_char, size);
            if parser_ctxt.is_null() {
                return Err(LibXml2Error::MemoryAllocation);
            }

            xmlSchemaSetParserStructuredErrors(
                parser_ctxt,
                Some(structured_error_callback),
                diagnostics_ptr as *mut c_void,
            );

            let schema_ptr = xmlSchemaParse(parser_ctxt);
            xmlSchemaFreeParserCtxt(parser_ctxt);

            if schema_ptr.is_null() {
                let details = if diagnostics.is_empty() {
                    "libxml2 could not compile the schema".to_string()
                } else {
                    diagnostics
                        .iter()
                        .map(|d| d.message.as_str())
                        .collect::<Vec<_>>()
                        .join("; ")
                };
                return Err(LibXml2Error::SchemaParseFailed { details });
            }

            XmlSchemaPtr::from_raw(schema_ptr)
        }
    }

    /// Validate a document pulled from `reader` in a single pass.
    ///
    /// Blocks the calling thread for as long as `reader` does. A failure of
    /// `reader` stops the parse and is returned in
    /// [`RawValidation::read_failure`].
    pub fn validate_stream(
        &self,
        schema: &XmlSchemaPtr,
        reader: &mut dyn Read,
    ) -> LibXml2Result<RawValidation> {
        let mut read_ctx = StreamReadContext {
            reader,
            failure: None,
        };
        let mut diagnostics: Vec<RawDiagnostic> = Vec::new();
        let diagnostics_ptr = &mut diagnostics as *mut Vec<RawDiagnostic>;

        let code = unsafe {
            let valid_ctxt = xmlSchemaNewValidCtxt(schema.as_ptr());
            if valid_ctxt.is_null() {
                return Err(LibXml2Error::ValidationContextCreationFailed);
            }

            let input = xmlParserInputBufferCreateIO(
                Some(stream_read_callback),
                Some(stream_close_callback),
                &mut read_ctx as *mut StreamReadContext<'_> as *mut c_void,
                XML_CHAR_ENCODING_NONE,
            );
            if input.is_null() {
                xmlSchemaFreeValidCtxt(valid_ctxt);
                return Err(LibXml2Error::InputBufferCreationFailed);
            }

            xmlSchemaSetValidStructuredErrors(
                valid_ctxt,
                Some(structured_error_callback),
                diagnostics_ptr as *mut c_void,
            );
            let _handler = ParserErrorHandlerGuard::install(diagnostics_ptr);

            let code = xmlSchemaValidateStream(
                valid_ctxt,
                input,
                XML_CHAR_ENCODING_NONE,
                std::ptr::null_mut(),
                std::ptr::null_mut(),
            );

            xmlSchemaFreeValidCtxt(valid_ctxt);
            code
        };

        Ok(RawValidation {
            code,
            diagnostics,
            read_failure: read_ctx.failure,
        })
    }

    /// Validate a document stored on disk.
    pub fn validate_file(
        &self,
        schema: &XmlSchemaPtr,
        file_path: &Path,
    ) -> LibXml2Result<RawValidation> {
        let path_str = file_path.to_str().ok_or_else(|| LibXml2Error::InvalidPath {
            path: file_path.display().to_string(),
        })?;
        let c_path = CString::new(path_str).map_err(|_| LibXml2Error::InvalidPath {
            path: file_path.display().to_string(),
        })?;

        let mut diagnostics: Vec<RawDiagnostic> = Vec::new();
        let diagnostics_ptr = &mut diagnostics as *mut Vec<RawDiagnostic>;

        let code = unsafe {
            let valid_ctxt = xmlSchemaNewValidCtxt(schema.as_ptr());
            if valid_ctxt.is_null() {
                return Err(LibXml2Error::ValidationContextCreationFailed);
            }

            xmlSchemaSetValidStructuredErrors(
                valid_ctxt,
                Some(structured_error_callback),
                diagnostics_ptr as *mut c_void,
            );
            let _handler = ParserErrorHandlerGuard::install(diagnostics_ptr);

            let code = xmlSchemaValidateFile(valid_ctxt, c_path.as_ptr(), 0);

            xmlSchemaFreeValidCtxt(valid_ctxt);
            code
        };

        Ok(RawValidation {
            code,
            diagnostics,
            read_failure: None,
        })
    }
}

impl Default for LibXml2Wrapper {
    fn default() -> Self {
        Self::new()
    }
}
