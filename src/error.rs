use crate::pdfinspect::format_file_size;
use std::fmt;

/// Fatal errors: the call produces no output document.
#[derive(Debug)]
pub enum StampError {
    EmptyInput,
    InputTooLarge { size: usize, limit: usize },
    NotAPdf,
    Parse(String),
    Encrypted,
    NoPages,
    InvalidConfiguration(String),
    Serialize(String),
    Io(std::io::Error),
}

impl StampError {
    pub fn as_code(&self) -> &'static str {
        match self {
            StampError::EmptyInput => "INPUT_EMPTY",
            StampError::InputTooLarge { .. } => "INPUT_TOO_LARGE",
            StampError::NotAPdf => "INPUT_NOT_PDF",
            StampError::Parse(_) => "PDF_PARSE_FAILED",
            StampError::Encrypted => "PDF_ENCRYPTED_UNSUPPORTED",
            StampError::NoPages => "PDF_EMPTY_OR_NO_PAGES",
            StampError::InvalidConfiguration(_) => "INVALID_CONFIGURATION",
            StampError::Serialize(_) => "PDF_SERIALIZE_FAILED",
            StampError::Io(_) => "IO_ERROR",
        }
    }
}

impl fmt::Display for StampError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StampError::EmptyInput => write!(f, "input document is empty"),
            StampError::InputTooLarge { size, limit } => write!(
                f,
                "input document is {}, limit is {}",
                format_file_size(*size as u64),
                format_file_size(*limit as u64)
            ),
            StampError::NotAPdf => write!(f, "input does not start with a %PDF- header"),
            StampError::Parse(message) => write!(f, "pdf parse error: {}", message),
            StampError::Encrypted => write!(f, "encrypted pdf documents are not supported"),
            StampError::NoPages => write!(f, "pdf has no pages"),
            StampError::InvalidConfiguration(message) => {
                write!(f, "invalid configuration: {}", message)
            }
            StampError::Serialize(message) => write!(f, "pdf serialize error: {}", message),
            StampError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for StampError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StampError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StampError {
    fn from(value: std::io::Error) -> Self {
        StampError::Io(value)
    }
}

/// Per-field failures. These never abort a call; the dispatcher turns them into
/// `FieldOutcome` records.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldError {
    Descriptor(String),
    Geometry(String),
    PageOutOfRange { page: i64, page_count: usize },
    ImagePayload(String),
    ImageDecode(String),
    ImageFit(String),
    ImageEmbed(String),
    Font(String),
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldError::Descriptor(message) => write!(f, "invalid field descriptor: {}", message),
            FieldError::Geometry(message) => write!(f, "invalid field geometry: {}", message),
            FieldError::PageOutOfRange { page, page_count } => write!(
                f,
                "page out of range: page {} requested, document has {}",
                page, page_count
            ),
            FieldError::ImagePayload(message) => write!(f, "invalid image payload: {}", message),
            FieldError::ImageDecode(message) => write!(f, "image decode failed: {}", message),
            FieldError::ImageFit(message) => write!(f, "image fit failed: {}", message),
            FieldError::ImageEmbed(message) => write!(f, "image embed failed: {}", message),
            FieldError::Font(message) => write!(f, "font error: {}", message),
        }
    }
}

impl std::error::Error for FieldError {}
