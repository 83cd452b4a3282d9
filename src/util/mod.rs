//! Utility functions shared across the pipeline and the CLI.
//!
//! - **URL validation**: shape checks for user input and SSRF guarding for article URLs
//! - **Text processing**: width-aware previews, error condensing, control-character stripping

mod text;
mod url_validator;

pub use text::{condense_error, preview, strip_control_chars};
pub use url_validator::{require_scheme_and_host, validate_url, UrlValidationError};
