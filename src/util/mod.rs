//! Utility functions shared by the library and the command-line front end.
//!
//! - **URL validation**: SSRF guard applied to every discovery candidate
//! - **Text**: control-character stripping for terminal output

mod text;
mod url_validator;

pub use text::strip_control_chars;
pub use url_validator::{validate_url, UrlValidationError};
