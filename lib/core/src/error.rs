//! Error handling foundation for oidc-link.
//!
//! Only the `Result` alias lives here. Each crate defines its own error
//! enums and reports them through rootcause's `Report`.

use rootcause::Report;

/// A Result type alias using rootcause's Report for error handling.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;
