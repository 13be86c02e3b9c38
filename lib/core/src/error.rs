//! Error handling foundation shared by the switchboard crates.
//!
//! Only the `Result` alias lives here. Each crate owns its domain error
//! enums and wraps them in a rootcause [`Report`] where a failure needs to
//! carry layered context (configuration loading, client construction).

use rootcause::Report;

/// A Result whose error is a rootcause report over the context type `C`.
pub type Result<T, C> = std::result::Result<T, Report<C>>;
