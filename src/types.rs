//! Re-exported types from external crates for convenience.
//!
//! These types are commonly used in this crate and are re-exported here
//! so users don't need to add these dependencies to their `Cargo.toml`.

/// Date and time types for error timestamps and trading days.
pub use chrono::{DateTime, NaiveDate, Utc};
/// Arbitrary precision decimal type for prices and percentage changes.
pub use rust_decimal::Decimal;
/// Macro for creating [`Decimal`] literals at compile time.
///
/// # Example
/// ```
/// use stockwatch_stream::types::dec;
/// let price = dec!(150.25);
/// ```
pub use rust_decimal_macros::dec;
/// Secret string type that redacts the bearer token in debug output.
pub use secrecy::{ExposeSecret, SecretString};
/// URL type used for the page origin and the stream endpoint.
pub use url::Url;
