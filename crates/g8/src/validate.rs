//! Validation of bound request payloads.

use crate::Error;

/// Validation trait for bound payload types.
///
/// Implementations should check all fields and return an error for invalid
/// input. Returning an [`crate::ApiError`] sends it to API callers unchanged;
/// any other error is treated as unhandled.
///
/// # Example
///
/// ```
/// use g8::{ApiError, Validate};
/// use http::StatusCode;
///
/// struct CreateOrder {
///     quantity: u32,
/// }
///
/// impl Validate for CreateOrder {
///     fn validate(&self) -> Result<(), g8::Error> {
///         if self.quantity == 0 {
///             return Err(ApiError::new(
///                 StatusCode::BAD_REQUEST,
///                 "INVALID_QUANTITY",
///                 "The 'quantity' field must be at least 1",
///             )
///             .into());
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait Validate {
    /// Validate the payload, returning an error if invalid.
    fn validate(&self) -> Result<(), Error>;
}
