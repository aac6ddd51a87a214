use crate::error::ValidationError;

/// Extension trait for Option types to simplify required field validation
///
/// # Example
///
/// ```rust
/// use quill_core::error::utilities::RequiredFieldExt;
///
/// let title: Option<String> = Some("Hello".to_string());
/// assert_eq!(title.require_field("Title").unwrap(), "Hello");
/// ```
pub trait RequiredFieldExt<T> {
    /// Convert None to a ValidationError::MissingField
    fn require_field(self, field_name: &str) -> Result<T, ValidationError>;
}

impl<T> RequiredFieldExt<T> for Option<T> {
    fn require_field(self, field_name: &str) -> Result<T, ValidationError> {
        self.ok_or_else(|| ValidationError::MissingField(format!("{field_name} is required")))
    }
}
