// Query Module
// "Read the field before you stoop"

pub mod validation;

pub use validation::{validate_query, ValidationError, MUTATING_KEYWORDS};
