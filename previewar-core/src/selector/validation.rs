use super::types::{Dimensions, ValidationWarning};

/// Largest plausible side of a home product, in inches (50 ft).
pub const MAX_PLAUSIBLE_INCHES: f64 = 600.0;

/// Flag dimensions that are non-positive or implausibly large.
/// These usually mean the model picked a package weight, a price or a
/// centimetre value that was never converted.
pub fn validate_dimensions(dims: &Dimensions) -> Vec<ValidationWarning> {
    [("length", dims.length), ("width", dims.width), ("height", dims.height)]
        .into_iter()
        .filter_map(|(field, value)| {
            let value = value?;
            let message = if !value.is_finite() || value <= 0.0 {
                format!("{} of {} in is not a positive size", capitalize(field), value)
            } else if value > MAX_PLAUSIBLE_INCHES {
                format!(
                    "{} of {} in exceeds {} in, likely a unit or extraction error",
                    capitalize(field),
                    value,
                    MAX_PLAUSIBLE_INCHES
                )
            } else {
                return None;
            };
            Some(ValidationWarning {
                field: field.to_string(),
                message,
                value: value.to_string(),
            })
        })
        .collect()
}

fn capitalize(field: &str) -> String {
    let mut chars = field.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
