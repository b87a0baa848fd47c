use validator::ValidationError;

/// Canonical form of a licence plate: upper-case, no whitespace.
pub fn normalize_plate(plate: &str) -> String {
    plate
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}

/// Plates are 2–12 letters, digits or hyphens once whitespace is removed.
pub fn validate_plate(plate: &str) -> Result<(), ValidationError> {
    let normalized = normalize_plate(plate);
    let len = normalized.chars().count();
    if !(2..=12).contains(&len) {
        let mut err = ValidationError::new("plate_length");
        err.message = Some("licence plate must be 2–12 characters".into());
        return Err(err);
    }
    if !normalized
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-')
    {
        let mut err = ValidationError::new("plate_charset");
        err.message = Some("licence plate may only contain letters, digits and '-'".into());
        return Err(err);
    }
    Ok(())
}

/// Feature tags are lower-case identifiers such as `ev_charging`.
pub fn validate_features(features: &[String]) -> Result<(), ValidationError> {
    let valid = features.iter().all(|f| {
        !f.is_empty()
            && f.chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    });
    if valid {
        Ok(())
    } else {
        let mut err = ValidationError::new("feature_format");
        err.message = Some("features must be lower-case identifiers".into());
        Err(err)
    }
}
