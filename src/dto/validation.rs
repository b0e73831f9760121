//! Validation helpers for request DTOs.

use validator::ValidationError;

const DEVICE_ID_MAX: usize = 128;

/// Validates that a device identifier is non-empty, bounded, and printable
/// ASCII without whitespace.
pub fn validate_device_id(id: &str) -> Result<(), ValidationError> {
    if id.is_empty() || id.len() > DEVICE_ID_MAX {
        let mut err = ValidationError::new("device_id_length");
        err.message =
            Some(format!("device id must be 1..={DEVICE_ID_MAX} characters (got {})", id.len()).into());
        return Err(err);
    }

    if !id.chars().all(|c| c.is_ascii_graphic()) {
        let mut err = ValidationError::new("device_id_format");
        err.message = Some("device id must be printable ASCII without spaces".into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_typical_device_ids() {
        assert!(validate_device_id("android-9f8e7d6c").is_ok());
        assert!(validate_device_id("ios_device.42").is_ok());
    }

    #[test]
    fn rejects_empty_and_oversized() {
        assert!(validate_device_id("").is_err());
        assert!(validate_device_id(&"x".repeat(129)).is_err());
    }

    #[test]
    fn rejects_whitespace_and_control() {
        assert!(validate_device_id("device id").is_err());
        assert!(validate_device_id("device\nid").is_err());
    }
}
