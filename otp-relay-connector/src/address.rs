use crate::{config::AddressingConfig, error::ControllerError};

/// Turns a user-supplied phone number into the transport's user address.
///
/// Every non-digit is dropped. Numbers already starting with the default country
/// code are kept as they are; a national number with a trunk `0` has it replaced by
/// the country code; anything else gets the country code prepended.
pub fn normalize_recipient(raw: &str, addressing: &AddressingConfig) -> Result<String, ControllerError> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return Err(ControllerError::InvalidRecipient(raw.to_string()));
    }

    let code = addressing.default_country_code.as_str();
    let number = if digits.starts_with(code) {
        digits
    } else if let Some(national) = digits.strip_prefix('0') {
        format!("{code}{national}")
    } else {
        format!("{code}{digits}")
    };

    Ok(format!("{number}{}", addressing.address_suffix))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalize(raw: &str) -> String {
        normalize_recipient(raw, &AddressingConfig::default()).unwrap()
    }

    #[test]
    fn keeps_numbers_with_country_code() {
        assert_eq!(normalize("6281234567890"), "6281234567890@s.whatsapp.net");
        assert_eq!(normalize("+62 812-3456-7890"), "6281234567890@s.whatsapp.net");
    }

    #[test]
    fn replaces_trunk_zero_with_country_code() {
        assert_eq!(normalize("081234567890"), "6281234567890@s.whatsapp.net");
    }

    #[test]
    fn prefixes_bare_national_numbers() {
        assert_eq!(normalize("81234567890"), "6281234567890@s.whatsapp.net");
    }

    #[test]
    fn honours_configured_country_code_and_suffix() {
        let addressing = AddressingConfig {
            default_country_code: "34".to_string(),
            address_suffix: "@example.net".to_string(),
        };
        assert_eq!(
            normalize_recipient("0612 345 678", &addressing).unwrap(),
            "34612345678@example.net"
        );
    }

    #[test]
    fn rejects_input_without_digits() {
        let err = normalize_recipient("not a number", &AddressingConfig::default()).unwrap_err();
        assert!(matches!(err, ControllerError::InvalidRecipient(_)));
    }
}
