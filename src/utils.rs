/// Formats bytes as uppercase hexadecimal pairs separated by spaces.
pub(crate) fn format_hex(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return "<empty>".to_string();
    }

    let mut rendered = String::with_capacity(bytes.len().saturating_mul(3));
    for (index, value) in bytes.iter().enumerate() {
        if index > 0 {
            rendered.push(' ');
        }
        rendered.push(nibble_to_hex(value >> 4));
        rendered.push(nibble_to_hex(value & 0x0F));
    }
    rendered
}

/// Formats a source list for terminal output.
pub(crate) fn format_sources(sources: &[String]) -> String {
    if sources.is_empty() {
        return "-".to_string();
    }
    sources.join(", ")
}

/// Formats an error followed by its sources, separated by `: `.
pub(crate) fn format_error_chain(error: &dyn std::error::Error) -> String {
    let mut rendered = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}

fn nibble_to_hex(value: u8) -> char {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    HEX[usize::from(value)] as char
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn format_hex_handles_empty_payload() {
        assert_eq!("<empty>", format_hex(&[]));
    }

    #[test]
    fn format_hex_formats_uppercase_pairs() {
        assert_eq!("AA BB 03 11 0F EE", format_hex(&[0xAA, 0xBB, 0x03, 0x11, 0x0F, 0xEE]));
    }

    #[test]
    fn format_error_chain_appends_sources() {
        let error = crate::error::ClientError::InvalidLedTimeout {
            seconds: 20,
            source: crate::error::SessionError::InvalidArgument {
                argument: "LED timeout",
                value: "20".into(),
            },
        };
        assert_eq!(
            "invalid LED timeout setting `20`: invalid LED timeout `20`",
            format_error_chain(&error)
        );
    }

    #[test]
    fn format_sources_handles_empty_list() {
        assert_eq!("-", format_sources(&[]));
    }

    #[test]
    fn format_sources_joins_identifiers() {
        let sources = vec!["1".to_string(), "2".to_string(), "3".to_string()];
        assert_eq!("1, 2, 3", format_sources(&sources));
    }
}
