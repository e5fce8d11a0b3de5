//! Human-readable byte sizes for cache ceilings (e.g. "10MB", "2GB").

use thiserror::Error;

/// Error parsing a size string.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid size '{input}' - expected bytes or a value like '500KB', '10MB', '2GB'")]
pub struct SizeParseError {
    input: String,
}

const KB: u64 = 1024;
const MB: u64 = KB * 1024;
const GB: u64 = MB * 1024;

/// Parse a size into bytes.
///
/// Accepts a bare byte count or a number followed by `B`, `K`/`KB`, `M`/`MB`
/// or `G`/`GB` (binary multiples, case-insensitive, optional whitespace).
///
/// ```
/// use iotnode::config::parse_size;
///
/// assert_eq!(parse_size("10000000").unwrap(), 10_000_000);
/// assert_eq!(parse_size("10MB").unwrap(), 10 * 1024 * 1024);
/// assert_eq!(parse_size("2 gb").unwrap(), 2 * 1024 * 1024 * 1024);
/// ```
pub fn parse_size(input: &str) -> Result<u64, SizeParseError> {
    let err = || SizeParseError {
        input: input.to_string(),
    };

    let trimmed = input.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, suffix) = trimmed.split_at(split);
    if digits.is_empty() {
        return Err(err());
    }

    let multiplier = match suffix.trim().to_ascii_uppercase().as_str() {
        "" | "B" => 1,
        "K" | "KB" => KB,
        "M" | "MB" => MB,
        "G" | "GB" => GB,
        _ => return Err(err()),
    };

    digits
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(multiplier))
        .ok_or_else(err)
}

/// Format a byte count using the largest unit that divides it exactly.
pub fn format_size(bytes: u64) -> String {
    match bytes {
        0 => "0".to_string(),
        b if b % GB == 0 => format!("{}GB", b / GB),
        b if b % MB == 0 => format!("{}MB", b / MB),
        b if b % KB == 0 => format!("{}KB", b / KB),
        b => b.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_bytes() {
        assert_eq!(parse_size("0"), Ok(0));
        assert_eq!(parse_size(" 10000000 "), Ok(10_000_000));
        assert_eq!(parse_size("512B"), Ok(512));
    }

    #[test]
    fn test_parse_suffixes() {
        assert_eq!(parse_size("4k"), Ok(4 * KB));
        assert_eq!(parse_size("500 MB"), Ok(500 * MB));
        assert_eq!(parse_size("3G"), Ok(3 * GB));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_size("").is_err());
        assert!(parse_size("MB").is_err());
        assert!(parse_size("10TB").is_err());
        assert!(parse_size("1.5GB").is_err());
        assert!(parse_size("-5").is_err());
    }

    #[test]
    fn test_parse_overflow() {
        assert!(parse_size("99999999999999999999GB").is_err());
        assert!(parse_size("18446744073709551615GB").is_err());
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0");
        assert_eq!(format_size(10_000_000), "10000000");
        assert_eq!(format_size(2 * GB), "2GB");
        assert_eq!(format_size(1536 * KB), "1536KB");
        assert_eq!(format_size(64 * MB), "64MB");
    }

    #[test]
    fn test_format_then_parse_preserves_value() {
        for bytes in [1, 1000, 4 * KB, 10_000_000, 7 * MB, 3 * GB] {
            assert_eq!(parse_size(&format_size(bytes)), Ok(bytes));
        }
    }
}
