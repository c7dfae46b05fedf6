use crate::error::PlatenError;
use chrono::{TimeZone, Utc};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::fmt::Write as _;
use std::io::Write;

pub(crate) fn flate_compress(data: &[u8]) -> Result<Vec<u8>, PlatenError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder
        .write_all(data)
        .map_err(|_| PlatenError::CompressionFailure)?;
    encoder
        .finish()
        .map_err(|_| PlatenError::CompressionFailure)
}

/// Formats a coordinate or scalar for a content stream. Values are
/// rounded to four decimals and trailing zeros are dropped so that
/// round numbers serialize as plain integers.
pub(crate) fn fmt_num(value: f64) -> String {
    let value = if value.is_finite() { value } else { 0.0 };
    let mut out = format!("{:.4}", value);
    while out.ends_with('0') {
        out.pop();
    }
    if out.ends_with('.') {
        out.pop();
    }
    if out == "-0" {
        out.truncate(0);
        out.push('0');
    }
    out
}

/// Escapes the contents of a literal string. The caller provides the
/// surrounding parentheses.
pub(crate) fn escape_pdf_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '(' => out.push_str("\\("),
            ')' => out.push_str("\\)"),
            '\\' => out.push_str("\\\\"),
            _ => out.push(c),
        }
    }
    out
}

/// Escapes a name object body. Characters outside printable ASCII and
/// PDF delimiters become #xx sequences. The leading slash is the
/// caller's business.
pub(crate) fn escape_pdf_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for byte in name.bytes() {
        let delimiter = matches!(
            byte,
            b'#' | b'/' | b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'%'
        );
        if (0x21..=0x7e).contains(&byte) && !delimiter {
            out.push(byte as char);
        } else {
            let _ = write!(out, "#{:02X}", byte);
        }
    }
    out
}

/// Serializes a document information string. Pure ASCII becomes an
/// escaped literal string, anything else a UTF-16BE hex string with a
/// BOM as required by PDF 1.7 7.9.2.2.
pub(crate) fn utf8_to_pdfmetastr(text: &str) -> String {
    if text.is_ascii() {
        return format!("({})", escape_pdf_string(text));
    }
    let mut encoded = String::from("<FEFF");
    for unit in text.encode_utf16() {
        let _ = write!(encoded, "{:04X}", unit);
    }
    encoded.push('>');
    encoded
}

/// Builds the (D:YYYYMMDDHHMMSSZ) timestamp for the info dictionary.
/// SOURCE_DATE_EPOCH overrides the clock for reproducible output.
pub(crate) fn current_date_string() -> String {
    let timestamp = std::env::var("SOURCE_DATE_EPOCH")
        .ok()
        .and_then(|raw| raw.parse::<i64>().ok())
        .unwrap_or_else(|| Utc::now().timestamp());
    let when = Utc.timestamp_opt(timestamp, 0).single().unwrap_or_default();
    format!("(D:{}Z)", when.format("%Y%m%d%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fmt_num_trims_trailing_zeros() {
        assert_eq!(fmt_num(100.0), "100");
        assert_eq!(fmt_num(1.0), "1");
        assert_eq!(fmt_num(0.5), "0.5");
        assert_eq!(fmt_num(-2.25), "-2.25");
        assert_eq!(fmt_num(0.123456), "0.1235");
    }

    #[test]
    fn fmt_num_normalizes_degenerate_values() {
        assert_eq!(fmt_num(f64::NAN), "0");
        assert_eq!(fmt_num(-0.0), "0");
        // The rotation helpers feed in cos(pi/2) which is not exactly zero.
        assert_eq!(fmt_num(6.123233995736766e-17), "0");
    }

    #[test]
    fn literal_string_escaping() {
        assert_eq!(escape_pdf_string("a(b)c\\d"), "a\\(b\\)c\\\\d");
        assert_eq!(escape_pdf_string("plain"), "plain");
    }

    #[test]
    fn name_escaping_hex_encodes_outside_printable_ascii() {
        assert_eq!(escape_pdf_name("Gold"), "Gold");
        assert_eq!(escape_pdf_name("two words"), "two#20words");
        assert_eq!(escape_pdf_name("a/b#c"), "a#2Fb#23c");
    }

    #[test]
    fn metadata_strings_switch_to_utf16() {
        assert_eq!(utf8_to_pdfmetastr("Title"), "(Title)");
        assert_eq!(utf8_to_pdfmetastr("(x)"), "(\\(x\\))");
        // o with diaeresis is U+00F6.
        assert_eq!(utf8_to_pdfmetastr("r\u{f6}m"), "<FEFF007200F6006D>");
    }

    #[test]
    fn date_string_honors_source_date_epoch() {
        std::env::set_var("SOURCE_DATE_EPOCH", "0");
        assert_eq!(current_date_string(), "(D:19700101000000Z)");
        std::env::remove_var("SOURCE_DATE_EPOCH");
    }

    #[test]
    fn flate_round_trip_is_smaller_for_redundant_input() {
        let data = vec![b'a'; 4096];
        let compressed = flate_compress(&data).unwrap();
        assert!(compressed.len() < data.len());
        // zlib header, first byte 0x78.
        assert_eq!(compressed[0], 0x78);
    }
}
