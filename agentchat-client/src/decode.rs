use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;

/// Standard alphabet; `=` padding optional and stray trailing bits tolerated.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Replies arrive either as raw HTML or as base64-encoded HTML.
///
/// Anything containing `<` is taken as HTML already. Otherwise the value is
/// base64-decoded as UTF-8; if that fails the raw value is returned.
pub fn decode_maybe_base64(raw: &str) -> String {
    if raw.is_empty() || raw.contains('<') {
        return raw.to_string();
    }
    let compact: String = raw.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    match LENIENT.decode(compact.as_bytes()) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(err) => {
            tracing::debug!(%err, "reply is not base64, using it verbatim");
            raw.to_string()
        }
    }
}

/// PNG bytes from a `data:image/png;base64,...` URL.
pub fn decode_png_data_url(data_url: &str) -> Result<Vec<u8>, String> {
    let (header, payload) = data_url
        .split_once(',')
        .ok_or_else(|| "missing data URL payload".to_string())?;
    if !header.starts_with("data:image/") || !header.ends_with(";base64") {
        return Err(format!("unexpected data URL header: {}", header));
    }
    LENIENT.decode(payload.trim()).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};

    #[test]
    fn test_html_passes_through() {
        assert_eq!(decode_maybe_base64("<p>hi</p>"), "<p>hi</p>");
        assert_eq!(decode_maybe_base64(""), "");
    }

    #[test]
    fn test_base64_is_decoded() {
        let encoded = STANDARD.encode("<p>Total: ₹1,200</p>");
        assert_eq!(decode_maybe_base64(&encoded), "<p>Total: ₹1,200</p>");
    }

    #[test]
    fn test_unpadded_base64_is_decoded() {
        let text = "<p>Revenue up 4%</p>";
        let unpadded = STANDARD_NO_PAD.encode(text);
        assert!(!unpadded.ends_with('='));
        assert_eq!(decode_maybe_base64(&unpadded), text);
        assert_eq!(decode_maybe_base64(&STANDARD.encode(text)), text);
    }

    #[test]
    fn test_plain_text_falls_back() {
        assert_eq!(decode_maybe_base64("Sorry, no data."), "Sorry, no data.");
    }

    #[test]
    fn test_png_data_url() {
        let url = format!("data:image/png;base64,{}", STANDARD.encode([137u8, 80, 78, 71]));
        assert_eq!(decode_png_data_url(&url).unwrap(), vec![137, 80, 78, 71]);
        assert!(decode_png_data_url("data:text/plain,hi").is_err());
        assert!(decode_png_data_url("nonsense").is_err());
    }
}
