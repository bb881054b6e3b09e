//! Filename derivation from a `Content-Disposition` header or, failing
//! that, the source URL's path.
//!
//! The decoding pipeline reproduces a legacy `decodeURIComponent(escape(x))`
//! trick byte-for-byte: the header is matched and percent-decoded in raw
//! byte space (never as a Rust `&str`), then the resulting bytes are
//! reinterpreted as UTF-8. This intentionally does *not* implement
//! RFC 5987 parsing -- see the design notes for why.

use std::sync::OnceLock;

use percent_encoding::percent_decode;
use regex::bytes::Regex;

// `filename*=` (RFC 5987) is `charset'language'value`, the apostrophes
// being literal delimiters rather than a quoting convention, so it gets
// its own pattern tried before the plain `filename=` form. `regex` also
// has no backreference support, so the plain form's three quoting
// styles (double-quoted, single-quoted, bare) each get their own
// capture group instead of a shared `(['"])?...\1?`.
fn star_filename_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)filename\*=(?:UTF-8|ISO-8859-2)?''([^;\n]+)"#)
            .expect("star filename regex is a fixed, valid pattern")
    })
}

fn plain_filename_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)filename=(?:"([^"]+)"|'([^']+)'|([^'";\n]+))"#)
            .expect("plain filename regex is a fixed, valid pattern")
    })
}

/// Extracts a filename from a raw `Content-Disposition` header value.
///
/// `header` is the *raw bytes* of the header as it came off the wire --
/// not a validated `&str` -- because the legacy decoding pipeline needs
/// to treat each byte as its own Latin-1 code unit.
pub fn from_content_disposition(header: &[u8]) -> Option<String> {
    let raw = if let Some(caps) = star_filename_regex().captures(header) {
        caps.get(1)?.as_bytes().to_vec()
    } else {
        let caps = plain_filename_regex().captures(header)?;
        caps.get(1)
            .or_else(|| caps.get(2))
            .or_else(|| caps.get(3))?
            .as_bytes()
            .to_vec()
    };
    let decoded = percent_decode(&raw).collect::<Vec<u8>>();
    String::from_utf8(decoded).ok()
}

/// Falls back to the last non-empty path segment of `url`, percent-decoded.
pub fn from_url(url: &str) -> String {
    let without_query = url.split('?').next().unwrap_or(url);
    let without_fragment = without_query.split('#').next().unwrap_or(without_query);
    without_fragment
        .rsplit('/')
        .find(|segment| !segment.is_empty())
        .map(|segment| {
            percent_decode(segment.as_bytes())
                .decode_utf8()
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| segment.to_string())
        })
        .unwrap_or_else(|| "download".to_string())
}

/// Derives the filename the coordinator will hand to every leg that
/// didn't supply its own.
pub fn derive(url: &str, content_disposition: Option<&[u8]>) -> String {
    content_disposition
        .and_then(from_content_disposition)
        .unwrap_or_else(|| from_url(url))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_filename() {
        let header = br#"attachment; filename="test.zip""#;
        assert_eq!(from_content_disposition(header).as_deref(), Some("test.zip"));
    }

    #[test]
    fn utf8_star_filename() {
        let header = b"attachment; filename*=UTF-8''%e6%97%a5%e6%9c%ac.txt";
        assert_eq!(from_content_disposition(header).as_deref(), Some("日本.txt"));
    }

    #[test]
    fn legacy_latin1_percent_encoded_utf8_bytes() {
        // "café.txt" encoded as UTF-8 bytes, percent-escaped one byte at a time --
        // the shape a legacy server following the Latin-1-escape convention emits.
        let header = b"attachment; filename=\"caf%C3%A9.txt\"";
        assert_eq!(from_content_disposition(header).as_deref(), Some("caf\u{e9}.txt"));
    }

    #[test]
    fn missing_header_falls_back_to_url() {
        assert_eq!(derive("http://host/path/file.bin?x=1", None), "file.bin");
    }

    #[test]
    fn url_fallback_percent_decodes() {
        assert_eq!(from_url("http://host/a%20b.zip"), "a b.zip");
    }
}
