use url::Url;

use crate::model::PlatformKind;

const HOST_TABLE: &[(&str, PlatformKind)] = &[
    ("youtube.com", PlatformKind::Youtube),
    ("youtu.be", PlatformKind::Youtube),
    ("youtube-nocookie.com", PlatformKind::Youtube),
    ("tiktok.com", PlatformKind::Tiktok),
    ("instagram.com", PlatformKind::Instagram),
    ("instagr.am", PlatformKind::Instagram),
    ("facebook.com", PlatformKind::Facebook),
    ("fb.watch", PlatformKind::Facebook),
    ("fb.com", PlatformKind::Facebook),
    ("twitter.com", PlatformKind::X),
    ("x.com", PlatformKind::X),
];

/// Map a URL to the platform it belongs to.
///
/// Never fails: anything that is not a recognised video host, including
/// input that does not parse as a URL at all, is a `Website`.
pub fn classify(url: &str) -> PlatformKind {
    match parse_lenient(url).as_ref().and_then(Url::host_str) {
        Some(host) => classify_host(host),
        None => PlatformKind::Website,
    }
}

/// Parse a URL, accepting scheme-less input such as `youtu.be/abc`.
pub(crate) fn parse_lenient(raw: &str) -> Option<Url> {
    let trimmed = raw.trim();
    match Url::parse(trimmed) {
        Ok(url) if url.has_host() => Some(url),
        Ok(_) => None,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            Url::parse(&format!("https://{}", trimmed)).ok()
        }
        Err(_) => None,
    }
}

fn classify_host(host: &str) -> PlatformKind {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    HOST_TABLE
        .iter()
        .find(|(domain, _)| host == *domain || host.ends_with(&format!(".{}", domain)))
        .map(|(_, kind)| *kind)
        .unwrap_or(PlatformKind::Website)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_platforms() {
        let cases = [
            ("https://www.youtube.com/watch?v=dQw4w9WgXcQ", PlatformKind::Youtube),
            ("https://youtu.be/dQw4w9WgXcQ", PlatformKind::Youtube),
            ("https://m.youtube.com/shorts/abcdefghijk", PlatformKind::Youtube),
            ("https://www.tiktok.com/@chef/video/7234567890123456789", PlatformKind::Tiktok),
            ("https://vm.tiktok.com/ZMabc123/", PlatformKind::Tiktok),
            ("https://www.instagram.com/reel/Cxyz123AbC/", PlatformKind::Instagram),
            ("https://www.facebook.com/watch/?v=123456789", PlatformKind::Facebook),
            ("https://fb.watch/abcDEF12/", PlatformKind::Facebook),
            ("https://twitter.com/chef/status/1234567890", PlatformKind::X),
            ("https://x.com/chef/status/1234567890", PlatformKind::X),
        ];

        for (url, expected) in cases {
            assert_eq!(classify(url), expected, "classifying {}", url);
        }
    }

    #[test]
    fn test_unmatched_urls_fall_back_to_website() {
        assert_eq!(classify("https://example.com/some-recipe"), PlatformKind::Website);
        assert_eq!(classify("https://notyoutube.com/watch?v=x"), PlatformKind::Website);
        assert_eq!(classify("https://box.com/file"), PlatformKind::Website);
    }

    #[test]
    fn test_malformed_input_is_website() {
        assert_eq!(classify(""), PlatformKind::Website);
        assert_eq!(classify("not a url at all"), PlatformKind::Website);
        assert_eq!(classify("http://"), PlatformKind::Website);
        assert_eq!(classify("mailto:chef@youtube.com"), PlatformKind::Website);
    }

    #[test]
    fn test_scheme_less_input() {
        assert_eq!(classify("youtu.be/dQw4w9WgXcQ"), PlatformKind::Youtube);
        assert_eq!(classify("WWW.TIKTOK.COM/@a/video/1"), PlatformKind::Tiktok);
    }

    #[test]
    fn test_classify_is_idempotent() {
        for url in ["https://x.com/a/status/1", "garbage", "https://example.org"] {
            assert_eq!(classify(url), classify(url));
        }
    }
}
