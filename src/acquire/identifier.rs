use regex::Regex;
use std::sync::LazyLock;

use crate::error::HarvestError;
use crate::model::PlatformKind;

static YOUTUBE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?i)youtube(?:-nocookie)?\.com/(?:watch\?(?:[^#]*&)?v=|shorts/|embed/|live/|v/)([A-Za-z0-9_-]{11})",
        r"(?i)youtu\.be/([A-Za-z0-9_-]{11})",
    ])
});

static TIKTOK: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?i)tiktok\.com/@[^/?#]+/(?:video|photo)/(\d+)",
        r"(?i)tiktok\.com/(?:v|embed(?:/v2)?)/(\d+)",
        r"(?i)(?:vm|vt)\.tiktok\.com/([A-Za-z0-9]+)",
        r"(?i)tiktok\.com/t/([A-Za-z0-9]+)",
    ])
});

static INSTAGRAM: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[r"(?i)instagr(?:am\.com|\.am)/(?:[A-Za-z0-9_.]+/)?(?:p|reels?|tv)/([A-Za-z0-9_-]+)"])
});

static FACEBOOK: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?i)facebook\.com/[^?#]*/videos/(?:[^/?#]+/)?(\d+)",
        r"(?i)facebook\.com/(?:watch/?\?(?:[^#]*&)?v=|reel/|video\.php\?(?:[^#]*&)?v=)(\d+)",
        r"(?i)fb\.watch/([A-Za-z0-9_-]+)",
        r"(?i)facebook\.com/share/(?:v|r)/([A-Za-z0-9_-]+)",
    ])
});

static X: LazyLock<Vec<Regex>> =
    LazyLock::new(|| compile(&[r"(?i)(?:twitter|x)\.com/[^/?#]+/status(?:es)?/(\d+)"]));

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|pattern| Regex::new(pattern).expect("static identifier pattern"))
        .collect()
}

/// Pull the platform's post or video identifier out of a URL.
///
/// A URL without a recognisable identifier is a permanent failure: retrying
/// cannot make one appear.
pub fn extract_identifier(url: &str, kind: PlatformKind) -> Result<String, HarvestError> {
    let patterns: &[Regex] = match kind {
        PlatformKind::Youtube => YOUTUBE.as_slice(),
        PlatformKind::Tiktok => TIKTOK.as_slice(),
        PlatformKind::Instagram => INSTAGRAM.as_slice(),
        PlatformKind::Facebook => FACEBOOK.as_slice(),
        PlatformKind::X => X.as_slice(),
        PlatformKind::Website => {
            return Err(HarvestError::UnsupportedContent(
                "not a video platform URL".to_string(),
            ))
        }
    };

    patterns
        .iter()
        .find_map(|re| re.captures(url))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| {
            HarvestError::UnsupportedContent(format!("no {} video id found in URL", kind))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(url: &str, kind: PlatformKind) -> String {
        extract_identifier(url, kind).unwrap()
    }

    #[test]
    fn test_youtube_ids() {
        let kind = PlatformKind::Youtube;
        assert_eq!(id("https://www.youtube.com/watch?v=dQw4w9WgXcQ", kind), "dQw4w9WgXcQ");
        assert_eq!(id("https://youtube.com/watch?feature=share&v=dQw4w9WgXcQ", kind), "dQw4w9WgXcQ");
        assert_eq!(id("https://youtu.be/dQw4w9WgXcQ?t=10", kind), "dQw4w9WgXcQ");
        assert_eq!(id("https://www.youtube.com/shorts/abcDEF_1234", kind), "abcDEF_1234");
    }

    #[test]
    fn test_tiktok_ids() {
        let kind = PlatformKind::Tiktok;
        assert_eq!(
            id("https://www.tiktok.com/@chef.anna/video/7234567890123456789?lang=en", kind),
            "7234567890123456789"
        );
        assert_eq!(id("https://vm.tiktok.com/ZMabc123/", kind), "ZMabc123");
    }

    #[test]
    fn test_instagram_facebook_x_ids() {
        assert_eq!(
            id("https://www.instagram.com/reel/Cxyz123AbC/?igsh=1", PlatformKind::Instagram),
            "Cxyz123AbC"
        );
        assert_eq!(
            id("https://www.instagram.com/chefanna/p/B_a-1/", PlatformKind::Instagram),
            "B_a-1"
        );
        assert_eq!(
            id("https://www.facebook.com/watch/?v=1234567890", PlatformKind::Facebook),
            "1234567890"
        );
        assert_eq!(
            id("https://www.facebook.com/chefanna/videos/987654321/", PlatformKind::Facebook),
            "987654321"
        );
        assert_eq!(id("https://fb.watch/abcDEF12/", PlatformKind::Facebook), "abcDEF12");
        assert_eq!(
            id("https://x.com/chefanna/status/1790000000000000000", PlatformKind::X),
            "1790000000000000000"
        );
    }

    #[test]
    fn test_missing_identifier_is_permanent() {
        let err = extract_identifier("https://www.tiktok.com/@chef.anna", PlatformKind::Tiktok)
            .unwrap_err();
        assert!(matches!(err, HarvestError::UnsupportedContent(_)));
        assert!(!err.is_transient());

        let err = extract_identifier("https://youtube.com/watch?v=short", PlatformKind::Youtube)
            .unwrap_err();
        assert!(matches!(err, HarvestError::UnsupportedContent(_)));
    }
}
