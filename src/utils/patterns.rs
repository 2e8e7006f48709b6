// file: src/utils/patterns.rs
// description: compiled remote URL grammars per provider
// reference: https://docs.rs/regex

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Accepted shapes
    pub static ref GITHUB_HTTPS_GIT: Regex = Regex::new(
        r"^https://github\.com/[^/]+/[^/]+\.git$"
    ).expect("GITHUB_HTTPS_GIT regex is valid");

    pub static ref GITHUB_HTTPS: Regex = Regex::new(
        r"^https://github\.com/[^/]+/[^/]+$"
    ).expect("GITHUB_HTTPS regex is valid");

    pub static ref GITHUB_SSH: Regex = Regex::new(
        r"^git@github\.com:[^/]+/[^/]+\.git$"
    ).expect("GITHUB_SSH regex is valid");

    pub static ref CODECOMMIT_SHORT: Regex = Regex::new(
        r"^codecommit://[^/]+$"
    ).expect("CODECOMMIT_SHORT regex is valid");

    pub static ref CODECOMMIT_REGIONAL: Regex = Regex::new(
        r"^codecommit::[^:]+://[^/]+$"
    ).expect("CODECOMMIT_REGIONAL regex is valid");

    pub static ref CODECOMMIT_HTTPS: Regex = Regex::new(
        r"^https://git-codecommit\.[^.]+\.amazonaws\.com/v1/repos/[^/]+$"
    ).expect("CODECOMMIT_HTTPS regex is valid");

    // Owner/name extraction
    pub static ref GITHUB_HTTPS_PARTS: Regex = Regex::new(
        r"^https://github\.com/([^/]+)/([^/]+?)(?:\.git)?/?$"
    ).expect("GITHUB_HTTPS_PARTS regex is valid");

    pub static ref GITHUB_SSH_PARTS: Regex = Regex::new(
        r"^git@github\.com:([^/]+)/([^/]+?)\.git$"
    ).expect("GITHUB_SSH_PARTS regex is valid");

    pub static ref CODECOMMIT_SHORT_PARTS: Regex = Regex::new(
        r"^codecommit://([^/]+)$"
    ).expect("CODECOMMIT_SHORT_PARTS regex is valid");

    pub static ref CODECOMMIT_REGIONAL_PARTS: Regex = Regex::new(
        r"^codecommit::([^:]+)://([^/]+)$"
    ).expect("CODECOMMIT_REGIONAL_PARTS regex is valid");

    pub static ref CODECOMMIT_HTTPS_PARTS: Regex = Regex::new(
        r"^https://git-codecommit\.([^.]+)\.amazonaws\.com/v1/repos/([^/]+)$"
    ).expect("CODECOMMIT_HTTPS_PARTS regex is valid");
}

pub fn github_patterns() -> [&'static Regex; 3] {
    [&*GITHUB_HTTPS_GIT, &*GITHUB_HTTPS, &*GITHUB_SSH]
}

pub fn codecommit_patterns() -> [&'static Regex; 3] {
    [&*CODECOMMIT_SHORT, &*CODECOMMIT_REGIONAL, &*CODECOMMIT_HTTPS]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_github_shapes() {
        assert!(GITHUB_HTTPS.is_match("https://github.com/acme/widgets"));
        assert!(GITHUB_HTTPS_GIT.is_match("https://github.com/acme/widgets.git"));
        assert!(GITHUB_SSH.is_match("git@github.com:acme/widgets.git"));
        assert!(!GITHUB_HTTPS.is_match("https://github.com/acme"));
        assert!(!GITHUB_HTTPS.is_match("https://github.com/acme/widgets/tree/main"));
    }

    #[test]
    fn test_codecommit_shapes() {
        assert!(CODECOMMIT_SHORT.is_match("codecommit://widgets"));
        assert!(CODECOMMIT_REGIONAL.is_match("codecommit::us-east-1://widgets"));
        assert!(CODECOMMIT_HTTPS.is_match(
            "https://git-codecommit.us-east-1.amazonaws.com/v1/repos/widgets"
        ));
        assert!(!CODECOMMIT_SHORT.is_match("codecommit://a/b"));
    }

    #[test]
    fn test_github_parts_strip_suffix() {
        let caps = GITHUB_HTTPS_PARTS
            .captures("https://github.com/acme/widgets.git")
            .unwrap();
        assert_eq!(&caps[1], "acme");
        assert_eq!(&caps[2], "widgets");
    }
}
