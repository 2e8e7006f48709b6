// file: src/models/classifier.rs
// description: page type and importance inference from source path and content
// reference: path-based classification

use crate::models::page::{Importance, PageType};

const CODE_EXTENSIONS: [&str; 8] = [".py", ".js", ".ts", ".java", ".cpp", ".c", ".go", ".rs"];
const API_KEYWORDS: [&str; 3] = ["api", "swagger", "openapi"];
const GUIDE_KEYWORDS: [&str; 3] = ["doc", "guide", "tutorial"];
const HIGH_IMPORTANCE_KEYWORDS: [&str; 7] =
    ["readme", "main", "index", "app", "server", "client", "api"];

const HIGH_IMPORTANCE_CHARS: usize = 5000;
const MEDIUM_IMPORTANCE_CHARS: usize = 1000;

pub struct PageClassifier;

impl PageClassifier {
    /// First match wins: readme, code extension, api, guide, directory, else code.
    pub fn infer_type(source_path: &str) -> PageType {
        let path = source_path.to_lowercase();

        if path.contains("readme") {
            PageType::Readme
        } else if CODE_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
            PageType::Code
        } else if API_KEYWORDS.iter().any(|kw| path.contains(kw)) {
            PageType::Api
        } else if GUIDE_KEYWORDS.iter().any(|kw| path.contains(kw)) {
            PageType::Guide
        } else if path.ends_with('/') || path.ends_with('\\') {
            PageType::Directory
        } else {
            PageType::Code
        }
    }

    /// Path keywords decide first; otherwise content length in characters.
    pub fn infer_importance(source_path: &str, content: &str) -> Importance {
        let path = source_path.to_lowercase();
        if HIGH_IMPORTANCE_KEYWORDS.iter().any(|kw| path.contains(kw)) {
            return Importance::High;
        }

        let length = content.chars().count();
        if length > HIGH_IMPORTANCE_CHARS {
            Importance::High
        } else if length > MEDIUM_IMPORTANCE_CHARS {
            Importance::Medium
        } else {
            Importance::Low
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_type_order() {
        assert_eq!(PageClassifier::infer_type("README.md"), PageType::Readme);
        assert_eq!(PageClassifier::infer_type("docs/readme.py"), PageType::Readme);
        assert_eq!(PageClassifier::infer_type("src/api/handler.rs"), PageType::Code);
        assert_eq!(PageClassifier::infer_type("spec/openapi.yaml"), PageType::Api);
        assert_eq!(PageClassifier::infer_type("docs/setup.md"), PageType::Guide);
        assert_eq!(PageClassifier::infer_type("src/models/"), PageType::Directory);
        assert_eq!(PageClassifier::infer_type("Makefile"), PageType::Code);
    }

    #[test]
    fn test_infer_importance() {
        assert_eq!(PageClassifier::infer_importance("README.md", ""), Importance::High);
        assert_eq!(PageClassifier::infer_importance("src/server.rs", "x"), Importance::High);
        assert_eq!(
            PageClassifier::infer_importance("lib/util.rs", &"x".repeat(5001)),
            Importance::High
        );
        assert_eq!(
            PageClassifier::infer_importance("lib/util.rs", &"x".repeat(5000)),
            Importance::Medium
        );
        assert_eq!(
            PageClassifier::infer_importance("lib/util.rs", &"x".repeat(1000)),
            Importance::Low
        );
    }
}
