//! Field matchers
//!
//! Every matcher returns the matched strings found in one field category.
//! Errors never escape: a regex that does not compile is logged and the
//! search using it yields nothing, so only that field goes unmatched.

use super::decoder::candidates;
use super::error::WafError;
use super::finding::HashAlgorithm;
use super::rules::{BodyRule, HeaderRule, ParameterRule, SearchMode};
use md5::Md5;
use sha2::{Digest, Sha256};
use tracing::error;

/// Search a value with one mode.
///
/// A case-insensitive literal hit records the literal itself; regex hits
/// record every non-overlapping match. Each decode candidate is searched.
/// A regex that does not compile discards the literal hits too.
pub fn search(value: &str, mode: &SearchMode) -> Vec<String> {
    let mut matches = Vec::new();

    let regex = match mode.compiled_regex() {
        Some(Ok(regex)) => Some(regex),
        Some(Err(e)) => {
            let err = WafError::RuntimeMatch {
                pattern: mode.regex.clone(),
                message: e.to_string(),
            };
            error!(error = %err, "search skipped");
            return matches;
        },
        None => None,
    };
    let literal = (!mode.literal.is_empty()).then(|| mode.literal.to_lowercase());

    for candidate in candidates(value, mode.encodings()) {
        if let Some(literal) = &literal {
            if candidate.to_lowercase().contains(literal.as_str()) {
                matches.push(mode.literal.clone());
            }
        }
        if let Some(regex) = regex {
            matches.extend(regex.find_iter(&candidate).map(|m| m.as_str().to_string()));
        }
    }

    matches
}

/// Match the request method.
pub fn check_method(method: &str, mode: Option<&SearchMode>) -> Vec<String> {
    mode.map(|mode| search(method, mode)).unwrap_or_default()
}

/// Match the request target against every URL mode.
pub fn check_url(target: &str, modes: &[SearchMode]) -> Vec<String> {
    modes.iter().flat_map(|mode| search(target, mode)).collect()
}

/// Match observed headers.
///
/// For each observed header only the first rule entry with the same name
/// (case-insensitive) is applied, against every value of the header.
pub fn check_headers(headers: &[(String, Vec<String>)], specs: &[HeaderRule]) -> Vec<String> {
    let mut matches = Vec::new();

    for (name, values) in headers {
        if let Some(spec) = specs.iter().find(|s| s.name.eq_ignore_ascii_case(name)) {
            for value in values {
                matches.extend(search(value, &spec.mode));
            }
        }
    }

    matches
}

/// Match parameters; a rule named `any` applies to every parameter.
pub fn check_parameters(parameters: &[(String, String)], specs: &[ParameterRule]) -> Vec<String> {
    let mut matches = Vec::new();

    for spec in specs {
        for (name, value) in parameters {
            if spec.applies_to(name) {
                matches.extend(search(value, &spec.mode));
            }
        }
    }

    matches
}

/// Result of the body matchers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BodyMatches {
    /// Textual matches
    pub text: Vec<String>,
    /// Matching digests
    pub hashes: Vec<(HashAlgorithm, String)>,
}

/// Lazily computed hex digests of one body
struct BodyDigests<'a> {
    body: &'a [u8],
    md5: Option<String>,
    sha256: Option<String>,
}

impl<'a> BodyDigests<'a> {
    fn new(body: &'a [u8]) -> Self {
        Self {
            body,
            md5: None,
            sha256: None,
        }
    }

    fn md5(&mut self) -> &str {
        let body = self.body;
        self.md5.get_or_insert_with(|| hex::encode(Md5::digest(body)))
    }

    fn sha256(&mut self) -> &str {
        let body = self.body;
        self.sha256
            .get_or_insert_with(|| hex::encode(Sha256::digest(body)))
    }
}

/// Match the body text and compare its digests.
pub fn check_body(body: &[u8], specs: &[BodyRule]) -> BodyMatches {
    let mut result = BodyMatches::default();
    let text = String::from_utf8_lossy(body);
    let mut digests = BodyDigests::new(body);

    for spec in specs {
        result.text.extend(search(&text, &spec.mode));

        if let Some(expected) = spec.md5sum.as_deref().filter(|s| !s.is_empty()) {
            let actual = digests.md5();
            if actual.eq_ignore_ascii_case(expected.trim()) {
                result.hashes.push((HashAlgorithm::Md5, actual.to_string()));
            }
        }

        if let Some(expected) = spec.sha256sum.as_deref().filter(|s| !s.is_empty()) {
            let actual = digests.sha256();
            if actual.eq_ignore_ascii_case(expected.trim()) {
                result.hashes.push((HashAlgorithm::Sha256, actual.to_string()));
            }
        }
    }

    result
}
