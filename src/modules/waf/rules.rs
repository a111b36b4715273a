//! Declarative rule model, validation and the loaded rule set

use super::error::{WafError, WafResult};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Rule severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Severity {
    /// Informational
    Low,
    /// Potential threat
    Medium,
    /// Likely attack, alerts the dashboard
    High,
    /// Confirmed attack, alerts the dashboard
    Critical,
}

impl Severity {
    /// Numeric level as stored by the collector (0..=3)
    pub fn level(&self) -> i64 {
        match self {
            Self::Low => 0,
            Self::Medium => 1,
            Self::High => 2,
            Self::Critical => 3,
        }
    }

    /// Get display name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Whether findings of this severity are pushed to the alerting collaborator
    pub fn should_alert(&self) -> bool {
        *self >= Self::High
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(format!(
                "severity '{}' is not one of: low, medium, high, critical",
                s
            )),
        }
    }
}

impl TryFrom<String> for Severity {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action to take in WAF mode when a rule matches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum RuleAction {
    /// Let the exchange through
    Allow,
    /// Block the exchange
    Drop,
}

impl RuleAction {
    /// Get display name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Drop => "drop",
        }
    }
}

impl FromStr for RuleAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "allow" => Ok(Self::Allow),
            "drop" => Ok(Self::Drop),
            _ => Err(format!("action '{}' is not one of: allow, drop", s)),
        }
    }
}

impl TryFrom<String> for RuleAction {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// An empty `action` is the same as no action at all.
fn deserialize_action<'de, D>(deserializer: D) -> Result<Option<RuleAction>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

/// Supported value encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Encoding {
    /// Standard base64 with padding
    Base64,
    /// URL query escaping
    Url,
}

impl Encoding {
    /// Get display name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Base64 => "base64",
            Self::Url => "url",
        }
    }
}

impl FromStr for Encoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "base64" => Ok(Self::Base64),
            "url" => Ok(Self::Url),
            _ => Err(format!("unsupported encoding '{}'", s)),
        }
    }
}

impl TryFrom<String> for Encoding {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Match/regex/encodings triple applied to one piece of data
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchMode {
    /// Case-insensitive substring to look for
    #[serde(default, rename = "match")]
    pub literal: String,

    /// Regex whose every match is reported
    #[serde(default)]
    pub regex: String,

    /// Decodings to try; `None` means "inherit from the rule info"
    #[serde(default)]
    pub encodings: Option<Vec<Encoding>>,

    /// Regex compiled on first use
    #[serde(skip)]
    compiled: OnceLock<Result<Regex, regex::Error>>,
}

impl SearchMode {
    /// Create a mode matching a literal substring
    pub fn literal(literal: impl Into<String>) -> Self {
        Self {
            literal: literal.into(),
            ..Self::default()
        }
    }

    /// Create a mode matching a regex
    pub fn regex(regex: impl Into<String>) -> Self {
        Self {
            regex: regex.into(),
            ..Self::default()
        }
    }

    /// Builder: set the encodings list
    pub fn with_encodings(mut self, encodings: Vec<Encoding>) -> Self {
        self.encodings = Some(encodings);
        self
    }

    /// Effective encodings (empty when unset)
    pub fn encodings(&self) -> &[Encoding] {
        self.encodings.as_deref().unwrap_or(&[])
    }

    /// Compiled regex, or `None` when the mode has no regex.
    pub fn compiled_regex(&self) -> Option<Result<&Regex, &regex::Error>> {
        if self.regex.is_empty() {
            return None;
        }
        Some(
            self.compiled
                .get_or_init(|| Regex::new(&self.regex))
                .as_ref(),
        )
    }
}

/// Header matcher, keyed by header name
#[derive(Debug, Clone, Deserialize)]
pub struct HeaderRule {
    /// Header name (compared case-insensitively)
    pub name: String,

    /// Search applied to every value of the header
    #[serde(flatten)]
    pub mode: SearchMode,
}

/// Parameter matcher; the name `any` matches every parameter
#[derive(Debug, Clone, Deserialize)]
pub struct ParameterRule {
    /// Parameter name or `any`
    pub name: String,

    /// Search applied to every value of the parameter
    #[serde(flatten)]
    pub mode: SearchMode,
}

impl ParameterRule {
    /// Wildcard parameter name
    pub const ANY: &'static str = "any";

    /// Check if this rule applies to a parameter name
    pub fn applies_to(&self, parameter: &str) -> bool {
        self.name == Self::ANY || self.name == parameter
    }
}

/// Body matcher with optional digests of the exact raw bytes
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BodyRule {
    /// Textual search over the body
    #[serde(flatten)]
    pub mode: SearchMode,

    /// Hex MD5 digest of the whole body
    #[serde(default)]
    pub md5sum: Option<String>,

    /// Hex SHA-256 digest of the whole body
    #[serde(default)]
    pub sha256sum: Option<String>,
}

/// `info` block of a rule file
#[derive(Debug, Clone, Deserialize)]
pub struct RuleInfo {
    /// Rule name
    #[serde(default)]
    pub name: String,

    /// Rule description
    #[serde(default)]
    pub description: String,

    /// Severity reported in findings
    pub severity: Severity,

    /// Classification reported in findings
    #[serde(default)]
    pub classification: String,

    /// WAF action; unset behaves as drop
    #[serde(default, deserialize_with = "deserialize_action")]
    pub action: Option<RuleAction>,

    /// Encodings inherited by every matcher that declares none
    #[serde(default)]
    pub encodings: Option<Vec<Encoding>>,
}

/// Request matchers
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestRule {
    /// Method matcher
    #[serde(default)]
    pub method: Option<SearchMode>,

    /// URL matchers, any of which may match
    #[serde(default)]
    pub url: Vec<SearchMode>,

    /// Header matchers
    #[serde(default)]
    pub headers: Vec<HeaderRule>,

    /// Query and form parameter matchers
    #[serde(default, rename = "params")]
    pub parameters: Vec<ParameterRule>,

    /// Body matchers
    #[serde(default)]
    pub body: Vec<BodyRule>,
}

/// Response matchers
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseRule {
    /// Status code matcher (parsed and validated, not matched)
    #[serde(default)]
    pub code: Option<SearchMode>,

    /// Header matchers
    #[serde(default)]
    pub headers: Vec<HeaderRule>,

    /// Body matchers
    #[serde(default)]
    pub body: Vec<BodyRule>,
}

/// A rule parsed from one YAML file
#[derive(Debug, Clone, Deserialize)]
pub struct Rule {
    /// Unique rule ID
    pub id: String,

    /// Metadata and defaults
    pub info: RuleInfo,

    /// Request matchers
    #[serde(default)]
    pub request: Option<RequestRule>,

    /// Response matchers
    #[serde(default)]
    pub response: Option<ResponseRule>,
}

impl Rule {
    /// Parse a rule from YAML text (no validation)
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    /// Every search mode of the rule together with its field path
    pub fn search_modes(&self) -> Vec<(String, &SearchMode)> {
        let mut modes = Vec::new();

        if let Some(request) = &self.request {
            if let Some(method) = &request.method {
                modes.push(("request.method".to_string(), method));
            }
            for (i, url) in request.url.iter().enumerate() {
                modes.push((format!("request.url[{}]", i), url));
            }
            for header in &request.headers {
                modes.push((format!("request.headers[{}]", header.name), &header.mode));
            }
            for param in &request.parameters {
                modes.push((format!("request.params[{}]", param.name), &param.mode));
            }
            for (i, body) in request.body.iter().enumerate() {
                modes.push((format!("request.body[{}]", i), &body.mode));
            }
        }

        if let Some(response) = &self.response {
            if let Some(code) = &response.code {
                modes.push(("response.code".to_string(), code));
            }
            for header in &response.headers {
                modes.push((format!("response.headers[{}]", header.name), &header.mode));
            }
            for (i, body) in response.body.iter().enumerate() {
                modes.push((format!("response.body[{}]", i), &body.mode));
            }
        }

        modes
    }

    fn for_each_mode_mut(&mut self, mut f: impl FnMut(&mut SearchMode)) {
        if let Some(request) = &mut self.request {
            if let Some(method) = &mut request.method {
                f(method);
            }
            request.url.iter_mut().for_each(&mut f);
            request.headers.iter_mut().for_each(|h| f(&mut h.mode));
            request.parameters.iter_mut().for_each(|p| f(&mut p.mode));
            request.body.iter_mut().for_each(|b| f(&mut b.mode));
        }

        if let Some(response) = &mut self.response {
            if let Some(code) = &mut response.code {
                f(code);
            }
            response.headers.iter_mut().for_each(|h| f(&mut h.mode));
            response.body.iter_mut().for_each(|b| f(&mut b.mode));
        }
    }

    /// Validate the rule.
    ///
    /// Severity, action and encoding tokens are checked while parsing; this
    /// checks the ID and that every regex compiles.
    pub fn validate(&self) -> WafResult<()> {
        if self.id.trim().is_empty() {
            return Err(WafError::Validation("rule id cannot be empty".to_string()));
        }

        for (field, mode) in self.search_modes() {
            if let Some(Err(e)) = mode.compiled_regex() {
                return Err(WafError::Validation(format!(
                    "cannot compile regex for {}: {}",
                    field, e
                )));
            }
        }

        Ok(())
    }

    /// Copy `info.encodings` into every matcher whose own list is unset.
    ///
    /// Matchers that declare a list, even an empty one, keep it.
    pub fn inherit_encodings(&mut self) {
        let Some(global) = self.info.encodings.clone() else {
            return;
        };

        self.for_each_mode_mut(|mode| {
            if mode.encodings.is_none() {
                mode.encodings = Some(global.clone());
            }
        });
    }
}

/// Ordered, deduplicated collection of validated rules
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    /// Rules in load order
    rules: Vec<Rule>,

    /// Position of each rule by ID
    index: HashMap<String, usize>,
}

impl RuleSet {
    /// Create empty ruleset
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate, resolve encodings and append a rule.
    ///
    /// The first rule with a given ID wins; later duplicates are rejected.
    pub fn add(&mut self, mut rule: Rule) -> WafResult<()> {
        rule.validate()?;

        if self.index.contains_key(&rule.id) {
            return Err(WafError::Validation(format!(
                "a rule with id '{}' already exists",
                rule.id
            )));
        }

        rule.inherit_encodings();
        self.index.insert(rule.id.clone(), self.rules.len());
        self.rules.push(rule);
        Ok(())
    }

    /// Get rule by ID
    pub fn get(&self, id: &str) -> Option<&Rule> {
        self.index.get(id).map(|&i| &self.rules[i])
    }

    /// Check if a rule ID is loaded
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Get all rules in load order
    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    /// Action declared by a rule; `None` when unset or the rule is unknown
    pub fn action(&self, rule_id: &str) -> Option<RuleAction> {
        self.get(rule_id).and_then(|rule| rule.info.action)
    }

    /// Rule count
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_RULE: &str = r#"
id: lfi-001
info:
  name: Path traversal
  description: Detects dot-dot-slash sequences
  severity: HIGH
  classification: LFI
  action: drop
  encodings: [url]
request:
  method:
    match: get
  url:
    - regex: '\.\./'
    - match: passwd
      encodings: []
  headers:
    - name: User-Agent
      match: sqlmap
  params:
    - name: any
      regex: '\.\./'
      encodings: [base64, URL]
  body:
    - match: root:x
      sha256sum: abcd
response:
  headers:
    - name: Server
      match: apache
  body:
    - md5sum: ef01
websocket:
  message_type: 1
"#;

    #[test]
    fn test_parse_full_rule() {
        let rule = Rule::from_yaml(FULL_RULE).unwrap();
        assert_eq!(rule.id, "lfi-001");
        assert_eq!(rule.info.severity, Severity::High);
        assert_eq!(rule.info.action, Some(RuleAction::Drop));

        let request = rule.request.as_ref().unwrap();
        assert_eq!(request.method.as_ref().unwrap().literal, "get");
        assert_eq!(request.url.len(), 2);
        assert_eq!(request.headers[0].name, "User-Agent");
        assert_eq!(request.headers[0].mode.literal, "sqlmap");
        assert_eq!(
            request.parameters[0].mode.encodings,
            Some(vec![Encoding::Base64, Encoding::Url])
        );
        assert_eq!(request.body[0].sha256sum.as_deref(), Some("abcd"));

        let response = rule.response.as_ref().unwrap();
        assert_eq!(response.body[0].md5sum.as_deref(), Some("ef01"));
        assert_eq!(rule.search_modes().len(), 8);
    }

    #[test]
    fn test_severity_is_case_insensitive() {
        assert_eq!("CrItIcAl".parse::<Severity>(), Ok(Severity::Critical));
        assert!("urgent".parse::<Severity>().is_err());
        assert!(Severity::High.should_alert());
        assert!(Severity::Critical.should_alert());
        assert!(!Severity::Medium.should_alert());
        assert_eq!(Severity::Critical.level(), 3);
    }

    #[test]
    fn test_invalid_tokens_fail_to_parse() {
        let bad_severity = "id: a\ninfo:\n  severity: urgent\n";
        assert!(Rule::from_yaml(bad_severity).is_err());

        let bad_action = "id: a\ninfo:\n  severity: low\n  action: deflect\n";
        assert!(Rule::from_yaml(bad_action).is_err());

        let bad_encoding = "id: a\ninfo:\n  severity: low\n  encodings: [rot13]\n";
        assert!(Rule::from_yaml(bad_encoding).is_err());

        let missing_info = "id: a\nrequest:\n  url:\n    - match: x\n";
        assert!(Rule::from_yaml(missing_info).is_err());
    }

    #[test]
    fn test_empty_action_is_unset() {
        let rule = Rule::from_yaml("id: a\ninfo:\n  severity: low\n  action: ''\n").unwrap();
        assert_eq!(rule.info.action, None);

        let rule = Rule::from_yaml("id: a\ninfo:\n  severity: low\n  action: ALLOW\n").unwrap();
        assert_eq!(rule.info.action, Some(RuleAction::Allow));
    }

    #[test]
    fn test_validate_rejects_bad_regex() {
        let rule = Rule::from_yaml(
            "id: a\ninfo:\n  severity: low\nresponse:\n  headers:\n    - name: X\n      regex: '(unclosed'\n",
        )
        .unwrap();
        let err = rule.validate().unwrap_err();
        assert!(err.to_string().contains("response.headers[X]"));
    }

    #[test]
    fn test_inherit_encodings() {
        let mut rule = Rule::from_yaml(FULL_RULE).unwrap();
        rule.inherit_encodings();

        let request = rule.request.as_ref().unwrap();
        assert_eq!(request.method.as_ref().unwrap().encodings(), &[Encoding::Url]);
        assert_eq!(request.url[0].encodings(), &[Encoding::Url]);
        // Explicit empty list is kept
        assert_eq!(request.url[1].encodings, Some(vec![]));
        // Explicit list is kept
        assert_eq!(
            request.parameters[0].mode.encodings(),
            &[Encoding::Base64, Encoding::Url]
        );
        let response = rule.response.as_ref().unwrap();
        assert_eq!(response.headers[0].mode.encodings(), &[Encoding::Url]);
    }

    #[test]
    fn test_no_global_encodings_leaves_matchers_unset() {
        let mut rule =
            Rule::from_yaml("id: a\ninfo:\n  severity: low\nrequest:\n  url:\n    - match: x\n")
                .unwrap();
        rule.inherit_encodings();
        assert_eq!(rule.request.unwrap().url[0].encodings, None);
    }

    #[test]
    fn test_ruleset_first_wins() {
        let mut set = RuleSet::new();
        let first =
            Rule::from_yaml("id: dup\ninfo:\n  name: first\n  severity: low\n").unwrap();
        let second =
            Rule::from_yaml("id: dup\ninfo:\n  name: second\n  severity: high\n").unwrap();

        set.add(first).unwrap();
        assert!(set.add(second).is_err());
        assert_eq!(set.len(), 1);
        assert_eq!(set.get("dup").unwrap().info.name, "first");
    }

    #[test]
    fn test_ruleset_action_lookup() {
        let mut set = RuleSet::new();
        set.add(Rule::from_yaml("id: a\ninfo:\n  severity: low\n  action: allow\n").unwrap())
            .unwrap();
        set.add(Rule::from_yaml("id: b\ninfo:\n  severity: low\n").unwrap())
            .unwrap();

        assert_eq!(set.action("a"), Some(RuleAction::Allow));
        assert_eq!(set.action("b"), None);
        assert_eq!(set.action("missing"), None);
        assert_eq!(set.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(), ["a", "b"]);
    }

    #[test]
    fn test_compiled_regex_is_cached() {
        let mode = SearchMode::regex(r"\d+");
        let first = mode.compiled_regex().unwrap().unwrap() as *const Regex;
        let second = mode.compiled_regex().unwrap().unwrap() as *const Regex;
        assert_eq!(first, second);
        assert!(SearchMode::literal("x").compiled_regex().is_none());
    }
}
