//! Map textual findings back to line and byte offset in the raw exchange

use super::error::WafError;
use super::finding::Finding;
use tracing::warn;

/// First `(line, byte offset)` of `needle` in `raw`, ASCII case-insensitive.
///
/// Literal hits record the rule's literal, not the traffic's spelling, so a
/// case-sensitive search would drop every case-variant literal hit
/// (`union select` against `UNION SELECT`). Ignoring case keeps those
/// findings; a byte-exact search would keep fewer.
pub fn locate(raw: &str, needle: &str) -> Option<(i64, i64)> {
    if needle.is_empty() {
        return None;
    }
    let needle = needle.to_ascii_lowercase();

    raw.split('\n').enumerate().find_map(|(line, text)| {
        text.to_ascii_lowercase()
            .find(&needle)
            .map(|offset| (line as i64, offset as i64))
    })
}

/// Resolve every unresolved textual finding against a raw dump.
///
/// Hash findings pass through. Findings whose matched string is absent from
/// the dump are dropped with a warning.
pub fn resolve(raw: &str, findings: Vec<Finding>) -> Vec<Finding> {
    findings
        .into_iter()
        .filter_map(|finding| {
            if finding.is_resolved() {
                return Some(finding);
            }
            match locate(raw, &finding.matched_string) {
                Some((line, index)) => Some(finding.with_position(line, index)),
                None => {
                    let err = WafError::PositionResolution(finding.matched_string.clone());
                    warn!(rule_id = %finding.rule_id, error = %err, "dropping finding");
                    None
                },
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::waf::exchange::{dump_request, dump_response, Body};
    use crate::modules::waf::finding::HashAlgorithm;
    use crate::modules::waf::rules::Severity;

    #[test]
    fn test_locate_first_occurrence() {
        let raw = "GET /a HTTP/1.1\nHost: x\nuser-agent: SQLMap\n\nsqlmap";
        assert_eq!(locate(raw, "sqlmap"), Some((2, 12)));
        assert_eq!(locate(raw, "HTTP/1.1"), Some((0, 7)));
        assert_eq!(locate(raw, "missing"), None);
        assert_eq!(locate(raw, ""), None);
    }

    #[test]
    fn test_case_variant_literal_is_kept() {
        let raw = "GET /x?q=UNION+SELECT HTTP/1.1\nHost: x\nX-Note: Union Select\n\n";
        let resolved = resolve(raw, vec![Finding::new("sqli", Severity::High, "union select")]);
        assert_eq!(resolved.len(), 1);
        assert_eq!((resolved[0].line, resolved[0].line_index), (2, 8));
    }

    #[test]
    fn test_resolve_drops_misses() {
        let raw = "POST /login HTTP/1.1\nHost: x\n\nuser=admin";
        let findings = vec![
            Finding::new("r1", Severity::High, "admin"),
            Finding::new("r2", Severity::High, "only-decoded"),
        ];

        let resolved = resolve(raw, findings);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].rule_id, "r1");
        assert_eq!((resolved[0].line, resolved[0].line_index), (3, 5));
    }

    #[test]
    fn test_hash_findings_bypass() {
        let mut hash = Finding::new("h", Severity::Low, "");
        hash.matched_body_hash = Some("abc".to_string());
        hash.matched_body_hash_alg = Some(HashAlgorithm::Md5);

        let resolved = resolve("nothing here", vec![hash.clone()]);
        assert_eq!(resolved, vec![hash]);
    }

    #[test]
    fn test_resolve_request_url_match() {
        let mut req = http::Request::builder()
            .uri("/x?q=union+select+1")
            .header("Host", "shop.local")
            .body(Body::empty())
            .unwrap();

        let findings = vec![Finding::new("r1", Severity::High, "union select")];
        let resolved = resolve(&dump_request(&mut req), findings);
        assert_eq!(resolved.len(), 1);
        assert_eq!((resolved[0].line, resolved[0].line_index), (0, 9));
    }

    #[test]
    fn test_resolve_response_body() {
        let mut resp = http::Response::builder()
            .status(200)
            .body(Body::from("root:x:0:0"))
            .unwrap();

        let findings = vec![Finding::new("r1", Severity::High, "root:x")];
        let resolved = resolve(&dump_response(&mut resp), findings);
        assert_eq!((resolved[0].line, resolved[0].line_index), (2, 0));
    }
}
