//! Encoding-aware candidate expansion
//!
//! A value is tested in its raw form and in every form obtained by applying
//! an ordered permutation of the declared encodings, so nested obfuscation is
//! caught whatever order the attacker applied it in.

use super::error::{WafError, WafResult};
use super::rules::Encoding;
use base64::Engine;
use tracing::trace;

/// Expand a raw value into its decode candidates.
///
/// The raw value always comes first. Then, for every size from 1 to
/// `encodings.len()`, every permutation of that size is applied left to right.
/// A failing step stops that permutation but keeps what was decoded so far.
/// Duplicates are kept.
pub fn candidates(value: &str, encodings: &[Encoding]) -> Vec<String> {
    let mut out = vec![value.to_string()];

    for size in 1..=encodings.len() {
        for order in permutations(encodings.len(), size) {
            let mut current = value.to_string();
            for &i in &order {
                match decode(&current, encodings[i]) {
                    Ok(decoded) => current = decoded,
                    Err(e) => {
                        trace!(error = %e, "decode step failed, keeping partial candidate");
                        break;
                    },
                }
            }
            out.push(current);
        }
    }

    out
}

/// All ordered selections of `size` distinct indices out of `0..n`.
fn permutations(n: usize, size: usize) -> Vec<Vec<usize>> {
    fn walk(n: usize, size: usize, used: &mut Vec<bool>, prefix: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
        if prefix.len() == size {
            out.push(prefix.clone());
            return;
        }
        for i in 0..n {
            if used[i] {
                continue;
            }
            used[i] = true;
            prefix.push(i);
            walk(n, size, used, prefix, out);
            prefix.pop();
            used[i] = false;
        }
    }

    let mut out = Vec::new();
    if size == 0 || size > n {
        return out;
    }
    walk(n, size, &mut vec![false; n], &mut Vec::with_capacity(size), &mut out);
    out
}

/// Apply one decoding step.
pub fn decode(value: &str, encoding: Encoding) -> WafResult<String> {
    match encoding {
        Encoding::Base64 => base64::engine::general_purpose::STANDARD
            .decode(value)
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .map_err(|e| WafError::Decode {
                encoding: encoding.to_string(),
                message: e.to_string(),
            }),
        Encoding::Url => query_unescape(value),
    }
}

/// Strict query unescaping: `+` is a space and every `%` must start a valid
/// two-digit hex escape.
pub fn query_unescape(value: &str) -> WafResult<String> {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let hi = bytes.get(i + 1).copied().and_then(hex_value);
                let lo = bytes.get(i + 2).copied().and_then(hex_value);
                match (hi, lo) {
                    (Some(hi), Some(lo)) => {
                        out.push(hi << 4 | lo);
                        i += 3;
                    },
                    _ => {
                        let end = (i + 3).min(bytes.len());
                        return Err(WafError::Decode {
                            encoding: Encoding::Url.to_string(),
                            message: format!(
                                "invalid escape '{}'",
                                String::from_utf8_lossy(&bytes[i..end])
                            ),
                        });
                    },
                }
            },
            b'+' => {
                out.push(b' ');
                i += 1;
            },
            b => {
                out.push(b);
                i += 1;
            },
        }
    }

    Ok(String::from_utf8_lossy(&out).into_owned())
}

/// Lenient percent-decoding: malformed escapes are kept verbatim.
pub fn percent_decode_lenient(value: &str, plus_as_space: bool) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if b == b'%' {
            let hi = bytes.get(i + 1).copied().and_then(hex_value);
            let lo = bytes.get(i + 2).copied().and_then(hex_value);
            if let (Some(hi), Some(lo)) = (hi, lo) {
                out.push(hi << 4 | lo);
                i += 3;
                continue;
            }
        }
        out.push(if plus_as_space && b == b'+' { b' ' } else { b });
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
