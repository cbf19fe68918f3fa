//! Key layout shared with every deployed store. Changing any of these breaks
//! interoperability with existing records.

use super::types::{SessionId, TokenId};

pub const REFRESH_TOKEN_PREFIX: &str = "refresh_token:";
pub const SESSION_PREFIX: &str = "session:";
pub const SESSION_PATTERN: &str = "session:*";

pub fn refresh_token_key(subject_id: &str, token_id: &TokenId) -> String {
    format!("{}{}:{}", REFRESH_TOKEN_PREFIX, subject_id, token_id.0)
}

/// Matches every refresh token of `subject_id`, and nothing else.
pub fn refresh_token_pattern(subject_id: &str) -> String {
    format!("{}{}:*", REFRESH_TOKEN_PREFIX, escape_glob(subject_id))
}

/// Whether `key`, returned by a scan of `refresh_token_pattern(subject_id)`,
/// really belongs to `subject_id`. Subjects may contain `:`, so `a` would
/// otherwise claim the tokens of `a:b`.
pub fn is_refresh_token_key_of(subject_id: &str, key: &str) -> bool {
    key.strip_prefix(REFRESH_TOKEN_PREFIX)
        .and_then(|rest| rest.strip_prefix(subject_id))
        .and_then(|rest| rest.strip_prefix(':'))
        .and_then(|token_id| token_id.strip_prefix(subject_id))
        .and_then(|rest| rest.strip_prefix('_'))
        .map(|stamp| !stamp.is_empty() && stamp.bytes().all(|b| b.is_ascii_digit()))
        .unwrap_or(false)
}

pub fn session_key(id: &SessionId) -> String {
    format!("{}{}", SESSION_PREFIX, id.0)
}

pub fn session_id_from_key(key: &str) -> Option<SessionId> {
    key.strip_prefix(SESSION_PREFIX)
        .filter(|id| !id.is_empty())
        .map(|id| SessionId(id.to_string()))
}

pub fn escape_glob(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Glob matching with the subset of Redis `MATCH` syntax the engine emits:
/// `*`, `?` and backslash escapes.
pub fn glob_matches(pattern: &str, key: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let key: Vec<char> = key.chars().collect();

    let (mut p, mut k) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while k < key.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, k));
                p += 1;
                continue;
            }
            Some('?') => {
                p += 1;
                k += 1;
                continue;
            }
            Some('\\') if p + 1 < pattern.len() => {
                if pattern[p + 1] == key[k] {
                    p += 2;
                    k += 1;
                    continue;
                }
            }
            Some(c) if *c == key[k] => {
                p += 1;
                k += 1;
                continue;
            }
            _ => {}
        }

        match backtrack {
            Some((star, matched)) => {
                p = star + 1;
                k = matched + 1;
                backtrack = Some((star, matched + 1));
            }
            None => return false,
        }
    }

    pattern[p..].iter().all(|c| *c == '*')
}
