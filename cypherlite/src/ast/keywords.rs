// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Text-level recognizers used to classify queries without a full parse

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;

/// Compiled `(?i)\bname\s*\(` recognizers, keyed by lowercase function name
static FUNCTION_PATTERNS: Lazy<RwLock<HashMap<String, Arc<Regex>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Recognizer for calls to `name`, tolerant of whitespace before `(`
pub fn function_call_pattern(name: &str) -> Result<Arc<Regex>, regex::Error> {
    let key = name.to_ascii_lowercase();
    if let Some(pattern) = FUNCTION_PATTERNS.read().get(&key) {
        return Ok(pattern.clone());
    }
    let compiled = Arc::new(Regex::new(&format!(r"(?i)\b{}\s*\(", regex::escape(name)))?);
    let mut patterns = FUNCTION_PATTERNS.write();
    Ok(patterns.entry(key).or_insert(compiled).clone())
}

/// True if `text` calls `name`, ignoring case. Matches preceded by `.` or
/// `:` are property or label names, not calls.
pub fn calls_function(text: &str, name: &str) -> bool {
    let pattern = match function_call_pattern(name) {
        Ok(pattern) => pattern,
        Err(_) => return false,
    };
    let found = pattern
        .find_iter(text)
        .any(|m| !preceded_by_accessor(text, m.start()));
    found
}

/// True if `text` calls any of `names`
pub fn calls_any(text: &str, names: &[&str]) -> bool {
    names.iter().any(|name| calls_function(text, name))
}

fn preceded_by_accessor(text: &str, start: usize) -> bool {
    text[..start]
        .trim_end()
        .chars()
        .next_back()
        .map(|c| c == ':' || c == '.')
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cached_patterns() -> usize {
        FUNCTION_PATTERNS.read().len()
    }

    #[test]
    fn test_calls_function() {
        assert!(calls_function("RETURN count (n)", "count"));
        assert!(calls_function("RETURN COUNT(n)", "count"));
        assert!(!calls_function("RETURN account(n)", "count"));
        assert!(!calls_function("MATCH (n) RETURN n.count", "count"));
        assert!(calls_function(
            "RETURN vector.similarity.cosine(a, b)",
            "vector.similarity.cosine"
        ));
    }

    #[test]
    fn test_pattern_cache_is_shared() {
        let first = function_call_pattern("toUpper").unwrap();
        let second = function_call_pattern("TOUPPER").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(cached_patterns() >= 1);
    }

    #[test]
    fn test_calls_any() {
        assert!(calls_any("MATCH (n) RETURN n.name, rand ()", &["timestamp", "rand"]));
        assert!(!calls_any("MATCH (n:Rand) RETURN n.timestamp", &["timestamp", "rand"]));
    }
}
