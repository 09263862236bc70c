//! Property-list helpers for s-expression config files and gaze traces.
//!
//! Walks cons pairs directly to find `:key` followed by its value.
//! Handles both `Value::Keyword("key")` (elisp parser) and
//! `Value::Symbol(":key")` (default parser) forms.

use lexpr::Value;

/// Extract a plist value as a string. Keywords lose their leading colon,
/// booleans become `t`/`nil`.
pub fn get_keyword(value: &Value, key: &str) -> Option<String> {
    let prefixed = format!(":{}", key);
    let mut current = value;
    while let Value::Cons(pair) = current {
        let is_key = match pair.car() {
            Value::Keyword(k) => k.as_ref() == key,
            Value::Symbol(s) => s.as_ref() == prefixed,
            _ => false,
        };
        if is_key {
            let Value::Cons(next) = pair.cdr() else {
                return None;
            };
            let val = next.car();
            return Some(match val {
                Value::Keyword(v) => v.to_string(),
                Value::Symbol(v) => {
                    let s = v.to_string();
                    s.strip_prefix(':').unwrap_or(&s).to_string()
                }
                Value::String(v) => v.to_string(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => if *b { "t" } else { "nil" }.to_string(),
                Value::Null | Value::Nil => "nil".to_string(),
                _ => val.to_string(),
            });
        }
        current = pair.cdr();
    }
    None
}

/// Every key present in a plist, in order, without the leading colon.
pub fn plist_keys(value: &Value) -> Vec<String> {
    let mut keys = Vec::new();
    let mut current = value;
    while let Value::Cons(pair) = current {
        match pair.car() {
            Value::Keyword(k) => keys.push(k.to_string()),
            Value::Symbol(s) if s.starts_with(':') => keys.push(s[1..].to_string()),
            _ => {}
        }
        // Skip the value cell
        match pair.cdr() {
            Value::Cons(next) => current = next.cdr(),
            _ => break,
        }
    }
    keys
}

pub fn get_float(value: &Value, key: &str) -> Option<f64> {
    get_keyword(value, key).and_then(|s| s.parse().ok())
}

pub fn get_int(value: &Value, key: &str) -> Option<i64> {
    get_keyword(value, key).and_then(|s| s.parse().ok())
}

/// `t` / `#t` as true, `nil` / `#f` as false. Any other token is `None`,
/// the same as a missing key; use `get_keyword` to tell the two apart.
pub fn get_bool(value: &Value, key: &str) -> Option<bool> {
    match get_keyword(value, key)?.as_str() {
        "t" => Some(true),
        "nil" => Some(false),
        _ => None,
    }
}

/// Escape a string for s-expression output.
pub fn escape_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// `t` / `nil` rendering of a bool.
pub fn sexp_bool(b: bool) -> &'static str {
    if b {
        "t"
    } else {
        "nil"
    }
}

// ── Tests ───────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_keyword_from_plist() {
        let v = lexpr::from_str("(:preset :baseline :history 3)").unwrap();
        assert_eq!(get_keyword(&v, "preset"), Some("baseline".to_string()));
        assert_eq!(get_keyword(&v, "history"), Some("3".to_string()));
        assert_eq!(get_keyword(&v, "missing"), None);
    }

    #[test]
    fn test_get_keyword_symbol_and_string_values() {
        let v = lexpr::from_str("(:policy active-key-only :label \"space\")").unwrap();
        assert_eq!(get_keyword(&v, "policy"), Some("active-key-only".to_string()));
        assert_eq!(get_keyword(&v, "label"), Some("space".to_string()));
    }

    #[test]
    fn test_get_float_and_int() {
        let v = lexpr::from_str("(:x 12.5 :y -3 :n 7)").unwrap();
        assert_eq!(get_float(&v, "x"), Some(12.5));
        assert_eq!(get_float(&v, "y"), Some(-3.0));
        assert_eq!(get_int(&v, "n"), Some(7));
        assert_eq!(get_int(&v, "x"), None);
    }

    #[test]
    fn test_get_bool() {
        let v = lexpr::from_str("(:a t :b nil :c false :d 0)").unwrap();
        assert_eq!(get_bool(&v, "a"), Some(true));
        assert_eq!(get_bool(&v, "b"), Some(false));
        assert_eq!(get_bool(&v, "c"), None, "Only t and nil are booleans");
        assert_eq!(get_bool(&v, "d"), None);
        assert_eq!(get_bool(&v, "e"), None);

        let v = lexpr::from_str("(:a #t :b #f)").unwrap();
        assert_eq!(get_bool(&v, "a"), Some(true));
        assert_eq!(get_bool(&v, "b"), Some(false));
    }

    #[test]
    fn test_plist_keys() {
        let v = lexpr::from_str("(:a 1 :b-c 2 :d t)").unwrap();
        assert_eq!(plist_keys(&v), vec!["a", "b-c", "d"]);
        let empty = lexpr::from_str("()").unwrap();
        assert!(plist_keys(&empty).is_empty());
    }

    #[test]
    fn test_escape_string() {
        assert_eq!(escape_string("say \"hi\""), "say \\\"hi\\\"");
        assert_eq!(escape_string("a\\b"), "a\\\\b");
    }
}
