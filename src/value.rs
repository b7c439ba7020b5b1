//! The ISB value model: numbers, strings, and sparse nested arrays.
//!
//! Three variants make up every value the language can hold. Conversion
//! between them never errors — a value that can't be meaningfully read as a
//! number or boolean falls back to zero/false rather than producing a
//! diagnostic. See §3 and §4.1 of the design spec for the exact rules.

use std::cmp::Ordering;
use std::fmt;

use bigdecimal::{BigDecimal, Zero};
use indexmap::IndexMap;

/// Fractional digits a division result is truncated to when it would
/// otherwise produce a repeating decimal.
pub const DECIMAL_SCALE: i64 = 20;

/// A single ISB value: a decimal number, an immutable string, or a sparse
/// nested array keyed by canonical strings.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(BigDecimal),
    String(String),
    Array(Array),
}

/// A sparse, ordered, heterogeneously-keyed array.
///
/// Keys are always strings; a numeric index like `a[3]` is normalized to its
/// canonical decimal form (`"3"`) before insertion, so that `a[3]` and
/// `a["3"]` address the same slot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Array {
    entries: IndexMap<String, Value>,
}

impl Array {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn set(&mut self, key: String, value: Value) {
        self.entries.insert(key, value);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl Value {
    pub fn number<T: Into<BigDecimal>>(n: T) -> Self {
        Value::Number(n.into())
    }

    pub fn string<S: Into<String>>(s: S) -> Self {
        Value::String(s.into())
    }

    pub fn empty_string() -> Self {
        Value::String(String::new())
    }

    pub fn array() -> Self {
        Value::Array(Array::new())
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    /// Numeric view: `Number` passes through, `String` parses as decimal
    /// (zero on failure), `Array` is always zero.
    pub fn to_number(&self) -> BigDecimal {
        match self {
            Value::Number(n) => n.clone(),
            Value::String(s) => s.trim().parse().unwrap_or_else(|_| BigDecimal::zero()),
            Value::Array(_) => BigDecimal::zero(),
        }
    }

    /// Boolean view: numbers are true if non-zero; strings are true unless
    /// empty or (case-insensitively) the literal `"false"`; arrays are
    /// always true.
    pub fn to_bool(&self) -> bool {
        match self {
            Value::Number(n) => !n.is_zero(),
            Value::String(s) => !s.is_empty() && !s.eq_ignore_ascii_case("false"),
            Value::Array(_) => true,
        }
    }

    /// Display/string view: numbers render via their canonical decimal
    /// form, strings pass through, arrays render as the empty string.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Number(n) => canonical_decimal_string(n),
            Value::String(s) => s.clone(),
            Value::Array(_) => String::new(),
        }
    }

    /// Canonical key form used to index into an array: numbers normalize
    /// their scale so `0.1 + 0.2` and `0.3` collide on the same key.
    pub fn to_key(&self) -> String {
        match self {
            Value::Number(n) => canonical_decimal_string(n),
            Value::String(s) => s.clone(),
            Value::Array(_) => String::new(),
        }
    }

    /// Equality per §4.1: numeric if both sides coerce to a number
    /// cleanly from a `Number` variant, lexicographic on the display form
    /// otherwise. Mixed `Number`/`String` comparisons fall back to numeric
    /// comparison, since a `String` always has a numeric view.
    pub fn eq_value(&self, other: &Value) -> bool {
        self.compare(other) == Ordering::Equal
    }

    pub fn compare(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Array(_), _) | (_, Value::Array(_)) => {
                self.to_display_string().cmp(&other.to_display_string())
            }
            (Value::Number(_), _) | (_, Value::Number(_)) => {
                self.to_number().cmp(&other.to_number())
            }
            _ => self.to_display_string().cmp(&other.to_display_string()),
        }
    }

    /// Reads a path of keys through nested arrays. Missing keys, or
    /// indexing through a scalar, yield the empty string rather than an
    /// error (§4.1).
    pub fn read_path(&self, keys: &[String]) -> Value {
        let mut current = self;
        for key in keys {
            match current {
                Value::Array(arr) => match arr.get(key) {
                    Some(v) => current = v,
                    None => return Value::empty_string(),
                },
                _ => return Value::empty_string(),
            }
        }
        current.clone()
    }

    /// Writes `value` at the end of `keys`, auto-promoting any intermediate
    /// scalar (or unset) slot into an array, overwriting whatever scalar
    /// was there (§4.1, §9: arrays own their children, assignment deep
    /// clones rather than sharing references).
    pub fn write_path(&mut self, keys: &[String], value: Value) {
        if keys.is_empty() {
            *self = value;
            return;
        }

        if !self.is_array() {
            *self = Value::array();
        }

        if let Value::Array(arr) = self {
            let (head, rest) = keys.split_first().expect("keys is non-empty");
            if rest.is_empty() {
                arr.set(head.clone(), value);
            } else {
                let mut child = arr.get(head).cloned().unwrap_or_else(Value::array);
                child.write_path(rest, value);
                arr.set(head.clone(), child);
            }
        }
    }
}

/// Strips trailing fractional zeros (and a trailing decimal point) so that
/// `0.30` and `0.3` render identically and collide as the same array key.
pub fn canonical_decimal_string(n: &BigDecimal) -> String {
    let normalized = n.normalized();
    normalized.to_string()
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_display_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn num(s: &str) -> Value {
        Value::Number(BigDecimal::from_str(s).unwrap())
    }

    #[test]
    fn string_boolean_view() {
        assert!(!Value::string("").to_bool());
        assert!(!Value::string("false").to_bool());
        assert!(!Value::string("FALSE").to_bool());
        assert!(Value::string("0").to_bool()); // non-empty, not "false"
        assert!(Value::string("anything").to_bool());
    }

    #[test]
    fn number_boolean_view() {
        assert!(!num("0").to_bool());
        assert!(num("0.0001").to_bool());
        assert!(num("-1").to_bool());
    }

    #[test]
    fn string_numeric_view_falls_back_to_zero() {
        assert_eq!(Value::string("abc").to_number(), BigDecimal::zero());
        assert_eq!(Value::string("42").to_number(), BigDecimal::from(42));
    }

    #[test]
    fn array_auto_promotes_nested_paths() {
        let mut root = Value::empty_string();
        root.write_path(&["0".into()], num("0"));
        root.write_path(&["1".into()], num("1"));
        root.write_path(&["2".into()], num("1"));

        assert_eq!(root.read_path(&["0".into()]), num("0"));
        assert_eq!(root.read_path(&["2".into()]), num("1"));
        assert_eq!(root.read_path(&["missing".into()]), Value::empty_string());
    }

    #[test]
    fn array_deep_nesting_and_overwrite() {
        let mut root = Value::array();
        root.write_path(&["0".into(), "0".into()], num("7"));
        assert_eq!(root.read_path(&["0".into(), "0".into()]), num("7"));

        // overwriting a scalar slot with a deeper path promotes it
        root.write_path(&["0".into()], num("5"));
        assert_eq!(root.read_path(&["0".into()]), num("5"));
        root.write_path(&["0".into(), "1".into()], num("9"));
        assert_eq!(root.read_path(&["0".into(), "1".into()]), num("9"));
    }

    #[test]
    fn canonical_keys_collide_across_equivalent_decimals() {
        let a = num("0.1") .to_number() + num("0.2").to_number();
        let b = num("0.3").to_number();
        assert_eq!(canonical_decimal_string(&a), canonical_decimal_string(&b));
    }

    #[test]
    fn reading_into_a_scalar_yields_empty_string() {
        let scalar = num("42");
        assert_eq!(scalar.read_path(&["0".into()]), Value::empty_string());
    }
}
