//! Value classification and rule construction for inferred blanks.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use tinker_blanks::AnswerRule;

use crate::RuleClass;

#[allow(clippy::expect_used)]
static NUMBER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[+-]?(?:0[xX][0-9A-Fa-f]+|0[bB][01]+|(?:\d+\.\d*|\.\d+|\d+)(?:[eE][+-]?\d+)?)(?:[uU]?[lL]{0,2}|[fF])?$",
    )
    .expect("number pattern is valid")
});

#[allow(clippy::expect_used)]
static STRING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^(?:"(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)')$"#).expect("string pattern is valid")
});

#[allow(clippy::expect_used)]
static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid"));

#[allow(clippy::expect_used)]
static TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"[A-Za-z_][A-Za-z0-9_]*|\d[A-Za-z0-9_.]*|"(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*'|\S"#,
    )
    .expect("token pattern is valid")
});

const STRUCTURAL: &[char] = &[
    '(', ')', '[', ']', '{', '}', '<', '>', ',', ':', ';', '=', '&', '|', '^', '!', '~', '?', '*',
    '/', '%',
];

/// Returns `true` if `value` contains brackets, operators, commas or colons.
///
/// A single leading sign and the sign of an exponent do not count.
pub fn has_structural_punctuation(value: &str) -> bool {
    let body = value.strip_prefix(['+', '-']).unwrap_or(value);
    let mut previous = None;
    for c in body.chars() {
        if STRUCTURAL.contains(&c) {
            return true;
        }
        if (c == '+' || c == '-') && !matches!(previous, Some('e' | 'E')) {
            return true;
        }
        previous = Some(c);
    }
    false
}

/// Returns `true` if `value` is a bare numeric literal.
pub fn is_number(value: &str) -> bool {
    NUMBER_RE.is_match(value) && !has_structural_punctuation(value)
}

/// Returns `true` if `value` is a quoted string or character literal.
pub fn is_string_literal(value: &str) -> bool {
    STRING_RE.is_match(value) && !has_structural_punctuation(value)
}

/// Returns `true` if `value` is a bare identifier.
pub fn is_identifier(value: &str) -> bool {
    IDENTIFIER_RE.is_match(value)
}

/// Classifies `value` when no kind was forced.
pub fn classify(value: &str) -> RuleClass {
    if is_number(value) {
        RuleClass::Number
    } else if is_string_literal(value) {
        RuleClass::StringLiteral
    } else if is_identifier(value) {
        RuleClass::Identifier
    } else {
        RuleClass::Structural
    }
}

/// Builds the rule for a value of the given class.
///
/// `bindings` maps identifier values to the blank that defines them and is
/// only consulted for structural rules.
pub fn rule_for(class: RuleClass, value: &str, bindings: &HashMap<String, String>) -> AnswerRule {
    match class {
        RuleClass::Number => AnswerRule::OneOf {
            values: numeric_spellings(value),
        },
        RuleClass::StringLiteral | RuleClass::Identifier => AnswerRule::equals(value),
        RuleClass::Structural => AnswerRule::matches(structural_pattern(value, bindings)),
        // Bindings are resolved by the caller, which knows the source blank.
        RuleClass::Binding => AnswerRule::equals(value),
    }
}

/// Returns the accepted spellings of a numeric literal.
///
/// Plain integers are accepted as written, in decimal, and in hexadecimal.
/// Floats and literals with a `u`/`l` suffix only as written, since the
/// suffix changes the type.
pub fn numeric_spellings(value: &str) -> Vec<String> {
    let mut spellings = vec![value.to_string()];
    if let Some(parsed) = parse_integer(value) {
        let sign = if parsed < 0 { "-" } else { "" };
        let magnitude = parsed.unsigned_abs();
        for spelling in [format!("{sign}{magnitude}"), format!("{sign}0x{magnitude:x}")] {
            if !spellings.contains(&spelling) {
                spellings.push(spelling);
            }
        }
    }
    spellings
}

fn parse_integer(value: &str) -> Option<i128> {
    let (negative, body) = match value.as_bytes().first() {
        Some(b'-') => (true, &value[1..]),
        Some(b'+') => (false, &value[1..]),
        _ => (false, value),
    };
    let magnitude = if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        i128::from_str_radix(hex, 16).ok()?
    } else if let Some(bin) = body.strip_prefix("0b").or_else(|| body.strip_prefix("0B")) {
        i128::from_str_radix(bin, 2).ok()?
    } else if body.len() > 1 && body.starts_with('0') {
        i128::from_str_radix(&body[1..], 8).ok()?
    } else {
        body.parse::<i128>().ok()?
    };

    Some(if negative { -magnitude } else { magnitude })
}

/// Builds a whitespace-tolerant anchored-by-caller pattern for an expression.
///
/// Adjacent word tokens require at least one whitespace character between
/// them; every other token boundary accepts any amount. Identifier tokens
/// found in `bindings` become `${SOURCE}` references.
pub fn structural_pattern(value: &str, bindings: &HashMap<String, String>) -> String {
    let mut pattern = String::new();
    let mut previous_word = false;

    for (index, token) in TOKEN_RE.find_iter(value).map(|m| m.as_str()).enumerate() {
        let word = token
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_');
        if index > 0 {
            pattern.push_str(if previous_word && word { r"\s+" } else { r"\s*" });
        }
        match bindings.get(token) {
            Some(source) if is_identifier(token) => {
                pattern.push_str("${");
                pattern.push_str(source);
                pattern.push('}');
            }
            _ => pattern.push_str(&regex::escape(token)),
        }
        previous_word = word;
    }

    pattern
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn numbers_in_every_base_are_numbers() {
        for value in [
            "9600", "-5", "+3", "0x1F", "0b1010", "0755", "1.5", ".5", "2.", "1e6", "1.5e-3",
            "9600UL", "3.3f",
        ] {
            assert!(is_number(value), "{value} should be numeric");
        }
    }

    #[test]
    fn expressions_are_not_numbers() {
        for value in ["1+2", "-(5)", "1,000", "0xZZ", "A0", "1.2.3", ""] {
            assert!(!is_number(value), "{value} should not be numeric");
        }
    }

    #[test]
    fn string_literals() {
        assert!(is_string_literal(r#""Hello""#));
        assert!(is_string_literal(r#""say \"hi\"""#));
        assert!(is_string_literal("'x'"));
        assert!(!is_string_literal(r#""Temp: ""#));
        assert!(!is_string_literal(r#""a" + "b""#));
    }

    #[test]
    fn classification_order() {
        assert_eq!(classify("115200"), RuleClass::Number);
        assert_eq!(classify(r#""on""#), RuleClass::StringLiteral);
        assert_eq!(classify("LED_BUILTIN"), RuleClass::Identifier);
        assert_eq!(classify("digitalRead(2)"), RuleClass::Structural);
        assert_eq!(classify("A0"), RuleClass::Identifier);
    }

    #[test]
    fn numeric_spellings_cover_decimal_and_hex() {
        assert_eq!(numeric_spellings("9600"), vec!["9600", "0x2580"]);
        assert_eq!(numeric_spellings("0x10"), vec!["0x10", "16"]);
        assert_eq!(numeric_spellings("0b101"), vec!["0b101", "5", "0x5"]);
        assert_eq!(numeric_spellings("-12"), vec!["-12", "-0xc"]);
        assert_eq!(numeric_spellings("1.5"), vec!["1.5"]);
    }

    #[test]
    fn suffixed_integers_keep_only_the_literal() {
        assert_eq!(numeric_spellings("9600UL"), vec!["9600UL"]);
        assert_eq!(numeric_spellings("255u"), vec!["255u"]);
        assert_eq!(numeric_spellings("0x10L"), vec!["0x10L"]);
    }

    #[test]
    fn structural_pattern_tolerates_whitespace() {
        let pattern = structural_pattern("analogRead(A0) > 512", &HashMap::new());
        assert_eq!(pattern, r"analogRead\s*\(\s*A0\s*\)\s*>\s*512");

        let re = Regex::new(&format!("^(?:{pattern})$")).unwrap();
        assert!(re.is_match("analogRead( A0 )>512"));
        assert!(!re.is_match("analogRead(A1) > 512"));
    }

    #[test]
    fn structural_pattern_keeps_word_separation() {
        let pattern = structural_pattern("unsigned long", &HashMap::new());
        assert_eq!(pattern, r"unsigned\s+long");
    }

    #[test]
    fn structural_pattern_references_bound_identifiers() {
        let bindings: HashMap<String, String> =
            [("sensorPin".to_string(), "SENSOR".to_string())].into_iter().collect();
        let pattern = structural_pattern("analogRead(sensorPin)", &bindings);
        assert_eq!(pattern, r"analogRead\s*\(\s*${SENSOR}\s*\)");
    }

    #[test]
    fn string_tokens_stay_whole() {
        let pattern = structural_pattern(r#"Serial.println("a b")"#, &HashMap::new());
        assert_eq!(pattern, r#"Serial\s*\.\s*println\s*\(\s*"a b"\s*\)"#);
    }
}
