// Comparison semantics of boolean queries in the in-process backend.
// Mirrors SQL: nulls never match and LIKE uses `%` and `_` wildcards.

use mediax_core::{ComparisonOperator, Value};
use std::cmp::Ordering;

pub fn matches(operator: ComparisonOperator, stored: Option<&Value>, literal: &Value) -> bool {
    let Some(stored) = stored else {
        return false;
    };
    if operator == ComparisonOperator::Like {
        return match (stored.as_str(), literal.as_str()) {
            (Some(text), Some(pattern)) => like(text, pattern),
            _ => false,
        };
    }
    let Some(ordering) = stored.compare(literal) else {
        return false;
    };
    match operator {
        ComparisonOperator::Eq => ordering == Ordering::Equal,
        ComparisonOperator::Neq => ordering != Ordering::Equal,
        ComparisonOperator::Lt => ordering == Ordering::Less,
        ComparisonOperator::Gt => ordering == Ordering::Greater,
        ComparisonOperator::Leq => ordering != Ordering::Greater,
        ComparisonOperator::Geq => ordering != Ordering::Less,
        ComparisonOperator::Like => false,
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Token {
    One,
    Many,
    Char(char),
}

fn tokens(pattern: &str) -> Vec<Token> {
    let mut chars = pattern.chars();
    let mut tokens = Vec::new();
    while let Some(c) = chars.next() {
        tokens.push(match c {
            '%' => Token::Many,
            '_' => Token::One,
            // A trailing backslash matches itself.
            '\\' => Token::Char(chars.next().unwrap_or('\\')),
            c => Token::Char(c),
        });
    }
    tokens
}

/// SQL `LIKE` matching with `\` as escape character.
///
/// Runs in `O(text * pattern)`: on a mismatch only the most recent `%` is
/// retried, one character further along the text.
pub fn like(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern = tokens(pattern);
    let (mut t, mut p) = (0, 0);
    // Pattern position after the last `%` and the text position it resumed at.
    let mut resume: Option<(usize, usize)> = None;
    while t < text.len() {
        match pattern.get(p) {
            Some(Token::Many) => {
                p += 1;
                resume = Some((p, t));
            }
            Some(Token::One) => {
                p += 1;
                t += 1;
            }
            Some(Token::Char(c)) if *c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match resume {
                Some((star, from)) => {
                    p = star;
                    t = from + 1;
                    resume = Some((star, from + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|token| *token == Token::Many)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_wildcards() {
        assert!(like("/media/cat.png", "%.png"));
        assert!(like("cat", "c_t"));
        assert!(!like("cart", "c_t"));
        assert!(like("100%", "100\\%"));
        assert!(!like("1000", "100\\%"));
        assert!(like("", "%"));
        assert!(like("a\\", "a\\"));
        assert!(like("abcbd", "a%b_"));
        assert!(!like("abc", "a%b"));
        assert!(like("aXbYc", "a%b%c"));
        assert!(!like("", "_"));
    }

    #[test]
    fn test_like_many_wildcards_stays_linear() {
        let text = "a".repeat(36);
        let pattern = format!("{}b", "%a".repeat(12));
        let started = std::time::Instant::now();
        assert!(!like(&text, &pattern));
        assert!(like(&text, &"%a".repeat(12)));
        assert!(started.elapsed() < std::time::Duration::from_secs(1));
    }

    #[test]
    fn test_inclusive_boundaries() {
        let five = Value::Long(5);
        assert!(matches(ComparisonOperator::Leq, Some(&five), &Value::Long(5)));
        assert!(matches(ComparisonOperator::Geq, Some(&five), &Value::Long(5)));
        assert!(!matches(ComparisonOperator::Lt, Some(&five), &Value::Long(5)));
        assert!(!matches(ComparisonOperator::Eq, None, &Value::Long(5)));
        assert!(!matches(ComparisonOperator::Neq, None, &Value::Long(5)));
    }
}
