//! Sample strings for simple `pattern` constraints.
//!
//! Only a small regex subset is understood: literals, escapes (`\d`, `\w`,
//! `\s`, escaped punctuation), `.`, bracket classes with ranges, and the
//! quantifiers `{n}`, `{n,}`, `{n,m}`, `+`, `*`, `?`. Anchors are ignored.
//! Groups, alternation and negated classes make [`sample`] return `None` so
//! the caller can fall back to its regular string path.

use rand::seq::SliceRandom;
use rand::Rng;

const OPEN_ENDED_EXTRA: usize = 5;
const MAX_REPEAT: usize = 64;

#[derive(Debug, Clone)]
enum Atom {
    Literal(char),
    Class(Vec<char>),
}

#[derive(Debug, Clone)]
struct Piece {
    atom: Atom,
    min: usize,
    max: usize,
}

fn digits() -> Vec<char> {
    ('0'..='9').collect()
}

fn word_chars() -> Vec<char> {
    ('a'..='z')
        .chain('A'..='Z')
        .chain('0'..='9')
        .chain(std::iter::once('_'))
        .collect()
}

fn alnum() -> Vec<char> {
    ('a'..='z').chain('0'..='9').collect()
}

/// Generate a string matching `pattern`, or `None` when the pattern uses
/// constructs outside the supported subset.
pub fn sample(pattern: &str) -> Option<String> {
    let pieces = parse(pattern)?;
    let mut rng = rand::thread_rng();
    let mut out = String::new();

    for piece in pieces {
        let count = if piece.min >= piece.max {
            piece.min
        } else {
            rng.gen_range(piece.min..=piece.max)
        };
        for _ in 0..count {
            match &piece.atom {
                Atom::Literal(c) => out.push(*c),
                Atom::Class(chars) => out.push(*chars.choose(&mut rng)?),
            }
        }
    }

    Some(out)
}

fn parse(pattern: &str) -> Option<Vec<Piece>> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut pieces = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let atom = match chars[i] {
            '^' if i == 0 => {
                i += 1;
                continue;
            }
            '$' if i == chars.len() - 1 => break,
            '(' | ')' | '|' => return None,
            '.' => {
                i += 1;
                Atom::Class(alnum())
            }
            '\\' => {
                let escaped = *chars.get(i + 1)?;
                i += 2;
                match escaped {
                    'd' => Atom::Class(digits()),
                    'w' => Atom::Class(word_chars()),
                    's' => Atom::Literal(' '),
                    c if c.is_ascii_alphanumeric() => return None,
                    c => Atom::Literal(c),
                }
            }
            '[' => {
                let (class, next) = parse_class(&chars, i + 1)?;
                i = next;
                Atom::Class(class)
            }
            '{' | '}' | '+' | '*' | '?' => return None,
            c => {
                i += 1;
                Atom::Literal(c)
            }
        };

        let (min, max, next) = parse_quantifier(&chars, i)?;
        i = next;
        pieces.push(Piece { atom, min, max });
    }

    Some(pieces)
}

/// Parse a bracket class starting just after `[`; returns the members and
/// the index after the closing `]`.
fn parse_class(chars: &[char], start: usize) -> Option<(Vec<char>, usize)> {
    let mut members = Vec::new();
    let mut i = start;

    if chars.get(i) == Some(&'^') {
        return None;
    }

    while i < chars.len() && chars[i] != ']' {
        let c = if chars[i] == '\\' {
            let escaped = *chars.get(i + 1)?;
            i += 2;
            match escaped {
                'd' => {
                    members.extend(digits());
                    continue;
                }
                'w' => {
                    members.extend(word_chars());
                    continue;
                }
                's' => ' ',
                other => other,
            }
        } else {
            i += 1;
            chars[i - 1]
        };

        if chars.get(i) == Some(&'-') && chars.get(i + 1).is_some_and(|n| *n != ']') {
            let end = chars[i + 1];
            i += 2;
            if end < c {
                return None;
            }
            members.extend(c..=end);
        } else {
            members.push(c);
        }
    }

    if i >= chars.len() || members.is_empty() {
        return None;
    }
    Some((members, i + 1))
}

fn parse_quantifier(chars: &[char], i: usize) -> Option<(usize, usize, usize)> {
    let (min, max, mut next) = match chars.get(i) {
        Some('+') => (1, 1 + OPEN_ENDED_EXTRA, i + 1),
        Some('*') => (0, OPEN_ENDED_EXTRA, i + 1),
        Some('?') => (0, 1, i + 1),
        Some('{') => {
            let close = chars[i..].iter().position(|c| *c == '}')? + i;
            let body: String = chars[i + 1..close].iter().collect();
            let (min, max) = match body.split_once(',') {
                None => {
                    let n = body.trim().parse::<usize>().ok()?;
                    (n, n)
                }
                Some((lo, hi)) => {
                    let lo = lo.trim().parse::<usize>().ok()?;
                    let hi = if hi.trim().is_empty() {
                        lo.saturating_add(OPEN_ENDED_EXTRA)
                    } else {
                        hi.trim().parse::<usize>().ok()?
                    };
                    (lo, hi)
                }
            };
            if max < min {
                return None;
            }
            (min, max, close + 1)
        }
        _ => (1, 1, i),
    };

    // Lazy/possessive suffixes do not change what matches
    if next > i && matches!(chars.get(next), Some('?') | Some('+')) {
        next += 1;
    }

    Some((min.min(MAX_REPEAT), max.min(MAX_REPEAT), next))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_digits() {
        for _ in 0..20 {
            let s = sample(r"^\d{3}-\d{4}$").unwrap();
            assert_eq!(s.len(), 8);
            assert_eq!(&s[3..4], "-");
            assert!(s[..3].chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_bracket_class_range() {
        for _ in 0..20 {
            let s = sample("^[A-Z]{2}[0-9]{2,4}$").unwrap();
            assert!(s.len() >= 4 && s.len() <= 6);
            assert!(s[..2].chars().all(|c| c.is_ascii_uppercase()));
            assert!(s[2..].chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_escaped_literal() {
        assert_eq!(sample(r"v1\.0").unwrap(), "v1.0");
    }

    #[test]
    fn test_huge_open_ended_repeat_is_capped() {
        let digits = sample(r"^\d{18446744073709551615,}$").unwrap();
        assert_eq!(digits.len(), MAX_REPEAT);
        assert!(digits.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_unsupported_constructs() {
        assert!(sample("^(foo|bar)$").is_none());
        assert!(sample("[^a]").is_none());
        assert!(sample(r"\bword").is_none());
    }
}
