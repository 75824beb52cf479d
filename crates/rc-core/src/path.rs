//! Field path grammar.
//!
//! A full address is `ObjectIdentifier '.' field ( '.' field | '[' index ']' | '[' key ']' )*`.
//! Object identifiers are engine paths and may themselves contain dots
//! (`/Game/Main.Main:Light_1`), so the split between object and field path is
//! ambiguous at the syntax level. [`split_candidates`] enumerates every split
//! point; the resolver decides which one the engine recognises.

use std::fmt;

use crate::errors::{RcError, Result};

/// One step below an object.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Segment {
    /// `.name` (property, struct member, or function name).
    Field(String),
    /// `[3]` array element.
    Index(usize),
    /// `["key"]` or `[key]` map entry.
    Key(String),
}

impl Segment {
    /// Name carried by a field or key segment.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Field(n) | Self::Key(n) => Some(n),
            Self::Index(_) => None,
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(name) => write!(f, ".{name}"),
            Self::Index(i) => write!(f, "[{i}]"),
            Self::Key(key) => {
                f.write_str("[\"")?;
                for c in key.chars() {
                    if c == '"' || c == '\\' {
                        f.write_str("\\")?;
                    }
                    write!(f, "{c}")?;
                }
                f.write_str("\"]")
            }
        }
    }
}

/// Parsed path below an object: a leading member name plus nested segments.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldPath {
    root: String,
    nested: Vec<Segment>,
}

impl FieldPath {
    /// Path naming a single top-level member.
    pub fn member(name: impl Into<String>) -> Self {
        Self {
            root: name.into(),
            nested: Vec::new(),
        }
    }

    /// Parse `Field[.Sub|[i]|[key]]*`.
    pub fn parse(input: &str) -> Result<Self> {
        let mut parser = Parser {
            input,
            chars: input.char_indices().peekable(),
        };
        let root = parser.name()?;
        let mut nested = Vec::new();
        while let Some((_, c)) = parser.chars.next() {
            match c {
                '.' => nested.push(Segment::Field(parser.name()?)),
                '[' => nested.push(parser.bracket()?),
                other => {
                    return Err(invalid(input, &format!("unexpected '{other}'")));
                }
            }
        }
        Ok(Self { root, nested })
    }

    /// Top-level property or function name.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Segments below the top-level member.
    pub fn nested(&self) -> &[Segment] {
        &self.nested
    }

    /// Whether the path names only a top-level member.
    pub fn is_member(&self) -> bool {
        self.nested.is_empty()
    }

    /// Append a nested segment.
    #[must_use]
    pub fn join(mut self, segment: Segment) -> Self {
        self.nested.push(segment);
        self
    }

    /// Append every segment of `tail` (its root becomes a field segment).
    #[must_use]
    pub fn extend(mut self, tail: &FieldPath) -> Self {
        self.nested.push(Segment::Field(tail.root.clone()));
        self.nested.extend(tail.nested.iter().cloned());
        self
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.root)?;
        for segment in &self.nested {
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl std::str::FromStr for FieldPath {
    type Err = RcError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Every `(object identifier, field path)` split of a full address.
///
/// Splits are taken at each `.` outside brackets, shortest object identifier
/// first. Splits whose field part does not parse are skipped.
pub fn split_candidates(address: &str) -> Vec<(&str, FieldPath)> {
    let mut out = Vec::new();
    let mut depth = 0_u32;
    let mut in_quotes = false;
    let mut escaped = false;
    for (i, c) in address.char_indices() {
        if in_quotes {
            match (escaped, c) {
                (true, _) => escaped = false,
                (false, '\\') => escaped = true,
                (false, '"') => in_quotes = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' if depth > 0 => in_quotes = true,
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            '.' if depth == 0 && i > 0 => {
                if let Ok(field) = FieldPath::parse(&address[i + 1..]) {
                    out.push((&address[..i], field));
                }
            }
            _ => {}
        }
    }
    out
}

fn invalid(input: &str, reason: &str) -> RcError {
    RcError::invalid_request(format!("invalid path '{input}': {reason}"))
}

struct Parser<'a> {
    input: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
}

impl Parser<'_> {
    fn name(&mut self) -> Result<String> {
        let mut name = String::new();
        while let Some(&(_, c)) = self.chars.peek() {
            if c == '.' || c == '[' || c == ']' {
                break;
            }
            name.push(c);
            let _ = self.chars.next();
        }
        if name.is_empty() {
            return Err(invalid(self.input, "empty segment"));
        }
        Ok(name)
    }

    fn bracket(&mut self) -> Result<Segment> {
        if matches!(self.chars.peek(), Some((_, '"'))) {
            let _ = self.chars.next();
            let mut key = String::new();
            loop {
                match self.chars.next() {
                    Some((_, '\\')) => match self.chars.next() {
                        Some((_, c)) => key.push(c),
                        None => return Err(invalid(self.input, "unterminated escape")),
                    },
                    Some((_, '"')) => break,
                    Some((_, c)) => key.push(c),
                    None => return Err(invalid(self.input, "unterminated key")),
                }
            }
            return match self.chars.next() {
                Some((_, ']')) => Ok(Segment::Key(key)),
                _ => Err(invalid(self.input, "expected ']' after key")),
            };
        }

        let mut raw = String::new();
        loop {
            match self.chars.next() {
                Some((_, ']')) => break,
                Some((_, '[')) => return Err(invalid(self.input, "nested '['")),
                Some((_, c)) => raw.push(c),
                None => return Err(invalid(self.input, "unterminated '['")),
            }
        }
        if raw.is_empty() {
            return Err(invalid(self.input, "empty brackets"));
        }
        Ok(match raw.parse::<usize>() {
            Ok(i) => Segment::Index(i),
            Err(_) => Segment::Key(raw),
        })
    }
}
