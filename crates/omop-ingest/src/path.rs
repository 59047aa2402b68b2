//! Path expressions for element selection.
//!
//! The parse configurations address elements with a small XPath-like
//! subset, enough for CCDA navigation:
//!
//! ```text
//! ./hl7:component/hl7:section/hl7:entry
//! hl7:id[@root="2.16.840.1.113883.4.1"]
//! hl7:templateId[@root="2.16.840.1.113883.10.20.22.4.49"]/..
//! hl7:value[not(@codeSystem="2.16.840.1.113883.6.96")]
//! hl7:entryRelationship[@typeCode="SUBJ" or @typeCode="RSON"]/*
//! ```
//!
//! Namespace prefixes are dropped; CCDA documents live in a single HL7
//! namespace, so matching on local names is unambiguous.

use crate::error::{IngestError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathExpr {
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// `.` stays on the current element.
    Current,
    /// `..` moves to the parent element.
    Parent,
    /// A named (or `*`) child step with optional predicates.
    Child { name: NameTest, predicates: Vec<Predicate> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameTest {
    Any,
    /// Local element name, prefix already stripped.
    Named(String),
}

impl NameTest {
    pub fn matches(&self, local_name: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Named(name) => name == local_name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// `@name="value"`
    AttrEquals { name: String, value: String },
    /// `not(@name="value")`
    Not(Box<Predicate>),
    /// `a or b or ...` inside one bracket pair.
    AnyOf(Vec<Predicate>),
}

impl PathExpr {
    /// Parses a path expression. Unsupported syntax is an error so a config
    /// typo surfaces as a diagnostic instead of silently matching nothing.
    pub fn parse(path: &str) -> Result<Self> {
        let trimmed = path.trim();
        if trimmed.is_empty() {
            return Err(unsupported(path, "empty expression"));
        }
        let mut steps = Vec::new();
        for segment in trimmed.split('/') {
            let segment = segment.trim();
            match segment {
                // a leading or doubled slash contributes an empty segment
                "" => continue,
                "." => steps.push(Step::Current),
                ".." => steps.push(Step::Parent),
                _ => steps.push(parse_child(path, segment)?),
            }
        }
        if steps.is_empty() {
            return Err(unsupported(path, "no steps"));
        }
        Ok(Self { steps })
    }
}

fn parse_child(path: &str, segment: &str) -> Result<Step> {
    let (name_part, predicates) = match segment.find('[') {
        Some(open) => {
            let Some(body) = segment[open..].strip_prefix('[').and_then(|s| s.strip_suffix(']'))
            else {
                return Err(unsupported(path, "unterminated predicate"));
            };
            (&segment[..open], parse_predicates(path, body)?)
        }
        None => (segment, Vec::new()),
    };
    let name = match name_part {
        "*" => NameTest::Any,
        "" => return Err(unsupported(path, "missing element name")),
        qualified => NameTest::Named(local_name(qualified).to_string()),
    };
    Ok(Step::Child { name, predicates })
}

fn parse_predicates(path: &str, body: &str) -> Result<Vec<Predicate>> {
    let terms: Vec<Predicate> = body
        .split(" or ")
        .map(|term| parse_term(path, term.trim()))
        .collect::<Result<_>>()?;
    match terms.len() {
        0 => Err(unsupported(path, "empty predicate")),
        1 => Ok(terms),
        _ => Ok(vec![Predicate::AnyOf(terms)]),
    }
}

fn parse_term(path: &str, term: &str) -> Result<Predicate> {
    if let Some(inner) = term.strip_prefix("not(").and_then(|s| s.strip_suffix(')')) {
        return Ok(Predicate::Not(Box::new(parse_term(path, inner.trim())?)));
    }
    let Some(rest) = term.strip_prefix('@') else {
        return Err(unsupported(path, "predicate must test an attribute"));
    };
    let Some((name, value)) = rest.split_once('=') else {
        return Err(unsupported(path, "attribute predicate lacks a comparison"));
    };
    let value = value.trim();
    let unquoted = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')));
    let Some(value) = unquoted else {
        return Err(unsupported(path, "attribute value must be quoted"));
    };
    Ok(Predicate::AttrEquals {
        name: local_name(name.trim()).to_string(),
        value: value.to_string(),
    })
}

/// The part after a namespace prefix, if any.
pub fn local_name(qualified: &str) -> &str {
    qualified.rsplit(':').next().unwrap_or(qualified)
}

fn unsupported(path: &str, reason: &str) -> IngestError {
    IngestError::Path {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}
