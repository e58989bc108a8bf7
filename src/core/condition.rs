//! Condition expressions that gate stages and deploy targets
//!
//! A condition is a small boolean expression evaluated against the
//! [`TriggerContext`] of a run:
//!
//! ```text
//! tag                          # the run is associated with a tag
//! tag =~ ^v\d+                 # tag matches a regex
//! branch = master and not tag
//! event = pull_request or tag IS present
//! ```
//!
//! `and` binds tighter than `or`; keywords are case-insensitive.

use crate::core::trigger::{TriggerContext, TriggerEvent};
use anyhow::{bail, Context, Result};
use regex::Regex;
use std::fmt;

/// Which part of the trigger a comparison looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefField {
    Tag,
    Branch,
}

impl RefField {
    fn value<'a>(&self, ctx: &'a TriggerContext) -> Option<&'a str> {
        match self {
            RefField::Tag => ctx.tag.as_deref(),
            RefField::Branch => ctx.branch.as_deref(),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            RefField::Tag => "tag",
            RefField::Branch => "branch",
        }
    }
}

/// Parsed condition (not serializable due to Regex)
#[derive(Debug, Clone)]
pub enum Condition {
    Always,
    Never,
    /// The field is set for this run
    Present(RefField),
    /// The field equals a literal
    Equals(RefField, String),
    /// The field matches a regular expression
    Matches(RefField, Regex),
    Event(TriggerEvent),
    Not(Box<Condition>),
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
}

impl Default for Condition {
    fn default() -> Self {
        Condition::Always
    }
}

impl Condition {
    /// Condition used for deploy targets that don't declare one
    pub fn tagged() -> Self {
        Condition::Present(RefField::Tag)
    }

    /// Parse a condition expression
    pub fn parse(expr: &str) -> Result<Self> {
        let tokens = tokenize(expr)?;
        if tokens.is_empty() {
            bail!("Empty condition expression");
        }

        let mut parser = Parser { tokens, pos: 0 };
        let condition = parser.parse_or()?;
        if let Some(extra) = parser.peek() {
            bail!("Unexpected '{}' in condition '{}'", extra, expr);
        }
        Ok(condition)
    }

    /// Evaluate the condition against a trigger
    pub fn evaluate(&self, ctx: &TriggerContext) -> bool {
        match self {
            Condition::Always => true,
            Condition::Never => false,
            Condition::Present(field) => field.value(ctx).is_some(),
            Condition::Equals(field, expected) => field.value(ctx) == Some(expected.as_str()),
            Condition::Matches(field, regex) => field.value(ctx).is_some_and(|v| regex.is_match(v)),
            Condition::Event(event) => ctx.event == *event,
            Condition::Not(inner) => !inner.evaluate(ctx),
            Condition::And(a, b) => a.evaluate(ctx) && b.evaluate(ctx),
            Condition::Or(a, b) => a.evaluate(ctx) || b.evaluate(ctx),
        }
    }

    /// Human-readable form, used as the skip reason
    pub fn describe(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Always => write!(f, "always"),
            Condition::Never => write!(f, "never"),
            Condition::Present(field) => write!(f, "{}", field.name()),
            Condition::Equals(field, value) => write!(f, "{} = {}", field.name(), value),
            Condition::Matches(field, regex) => write!(f, "{} =~ {}", field.name(), regex.as_str()),
            Condition::Event(event) => write!(f, "event = {}", event.as_str()),
            Condition::Not(inner) => write!(f, "not {}", inner),
            Condition::And(a, b) => write!(f, "{} and {}", a, b),
            Condition::Or(a, b) => write!(f, "{} or {}", a, b),
        }
    }
}

fn tokenize(expr: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut chars = expr.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '=' {
            chars.next();
            if chars.peek() == Some(&'~') {
                chars.next();
                tokens.push("=~".to_string());
            } else {
                tokens.push("=".to_string());
            }
        } else if c == '"' || c == '\'' {
            chars.next();
            let mut value = String::new();
            let mut closed = false;
            for ch in chars.by_ref() {
                if ch == c {
                    closed = true;
                    break;
                }
                value.push(ch);
            }
            if !closed {
                bail!("Unterminated quote in condition '{}'", expr);
            }
            tokens.push(value);
        } else {
            let mut word = String::new();
            while let Some(&ch) = chars.peek() {
                if ch.is_whitespace() || ch == '=' {
                    break;
                }
                word.push(ch);
                chars.next();
            }
            tokens.push(word);
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<String>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&str> {
        self.tokens.get(self.pos).map(|s| s.as_str())
    }

    fn peek_keyword(&self) -> Option<String> {
        self.peek().map(|s| s.to_ascii_lowercase())
    }

    fn next(&mut self) -> Option<String> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect_value(&mut self, after: &str) -> Result<String> {
        self.next()
            .with_context(|| format!("Expected a value after '{}'", after))
    }

    fn parse_or(&mut self) -> Result<Condition> {
        let mut left = self.parse_and()?;
        while self.peek_keyword().as_deref() == Some("or") {
            self.next();
            let right = self.parse_and()?;
            left = Condition::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Condition> {
        let mut left = self.parse_unary()?;
        while self.peek_keyword().as_deref() == Some("and") {
            self.next();
            let right = self.parse_unary()?;
            left = Condition::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Condition> {
        if self.peek_keyword().as_deref() == Some("not") {
            self.next();
            let inner = self.parse_unary()?;
            return Ok(Condition::Not(Box::new(inner)));
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> Result<Condition> {
        let keyword = self
            .next()
            .context("Condition ends unexpectedly")?
            .to_ascii_lowercase();

        match keyword.as_str() {
            "always" | "true" => Ok(Condition::Always),
            "never" | "false" => Ok(Condition::Never),
            "tag" => self.parse_ref(RefField::Tag),
            "branch" => self.parse_ref(RefField::Branch),
            "event" | "type" => {
                match self.next().as_deref() {
                    Some("=") => {}
                    _ => bail!("Expected '=' after 'event'"),
                }
                let value = self.expect_value("event =")?;
                let event = TriggerEvent::parse(&value)
                    .with_context(|| format!("Unknown event '{}'", value))?;
                Ok(Condition::Event(event))
            }
            other => bail!("Unknown condition keyword '{}'", other),
        }
    }

    fn parse_ref(&mut self, field: RefField) -> Result<Condition> {
        match self.peek_keyword().as_deref() {
            Some("=") => {
                self.next();
                let value = self.expect_value(&format!("{} =", field.name()))?;
                Ok(Condition::Equals(field, value))
            }
            Some("=~") => {
                self.next();
                let pattern = self.expect_value(&format!("{} =~", field.name()))?;
                let regex = Regex::new(&pattern)
                    .with_context(|| format!("Invalid regex '{}' in condition", pattern))?;
                Ok(Condition::Matches(field, regex))
            }
            Some("is") => {
                self.next();
                match self.next().map(|s| s.to_ascii_lowercase()).as_deref() {
                    Some("present") => Ok(Condition::Present(field)),
                    Some("blank") => Ok(Condition::Not(Box::new(Condition::Present(field)))),
                    _ => bail!("Expected 'present' or 'blank' after '{} IS'", field.name()),
                }
            }
            _ => Ok(Condition::Present(field)),
        }
    }
}
