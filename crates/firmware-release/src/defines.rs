//! `-D` compiler definitions pulled out of the build flags.
//!
//! The build flags arrive as the raw strings the firmware project declares,
//! e.g. `-DFW_VERSION=\"1.4.0-beta2\" -DHW_TAG=rev3 -DMODEL=scribble`.
//! Only definitions are kept; every other flag is ignored.

use crate::error::{Error, Result};

/// Ordered table of build definitions.
///
/// Definitions keep their declaration order. Looking a name up returns the
/// last definition, so later flags (and command-line overrides) win.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildDefines {
    entries: Vec<(String, String)>,
}

impl BuildDefines {
    /// Collect the definitions found in `flags`.
    ///
    /// Accepts `-DNAME=VALUE`, `-DNAME` and `-D NAME=VALUE`.
    pub fn parse<I, S>(flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut defines = Self::default();
        for flag in flags {
            let mut tokens = tokenize(flag.as_ref()).into_iter();
            while let Some(token) = tokens.next() {
                let body = match token.strip_prefix("-D") {
                    Some("") => match tokens.next() {
                        Some(next) => next,
                        None => break,
                    },
                    Some(body) => body.to_owned(),
                    None => continue,
                };
                defines.push_raw(&body);
            }
        }
        defines
    }

    /// Parse a single `NAME=VALUE` (or bare `NAME`) definition and append it.
    pub fn push_raw(&mut self, definition: &str) {
        let (name, value) = definition.split_once('=').unwrap_or((definition, ""));
        if !name.is_empty() {
            self.set(name, value);
        }
    }

    /// Append a definition, overriding any earlier one with the same name.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Value of the last definition of `name`, if any.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Like [`get`](Self::get) but a missing or empty value is an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingDefine`] when `name` is absent or valueless.
    pub fn require(&self, name: &str) -> Result<&str> {
        match self.get(name) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(Error::MissingDefine(name.to_owned())),
        }
    }

    /// Every definition in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Number of definitions, duplicates included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if no definition was parsed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Split a flag string into shell-style words.
///
/// Whitespace separates words, quotes group them (and are dropped) and a
/// backslash takes the next character literally. `\"` therefore yields a
/// literal quote that survives into the value.
fn tokenize(input: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (_, '\\') => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
                in_word = true;
            }
            (Some(q), c) if c == q => quote = None,
            (Some(_), c) => current.push(c),
            (None, '"' | '\'') => {
                quote = Some(c);
                in_word = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_word {
                    words.push(core::mem::take(&mut current));
                    in_word = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_word = true;
            }
        }
    }
    if in_word {
        words.push(current);
    }
    words
}
