//! `@mention` routing to public accounts.
//!
//! The router is a pure function over a fixed [`PublicAccountSet`]. It scans
//! text fields of the payload for `@name` tokens; the first token naming a
//! public account redirects the message to that account.

use std::collections::HashSet;

use serde_json::Value;
use tracing::debug;

use crate::message::{Message, Payload};

/// Payload fields scanned for mentions when none are configured.
pub const DEFAULT_MENTION_FIELDS: &[&str] = &["message", "text", "content"];

/// Reserved identities eligible for mention redirection.
#[derive(Debug, Clone, Default)]
pub struct PublicAccountSet {
    names: HashSet<String>,
}

impl PublicAccountSet {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for PublicAccountSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}

/// Rewrites a message's target when it mentions a public account.
#[derive(Debug, Clone)]
pub struct MessageRouter {
    public_accounts: PublicAccountSet,
    fields: Vec<String>,
}

impl MessageRouter {
    pub fn new(public_accounts: PublicAccountSet) -> Self {
        Self {
            public_accounts,
            fields: DEFAULT_MENTION_FIELDS.iter().map(|f| f.to_string()).collect(),
        }
    }

    /// Replace the scanned payload fields. Order matters: earlier fields win.
    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn public_accounts(&self) -> &PublicAccountSet {
        &self.public_accounts
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Resolve the destination of `message`.
    ///
    /// Returns the message unchanged when no public account is mentioned.
    pub fn route(&self, message: Message) -> Message {
        match self.find_mention(message.payload()) {
            Some(account) => {
                let account = account.to_string();
                debug!(
                    from = %message.target(),
                    to = %account,
                    "redirecting message to public account"
                );
                message.redirect(account)
            }
            None => message,
        }
    }

    /// First public account mentioned in the scanned fields, if any.
    pub fn find_mention<'a>(&self, payload: &'a Payload) -> Option<&'a str> {
        if self.public_accounts.is_empty() {
            return None;
        }
        self.fields
            .iter()
            .filter_map(|field| payload.get(field).and_then(Value::as_str))
            .flat_map(mentions)
            .find(|name| self.public_accounts.contains(name))
    }
}

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Iterate the `@name` tokens of `text`, left to right, without the `@`.
///
/// A token is the longest run of identifier characters (ASCII alphanumerics,
/// `_`, `-`) after an `@`. An `@` directly preceded by an identifier character
/// (as in `user@host`) does not start a token.
pub fn mentions(text: &str) -> Mentions<'_> {
    Mentions { text, pos: 0 }
}

/// Iterator returned by [`mentions`].
pub struct Mentions<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Iterator for Mentions<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        while let Some(offset) = self.text[self.pos..].find('@') {
            let at = self.pos + offset;
            let start = at + 1;
            let end = self.text[start..]
                .find(|c: char| !is_identifier_char(c))
                .map_or(self.text.len(), |n| start + n);
            self.pos = end;

            let embedded = self.text[..at]
                .chars()
                .next_back()
                .is_some_and(is_identifier_char);
            if end > start && !embedded {
                return Some(&self.text[start..end]);
            }
        }
        None
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
