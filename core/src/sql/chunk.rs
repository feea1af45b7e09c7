use super::Token;
use crate::value::SQLParam;
use std::borrow::Cow;

/// One atom of a [`crate::sql::SQL`] fragment.
///
/// Only `Ident`/`Raw`/`Param`/`Token` exist — there is no `Table`/`Column`
/// variant carrying a `&'static dyn` descriptor, because relations and
/// fields here are runtime objects, not compile-time types. Every
/// identifier that reaches the synthesizer comes from relation/field
/// metadata and is rendered quoted through `Ident`.
#[derive(Debug, Clone)]
pub enum SQLChunk<'a, V: SQLParam> {
    Token(Token),
    /// A double-quoted identifier (column/relation/alias name).
    Ident(Cow<'a, str>),
    /// Unquoted text: comparators, already-built sub-fragments, etc.
    Raw(Cow<'a, str>),
    Param(Param<'a, V>),
}

/// A single bound value, rendered as a positional `$n` placeholder.
#[derive(Debug, Clone)]
pub struct Param<'a, V: SQLParam> {
    pub value: Cow<'a, V>,
}

impl<'a, V: SQLParam> Param<'a, V> {
    pub fn new(value: impl Into<Cow<'a, V>>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

impl<'a, V: SQLParam> SQLChunk<'a, V> {
    pub fn write(&self, buf: &mut impl core::fmt::Write) {
        match self {
            SQLChunk::Token(t) => {
                let _ = buf.write_str(t.as_str());
            }
            SQLChunk::Ident(name) => {
                let _ = buf.write_char('"');
                let _ = buf.write_str(name);
                let _ = buf.write_char('"');
            }
            SQLChunk::Raw(text) => {
                let _ = buf.write_str(text);
            }
            SQLChunk::Param(_) => unreachable!("placeholder rendering handled by SQL::write_to"),
        }
    }

    pub fn is_word_like(&self) -> bool {
        match self {
            SQLChunk::Token(t) => t.is_word_like(),
            SQLChunk::Ident(_) | SQLChunk::Raw(_) => true,
            SQLChunk::Param(_) => true,
        }
    }
}

impl<'a, V: SQLParam> From<Token> for SQLChunk<'a, V> {
    fn from(value: Token) -> Self {
        SQLChunk::Token(value)
    }
}
