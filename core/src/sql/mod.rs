//! Parameterized SQL fragment builder.
//!
//! Grounded in the teacher's chunk-based `SQL<V>`/`SQLChunk`/`Token` builder:
//! fragments are a flat `SmallVec` of chunks, joined/appended without ever
//! touching a value except through a [`Param`] chunk. Every caller-supplied
//! value the synthesizer binds goes through [`SQL::param`]; there is no path
//! from a value to raw SQL text, which is what keeps the generated
//! statements injection-safe regardless of how deeply relations are
//! composed.

mod chunk;
mod token;

pub use chunk::{Param, SQLChunk};
pub use token::Token;

use crate::value::SQLParam;
use smallvec::SmallVec;
use std::borrow::Cow;

/// A parameterized SQL fragment: renderable text plus the ordered parameter
/// values it binds.
#[derive(Debug, Clone)]
pub struct SQL<'a, V: SQLParam> {
    pub chunks: SmallVec<[SQLChunk<'a, V>; 8]>,
}

impl<'a, V: SQLParam> SQL<'a, V> {
    #[inline]
    pub fn empty() -> Self {
        Self {
            chunks: SmallVec::new(),
        }
    }

    #[inline]
    pub fn token(t: Token) -> Self {
        Self {
            chunks: smallvec::smallvec![SQLChunk::Token(t)],
        }
    }

    #[inline]
    pub fn ident(name: impl Into<Cow<'a, str>>) -> Self {
        Self {
            chunks: smallvec::smallvec![SQLChunk::Ident(name.into())],
        }
    }

    #[inline]
    pub fn raw(text: impl Into<Cow<'a, str>>) -> Self {
        Self {
            chunks: smallvec::smallvec![SQLChunk::Raw(text.into())],
        }
    }

    #[inline]
    pub fn param(value: impl Into<Cow<'a, V>>) -> Self {
        Self {
            chunks: smallvec::smallvec![SQLChunk::Param(Param::new(value))],
        }
    }

    /// `name(args)`; a `SELECT ...` argument is parenthesized automatically.
    pub fn func(name: impl Into<Cow<'a, str>>, args: SQL<'a, V>) -> Self {
        let args = if args.is_subquery() {
            args.parens()
        } else {
            args
        };
        SQL::raw(name)
            .push(Token::LParen)
            .append(args)
            .push(Token::RParen)
    }

    #[inline]
    pub fn append(mut self, other: impl Into<SQL<'a, V>>) -> Self {
        let mut other = other.into();
        if !other.chunks.is_empty() {
            self.chunks.reserve(other.chunks.len());
            self.chunks.extend(other.chunks.drain(..));
        }
        self
    }

    #[inline]
    pub fn push(mut self, chunk: impl Into<SQLChunk<'a, V>>) -> Self {
        self.chunks.push(chunk.into());
        self
    }

    /// Joins fragments with a separator token (`a, b, c` for `Token::Comma`).
    pub fn join(sqls: impl IntoIterator<Item = SQL<'a, V>>, separator: Token) -> SQL<'a, V> {
        let mut iter = sqls.into_iter();
        let Some(first) = iter.next() else {
            return SQL::empty();
        };
        let mut result = first;
        for item in iter {
            result = result.push(separator).append(item);
        }
        result
    }

    #[inline]
    pub fn parens(self) -> Self {
        SQL::token(Token::LParen).append(self).push(Token::RParen)
    }

    #[inline]
    pub fn is_subquery(&self) -> bool {
        matches!(self.chunks.first(), Some(SQLChunk::Token(Token::Select)))
    }

    pub fn alias(self, name: impl Into<Cow<'a, str>>) -> SQL<'a, V> {
        self.push(Token::As).push(SQLChunk::Ident(name.into()))
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Renders to a `$1, $2, ...`-placeholder SQL string.
    pub fn sql(&self) -> String {
        let mut buf = String::with_capacity(self.estimate_capacity());
        self.write_to(&mut buf);
        buf
    }

    pub fn write_to(&self, buf: &mut impl core::fmt::Write) {
        let mut param_index = 1usize;
        for (i, chunk) in self.chunks.iter().enumerate() {
            match chunk {
                SQLChunk::Param(_) => {
                    let _ = write!(buf, "${param_index}");
                    param_index += 1;
                }
                _ => chunk.write(buf),
            }
            if self.needs_space(i) {
                let _ = buf.write_char(' ');
            }
        }
    }

    fn estimate_capacity(&self) -> usize {
        self.chunks
            .iter()
            .map(|chunk| match chunk {
                SQLChunk::Token(t) => t.as_str().len(),
                SQLChunk::Ident(s) => s.len() + 2,
                SQLChunk::Raw(s) => s.len(),
                SQLChunk::Param(_) => 3,
            })
            .sum::<usize>()
            + self.chunks.len()
    }

    fn needs_space(&self, index: usize) -> bool {
        let Some(next) = self.chunks.get(index + 1) else {
            return false;
        };
        chunk_needs_space(&self.chunks[index], next)
    }

    /// Parameter values in binding order, as they will appear positionally
    /// (`$1, $2, ...`) in the rendered SQL.
    pub fn params(&self) -> impl Iterator<Item = &V> {
        self.chunks.iter().filter_map(|chunk| match chunk {
            SQLChunk::Param(p) => Some(p.value.as_ref()),
            _ => None,
        })
    }
}

fn chunk_needs_space<V: SQLParam>(current: &SQLChunk<'_, V>, next: &SQLChunk<'_, V>) -> bool {
    if let SQLChunk::Raw(text) = current
        && text.ends_with(' ')
    {
        return false;
    }
    if let SQLChunk::Raw(text) = next
        && text.starts_with(' ')
    {
        return false;
    }
    match (current, next) {
        (_, SQLChunk::Token(Token::RParen | Token::Comma | Token::Semi | Token::Dot)) => false,
        (SQLChunk::Token(Token::LParen | Token::Dot), _) => false,
        (SQLChunk::Token(Token::Comma), _) => true,
        (SQLChunk::Token(Token::RParen), next) => next.is_word_like(),
        (current, SQLChunk::Token(Token::LParen)) => current.is_word_like(),
        (SQLChunk::Token(t), _) if t.is_operator() => true,
        (_, SQLChunk::Token(t)) if t.is_operator() => true,
        _ => current.is_word_like() && next.is_word_like(),
    }
}

impl<'a, V: SQLParam> Default for SQL<'a, V> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<'a, V: SQLParam> From<Token> for SQL<'a, V> {
    fn from(value: Token) -> Self {
        SQL::token(value)
    }
}

impl<'a, V: SQLParam + core::fmt::Display> core::fmt::Display for SQL<'a, V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let params: Vec<_> = self.params().collect();
        write!(f, r#"sql: "{}", params: {:?}"#, self.sql(), params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Dialect;

    #[derive(Debug, Clone, PartialEq)]
    struct V(i64);
    impl SQLParam for V {
        const DIALECT: Dialect = Dialect::PostgreSQL;
        fn null() -> Self {
            V(i64::MIN)
        }
        fn array(values: Vec<Self>) -> Self {
            values.into_iter().next().unwrap_or(V(0))
        }
        fn as_i64(&self) -> Option<i64> {
            Some(self.0)
        }
    }

    #[test]
    fn renders_positional_placeholders() {
        let sql = SQL::token(Token::Select)
            .append(SQL::ident("id"))
            .push(Token::From)
            .append(SQL::ident("person"))
            .push(Token::Where)
            .append(SQL::ident("id"))
            .push(Token::Eq)
            .append(SQL::param(V(1)));
        assert_eq!(
            sql.sql(),
            r#"SELECT "id" FROM "person" WHERE "id" = $1"#
        );
        assert_eq!(sql.params().collect::<Vec<_>>(), vec![&V(1)]);
    }

    #[test]
    fn join_inserts_separator() {
        let sql = SQL::<V>::join(
            vec![SQL::ident("a"), SQL::ident("b"), SQL::ident("c")],
            Token::Comma,
        );
        assert_eq!(sql.sql(), r#""a", "b", "c""#);
    }

    #[test]
    fn func_wraps_subquery_in_parens() {
        let sub = SQL::token(Token::Select)
            .append(SQL::ident("x"))
            .push(Token::From)
            .append(SQL::ident("t"));
        let sql = SQL::<V>::func("count", sub);
        assert!(sql.sql().starts_with("count((SELECT"));
    }
}
