//! Field constraints (§3, §4.2), grounded in halfORM's `field.py`:
//! `__set__`'s value/comparator assignment rules and `where_repr`'s
//! alias-prefixed rendering.

use crate::error::{Error, Result};
use crate::executor::ExecutorQuirks;
use crate::metadata::FieldDescriptor;
use crate::sql::SQL;
use crate::value::SQLParam;

/// The closed comparator set (§3). Any string outside this set is rejected
/// at the point of assignment with `Error::InvalidComparator`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    ILike,
    /// `@@` — full-text search match.
    Match,
    /// `%` — trigram similarity (`pg_trgm`).
    Similar,
    Is,
    IsNot,
    In,
    Any,
}

impl Comparator {
    pub fn as_str(self) -> &'static str {
        match self {
            Comparator::Eq => "=",
            Comparator::Ne => "!=",
            Comparator::Lt => "<",
            Comparator::Le => "<=",
            Comparator::Gt => ">",
            Comparator::Ge => ">=",
            Comparator::Like => "like",
            Comparator::ILike => "ilike",
            Comparator::Match => "@@",
            Comparator::Similar => "%",
            Comparator::Is => "is",
            Comparator::IsNot => "is not",
            Comparator::In => "in",
            Comparator::Any => "any",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "=" => Comparator::Eq,
            "!=" | "<>" => Comparator::Ne,
            "<" => Comparator::Lt,
            "<=" => Comparator::Le,
            ">" => Comparator::Gt,
            ">=" => Comparator::Ge,
            "like" => Comparator::Like,
            "ilike" => Comparator::ILike,
            "@@" => Comparator::Match,
            "%" => Comparator::Similar,
            "is" => Comparator::Is,
            "is not" => Comparator::IsNot,
            "in" => Comparator::In,
            "any" => Comparator::Any,
            _ => return None,
        })
    }

    fn requires_null(self) -> bool {
        matches!(self, Comparator::Is | Comparator::IsNot)
    }
}

/// The value half of a field constraint. `Unset` is the "no constraint"
/// state — distinct from a NULL constraint, which is `Scalar` holding
/// `V::null()` with comparator `Is`/`IsNot` (§3 invariant 1/2).
#[derive(Debug, Clone)]
enum FieldState<V: SQLParam> {
    Unset,
    Scalar(V, Comparator),
    Sequence(Vec<V>, Comparator),
}

/// One column of a [`crate::relation::Relation`], holding at most one
/// constraint. Carries no back-reference to its owning relation (§9
/// redesign note) — alias rendering takes the owner's alias id as a
/// parameter instead of a stored pointer.
#[derive(Debug, Clone)]
pub struct Field<V: SQLParam> {
    name: String,
    descriptor: FieldDescriptor,
    state: FieldState<V>,
    unaccent: bool,
}

/// Rendering context: `select` qualifies with the relation alias, mutating
/// statements use the quoted bare column name (`field.py`'s `_praf`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Select,
    Mutating,
}

impl<V: SQLParam> Field<V> {
    pub fn new(descriptor: FieldDescriptor) -> Self {
        Self {
            name: descriptor.name.clone(),
            descriptor,
            state: FieldState::Unset,
            unaccent: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptor(&self) -> &FieldDescriptor {
        &self.descriptor
    }

    pub fn is_set(&self) -> bool {
        !matches!(self.state, FieldState::Unset)
    }

    pub fn unset(&mut self) {
        self.state = FieldState::Unset;
    }

    pub fn unaccent(&mut self, value: bool) {
        self.unaccent = value;
    }

    /// `field.set(value)` — comparator defaults to `=` (`field.py`
    /// `__set__`'s `comp is None` branch for non-NULL, non-Field values).
    pub fn set(&mut self, value: V) -> Result<()> {
        if value.is_null() {
            self.state = FieldState::Scalar(value, Comparator::Is);
        } else {
            self.state = FieldState::Scalar(value, Comparator::Eq);
        }
        Ok(())
    }

    /// `field.set_cmp(comparator, value)` — explicit comparator (§4.1).
    /// NULL is only accepted with `is`/`is not`; a non-NULL value is
    /// rejected for `is`/`is not` since those only make sense against NULL.
    pub fn set_cmp(&mut self, comparator: Comparator, value: V) -> Result<()> {
        if comparator.requires_null() && !value.is_null() {
            return Err(Error::InvalidValue {
                field: self.name.clone(),
                reason: format!("comparator {:?} requires the NULL sentinel", comparator),
            });
        }
        if value.is_null() && !comparator.requires_null() {
            return Err(Error::InvalidComparator {
                field: self.name.clone(),
                comparator: comparator.as_str().to_string(),
            });
        }
        self.state = FieldState::Scalar(value, comparator);
        Ok(())
    }

    /// Sets the NULL sentinel directly, defaulting to `is` (`field.py`:
    /// `value is NULL and comp is None => comp = 'is'`).
    pub fn set_null(&mut self) {
        self.state = FieldState::Scalar(V::null(), Comparator::Is);
    }

    /// A sequence constraint, bound as a single array-valued parameter
    /// (see [`Self::where_repr`]); `self.descriptor.is_array` decides
    /// whether the rendered predicate wraps it in `any(...)`, mirroring
    /// `field.py`'s `type_[0] != '_'` check.
    pub fn set_sequence(&mut self, values: Vec<V>, comparator: Comparator) -> Result<()> {
        if values.iter().any(|v| v.is_null()) {
            return Err(Error::InvalidValue {
                field: self.name.clone(),
                reason: "sequence values must not include the NULL sentinel".into(),
            });
        }
        self.state = FieldState::Sequence(values, comparator);
        Ok(())
    }

    /// The value to bind for this column in an `INSERT`/`UPDATE SET`, if
    /// any constraint has been placed on it. A sequence constraint against
    /// an array-typed column inserts the whole array; against a scalar
    /// column it has no insert-side meaning (it only makes sense as a
    /// `WHERE`-side membership test).
    pub fn bind_value(&self) -> Option<V> {
        match &self.state {
            FieldState::Unset => None,
            FieldState::Scalar(v, _) => Some(v.clone()),
            FieldState::Sequence(values, _) if self.descriptor.is_array => {
                Some(V::array(values.clone()))
            }
            FieldState::Sequence(..) => None,
        }
    }

    fn praf<'a>(&self, kind: QueryKind, alias_id: u64) -> SQL<'a, V> {
        match kind {
            QueryKind::Select => SQL::raw(format!("r{alias_id}.\"{}\"", self.name)),
            QueryKind::Mutating => SQL::ident(self.name.clone()),
        }
    }

    /// Renders this field's predicate fragment (§4.2). Returns `None` for
    /// an unset field (no predicate to contribute).
    ///
    /// A sequence value is always bound as a single array-valued parameter
    /// (`field.py`'s reliance on the driver auto-adapting a list/tuple to
    /// `ARRAY[...]`); the only thing the column's array-ness changes is
    /// whether the right-hand side gets wrapped in `any(...)` — scalar
    /// columns need it to turn array equality into membership, array
    /// columns compare the arrays directly.
    pub fn where_repr<'a>(&self, kind: QueryKind, alias_id: u64, quirks: ExecutorQuirks) -> Option<SQL<'a, V>> {
        let lhs = self.praf(kind, alias_id);
        match &self.state {
            FieldState::Unset => None,
            FieldState::Scalar(value, comparator) => {
                let value = self.maybe_escape(*comparator, value.clone(), quirks);
                Some(self.render(lhs, *comparator, SQL::param(value)))
            }
            FieldState::Sequence(values, comparator) => {
                let values: Vec<V> = values
                    .iter()
                    .cloned()
                    .map(|v| self.maybe_escape(*comparator, v, quirks))
                    .collect();
                let param = SQL::param(V::array(values));
                let rhs = if self.descriptor.is_array {
                    param
                } else {
                    SQL::func("any", param)
                };
                Some(self.render(lhs, *comparator, rhs))
            }
        }
    }

    /// Doubles a `like`/`ilike` operand's literal `%` when the active
    /// executor reports the legacy quirk (§4.2, §9). Every other comparator
    /// passes the value through untouched.
    fn maybe_escape(&self, comparator: Comparator, value: V, quirks: ExecutorQuirks) -> V {
        if quirks.escape_percent && matches!(comparator, Comparator::Like | Comparator::ILike) {
            value.escape_percent()
        } else {
            value
        }
    }

    fn render<'a>(&self, lhs: SQL<'a, V>, comparator: Comparator, rhs: SQL<'a, V>) -> SQL<'a, V> {
        let (lhs, rhs) = if self.unaccent {
            (SQL::func("unaccent", lhs), SQL::func("unaccent", rhs))
        } else {
            (lhs, rhs)
        };
        lhs.append(SQL::raw(comparator.as_str())).append(rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Dialect;

    #[derive(Debug, Clone, PartialEq)]
    enum V {
        Int(i64),
        Text(String),
        Array(Vec<V>),
        Null,
    }
    impl SQLParam for V {
        const DIALECT: Dialect = Dialect::PostgreSQL;
        fn null() -> Self {
            V::Null
        }
        fn array(values: Vec<Self>) -> Self {
            V::Array(values)
        }
        fn as_i64(&self) -> Option<i64> {
            match self {
                V::Int(n) => Some(*n),
                _ => None,
            }
        }
        fn escape_percent(&self) -> Self {
            match self {
                V::Text(s) => V::Text(s.replace('%', "%%")),
                other => other.clone(),
            }
        }
    }

    fn descriptor(name: &str, is_array: bool) -> FieldDescriptor {
        FieldDescriptor {
            name: name.to_string(),
            sql_type: "text".into(),
            is_pk: false,
            is_unique: false,
            not_null: false,
            is_array,
        }
    }

    #[test]
    fn unset_field_has_no_predicate() {
        let f: Field<V> = Field::new(descriptor("name", false));
        assert!(f.where_repr(QueryKind::Select, 1, ExecutorQuirks::default()).is_none());
    }

    #[test]
    fn scalar_set_defaults_to_eq() {
        let mut f: Field<V> = Field::new(descriptor("name", false));
        f.set(V::Text("Lagaffe".into())).unwrap();
        let sql = f.where_repr(QueryKind::Select, 7, ExecutorQuirks::default()).unwrap();
        assert_eq!(sql.sql(), r#"r7."name" = $1"#);
    }

    #[test]
    fn null_requires_is_or_is_not() {
        let mut f: Field<V> = Field::new(descriptor("content", false));
        assert!(f.set_cmp(Comparator::Eq, V::Null).is_err());
        f.set_null();
        assert_eq!(
            f.where_repr(QueryKind::Mutating, 1, ExecutorQuirks::default()).unwrap().sql(),
            r#""content" is $1"#
        );
    }

    #[test]
    fn sequence_on_scalar_column_wraps_any() {
        let mut f: Field<V> = Field::new(descriptor("last_name", false));
        f.set_sequence(
            vec![V::Text("aa".into()), V::Text("ab".into())],
            Comparator::Eq,
        )
        .unwrap();
        let sql = f.where_repr(QueryKind::Select, 1, ExecutorQuirks::default()).unwrap();
        assert!(sql.sql().contains("any ("));
    }

    #[test]
    fn sequence_on_array_column_skips_any() {
        let mut f: Field<V> = Field::new(descriptor("tags", true));
        f.set_sequence(vec![V::Text("a".into())], Comparator::Eq)
            .unwrap();
        let sql = f.where_repr(QueryKind::Select, 1, ExecutorQuirks::default()).unwrap();
        assert!(!sql.sql().contains("any"));
    }

    #[test]
    fn unaccent_wraps_both_sides() {
        let mut f: Field<V> = Field::new(descriptor("last_name", false));
        f.unaccent(true);
        f.set(V::Text("Lagaffe".into())).unwrap();
        let sql = f.where_repr(QueryKind::Select, 1, ExecutorQuirks::default()).unwrap().sql();
        assert!(sql.starts_with("unaccent ("));
        assert!(sql.contains("unaccent ($1)"));
    }

    #[test]
    fn like_escapes_percent_only_under_the_legacy_quirk() {
        let mut f: Field<V> = Field::new(descriptor("title", false));
        f.set_cmp(Comparator::Like, V::Text("50%off".into())).unwrap();
        let quirky = ExecutorQuirks { escape_percent: true };
        let sql = f.where_repr(QueryKind::Select, 1, quirky).unwrap();
        assert_eq!(sql.params().next(), Some(&V::Text("50%%off".into())));

        let sql = f.where_repr(QueryKind::Select, 1, ExecutorQuirks::default()).unwrap();
        assert_eq!(sql.params().next(), Some(&V::Text("50%off".into())));
    }

    #[test]
    fn eq_is_never_percent_escaped() {
        let mut f: Field<V> = Field::new(descriptor("title", false));
        f.set(V::Text("50%off".into())).unwrap();
        let quirky = ExecutorQuirks { escape_percent: true };
        let sql = f.where_repr(QueryKind::Select, 1, quirky).unwrap();
        assert_eq!(sql.params().next(), Some(&V::Text("50%off".into())));
    }
}
