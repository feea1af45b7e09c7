//! The value-type seam between the engine and a concrete database driver.

/// SQL dialect tag carried by a parameter type. Kept as a const (mirroring
/// the teacher's `SQLParam::DIALECT`) even though this workspace only ships
/// a PostgreSQL parameter type — it is what a `SQLParam` impl for another
/// dialect would hang off, and the synthesizer's call sites are already
/// written against the trait rather than a concrete enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    PostgreSQL,
}

/// Marker for types that can be bound as a query parameter.
///
/// The NULL sentinel (§6) is expressed by an associated constant rather than
/// a separate type so that `Field` can compare a caller's value against it
/// without downcasting: `V::NULL` gives the value this dialect's driver
/// considers SQL NULL.
pub trait SQLParam: Clone + core::fmt::Debug + PartialEq {
    const DIALECT: Dialect;

    /// The distinguished NULL sentinel for this value type (§3, §6). Never
    /// equal to any other value produced by this type's constructors.
    fn null() -> Self;

    fn is_null(&self) -> bool {
        self == &Self::null()
    }

    /// Wraps a sequence of values into a single array-valued parameter, the
    /// way `psycopg2` auto-adapts a Python list/tuple to a PostgreSQL
    /// `ARRAY[...]` literal (`field.py`'s sequence handling, §4.2).
    fn array(values: Vec<Self>) -> Self;

    /// Decodes a scalar integer out of this value, if it holds one. Used to
    /// read back `count(*)` without the core engine depending on a concrete
    /// backend's value representation.
    fn as_i64(&self) -> Option<i64>;

    /// Doubles a literal `%` the way a driver that does its own `%`-style
    /// interpolation over rendered SQL text needs (§4.2, §9). Applied only
    /// to `like`/`ilike` operands, and only when `Executor::quirks()`
    /// reports the legacy behavior is required — the default no-ops, since
    /// a parameter-binding driver never sees `%` as part of the SQL text.
    fn escape_percent(&self) -> Self {
        self.clone()
    }
}
