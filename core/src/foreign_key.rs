//! Foreign-key binding helpers: the `Fkeys` alias-exposure mechanism (§6)
//! and synthetic single-column foreign keys produced by field-to-field
//! assignment (§4.1, grounded in `field.py`'s `__set__` Field-value branch).

use crate::error::{Error, Result};
use crate::metadata::{FkDirection, ForeignKeyDescriptor, Fqrn};
use indexmap::IndexMap;

/// A generated type's declared alias → foreign-key-name mapping. Exposing
/// `post.author` instead of `post.fkey("post_person_fk")` is purely a naming
/// convenience layered over `Relation::fkey`; resolution failure is a
/// caller-visible error rather than a panic, since the mapping comes from
/// generated code that may drift from the live schema.
#[derive(Debug, Clone, Default)]
pub struct Fkeys {
    aliases: IndexMap<String, String>,
}

impl Fkeys {
    pub fn new(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            aliases: pairs.into_iter().collect(),
        }
    }

    /// Resolves `alias` to the foreign key it names, failing with
    /// `WrongForeignKey` if either the alias or the foreign key it points to
    /// is absent from `available`.
    pub fn resolve<'a>(
        &self,
        relation: &str,
        alias: &str,
        available: &'a IndexMap<String, ForeignKeyDescriptor>,
    ) -> Result<&'a ForeignKeyDescriptor> {
        let fk_name = self.aliases.get(alias).ok_or_else(|| Error::WrongForeignKey {
            relation: relation.to_string(),
            name: alias.to_string(),
        })?;
        available
            .get(fk_name)
            .ok_or_else(|| Error::WrongForeignKey {
                relation: relation.to_string(),
                name: fk_name.clone(),
            })
    }
}

/// Builds the single-column foreign key that a field-to-field assignment
/// (`rel_a.field(col).set(rel_b.field(col2))`) implies. `field.py`'s
/// `__set__` establishes this by hand (`fields`, `fk_names`, comparator
/// `'in'`); here it is expressed as an ordinary `ForeignKeyDescriptor` so
/// the join planner (§4.3) treats explicit and implicit joins identically.
pub fn synthetic(
    source_field: &str,
    target_relation: Fqrn,
    target_field: &str,
) -> ForeignKeyDescriptor {
    ForeignKeyDescriptor {
        name: format!("__implicit_{source_field}_{target_field}"),
        source_fields: vec![source_field.to_string()],
        target_relation,
        target_fields: vec![target_field.to_string()],
        direction: FkDirection::Forward,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_alias() {
        let mut fks = IndexMap::new();
        fks.insert(
            "post_person_fk".to_string(),
            ForeignKeyDescriptor {
                name: "post_person_fk".into(),
                source_fields: vec!["author_id".into()],
                target_relation: Fqrn::new("db", "public", "person"),
                target_fields: vec!["id".into()],
                direction: FkDirection::Forward,
            },
        );
        let aliases = Fkeys::new([("author".to_string(), "post_person_fk".to_string())]);
        assert!(aliases.resolve("post", "author", &fks).is_ok());
        assert!(aliases.resolve("post", "nope", &fks).is_err());
    }
}
