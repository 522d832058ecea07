//! Relation declarations and their normalization.
//!
//! A relation can be declared in a short positional form or in a keyed
//! form. Both are plain data (and deserialize from TOML or JSON), and both
//! normalize to the same [`Relation`]:
//!
//! | Short form | Relation |
//! |---|---|
//! | `["Comment", "article"]` | one-to-many (parent/children when self-referencing) |
//! | `["one", "Profile", "user"]` | one-to-one |
//! | `["many", "Comment", "article"]` | one-to-many |
//! | `["User", {"userId": "id"}]` | owner |
//! | `["User", {"userId": "id"}, "articles"]` | owner with opponent |
//! | `["Category", {"id": "article_id"}, "articles", "article_category"]` | many-to-many |
//! | `[{"parentType": {"a": "Article"}}, {"parentId": "id"}]` | morphed |
//!
//! The keyed form names the same options: `class`, `cardinality`,
//! `reference`, `opponent`, `table`, `morph_column` and `morph`.

use indexmap::IndexMap;
use orm_rs_core::{OrmError, OrmResult};
use serde::{Deserialize, Serialize};

use super::many_to_many::ManyToMany;
use super::morphed::{MorphReference, Morphed};
use super::one_to_many::OneToMany;
use super::one_to_one::OneToOne;
use super::owner::Owner;
use super::parent_children::ParentChildren;
use super::{Reference, Relation, RelationKind};

/// How many related entities a relation yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    One,
    Many,
}

/// The `reference` option: attribute pairs, or attribute pairs per
/// discriminator value for morphed relations.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ReferenceDeclaration {
    Attributes(IndexMap<String, String>),
    PerType(IndexMap<String, IndexMap<String, String>>),
}

/// One element of the short form.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ShortItem {
    Text(String),
    Attributes(IndexMap<String, String>),
    Nested(IndexMap<String, IndexMap<String, String>>),
}

/// The keyed form of a relation declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelationOptions {
    /// The related class.
    #[serde(default)]
    pub class: Option<String>,
    /// One or many; derived from the other options when absent.
    #[serde(default)]
    pub cardinality: Option<Cardinality>,
    /// Own attribute → related attribute (or association table column).
    #[serde(default)]
    pub reference: Option<ReferenceDeclaration>,
    /// The name of the relation on the other side.
    #[serde(default)]
    pub opponent: Option<String>,
    /// The association table of a many-to-many relation.
    #[serde(default)]
    pub table: Option<String>,
    /// The discriminator attribute of a morphed relation.
    #[serde(default)]
    pub morph_column: Option<String>,
    /// Discriminator value → class of a morphed relation. When empty the
    /// class name itself is stored.
    #[serde(default)]
    pub morph: Option<IndexMap<String, String>>,
}

/// A relation as declared on an entity type.
///
/// # Examples
///
/// ```
/// use orm_rs_db::relation::RelationDeclaration;
///
/// let short: RelationDeclaration =
///     serde_json::from_str(r#"["User", {"userId": "id"}, "articles"]"#).unwrap();
/// let long = RelationDeclaration::owner("User", [("userId", "id")]).with_opponent("articles");
/// assert_eq!(
///     short.normalize("Article", "user").unwrap(),
///     long.normalize("Article", "user").unwrap(),
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RelationDeclaration {
    Short(Vec<ShortItem>),
    Long(RelationOptions),
}

fn pairs<I, K, V>(reference: I) -> IndexMap<String, String>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    reference
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

impl RelationDeclaration {
    /// The owning side of a foreign key: `reference` maps own attributes to
    /// attributes of `class`.
    pub fn owner<I, K, V>(class: impl Into<String>, reference: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::Long(RelationOptions {
            class: Some(class.into()),
            reference: Some(ReferenceDeclaration::Attributes(pairs(reference))),
            ..RelationOptions::default()
        })
    }

    /// The inverse side of `class`'s owner relation `opponent`, with many cardinality.
    pub fn one_to_many(class: impl Into<String>, opponent: impl Into<String>) -> Self {
        Self::Long(RelationOptions {
            class: Some(class.into()),
            cardinality: Some(Cardinality::Many),
            opponent: Some(opponent.into()),
            ..RelationOptions::default()
        })
    }

    /// The inverse side of `class`'s owner relation `opponent`, with one cardinality.
    pub fn one_to_one(class: impl Into<String>, opponent: impl Into<String>) -> Self {
        Self::Long(RelationOptions {
            class: Some(class.into()),
            cardinality: Some(Cardinality::One),
            opponent: Some(opponent.into()),
            ..RelationOptions::default()
        })
    }

    /// A many-to-many relation through the association `table`; `reference`
    /// maps own attributes to columns of that table.
    pub fn many_to_many<I, K, V>(
        class: impl Into<String>,
        reference: I,
        opponent: impl Into<String>,
        table: impl Into<String>,
    ) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::Long(RelationOptions {
            class: Some(class.into()),
            cardinality: Some(Cardinality::Many),
            reference: Some(ReferenceDeclaration::Attributes(pairs(reference))),
            opponent: Some(opponent.into()),
            table: Some(table.into()),
            ..RelationOptions::default()
        })
    }

    /// A polymorphic owner: `morph_column` selects the class through `morph`
    /// (discriminator value → class; empty stores the class name).
    pub fn morphed<M, MK, MV, I, K, V>(
        morph_column: impl Into<String>,
        morph: M,
        reference: I,
    ) -> Self
    where
        M: IntoIterator<Item = (MK, MV)>,
        MK: Into<String>,
        MV: Into<String>,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::Long(RelationOptions {
            morph_column: Some(morph_column.into()),
            morph: Some(pairs(morph)),
            reference: Some(ReferenceDeclaration::Attributes(pairs(reference))),
            ..RelationOptions::default()
        })
    }

    /// Like [`morphed`](Self::morphed) with a reference per discriminator value.
    pub fn morphed_per_type<M, MK, MV>(
        morph_column: impl Into<String>,
        morph: M,
        references: IndexMap<String, IndexMap<String, String>>,
    ) -> Self
    where
        M: IntoIterator<Item = (MK, MV)>,
        MK: Into<String>,
        MV: Into<String>,
    {
        Self::Long(RelationOptions {
            morph_column: Some(morph_column.into()),
            morph: Some(pairs(morph)),
            reference: Some(ReferenceDeclaration::PerType(references)),
            ..RelationOptions::default()
        })
    }

    /// Sets the opponent of a keyed declaration.
    #[must_use]
    pub fn with_opponent(self, opponent: impl Into<String>) -> Self {
        match self {
            Self::Long(options) => Self::Long(RelationOptions {
                opponent: Some(opponent.into()),
                ..options
            }),
            short @ Self::Short(_) => short,
        }
    }

    /// Resolves the declaration of relation `name` on class `owner`.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::InvalidConfiguration`] naming the relation when
    /// the declaration is incomplete or ambiguous.
    pub fn normalize(&self, owner: &str, name: &str) -> OrmResult<Relation> {
        let options = match self {
            Self::Short(items) => short_to_options(items).ok_or_else(|| invalid(owner, name))?,
            Self::Long(options) => options.clone(),
        };
        options_to_relation(&options, owner, name)
    }
}

fn invalid(owner: &str, name: &str) -> OrmError {
    OrmError::InvalidConfiguration(format!(
        "Invalid relation configuration for {owner}::{name}"
    ))
}

fn short_to_options(items: &[ShortItem]) -> Option<RelationOptions> {
    use ShortItem::{Attributes, Nested, Text};

    let options = match items {
        [Text(class), Text(opponent)] => RelationOptions {
            class: Some(class.clone()),
            cardinality: Some(Cardinality::Many),
            opponent: Some(opponent.clone()),
            ..RelationOptions::default()
        },
        [Text(cardinality), Text(class), Text(opponent)] => RelationOptions {
            class: Some(class.clone()),
            cardinality: Some(match cardinality.as_str() {
                "one" => Cardinality::One,
                "many" => Cardinality::Many,
                _ => return None,
            }),
            opponent: Some(opponent.clone()),
            ..RelationOptions::default()
        },
        [Text(class), Attributes(reference)] => RelationOptions {
            class: Some(class.clone()),
            reference: Some(ReferenceDeclaration::Attributes(reference.clone())),
            ..RelationOptions::default()
        },
        [Text(class), Attributes(reference), Text(opponent)] => RelationOptions {
            class: Some(class.clone()),
            reference: Some(ReferenceDeclaration::Attributes(reference.clone())),
            opponent: Some(opponent.clone()),
            ..RelationOptions::default()
        },
        [Text(class), Attributes(reference), Text(opponent), Text(table)] => RelationOptions {
            class: Some(class.clone()),
            cardinality: Some(Cardinality::Many),
            reference: Some(ReferenceDeclaration::Attributes(reference.clone())),
            opponent: Some(opponent.clone()),
            table: Some(table.clone()),
            ..RelationOptions::default()
        },
        [Nested(morph), reference] if morph.len() == 1 => {
            let (column, map) = morph.first()?;
            let reference = match reference {
                Attributes(attributes) => ReferenceDeclaration::Attributes(attributes.clone()),
                Nested(per_type) => ReferenceDeclaration::PerType(per_type.clone()),
                Text(_) => return None,
            };
            RelationOptions {
                morph_column: Some(column.clone()),
                morph: Some(map.clone()),
                reference: Some(reference),
                ..RelationOptions::default()
            }
        }
        _ => return None,
    };
    Some(options)
}

fn attributes(reference: &ReferenceDeclaration) -> Option<Reference> {
    match reference {
        ReferenceDeclaration::Attributes(map) if !map.is_empty() => Some(Reference::new(map.clone())),
        _ => None,
    }
}

fn options_to_relation(options: &RelationOptions, owner: &str, name: &str) -> OrmResult<Relation> {
    let fail = || invalid(owner, name);

    let kind = if let Some(morph_column) = &options.morph_column {
        if options.table.is_some() || options.cardinality == Some(Cardinality::Many) {
            return Err(fail());
        }
        let reference = match options.reference.as_ref().ok_or_else(fail)? {
            ReferenceDeclaration::Attributes(map) if !map.is_empty() => {
                MorphReference::Shared(Reference::new(map.clone()))
            }
            ReferenceDeclaration::PerType(per_type)
                if !per_type.is_empty() && per_type.values().all(|r| !r.is_empty()) =>
            {
                MorphReference::PerType(
                    per_type
                        .iter()
                        .map(|(tag, r)| (tag.clone(), Reference::new(r.clone())))
                        .collect(),
                )
            }
            _ => return Err(fail()),
        };
        RelationKind::Morphed(Morphed {
            morph_column: morph_column.clone(),
            map: options.morph.clone().unwrap_or_default(),
            reference,
        })
    } else if let Some(table) = &options.table {
        let class = options.class.clone().ok_or_else(fail)?;
        let reference = options.reference.as_ref().and_then(attributes).ok_or_else(fail)?;
        let opponent = options.opponent.clone().ok_or_else(fail)?;
        if options.cardinality == Some(Cardinality::One) {
            return Err(fail());
        }
        RelationKind::ManyToMany(ManyToMany {
            class,
            reference,
            opponent,
            table: table.clone(),
        })
    } else if let Some(reference) = &options.reference {
        let class = options.class.clone().ok_or_else(fail)?;
        let reference = attributes(reference).ok_or_else(fail)?;
        if options.cardinality == Some(Cardinality::Many) {
            return Err(fail());
        }
        RelationKind::Owner(Owner {
            class,
            reference,
            opponent: options.opponent.clone(),
        })
    } else if let Some(opponent) = &options.opponent {
        let class = options.class.clone().ok_or_else(fail)?;
        let inverse = OneToMany {
            class,
            opponent: opponent.clone(),
        };
        match options.cardinality {
            Some(Cardinality::One) => RelationKind::OneToOne(OneToOne(inverse)),
            _ if inverse.class == owner => RelationKind::ParentChildren(ParentChildren(inverse)),
            _ => RelationKind::OneToMany(inverse),
        }
    } else {
        return Err(fail());
    };

    Ok(Relation {
        name: name.to_string(),
        owner: owner.to_string(),
        kind,
    })
}
