use crate::models::Relation;
use serde_json::{json, Value};

/// How membership in a relation is computed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationRule {
    /// Member only through a directly written tuple
    Direct,
    /// Member through a direct tuple, or through holding `owner`
    DirectOrOwner,
}

/// Static definition of the document type's relations.
///
/// The table is fixed at compile time. Adding a relation means extending the
/// match arms below; nothing is loaded at runtime.
pub struct RelationGraph;

impl RelationGraph {
    pub fn rule(relation: Relation) -> RelationRule {
        match relation {
            Relation::Owner => RelationRule::Direct,
            Relation::Reader | Relation::Writer | Relation::CanShare => RelationRule::DirectOrOwner,
        }
    }

    /// Relations whose direct tuples satisfy `relation`, direct relation first.
    pub fn expand(relation: Relation) -> &'static [Relation] {
        match relation {
            Relation::Owner => &[Relation::Owner],
            Relation::Reader => &[Relation::Reader, Relation::Owner],
            Relation::Writer => &[Relation::Writer, Relation::Owner],
            Relation::CanShare => &[Relation::CanShare, Relation::Owner],
        }
    }

    /// Whether a direct `held` tuple satisfies a check for `wanted`.
    pub fn implies(held: Relation, wanted: Relation) -> bool {
        Self::expand(wanted).contains(&held)
    }

    /// Renders the fixed model as an authorization-model document.
    ///
    /// Export only, for operators comparing deployments; it is never parsed back.
    pub fn authorization_model() -> Value {
        let mut relations = serde_json::Map::new();
        let mut metadata = serde_json::Map::new();

        for relation in Relation::ALL {
            let rewrite = match Self::rule(relation) {
                RelationRule::Direct => json!({ "this": {} }),
                RelationRule::DirectOrOwner => json!({
                    "union": {
                        "child": [
                            { "this": {} },
                            {
                                "computedUserset": {
                                    "object": "",
                                    "relation": Relation::Owner.as_str()
                                }
                            }
                        ]
                    }
                }),
            };
            relations.insert(relation.as_str().to_string(), rewrite);
            metadata.insert(
                relation.as_str().to_string(),
                json!({ "directly_related_user_types": [{ "type": "user" }] }),
            );
        }

        json!({
            "schema_version": "1.1",
            "type_definitions": [
                { "type": "user", "relations": {} },
                {
                    "type": "document",
                    "relations": relations,
                    "metadata": { "relations": metadata }
                }
            ]
        })
    }
}
