use crate::error::AuthzError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// The user a relation is granted to
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Subject(String);

impl Subject {
    pub fn user(user_id: &str) -> Self {
        Self(user_id.to_string())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl From<Uuid> for Subject {
    fn from(id: Uuid) -> Self {
        Self(id.to_string())
    }
}

impl FromStr for Subject {
    type Err = AuthzError;

    /// Accepts both `alice` and `user:alice`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = s.strip_prefix("user:").unwrap_or(s).trim();
        if id.is_empty() {
            return Err(AuthzError::InvalidIdentifier(format!("empty user id in '{s}'")));
        }
        Ok(Self(id.to_string()))
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "user:{}", self.0)
    }
}

/// The protected document
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectRef(String);

impl ObjectRef {
    pub fn document(document_id: &str) -> Self {
        Self(document_id.to_string())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl From<Uuid> for ObjectRef {
    fn from(id: Uuid) -> Self {
        Self(id.to_string())
    }
}

impl FromStr for ObjectRef {
    type Err = AuthzError;

    /// Accepts both `doc1` and `document:doc1`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = s.strip_prefix("document:").unwrap_or(s).trim();
        if id.is_empty() {
            return Err(AuthzError::InvalidIdentifier(format!("empty document id in '{s}'")));
        }
        Ok(Self(id.to_string()))
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "document:{}", self.0)
    }
}

/// The fixed relation set of the document type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    Owner,
    Reader,
    Writer,
    CanShare,
}

impl Relation {
    pub const ALL: [Relation; 4] = [
        Relation::Owner,
        Relation::Reader,
        Relation::Writer,
        Relation::CanShare,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Relation::Owner => "owner",
            Relation::Reader => "reader",
            Relation::Writer => "writer",
            Relation::CanShare => "can_share",
        }
    }
}

impl FromStr for Relation {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(Relation::Owner),
            "reader" => Ok(Relation::Reader),
            "writer" => Ok(Relation::Writer),
            "can_share" => Ok(Relation::CanShare),
            other => Err(AuthzError::UnsupportedRelation(other.to_string())),
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directly granted fact: subject has relation to object
///
/// Tuples are unique per triple. The same triple identifies the tuple on
/// deletion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tuple {
    pub subject: Subject,
    pub relation: Relation,
    pub object: ObjectRef,
}

impl Tuple {
    pub fn new(subject: Subject, relation: Relation, object: ObjectRef) -> Self {
        Self {
            subject,
            relation,
            object,
        }
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.subject, self.relation, self.object)
    }
}

/// A tuple as read back from storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTuple {
    pub tuple: Tuple,
    pub created_at: DateTime<Utc>,
}

/// Read filter; `None` fields act as wildcards
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TupleFilter {
    pub subject: Option<Subject>,
    pub relation: Option<Relation>,
    pub object: Option<ObjectRef>,
}

impl TupleFilter {
    pub fn object(object: &ObjectRef) -> Self {
        Self {
            object: Some(object.clone()),
            ..Self::default()
        }
    }

    pub fn subject(subject: &Subject) -> Self {
        Self {
            subject: Some(subject.clone()),
            ..Self::default()
        }
    }

    pub fn with_relation(mut self, relation: Relation) -> Self {
        self.relation = Some(relation);
        self
    }

    pub fn matches(&self, tuple: &Tuple) -> bool {
        self.subject.as_ref().map_or(true, |s| *s == tuple.subject)
            && self.relation.map_or(true, |r| r == tuple.relation)
            && self.object.as_ref().map_or(true, |o| *o == tuple.object)
    }
}

/// Application-level permission requested by document handlers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PermissionKind {
    Read,
    Write,
    Delete,
    Share,
}

impl PermissionKind {
    /// Relation evaluated when checking this permission
    pub fn relation(self) -> Relation {
        match self {
            PermissionKind::Read => Relation::Reader,
            PermissionKind::Write => Relation::Writer,
            PermissionKind::Delete | PermissionKind::Share => Relation::Owner,
        }
    }

    /// Relation written when this permission is shared with another user.
    ///
    /// # Errors
    ///
    /// `InvalidGrantKind` for `Delete` and `Share`, which are owner-only.
    pub fn grant_relation(self) -> Result<Relation, AuthzError> {
        match self {
            PermissionKind::Read => Ok(Relation::Reader),
            PermissionKind::Write => Ok(Relation::Writer),
            PermissionKind::Delete | PermissionKind::Share => {
                Err(AuthzError::InvalidGrantKind(self))
            }
        }
    }
}

impl FromStr for PermissionKind {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "read" => Ok(PermissionKind::Read),
            "write" => Ok(PermissionKind::Write),
            "delete" => Ok(PermissionKind::Delete),
            "share" => Ok(PermissionKind::Share),
            _ => Err(AuthzError::UnsupportedPermission(s.to_string())),
        }
    }
}

impl fmt::Display for PermissionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PermissionKind::Read => "Read",
            PermissionKind::Write => "Write",
            PermissionKind::Delete => "Delete",
            PermissionKind::Share => "Share",
        };
        f.write_str(name)
    }
}

/// Authorization check request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckRequest {
    pub subject: Subject,
    pub relation: Relation,
    pub object: ObjectRef,
}

/// Authorization check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResponse {
    pub request: CheckRequest,
    pub allowed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relation_parsing() {
        for relation in Relation::ALL {
            assert_eq!(relation.as_str().parse::<Relation>().unwrap(), relation);
        }

        let err = "editor".parse::<Relation>().unwrap_err();
        assert!(matches!(err, AuthzError::UnsupportedRelation(name) if name == "editor"));
    }

    #[test]
    fn test_permission_mapping() {
        assert_eq!(PermissionKind::Read.relation(), Relation::Reader);
        assert_eq!(PermissionKind::Write.relation(), Relation::Writer);
        assert_eq!(PermissionKind::Delete.relation(), Relation::Owner);
        assert_eq!(PermissionKind::Share.relation(), Relation::Owner);

        assert_eq!(PermissionKind::Read.grant_relation().unwrap(), Relation::Reader);
        assert_eq!(PermissionKind::Write.grant_relation().unwrap(), Relation::Writer);
        assert!(matches!(
            PermissionKind::Share.grant_relation(),
            Err(AuthzError::InvalidGrantKind(PermissionKind::Share))
        ));
        assert!(matches!(
            PermissionKind::Delete.grant_relation(),
            Err(AuthzError::InvalidGrantKind(PermissionKind::Delete))
        ));
    }

    #[test]
    fn test_permission_parsing_is_case_insensitive() {
        assert_eq!("Read".parse::<PermissionKind>().unwrap(), PermissionKind::Read);
        assert_eq!("WRITE".parse::<PermissionKind>().unwrap(), PermissionKind::Write);
        assert!(matches!(
            "admin".parse::<PermissionKind>(),
            Err(AuthzError::UnsupportedPermission(_))
        ));
    }

    #[test]
    fn test_identifier_display_and_parsing() {
        let subject: Subject = "user:alice".parse().unwrap();
        assert_eq!(subject, Subject::user("alice"));
        assert_eq!(subject.to_string(), "user:alice");

        let object: ObjectRef = "doc1".parse().unwrap();
        assert_eq!(object.to_string(), "document:doc1");

        assert!("user:".parse::<Subject>().is_err());
        assert!("  ".parse::<ObjectRef>().is_err());

        let tuple = Tuple::new(subject, Relation::CanShare, object);
        assert_eq!(tuple.to_string(), "user:alice can_share document:doc1");
    }

    #[test]
    fn test_filter_matching() {
        let tuple = Tuple::new(Subject::user("alice"), Relation::Owner, ObjectRef::document("d"));

        assert!(TupleFilter::default().matches(&tuple));
        assert!(TupleFilter::object(&ObjectRef::document("d")).matches(&tuple));
        assert!(!TupleFilter::object(&ObjectRef::document("other")).matches(&tuple));
        assert!(!TupleFilter::subject(&Subject::user("alice"))
            .with_relation(Relation::Reader)
            .matches(&tuple));
    }
}
