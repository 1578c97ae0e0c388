// Keyed record storage for documents and users
use crate::models::{Document, User};
use dashmap::DashMap;
use uuid::Uuid;

#[derive(Default)]
pub struct DocumentStore {
    documents: DashMap<Uuid, Document>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, document: Document) {
        self.documents.insert(document.id, document);
    }

    pub fn get(&self, id: Uuid) -> Option<Document> {
        self.documents.get(&id).map(|entry| entry.value().clone())
    }

    /// Apply `change` to the stored record, returning the updated copy
    pub fn update(&self, id: Uuid, change: impl FnOnce(&mut Document)) -> Option<Document> {
        self.documents.get_mut(&id).map(|mut entry| {
            change(entry.value_mut());
            entry.value().clone()
        })
    }

    pub fn remove(&self, id: Uuid) -> Option<Document> {
        self.documents.remove(&id).map(|(_, document)| document)
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.documents.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[derive(Default)]
pub struct UserDirectory {
    users: DashMap<Uuid, User>,
}

impl UserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user: User) {
        self.users.insert(user.id, user);
    }

    pub fn get(&self, id: Uuid) -> Option<User> {
        self.users.get(&id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.users.contains_key(&id)
    }

    pub fn find_by_username(&self, username: &str) -> Option<User> {
        self.users
            .iter()
            .find(|entry| entry.value().username == username)
            .map(|entry| entry.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewDocument;

    fn document(owner: Uuid) -> Document {
        Document::new(
            owner,
            NewDocument {
                name: "draft".to_string(),
                content: String::new(),
            },
        )
    }

    #[test]
    fn test_document_store_update_and_remove() {
        let store = DocumentStore::new();
        assert!(store.is_empty());

        let doc = document(Uuid::new_v4());
        store.insert(doc.clone());
        assert_eq!(store.len(), 1);

        let updated = store
            .update(doc.id, |d| d.content = "filled in".to_string())
            .unwrap();
        assert_eq!(updated.content, "filled in");
        assert_eq!(store.get(doc.id).unwrap().content, "filled in");

        assert!(store.update(Uuid::new_v4(), |_| {}).is_none());
        assert_eq!(store.remove(doc.id), Some(updated));
        assert!(!store.contains(doc.id));
    }

    #[test]
    fn test_user_directory_lookup() {
        let users = UserDirectory::new();
        let user = User {
            id: Uuid::new_v4(),
            username: "carol".to_string(),
            email: "carol@example.com".to_string(),
        };
        users.insert(user.clone());

        assert_eq!(users.get(user.id), Some(user.clone()));
        assert_eq!(users.find_by_username("carol"), Some(user));
        assert!(users.find_by_username("dave").is_none());
    }
}
