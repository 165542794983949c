//! Document id helpers.

use uuid::Uuid;

/// Generates a fresh random id.
pub fn new_document_id() -> String {
    Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_distinct() {
        let id = new_document_id();
        assert_eq!(id.len(), 32);
        assert_ne!(id, new_document_id());
    }
}
