use diesel::dsl::exists;
use diesel::prelude::*;
use diesel::{select, PgConnection};
use sha2::{Digest, Sha256};
use tracing::warn;
use uuid::Uuid;

use crate::schema::documents;

/// Content-addressed identity of an uploaded file: hex-encoded SHA-256 of the
/// exact byte sequence.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Identity fields derived exactly once, on a document's first save.
#[derive(Debug)]
pub struct DocumentIdentity {
    pub document_hash: String,
    pub document_hash_previous: Option<String>,
    pub unique_identifier: String,
    pub copy_id: Uuid,
}

/// Store probes the identity derivation needs: hash-uniqueness checks and the
/// issuing company's latest document hash for the previous-hash chain.
pub trait IssuanceStore {
    type Error;

    fn hash_taken(&mut self, candidate: &str) -> Result<bool, Self::Error>;

    fn latest_company_hash(&mut self) -> Result<Option<String>, Self::Error>;
}

/// Derives all identity fields for a first save. The hash is guaranteed
/// absent from the store at the moment of the check; on collision the digest
/// is re-derived from a random 128-bit value, which trades content addressing
/// for uniqueness. The previous-hash link points at the issuing company's
/// latest document, null for the company's first. Generic over the store so
/// the chaining rules can be exercised without a database; the final
/// serialization point against concurrent writers is the unique constraint
/// on `documents.document_hash`.
pub fn document_identity_with<S: IssuanceStore>(
    bytes: &[u8],
    store: &mut S,
) -> Result<DocumentIdentity, S::Error> {
    let document_hash = unique_hash_with(bytes, |candidate| store.hash_taken(candidate))?;
    let document_hash_previous = store.latest_company_hash()?;
    Ok(DocumentIdentity {
        document_hash,
        document_hash_previous,
        unique_identifier: generate_unique_identifier(),
        copy_id: generate_copy_id(),
    })
}

pub fn document_identity(
    conn: &mut PgConnection,
    bytes: &[u8],
    company_id: Uuid,
) -> QueryResult<DocumentIdentity> {
    document_identity_with(bytes, &mut PgIssuanceStore { conn, company_id })
}

struct PgIssuanceStore<'a> {
    conn: &'a mut PgConnection,
    company_id: Uuid,
}

impl IssuanceStore for PgIssuanceStore<'_> {
    type Error = diesel::result::Error;

    fn hash_taken(&mut self, candidate: &str) -> Result<bool, Self::Error> {
        document_hash_exists(self.conn, candidate)
    }

    fn latest_company_hash(&mut self) -> Result<Option<String>, Self::Error> {
        documents::table
            .filter(documents::company_id.eq(self.company_id))
            .order(documents::created_at.desc())
            .select(documents::document_hash)
            .first(self.conn)
            .optional()
    }
}

/// Core of the collision loop, generic over the "is this digest taken" probe
/// so it can be exercised without a database.
pub fn unique_hash_with<E>(
    bytes: &[u8],
    mut taken: impl FnMut(&str) -> Result<bool, E>,
) -> Result<String, E> {
    let mut hash = content_hash(bytes);
    while taken(&hash)? {
        warn!(
            colliding_hash = %hash,
            "document hash collision, re-deriving from random input"
        );
        hash = content_hash(Uuid::new_v4().as_bytes());
    }
    Ok(hash)
}

pub fn document_hash_exists(conn: &mut PgConnection, hash: &str) -> QueryResult<bool> {
    select(exists(
        documents::table.filter(documents::document_hash.eq(hash)),
    ))
    .get_result(conn)
}

/// Opaque 13-character document identifier: the leading characters of a
/// UUIDv4 string, matching the printed `ID:` footer width.
pub fn generate_unique_identifier() -> String {
    let id = Uuid::new_v4().to_string();
    id[..13].to_string()
}

pub fn generate_copy_id() -> Uuid {
    Uuid::new_v4()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    #[test]
    fn content_hash_is_hex_sha256() {
        let hash = content_hash(b"employment record");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        // stable for identical input
        assert_eq!(hash, content_hash(b"employment record"));
    }

    #[test]
    fn distinct_inputs_hash_differently() {
        assert_ne!(content_hash(b"a"), content_hash(b"b"));
    }

    #[test]
    fn unique_hash_returns_content_hash_when_free() {
        let hash =
            unique_hash_with(b"pdf bytes", |_| Ok::<_, Infallible>(false)).unwrap();
        assert_eq!(hash, content_hash(b"pdf bytes"));
    }

    #[test]
    fn unique_hash_rederives_on_collision() {
        let original = content_hash(b"pdf bytes");
        let mut probes = 0;
        let hash = unique_hash_with(b"pdf bytes", |candidate| {
            probes += 1;
            // only the content-derived digest is taken
            Ok::<_, Infallible>(candidate == original)
        })
        .unwrap();
        assert_ne!(hash, original);
        assert_eq!(hash.len(), 64);
        assert!(probes >= 2);
    }

    #[test]
    fn unique_hash_propagates_probe_errors() {
        let result = unique_hash_with(b"pdf bytes", |_| Err::<bool, _>("store down"));
        assert_eq!(result.unwrap_err(), "store down");
    }

    #[test]
    fn identifier_is_13_characters() {
        let id = generate_unique_identifier();
        assert_eq!(id.len(), 13);
        assert_ne!(id, generate_unique_identifier());
    }
}
