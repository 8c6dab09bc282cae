use std::convert::Infallible;

use uuid::Uuid;

use attesta::identity::{content_hash, document_identity_with, DocumentIdentity, IssuanceStore};

/// In-memory stand-in for the documents store: every issued (company, hash)
/// pair in insertion order.
#[derive(Default)]
struct Ledger {
    issued: Vec<(Uuid, String)>,
}

struct CompanyView<'a> {
    ledger: &'a mut Ledger,
    company_id: Uuid,
}

impl IssuanceStore for CompanyView<'_> {
    type Error = Infallible;

    fn hash_taken(&mut self, candidate: &str) -> Result<bool, Self::Error> {
        Ok(self.ledger.issued.iter().any(|(_, hash)| hash == candidate))
    }

    fn latest_company_hash(&mut self) -> Result<Option<String>, Self::Error> {
        Ok(self
            .ledger
            .issued
            .iter()
            .rev()
            .find(|(company, _)| *company == self.company_id)
            .map(|(_, hash)| hash.clone()))
    }
}

fn issue(ledger: &mut Ledger, company_id: Uuid, bytes: &[u8]) -> DocumentIdentity {
    let identity = document_identity_with(
        bytes,
        &mut CompanyView {
            ledger,
            company_id,
        },
    )
    .unwrap();
    ledger
        .issued
        .push((company_id, identity.document_hash.clone()));
    identity
}

#[test]
fn first_document_of_a_company_has_no_previous_link() {
    let mut ledger = Ledger::default();
    let identity = issue(&mut ledger, Uuid::new_v4(), b"certificate one");

    assert_eq!(identity.document_hash, content_hash(b"certificate one"));
    assert_eq!(identity.document_hash_previous, None);
    assert_eq!(identity.unique_identifier.len(), 13);
}

#[test]
fn chain_links_within_one_company_and_rederives_across_companies() {
    let mut ledger = Ledger::default();
    let company_one = Uuid::new_v4();
    let company_two = Uuid::new_v4();

    // pdf_A for company one: plain content hash, no predecessor.
    let first = issue(&mut ledger, company_one, b"pdf_A");
    assert_eq!(first.document_hash, content_hash(b"pdf_A"));
    assert_eq!(first.document_hash_previous, None);

    // The same bytes for company two collide, so the hash is re-derived;
    // the chain still starts fresh for the other company.
    let second = issue(&mut ledger, company_two, b"pdf_A");
    assert_ne!(second.document_hash, first.document_hash);
    assert_eq!(second.document_hash_previous, None);

    // New bytes back in company one link to that company's latest document,
    // not to company two's.
    let third = issue(&mut ledger, company_one, b"pdf_B");
    assert_eq!(
        third.document_hash_previous.as_deref(),
        Some(first.document_hash.as_str())
    );
}

#[test]
fn chain_traverses_newest_to_oldest() {
    let mut ledger = Ledger::default();
    let company_id = Uuid::new_v4();

    let versions: [&[u8]; 4] = [b"v1", b"v2", b"v3", b"v4"];
    let issued: Vec<DocumentIdentity> = versions
        .into_iter()
        .map(|bytes| issue(&mut ledger, company_id, bytes))
        .collect();

    // Walk the links from the newest document back to the first.
    let mut cursor = issued.last().unwrap().document_hash_previous.clone();
    for older in issued[..issued.len() - 1].iter().rev() {
        assert_eq!(cursor.as_deref(), Some(older.document_hash.as_str()));
        cursor = older.document_hash_previous.clone();
    }
    assert_eq!(cursor, None);
}

#[test]
fn identity_fields_are_fresh_per_issue() {
    let mut ledger = Ledger::default();
    let company_id = Uuid::new_v4();

    let first = issue(&mut ledger, company_id, b"doc one");
    let second = issue(&mut ledger, company_id, b"doc two");

    assert_ne!(first.unique_identifier, second.unique_identifier);
    assert_ne!(first.copy_id, second.copy_id);
}
