use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use once_cell::sync::Lazy;

use attesta::identity::{content_hash, generate_unique_identifier, unique_hash_with};
use attesta::stamp::{is_stamped, stamp_document};

fn build_pdf(pages: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("encode page content"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
            },
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("serialize pdf");
    bytes
}

static CERTIFICATE: Lazy<Vec<u8>> =
    Lazy::new(|| build_pdf(&["Employment certificate", "Appendix: salary history"]));

#[test]
fn issuing_flow_stamps_content_hash_and_identifier() {
    let pdf = CERTIFICATE.clone();
    let hash = unique_hash_with(&pdf, |_| Ok::<_, std::convert::Infallible>(false)).unwrap();
    assert_eq!(hash, content_hash(&pdf));

    let identifier = generate_unique_identifier();
    let stamped = stamp_document(&pdf, &hash, &identifier).unwrap();

    assert!(is_stamped(&stamped, &hash, &identifier).unwrap());

    let doc = Document::load_mem(&stamped).unwrap();
    let last = doc.extract_text(&[2]).unwrap();
    assert!(last.contains(&format!("Hash: {hash}")));
    assert!(last.contains(&format!("ID: {identifier}")));
    assert!(last.contains("Appendix: salary history"));
}

#[test]
fn earlier_pages_are_left_untouched() {
    let stamped = stamp_document(&CERTIFICATE, "hash-x", "id-x").unwrap();
    let doc = Document::load_mem(&stamped).unwrap();
    let first = doc.extract_text(&[1]).unwrap();
    assert!(first.contains("Employment certificate"));
    assert!(!first.contains("Hash: hash-x"));
    assert!(!first.contains("ID: id-x"));
}

#[test]
fn stamping_twice_returns_identical_bytes() {
    let once = stamp_document(&CERTIFICATE, "hash-y", "id-y").unwrap();
    let twice = stamp_document(&once, "hash-y", "id-y").unwrap();
    assert_eq!(once, twice);
}

#[test]
fn collision_rederivation_still_produces_a_stampable_hash() {
    let pdf = CERTIFICATE.clone();
    let original = content_hash(&pdf);
    let hash = unique_hash_with(&pdf, |candidate| {
        Ok::<_, std::convert::Infallible>(candidate == original)
    })
    .unwrap();
    assert_ne!(hash, original);

    let stamped = stamp_document(&pdf, &hash, "id-z").unwrap();
    assert!(is_stamped(&stamped, &hash, "id-z").unwrap());
}

#[test]
fn copies_of_a_stamped_document_keep_the_original_stamp() {
    let stamped = stamp_document(&CERTIFICATE, "hash-copy", "id-copy").unwrap();
    // a copy duplicates the stored bytes, so restamping must be a no-op
    let copy = stamp_document(&stamped, "hash-copy", "id-copy").unwrap();
    assert_eq!(stamped, copy);
    assert!(is_stamped(&copy, "hash-copy", "id-copy").unwrap());
}

#[test]
fn malformed_upload_is_rejected_before_persistence() {
    assert!(stamp_document(b"%PDF-garbage", "h", "id").is_err());
}
