use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId};
use thiserror::Error;

/// Resource name under which the footer font is registered on the last page.
const STAMP_FONT_NAME: &str = "StampHelv";
const STAMP_FONT_SIZE: i64 = 8;
// Footer coordinates on a US-letter page: centered horizontally, ID above Hash.
const STAMP_X: i64 = 306;
const STAMP_ID_Y: i64 = 25;
const STAMP_LINE_STEP: i64 = -15;

#[derive(Debug, Error)]
pub enum StampError {
    #[error("malformed pdf: {0}")]
    Pdf(#[from] lopdf::Error),
    #[error("pdf has no pages")]
    NoPages,
    #[error("failed to write stamped pdf: {0}")]
    Io(#[from] std::io::Error),
}

/// Embeds the document's identity footer (`Hash: <hash>` / `ID: <identifier>`)
/// as visible text on the last page and re-serializes the PDF.
///
/// Idempotent: if the last page already carries both lines verbatim, the input
/// bytes are returned unchanged. Malformed input is a hard error; callers must
/// abort the surrounding save rather than persist an unstamped file.
pub fn stamp_document(pdf: &[u8], hash: &str, identifier: &str) -> Result<Vec<u8>, StampError> {
    let mut doc = Document::load_mem(pdf)?;
    let (page_number, page_id) = last_page(&doc).ok_or(StampError::NoPages)?;

    let hash_line = format!("Hash: {hash}");
    let id_line = format!("ID: {identifier}");

    let existing = doc.extract_text(&[page_number]).unwrap_or_default();
    if existing.contains(&hash_line) && existing.contains(&id_line) {
        return Ok(pdf.to_vec());
    }

    ensure_stamp_font(&mut doc, page_id)?;

    let data = doc.get_page_content(page_id)?;
    let mut content = Content::decode(&data)?;
    content.operations.extend([
        Operation::new("q", vec![]),
        Operation::new("BT", vec![]),
        Operation::new(
            "Tf",
            vec![STAMP_FONT_NAME.into(), STAMP_FONT_SIZE.into()],
        ),
        Operation::new("Td", vec![STAMP_X.into(), STAMP_ID_Y.into()]),
        Operation::new("Tj", vec![Object::string_literal(id_line)]),
        Operation::new("Td", vec![0.into(), STAMP_LINE_STEP.into()]),
        Operation::new("Tj", vec![Object::string_literal(hash_line)]),
        Operation::new("ET", vec![]),
        Operation::new("Q", vec![]),
    ]);
    doc.change_page_content(page_id, content.encode()?)?;

    let mut stamped = Vec::new();
    doc.save_to(&mut stamped)?;
    Ok(stamped)
}

/// True if the last page already carries both footer lines.
pub fn is_stamped(pdf: &[u8], hash: &str, identifier: &str) -> Result<bool, StampError> {
    let doc = Document::load_mem(pdf)?;
    let (page_number, _) = last_page(&doc).ok_or(StampError::NoPages)?;
    let text = doc.extract_text(&[page_number]).unwrap_or_default();
    Ok(text.contains(&format!("Hash: {hash}")) && text.contains(&format!("ID: {identifier}")))
}

fn last_page(doc: &Document) -> Option<(u32, ObjectId)> {
    doc.get_pages().into_iter().next_back()
}

/// Registers the footer font on the last page. Direct and inherited resources
/// are merged into one page-local dictionary first, so the stamp font never
/// shadows fonts the page's existing content relies on.
fn ensure_stamp_font(doc: &mut Document, page_id: ObjectId) -> Result<(), StampError> {
    let mut resources = Dictionary::new();
    {
        let (direct, referenced) = doc.get_page_resources(page_id)?;
        if let Some(direct) = direct {
            resources = direct.clone();
        }
        for object_id in referenced {
            if let Ok(inherited) = doc.get_dictionary(object_id) {
                for (key, value) in inherited.iter() {
                    if !resources.has(key) {
                        resources.set(key.clone(), value.clone());
                    }
                }
            }
        }
    }

    let mut fonts = match resources.get(b"Font") {
        Ok(Object::Dictionary(existing)) => existing.clone(),
        Ok(Object::Reference(id)) => doc
            .get_dictionary(*id)
            .map(|dict| dict.clone())
            .unwrap_or_else(|_| Dictionary::new()),
        _ => Dictionary::new(),
    };

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    fonts.set(STAMP_FONT_NAME, font_id);
    resources.set("Font", fonts);

    let page = doc.get_object_mut(page_id)?.as_dict_mut()?;
    page.set("Resources", resources);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::Stream;

    fn fixture_pdf(pages: &[&str]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
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
                content.encode().expect("encode fixture content"),
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
        doc.save_to(&mut bytes).expect("serialize fixture pdf");
        bytes
    }

    #[test]
    fn stamp_adds_footer_to_last_page() {
        let pdf = fixture_pdf(&["certificate body"]);
        let stamped = stamp_document(&pdf, "abc123", "deadbeef-0001").unwrap();

        let doc = Document::load_mem(&stamped).unwrap();
        let text = doc.extract_text(&[1]).unwrap();
        assert!(text.contains("Hash: abc123"));
        assert!(text.contains("ID: deadbeef-0001"));
        assert!(text.contains("certificate body"));
    }

    #[test]
    fn stamp_touches_only_the_last_page() {
        let pdf = fixture_pdf(&["page one", "page two"]);
        let stamped = stamp_document(&pdf, "h1", "id1").unwrap();

        let doc = Document::load_mem(&stamped).unwrap();
        let first = doc.extract_text(&[1]).unwrap();
        let last = doc.extract_text(&[2]).unwrap();
        assert!(!first.contains("Hash: h1"));
        assert!(last.contains("Hash: h1"));
        assert!(last.contains("ID: id1"));
    }

    #[test]
    fn restamping_is_a_byte_identical_no_op() {
        let pdf = fixture_pdf(&["certificate body"]);
        let once = stamp_document(&pdf, "abc123", "deadbeef-0001").unwrap();
        let twice = stamp_document(&once, "abc123", "deadbeef-0001").unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn differing_identity_is_stamped_again() {
        let pdf = fixture_pdf(&["certificate body"]);
        let once = stamp_document(&pdf, "abc123", "deadbeef-0001").unwrap();
        assert!(!is_stamped(&once, "other", "deadbeef-0001").unwrap());
        let again = stamp_document(&once, "other", "id-other-00001").unwrap();
        assert!(is_stamped(&again, "other", "id-other-00001").unwrap());
    }

    #[test]
    fn malformed_input_is_a_hard_error() {
        let result = stamp_document(b"not a pdf at all", "h", "id");
        assert!(matches!(result, Err(StampError::Pdf(_))));
    }
}
