use std::collections::BTreeMap;
use std::path::Path;

use lopdf::content::Operation;
use lopdf::{Document, Encoding, Object, ObjectId};
use thiserror::Error;
use tracing::debug;

use super::records::{GradeRecord, PageRecords};
use super::tokens::tokenize;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("failed to open PDF: {0}")]
    Open(String),

    #[error("failed to extract text from page {page}: {message}")]
    Page { page: usize, message: String },
}

/// An opened document that can hand out the raw text of each page.
pub trait PageSource {
    fn page_count(&self) -> usize;

    /// Raw extracted text of the zero-based page `index`.
    fn page_text(&self, index: usize) -> Result<String, ParseError>;
}

/// A report PDF loaded with lopdf.
pub struct PdfDocument {
    doc: Document,
    page_ids: Vec<ObjectId>,
}

impl PdfDocument {
    pub fn open(path: &Path) -> Result<Self, ParseError> {
        Document::load(path)
            .map(Self::from_document)
            .map_err(|e| ParseError::Open(e.to_string()))
    }

    #[cfg(test)]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ParseError> {
        Document::load_mem(bytes)
            .map(Self::from_document)
            .map_err(|e| ParseError::Open(e.to_string()))
    }

    fn from_document(doc: Document) -> Self {
        // get_pages is keyed by 1-based page number, already in order.
        let page_ids = doc.get_pages().into_values().collect();
        Self { doc, page_ids }
    }
}

impl PageSource for PdfDocument {
    fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    fn page_text(&self, index: usize) -> Result<String, ParseError> {
        let page_id = *self.page_ids.get(index).ok_or_else(|| ParseError::Page {
            page: index,
            message: "page out of range".to_string(),
        })?;
        let page_error = |e: lopdf::Error| ParseError::Page {
            page: index,
            message: e.to_string(),
        };
        let encodings = font_encodings(&self.doc, page_id).map_err(page_error)?;
        let content = self.doc.get_and_decode_page_content(page_id).map_err(page_error)?;
        Ok(shown_text(&content.operations, &encodings))
    }
}

fn font_encodings(doc: &Document, page_id: ObjectId) -> lopdf::Result<BTreeMap<Vec<u8>, Encoding<'_>>> {
    let fonts = doc.get_page_fonts(page_id)?;
    Ok(fonts
        .into_iter()
        .filter_map(|(name, font)| match font.get_font_encoding(doc) {
            Ok(encoding) => Some((name, encoding)),
            Err(e) => {
                debug!(font = %String::from_utf8_lossy(&name), "unreadable font encoding: {}", e);
                None
            }
        })
        .collect())
}

/// Page text with a line break after every text-showing operator.
///
/// Report tables set each cell with its own `Tj`, often several per
/// `BT`/`ET` block, so breaking only at `ET` would glue whole rows together.
/// `'` and `"` start a new line before their string; `T*` is a bare line break.
fn shown_text(operations: &[Operation], encodings: &BTreeMap<Vec<u8>, Encoding>) -> String {
    let mut text = String::new();
    let mut encoding = None;
    for operation in operations {
        let operands = &operation.operands;
        match operation.operator.as_str() {
            "Tf" => {
                encoding = operands
                    .first()
                    .and_then(|font| font.as_name().ok())
                    .and_then(|name| encodings.get(name));
            }
            "Tj" => {
                push_strings(&mut text, encoding, operands.first());
                text.push('\n');
            }
            "TJ" => {
                if let Some(Object::Array(items)) = operands.first() {
                    push_strings(&mut text, encoding, items);
                }
                text.push('\n');
            }
            "'" => {
                text.push('\n');
                push_strings(&mut text, encoding, operands.first());
            }
            "\"" => {
                text.push('\n');
                push_strings(&mut text, encoding, operands.get(2));
            }
            "T*" => text.push('\n'),
            _ => {}
        }
    }
    text
}

fn push_strings<'o>(
    text: &mut String,
    encoding: Option<&Encoding>,
    objects: impl IntoIterator<Item = &'o Object>,
) {
    for object in objects {
        if let Object::String(bytes, _) = object {
            // Fonts lopdf cannot map (or no Tf yet) fall back to raw bytes.
            let decoded = encoding
                .and_then(|encoding| Document::decode_text(encoding, bytes).ok())
                .unwrap_or_else(|| String::from_utf8_lossy(bytes).into_owned());
            text.push_str(&decoded);
        }
    }
}

/// Parse every page in order and flatten the records into one list.
pub fn parse_document<S: PageSource + ?Sized>(source: &S) -> Result<Vec<GradeRecord>, ParseError> {
    let mut records = Vec::new();
    for index in 0..source.page_count() {
        let text = source.page_text(index)?;
        let tokens = tokenize(&text);
        let mut page = PageRecords::new(&tokens);
        records.extend(page.by_ref());
        debug!(
            page = index,
            tokens = tokens.len(),
            style = ?page.style(),
            malformed = page.malformed(),
            total = records.len(),
            "parsed page"
        );
    }
    Ok(records)
}

/// Open and parse a report PDF from disk.
pub fn parse_pdf(path: &Path) -> Result<Vec<GradeRecord>, ParseError> {
    let doc = PdfDocument::open(path)?;
    parse_document(&doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::records::ParseStyle;
    use lopdf::content::Content;
    use lopdf::{dictionary, Stream};

    struct TextPages(Vec<String>);

    impl PageSource for TextPages {
        fn page_count(&self) -> usize {
            self.0.len()
        }

        fn page_text(&self, index: usize) -> Result<String, ParseError> {
            Ok(self.0[index].clone())
        }
    }

    struct BrokenPage;

    impl PageSource for BrokenPage {
        fn page_count(&self) -> usize {
            2
        }

        fn page_text(&self, index: usize) -> Result<String, ParseError> {
            Err(ParseError::Page {
                page: index,
                message: "bad content stream".to_string(),
            })
        }
    }

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}.txt", name)).unwrap()
    }

    const ROW_CELLS: [&str; 20] = [
        "CSCE-181-500", "10", "40.00%", "5", "20.00%", "3", "12.00%", "2", "8.00%", "1", "4.00%",
        "25", "2.867", "2", "1", "0", "0", "1", "29", "SMITH J",
    ];

    /// One-page PDF with a WinAnsi Helvetica font as `F1`.
    fn single_page_pdf(operations: Vec<Operation>) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    fn assert_one_row(bytes: &[u8]) {
        let doc = PdfDocument::from_bytes(bytes).unwrap();
        assert_eq!(doc.page_count(), 1);
        let records = parse_document(&doc).unwrap();
        assert_eq!(records.len(), 1);
        let rec = &records[0];
        assert_eq!(rec.dept, "CSCE");
        assert_eq!(rec.course_num, "181");
        assert_eq!(rec.section_num, "500");
        assert_eq!(rec.grades, ["10", "5", "3", "2", "1", "2", "1", "0", "0", "1"]);
        assert_eq!(rec.instructor_name, "SMITH J");
    }

    #[test]
    fn cells_in_one_text_block_stay_separate() {
        let mut ops = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 8.into()]),
            Operation::new("Td", vec![36.into(), 700.into()]),
        ];
        for cell in ROW_CELLS {
            ops.push(Operation::new("Tj", vec![Object::string_literal(cell)]));
            ops.push(Operation::new("Td", vec![28.into(), 0.into()]));
        }
        ops.push(Operation::new("ET", vec![]));

        let bytes = single_page_pdf(ops);
        let text = PdfDocument::from_bytes(&bytes).unwrap().page_text(0).unwrap();
        assert_eq!(tokenize(&text).len(), 21);
        assert_one_row(&bytes);
    }

    #[test]
    fn one_text_block_per_cell() {
        let mut ops = Vec::new();
        for (i, cell) in ROW_CELLS.iter().enumerate() {
            ops.push(Operation::new("BT", vec![]));
            ops.push(Operation::new("Tf", vec!["F1".into(), 8.into()]));
            ops.push(Operation::new("Td", vec![(36 + 28 * i as i64).into(), 700.into()]));
            ops.push(Operation::new("Tj", vec![Object::string_literal(*cell)]));
            ops.push(Operation::new("ET", vec![]));
        }
        assert_one_row(&single_page_pdf(ops));
    }

    #[test]
    fn tj_arrays_and_line_operators_break_cells() {
        let ops = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 8.into()]),
            Operation::new(
                "TJ",
                vec![Object::Array(vec![
                    Object::string_literal("CSCE-"),
                    (-20).into(),
                    Object::string_literal("181-500"),
                ])],
            ),
            Operation::new("T*", vec![]),
            Operation::new("'", vec![Object::string_literal("10")]),
            Operation::new("\"", vec![0.into(), 0.into(), Object::string_literal("40.00%")]),
            Operation::new("ET", vec![]),
        ];
        let bytes = single_page_pdf(ops);
        let text = PdfDocument::from_bytes(&bytes).unwrap().page_text(0).unwrap();
        assert_eq!(tokenize(&text), ["CSCE-181-500", "10", "40.00%"]);
    }

    #[test]
    fn pages_flatten_in_order() {
        let doc = TextPages(vec![fixture("new_style_page"), fixture("old_style_page")]);
        let records = parse_document(&doc).unwrap();
        assert_eq!(records.len(), 7);
        assert_eq!(records[0].dept, "CSCE");
        assert_eq!(records[3].section_num, "500");
        assert_eq!(records[4].dept, "ACCT");
        assert_eq!(records[6].instructor_name, "GARCIA L");
    }

    #[test]
    fn style_resets_each_page() {
        // An old-style page must not leak its offsets into the next page.
        let doc = TextPages(vec![fixture("old_style_page"), fixture("new_style_page")]);
        let records = parse_document(&doc).unwrap();
        assert_eq!(records.len(), 7);
        assert_eq!(records[3].dept, "CSCE");
        assert_eq!(records[3].instructor_name, "SMITH J");
        assert_eq!(records[3].grades[0], "30");
        assert_eq!(ParseStyle::default(), ParseStyle::New);
    }

    #[test]
    fn blank_pages_yield_nothing() {
        let doc = TextPages(vec![String::new(), "\n\n".to_string()]);
        assert!(parse_document(&doc).unwrap().is_empty());
    }

    #[test]
    fn page_error_propagates() {
        let err = parse_document(&BrokenPage).unwrap_err();
        assert!(matches!(err, ParseError::Page { page: 0, .. }));
    }

    #[test]
    fn garbage_bytes_fail_to_open() {
        let err = PdfDocument::from_bytes(b"this is not a pdf").err().unwrap();
        assert!(matches!(err, ParseError::Open(_)));
    }

    #[test]
    fn missing_file_fails_to_open() {
        let err = parse_pdf(Path::new("tests/fixtures/does_not_exist.pdf")).unwrap_err();
        assert!(matches!(err, ParseError::Open(_)));
    }
}
