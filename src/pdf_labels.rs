// src/pdf_labels.rs

use crate::config::PlacementConfig;
use crate::error::{LabelError, Result};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat, dictionary};
use tracing::{debug, info, warn};

/// Resource name the stamped number's font is registered under.
const STOP_FONT: &str = "StopNumberFont";

/// Guard against cyclic `Parent` chains in broken files.
const MAX_TREE_DEPTH: usize = 32;

/// US Letter, used when a page has no usable MediaBox.
const FALLBACK_MEDIA_BOX: PageBox = PageBox {
    x0: 0.0,
    y0: 0.0,
    width: 612.0,
    height: 792.0,
};

/// Page geometry in points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageBox {
    pub x0: f64,
    pub y0: f64,
    pub width: f64,
    pub height: f64,
}

/// One label page: where it lives in the document and what text it carries.
#[derive(Debug, Clone)]
pub struct LabelPage {
    pub id: ObjectId,
    pub text: String,
    pub media_box: PageBox,
}

/// Drawing instructions for a stop number, sized to one page.
#[derive(Debug, Clone)]
pub struct Overlay {
    pub page: PageBox,
    pub content: Content,
}

/// A label PDF opened for numbering.
pub struct LabelDocument {
    doc: Document,
    pages: Vec<LabelPage>,
    font_id: Option<ObjectId>,
}

impl LabelDocument {
    /// Parse the PDF and pull the text of every page.
    pub fn load_mem(pdf_bytes: &[u8]) -> Result<Self> {
        let doc = Document::load_mem(pdf_bytes)?;
        let page_ids: Vec<(u32, ObjectId)> = doc.get_pages().into_iter().collect();

        // --- Phase 1: pdf-extract, whole document at once ---
        let extracted = whole_document_text(page_ids.len(), || {
            pdf_extract::extract_text_from_mem_by_pages(pdf_bytes)
        });

        let mut pages = Vec::with_capacity(page_ids.len());
        for (idx, (number, id)) in page_ids.iter().enumerate() {
            // --- Phase 2: per-page lopdf extraction when phase 1 gave nothing ---
            let text = match &extracted {
                Some(texts) => texts[idx].clone(),
                None => doc.extract_text(&[*number]).unwrap_or_else(|e| {
                    warn!(page = number, error = %e, "Could not extract page text");
                    String::new()
                }),
            };
            if text.trim().is_empty() {
                warn!(page = number, "Page has no extractable text, likely a scanned label");
            }
            let media_box = page_box(&doc, *id).unwrap_or_else(|| {
                warn!(page = number, "No usable MediaBox, assuming US Letter");
                FALLBACK_MEDIA_BOX
            });
            pages.push(LabelPage {
                id: *id,
                text,
                media_box,
            });
        }

        info!(pages = pages.len(), "Loaded label PDF");
        Ok(Self {
            doc,
            pages,
            font_id: None,
        })
    }

    pub fn pages(&self) -> &[LabelPage] {
        &self.pages
    }

    pub fn page_texts(&self) -> Vec<&str> {
        self.pages.iter().map(|p| p.text.as_str()).collect()
    }

    /// Draw `text` on page `index` using `placement`.
    pub fn stamp(&mut self, index: usize, text: &str, placement: &PlacementConfig) -> Result<()> {
        let Some(page) = self.pages.get(index) else {
            return Ok(());
        };
        let (page_id, media_box) = (page.id, page.media_box);
        let overlay = render_overlay(media_box, text, placement);
        let font_id = self.font_id();
        composite_page(&mut self.doc, page_id, &overlay, font_id)
    }

    /// Serialize the (stamped) document.
    pub fn save_to_vec(mut self) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        self.doc
            .save_to(&mut output)
            .map_err(|e| LabelError::PdfWrite(e.to_string()))?;
        Ok(output)
    }

    fn font_id(&mut self) -> ObjectId {
        if let Some(id) = self.font_id {
            return id;
        }
        let id = self.doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica-Bold",
            "Encoding" => "WinAnsiEncoding",
        });
        self.font_id = Some(id);
        id
    }
}

/// Run a whole-document extractor, giving `None` when it fails, panics, or
/// disagrees with lopdf about the page count.
fn whole_document_text<E: std::fmt::Display>(
    expected_pages: usize,
    extract: impl FnOnce() -> std::result::Result<Vec<String>, E>,
) -> Option<Vec<String>> {
    // pdf-extract can panic on malformed PDFs; treat that like an error
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(extract)) {
        Ok(Ok(texts)) if texts.len() == expected_pages => Some(texts),
        Ok(Ok(texts)) => {
            warn!(
                extracted = texts.len(),
                pages = expected_pages,
                "pdf-extract page count differs, using lopdf text"
            );
            None
        }
        Ok(Err(e)) => {
            warn!(error = %e, "pdf-extract failed, using lopdf text");
            None
        }
        Err(_) => {
            warn!("pdf-extract panicked, using lopdf text");
            None
        }
    }
}

/// Lay out the stop number for a page of the given size.
///
/// `y_offset` counts down from the top edge; PDF user space counts up from
/// the bottom, so the baseline lands at `height - y_offset`.
pub fn render_overlay(page: PageBox, text: &str, placement: &PlacementConfig) -> Overlay {
    let placement = placement.clamped();
    let (r, g, b) = placement.color.rgb();
    let x = page.x0 + f64::from(placement.x_position);
    let y = page.y0 + page.height - f64::from(placement.y_offset);

    let operations = vec![
        Operation::new("q", vec![]),
        Operation::new("BT", vec![]),
        Operation::new(
            "Tf",
            vec![
                Object::Name(STOP_FONT.as_bytes().to_vec()),
                Object::Integer(i64::from(placement.font_size)),
            ],
        ),
        Operation::new(
            "rg",
            vec![Object::Real(r), Object::Real(g), Object::Real(b)],
        ),
        Operation::new("Td", vec![Object::Real(x as f32), Object::Real(y as f32)]),
        Operation::new(
            "Tj",
            vec![Object::String(text.as_bytes().to_vec(), StringFormat::Literal)],
        ),
        Operation::new("ET", vec![]),
        Operation::new("Q", vec![]),
    ];

    Overlay {
        page,
        content: Content { operations },
    }
}

/// Paint `overlay` on top of the page's existing content.
///
/// The original content streams are fenced with `q`/`Q` so whatever graphics
/// state they leave behind cannot shift or recolour the number.
pub fn composite_page(
    doc: &mut Document,
    page_id: ObjectId,
    overlay: &Overlay,
    font_id: ObjectId,
) -> Result<()> {
    debug!(
        width = overlay.page.width,
        height = overlay.page.height,
        "Compositing stop number overlay"
    );
    let existing = existing_contents(doc, page_id);
    let overlay_bytes = overlay.content.encode()?;

    let save_id = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
    let restore_id = doc.add_object(Stream::new(Dictionary::new(), b"\nQ\n".to_vec()));
    let overlay_id = doc.add_object(Stream::new(Dictionary::new(), overlay_bytes));

    let mut contents = Vec::with_capacity(existing.len() + 3);
    contents.push(Object::Reference(save_id));
    contents.extend(existing);
    contents.push(Object::Reference(restore_id));
    contents.push(Object::Reference(overlay_id));

    let resources = resources_with_font(doc, page_id, font_id);

    let page = doc.get_object_mut(page_id)?.as_dict_mut()?;
    page.set("Contents", Object::Array(contents));
    page.set("Resources", Object::Dictionary(resources));
    Ok(())
}

fn existing_contents(doc: &Document, page_id: ObjectId) -> Vec<Object> {
    let Some(contents) = doc
        .get_object(page_id)
        .and_then(Object::as_dict)
        .ok()
        .and_then(|page| page.get(b"Contents").ok())
    else {
        return Vec::new();
    };

    match contents {
        Object::Array(items) => items.clone(),
        Object::Reference(id) => match doc.get_object(*id) {
            Ok(Object::Array(items)) => items.clone(),
            _ => vec![Object::Reference(*id)],
        },
        _ => Vec::new(),
    }
}

/// The page's effective resources as an inline dictionary, with the stop
/// number font added. Inherited resources are copied down so other pages
/// sharing them are left untouched.
fn resources_with_font(doc: &Document, page_id: ObjectId, font_id: ObjectId) -> Dictionary {
    let mut resources = inherited(doc, page_id, b"Resources")
        .and_then(|r| resolve_dict(doc, &r))
        .unwrap_or_default();

    let mut fonts = resources
        .get(b"Font")
        .ok()
        .and_then(|f| resolve_dict(doc, f))
        .unwrap_or_default();
    fonts.set(STOP_FONT, Object::Reference(font_id));
    resources.set("Font", Object::Dictionary(fonts));
    resources
}

fn page_box(doc: &Document, page_id: ObjectId) -> Option<PageBox> {
    let media_box = inherited(doc, page_id, b"MediaBox")?;
    let values = match &media_box {
        Object::Array(items) => items.clone(),
        Object::Reference(id) => doc.get_object(*id).ok()?.as_array().ok()?.clone(),
        _ => return None,
    };
    let numbers: Vec<f64> = values.iter().filter_map(number).collect();
    let [x0, y0, x1, y1] = numbers.as_slice() else {
        return None;
    };
    let (width, height) = ((x1 - x0).abs(), (y1 - y0).abs());
    (width > 0.0 && height > 0.0).then_some(PageBox {
        x0: x0.min(*x1),
        y0: y0.min(*y1),
        width,
        height,
    })
}

/// Look `key` up on the page, then on its ancestors in the page tree.
fn inherited(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut current = page_id;
    for _ in 0..MAX_TREE_DEPTH {
        let dict = doc.get_object(current).ok()?.as_dict().ok()?;
        if let Ok(found) = dict.get(key) {
            return Some(found.clone());
        }
        current = dict.get(b"Parent").ok()?.as_reference().ok()?;
    }
    None
}

fn resolve_dict(doc: &Document, obj: &Object) -> Option<Dictionary> {
    match obj {
        Object::Dictionary(dict) => Some(dict.clone()),
        Object::Reference(id) => doc.get_object(*id).ok()?.as_dict().ok().cloned(),
        _ => None,
    }
}

fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(f64::from(*r)),
        _ => None,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::LabelColor;
    use pretty_assertions::assert_eq;

    /// Build a PDF whose pages each show one line of Helvetica text.
    pub(crate) fn label_pdf(page_lines: &[&str]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids = Vec::new();
        for line in page_lines {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![40.into(), 200.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*line)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(Object::Reference(page_id));
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 288.into(), 432.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap();
        buffer
    }

    #[test]
    fn test_extractor_panic_falls_back() {
        let panicking = whole_document_text(2, || -> std::result::Result<Vec<String>, String> {
            panic!("unsupported font encoding")
        });
        assert_eq!(panicking, None);

        let short = whole_document_text(2, || Ok::<_, String>(vec!["only one".to_string()]));
        assert_eq!(short, None);

        let good = whole_document_text(1, || Ok::<_, String>(vec!["Order 7".to_string()]));
        assert_eq!(good, Some(vec!["Order 7".to_string()]));
    }

    #[test]
    fn test_garbage_bytes() {
        assert!(LabelDocument::load_mem(b"this is not a pdf").is_err());
    }

    #[test]
    fn test_pages_text_and_inherited_media_box() {
        let pdf = label_pdf(&["Order #555 Ann", "Order 777 Bob"]);
        let doc = LabelDocument::load_mem(&pdf).unwrap();
        assert_eq!(doc.pages().len(), 2);
        assert!(doc.page_texts()[0].contains("#555"));
        assert!(doc.page_texts()[1].contains("777"));
        assert_eq!(
            doc.pages()[0].media_box,
            PageBox {
                x0: 0.0,
                y0: 0.0,
                width: 288.0,
                height: 432.0
            }
        );
    }

    #[test]
    fn test_overlay_position_counts_from_top() {
        let page = PageBox {
            x0: 0.0,
            y0: 0.0,
            width: 288.0,
            height: 432.0,
        };
        let placement = PlacementConfig {
            font_size: 72,
            x_position: 30,
            y_offset: 90,
            color: LabelColor::Green,
        };
        let overlay = render_overlay(page, "12", &placement);
        let ops = &overlay.content.operations;

        let operands = |name: &str| {
            ops.iter()
                .find(|op| op.operator == name)
                .map(|op| op.operands.iter().filter_map(number).collect::<Vec<f64>>())
                .unwrap()
        };
        assert_eq!(operands("Td"), vec![30.0, 342.0]);
        assert_eq!(operands("rg"), vec![0.0, 0.5, 0.0]);
        assert_eq!(operands("Tf"), vec![72.0]);
    }

    #[test]
    fn test_stamp_keeps_original_content_underneath() {
        let pdf = label_pdf(&["Order #555"]);
        let mut doc = LabelDocument::load_mem(&pdf).unwrap();
        doc.stamp(0, "7", &PlacementConfig::default()).unwrap();
        let bytes = doc.save_to_vec().unwrap();

        let reloaded = Document::load_mem(&bytes).unwrap();
        let (_, page_id) = reloaded.get_pages().into_iter().next().unwrap();
        let content = reloaded.get_page_content(page_id).unwrap();
        let text = String::from_utf8_lossy(&content);

        let original = text.find("(Order #555)").unwrap();
        let number = text.find("(7)").unwrap();
        assert!(text.trim_start().starts_with('q'));
        assert!(original < number);

        let page = reloaded.get_object(page_id).unwrap().as_dict().unwrap();
        let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
        let fonts = resources.get(b"Font").unwrap().as_dict().unwrap();
        assert!(fonts.has(STOP_FONT.as_bytes()));
        assert!(fonts.has(b"F1"));
    }

    #[test]
    fn test_stamp_out_of_range_page_is_ignored() {
        let pdf = label_pdf(&["Order #555"]);
        let mut doc = LabelDocument::load_mem(&pdf).unwrap();
        assert!(doc.stamp(5, "1", &PlacementConfig::default()).is_ok());
    }
}
