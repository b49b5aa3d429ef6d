//! QR embedding into PDF pages via lopdf document surgery.
//!
//! The QR bitmap becomes a DeviceGray image XObject registered in the
//! first page's resources; a small appended content stream draws it at
//! the converted placement coordinates.

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};

use crate::error::StampError;

use super::{QrPlacement, QR_RENDER_SIZE};
use super::qr::QrImage;

/// Resource name under which the QR XObject is registered.
const XOBJECT_NAME: &str = "QRStamp";

/// Fallback page size (US Letter) when no MediaBox is found.
const DEFAULT_PAGE_SIZE: (f64, f64) = (612.0, 792.0);

/// Embeds the rendered QR into the first page of `source` and returns
/// the serialized result.
pub fn embed_qr(
    source: &[u8],
    placement: &QrPlacement,
    qr: &QrImage,
) -> Result<Vec<u8>, StampError> {
    let mut doc =
        Document::load_mem(source).map_err(|e| StampError::PdfParsing(e.to_string()))?;

    let pages = doc.get_pages();
    let first_page = *pages.values().next().ok_or(StampError::NoPages)?;

    let (page_width, page_height) = page_size(&doc, first_page);
    let (x, y) = placement.to_page_coords(page_width, page_height);

    let image = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => qr.width as i64,
            "Height" => qr.height as i64,
            "ColorSpace" => "DeviceGray",
            "BitsPerComponent" => 8,
        },
        qr.pixels.clone(),
    );
    let image_id = doc.add_object(Object::Stream(image));

    attach_xobject(&mut doc, first_page, image_id)?;
    append_stamp_content(&mut doc, first_page, x, y)?;

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)
        .map_err(|e| StampError::Serialize(e.to_string()))?;
    Ok(buffer)
}

/// Reads the effective page size, walking the Pages tree for an
/// inherited MediaBox.
fn page_size(doc: &Document, page_id: ObjectId) -> (f64, f64) {
    let mut current = Some(page_id);
    let mut hops = 0;

    while let Some(id) = current {
        // Guard against malformed Parent cycles.
        if hops > 32 {
            break;
        }
        hops += 1;

        let dict = match doc.get_object(id).ok().and_then(|o| o.as_dict().ok()) {
            Some(dict) => dict,
            None => break,
        };
        if let Ok(obj) = dict.get(b"MediaBox") {
            if let Some(size) = media_box_size(doc, obj) {
                return size;
            }
        }
        current = dict.get(b"Parent").ok().and_then(|o| o.as_reference().ok());
    }

    DEFAULT_PAGE_SIZE
}

fn media_box_size(doc: &Document, obj: &Object) -> Option<(f64, f64)> {
    let rect: Vec<Object> = match obj {
        Object::Array(values) => values.clone(),
        Object::Reference(id) => doc.get_object(*id).ok()?.as_array().ok()?.clone(),
        _ => return None,
    };
    if rect.len() != 4 {
        return None;
    }
    let values: Vec<f64> = rect.iter().map(number).collect::<Option<Vec<_>>>()?;
    Some(((values[2] - values[0]).abs(), (values[3] - values[1]).abs()))
}

fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}

/// Registers the QR image in the page's resources. The effective
/// resource dictionary (own, referenced or inherited) is cloned onto
/// the page so shared dictionaries are left untouched.
fn attach_xobject(
    doc: &mut Document,
    page_id: ObjectId,
    image_id: ObjectId,
) -> Result<(), StampError> {
    let mut resources = effective_resources(doc, page_id);

    let mut xobjects = match resources.get(b"XObject") {
        Ok(existing) => resolve_dict(doc, existing).unwrap_or_default(),
        Err(_) => Dictionary::new(),
    };
    xobjects.set(XOBJECT_NAME, Object::Reference(image_id));
    resources.set("XObject", Object::Dictionary(xobjects));

    let page = doc
        .get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(|e| StampError::PdfParsing(e.to_string()))?;
    page.set("Resources", Object::Dictionary(resources));
    Ok(())
}

fn effective_resources(doc: &Document, page_id: ObjectId) -> Dictionary {
    let mut current = Some(page_id);
    let mut hops = 0;

    while let Some(id) = current {
        if hops > 32 {
            break;
        }
        hops += 1;

        let dict = match doc.get_object(id).ok().and_then(|o| o.as_dict().ok()) {
            Some(dict) => dict,
            None => break,
        };
        if let Ok(obj) = dict.get(b"Resources") {
            if let Some(resources) = resolve_dict(doc, obj) {
                return resources;
            }
        }
        current = dict.get(b"Parent").ok().and_then(|o| o.as_reference().ok());
    }

    Dictionary::new()
}

fn resolve_dict(doc: &Document, obj: &Object) -> Option<Dictionary> {
    match obj {
        Object::Dictionary(dict) => Some(dict.clone()),
        Object::Reference(id) => doc.get_object(*id).ok()?.as_dict().ok().cloned(),
        _ => None,
    }
}

/// Appends a content stream drawing the QR at `(x, y)`, preserving the
/// page's existing content.
fn append_stamp_content(
    doc: &mut Document,
    page_id: ObjectId,
    x: f64,
    y: f64,
) -> Result<(), StampError> {
    let operators = format!(
        "q\n{size:.2} 0 0 {size:.2} {x:.2} {y:.2} cm\n/{name} Do\nQ\n",
        size = QR_RENDER_SIZE,
        x = x,
        y = y,
        name = XOBJECT_NAME,
    );
    let stamp_id = doc.add_object(Object::Stream(Stream::new(
        dictionary! {},
        operators.into_bytes(),
    )));

    let existing = doc
        .get_object(page_id)
        .ok()
        .and_then(|o| o.as_dict().ok())
        .and_then(|dict| dict.get(b"Contents").ok())
        .cloned();

    let contents = match existing {
        None => Object::Reference(stamp_id),
        Some(Object::Reference(id)) => Object::Array(vec![
            Object::Reference(id),
            Object::Reference(stamp_id),
        ]),
        Some(Object::Array(mut streams)) => {
            streams.push(Object::Reference(stamp_id));
            Object::Array(streams)
        }
        // Direct stream objects get promoted to an indirect reference
        // so both streams can sit in a Contents array.
        Some(other) => {
            let promoted = doc.add_object(other);
            Object::Array(vec![Object::Reference(promoted), Object::Reference(stamp_id)])
        }
    };

    let page = doc
        .get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(|e| StampError::PdfParsing(e.to_string()))?;
    page.set("Contents", contents);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stamper::qr;

    /// Minimal single-page PDF with an explicit MediaBox.
    fn minimal_pdf(width: i64, height: i64) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let content = "BT /F1 12 Tf 50 700 Td (Certificate) Tj ET";
        let content_id = doc.add_object(Object::Stream(Stream::new(
            dictionary! {},
            content.as_bytes().to_vec(),
        )));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
            "Contents" => content_id,
        });

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
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

    fn test_qr() -> qr::QrImage {
        qr::render("http://localhost:5000/verify/C1").unwrap()
    }

    #[test]
    fn test_embed_produces_loadable_pdf() {
        let source = minimal_pdf(612, 792);
        let placement = QrPlacement::new(80.0, 10.0).unwrap();

        let stamped = embed_qr(&source, &placement, &test_qr()).unwrap();
        assert!(stamped.len() > source.len());

        let doc = Document::load_mem(&stamped).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn test_embed_registers_xobject_and_appends_content() {
        let source = minimal_pdf(612, 792);
        let placement = QrPlacement::new(50.0, 50.0).unwrap();
        let stamped = embed_qr(&source, &placement, &test_qr()).unwrap();

        let doc = Document::load_mem(&stamped).unwrap();
        let page_id = *doc.get_pages().values().next().unwrap();
        let page = doc.get_object(page_id).unwrap().as_dict().unwrap();

        let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
        let xobjects = resources.get(b"XObject").unwrap().as_dict().unwrap();
        assert!(xobjects.get(XOBJECT_NAME.as_bytes()).is_ok());

        // Original content stream plus the stamp stream.
        let contents = page.get(b"Contents").unwrap().as_array().unwrap();
        assert_eq!(contents.len(), 2);
    }

    #[test]
    fn test_page_size_from_media_box() {
        let source = minimal_pdf(500, 400);
        let doc = Document::load_mem(&source).unwrap();
        let page_id = *doc.get_pages().values().next().unwrap();
        assert_eq!(page_size(&doc, page_id), (500.0, 400.0));
    }

    #[test]
    fn test_corrupt_pdf_is_a_parse_error() {
        let placement = QrPlacement::new(50.0, 50.0).unwrap();
        let result = embed_qr(b"not a pdf", &placement, &test_qr());
        assert!(matches!(result, Err(StampError::PdfParsing(_))));
    }

    #[test]
    fn test_stamp_coordinates_land_in_content() {
        let source = minimal_pdf(612, 792);
        // 80% of 612 = 489.60, 10% of 792 = 79.20
        let placement = QrPlacement::new(80.0, 10.0).unwrap();
        let stamped = embed_qr(&source, &placement, &test_qr()).unwrap();

        let doc = Document::load_mem(&stamped).unwrap();
        let page_id = *doc.get_pages().values().next().unwrap();
        let content = doc.get_page_content(page_id).unwrap();
        let text = String::from_utf8_lossy(&content);
        assert!(text.contains("489.60"));
        assert!(text.contains("79.20"));
        assert!(text.contains("/QRStamp Do"));
    }
}
