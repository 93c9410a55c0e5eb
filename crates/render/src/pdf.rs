//! PDF backend built on `lopdf`
//!
//! Page sizes come from each page's MediaBox. Rasterization is limited to a
//! blank page with a border at the right pixel size, which is enough for the
//! layout and scheduling pipeline to be exercised end to end.

use crate::backend::{
    check_page, paint_blank_page, BackendError, DecodingBackend, OpenSource, OutlineEntry,
    PageDimensions, RenderRequest, RgbaImage,
};
use folio_scheduler::CancellationToken;
use image::Rgba;
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use std::fs;

pub struct LopdfBackend {
    document: Document,
    page_ids: Vec<ObjectId>,
}

impl LopdfBackend {
    pub fn open(source: impl Into<OpenSource>) -> Result<Self, BackendError> {
        let bytes = match source.into() {
            OpenSource::Path(path) => fs::read(path)?,
            OpenSource::Bytes(bytes) => bytes,
        };

        if bytes.windows("/Encrypt".len()).any(|window| window == b"/Encrypt") {
            return Err(BackendError::EncryptedUnsupported);
        }

        let document = Document::load_mem(&bytes)?;
        let page_ids: Vec<ObjectId> = document.get_pages().into_values().collect();
        if page_ids.is_empty() {
            return Err(BackendError::EmptyDocument);
        }

        tracing::debug!(pages = page_ids.len(), bytes = bytes.len(), "opened PDF document");
        Ok(Self { document, page_ids })
    }

    /// Page size from the MediaBox, inherited from the page tree if needed
    fn media_box(&self, page_id: ObjectId) -> Option<PageDimensions> {
        const MAX_TREE_DEPTH: usize = 64;

        let mut node = self.document.get_dictionary(page_id).ok()?;
        for _ in 0..MAX_TREE_DEPTH {
            if let Ok(value) = node.get(b"MediaBox") {
                return self.rectangle(value);
            }
            let parent = node.get(b"Parent").ok()?.as_reference().ok()?;
            node = self.document.get_dictionary(parent).ok()?;
        }
        None
    }

    fn rectangle(&self, value: &Object) -> Option<PageDimensions> {
        let (_, value) = self.document.dereference(value).ok()?;
        let array = value.as_array().ok()?;
        if array.len() != 4 {
            return None;
        }

        let mut corners = [0.0f32; 4];
        for (corner, item) in corners.iter_mut().zip(array) {
            let (_, item) = self.document.dereference(item).ok()?;
            *corner = item.as_float().ok()?;
        }
        let [x0, y0, x1, y1] = corners;
        Some(PageDimensions::new(f64::from((x1 - x0).abs()), f64::from((y1 - y0).abs())))
    }
}

impl DecodingBackend for LopdfBackend {
    fn page_count(&self) -> u32 {
        self.page_ids.len() as u32
    }

    fn page_dimensions(&self, page_index: u32) -> Result<PageDimensions, BackendError> {
        check_page(page_index, self.page_count())?;
        let page_id = self.page_ids[page_index as usize];
        Ok(self.media_box(page_id).unwrap_or_else(PageDimensions::fallback))
    }

    fn render_page(
        &self,
        request: RenderRequest,
        token: &CancellationToken,
    ) -> Result<RgbaImage, BackendError> {
        let dimensions = self.page_dimensions(request.page_index)?;
        let (width, height) = request.pixel_size(dimensions);
        paint_blank_page(width, height, Rgba([255, 255, 255, 255]), token)
    }

    fn outline(&self) -> Result<Vec<OutlineEntry>, BackendError> {
        let mut entries = Vec::new();
        let Ok(catalog) = self.document.catalog() else {
            return Ok(entries);
        };
        let Ok(outlines) = catalog.get(b"Outlines").and_then(Object::as_reference) else {
            return Ok(entries);
        };
        let first = self
            .document
            .get_dictionary(outlines)
            .ok()
            .and_then(|dict| dict.get(b"First").ok())
            .and_then(|object| object.as_reference().ok());
        self.collect_outline(first, 0, &mut entries);
        Ok(entries)
    }

    fn text_content(&self, page_index: u32) -> Result<String, BackendError> {
        check_page(page_index, self.page_count())?;
        Ok(self.document.extract_text(&[page_index + 1])?)
    }
}

impl LopdfBackend {
    fn collect_outline(&self, mut next: Option<ObjectId>, level: u32, entries: &mut Vec<OutlineEntry>) {
        const MAX_DEPTH: u32 = 32;

        // Outline items link siblings through /Next; guard against cycles.
        let mut visited = 0usize;
        while let Some(item_id) = next {
            visited += 1;
            if visited > self.document.objects.len() || level > MAX_DEPTH {
                break;
            }
            let Ok(item) = self.document.get_dictionary(item_id) else {
                break;
            };

            let title = item
                .get(b"Title")
                .ok()
                .and_then(|object| object.as_str().ok())
                .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
                .unwrap_or_default();
            let page_index = item
                .get(b"Dest")
                .ok()
                .and_then(|object| object.as_array().ok())
                .and_then(|dest| dest.first())
                .and_then(|target| target.as_reference().ok())
                .and_then(|target| self.page_ids.iter().position(|id| *id == target))
                .map(|index| index as u32);
            entries.push(OutlineEntry { title, page_index, level });

            let child = item.get(b"First").ok().and_then(|object| object.as_reference().ok());
            self.collect_outline(child, level + 1, entries);

            next = item.get(b"Next").ok().and_then(|object| object.as_reference().ok());
        }
    }
}

/// Build a blank PDF with one page per `(width, height)` in points
///
/// Used to produce fixture documents for experiments and tests.
pub fn build_blank_pdf(page_sizes: &[(u32, u32)]) -> Result<Vec<u8>, BackendError> {
    let mut document = Document::with_version("1.5");
    let pages_id = document.new_object_id();

    let mut kids: Vec<Object> = Vec::with_capacity(page_sizes.len());
    for &(width, height) in page_sizes {
        let content_id = document.add_object(Stream::new(dictionary! {}, Vec::new()));
        let page_id = document.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(i64::from(width)),
                Object::Integer(i64::from(height)),
            ],
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => page_sizes.len() as i64,
    };
    document.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = document.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    document.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    document.save_to(&mut bytes)?;
    Ok(bytes)
}
