//! Builds the output PDF: one page per encoded raster, the image as its only content.

use lopdf::{dictionary, Document, Object, Stream};

use crate::errors::DomainResult;
use super::compressors::EncodedPage;
use super::types::PageEncoding;

/// Serialises encoded pages into an output document.
///
/// `measure` is the size measurement used by the search and inflation steps, so
/// implementations must report the length `assemble` would produce.
pub trait DocumentAssembler: Send + Sync {
    fn assemble(&self, pages: &[EncodedPage]) -> DomainResult<Vec<u8>>;

    fn measure(&self, pages: &[EncodedPage]) -> DomainResult<usize> {
        Ok(self.assemble(pages)?.len())
    }
}

/// lopdf-backed assembler
#[derive(Debug, Clone, Default)]
pub struct PdfAssembler;

impl DocumentAssembler for PdfAssembler {
    fn assemble(&self, pages: &[EncodedPage]) -> DomainResult<Vec<u8>> {
        let mut ordered: Vec<&EncodedPage> = pages.iter().collect();
        ordered.sort_by_key(|page| page.index);

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let mut kids = Vec::with_capacity(ordered.len());

        for page in ordered {
            let image_id = doc.add_object(Object::Stream(image_stream(page)));

            let content = format!("q {} 0 0 {} 0 0 cm /Im0 Do Q", page.width, page.height);
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));

            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), (page.width as i64).into(), (page.height as i64).into()],
                "Contents" => content_id,
                "Resources" => dictionary! {
                    "XObject" => dictionary! { "Im0" => image_id },
                },
            });
            kids.push(Object::Reference(page_id));
        }

        let count = kids.len() as i64;
        doc.objects.insert(pages_id, Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer)?;
        Ok(buffer)
    }
}

/// Image XObject for one page. JPEG bytes pass through as DCTDecode,
/// zlib samples as FlateDecode.
fn image_stream(page: &EncodedPage) -> Stream {
    let filter = match page.encoding {
        PageEncoding::Lossy { .. } => "DCTDecode",
        PageEncoding::Lossless { .. } => "FlateDecode",
    };
    let mut stream = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => page.width as i64,
            "Height" => page.height as i64,
            "ColorSpace" => page.color.color_space(),
            "BitsPerComponent" => 8,
            "Filter" => filter,
        },
        page.bytes.clone(),
    );
    // already encoded
    stream.allows_compression = false;
    stream
}
