//! PDF assembly on top of `printpdf`.

use image::DynamicImage;
use printpdf::{Image, ImageTransform, Mm, PdfDocument};
use tracing::debug;

use crate::application::export::{
    AssembleError, DocumentAssembler, DocumentBuilder, DocumentMetadata, DocumentSetup, PageImage,
};

/// Resolution page images are embedded at before scaling to their placement.
const EMBED_DPI: f32 = 300.0;
const MM_PER_INCH: f64 = 25.4;
const LAYER_NAME: &str = "Content";
/// Slack for floating-point placement arithmetic at the page edge.
const FIT_TOLERANCE_MM: f64 = 0.01;

#[derive(Debug, Clone, Copy, Default)]
pub struct PdfAssembler;

impl DocumentAssembler for PdfAssembler {
    fn begin(&self, setup: DocumentSetup) -> Box<dyn DocumentBuilder> {
        Box::new(PdfBuilder {
            setup,
            pages: Vec::new(),
        })
    }
}

/// A page image already encoded as a PDF image object, with its placement.
struct PreparedPage {
    image: Image,
    transform: ImageTransform,
}

/// Encodes each page as it arrives. The `printpdf` document is reference
/// counted and not `Send`, so it only exists inside `finish`.
struct PdfBuilder {
    setup: DocumentSetup,
    pages: Vec<PreparedPage>,
}

impl PdfBuilder {
    fn check_page(&self, page: &PageImage) -> Result<(), AssembleError> {
        if page.image.width() == 0 || page.image.height() == 0 {
            return Err(AssembleError::Page("page image is empty".to_string()));
        }
        let dimensions = [page.x_mm, page.y_mm, page.width_mm, page.height_mm];
        if dimensions.iter().any(|value| !value.is_finite()) {
            return Err(AssembleError::Page(
                "page placement is not finite".to_string(),
            ));
        }
        if page.width_mm <= 0.0 || page.height_mm <= 0.0 {
            return Err(AssembleError::Page(
                "page placement has no area".to_string(),
            ));
        }
        let right = page.x_mm + page.width_mm;
        let bottom = page.y_mm + page.height_mm;
        if page.x_mm < 0.0
            || page.y_mm < 0.0
            || right > self.setup.page_width_mm + FIT_TOLERANCE_MM
            || bottom > self.setup.page_height_mm + FIT_TOLERANCE_MM
        {
            return Err(AssembleError::Page(format!(
                "placement {:.1}x{:.1} mm at ({:.1}, {:.1}) falls outside the {:.1}x{:.1} mm page",
                page.width_mm,
                page.height_mm,
                page.x_mm,
                page.y_mm,
                self.setup.page_width_mm,
                self.setup.page_height_mm
            )));
        }
        Ok(())
    }
}

/// Transform drawing `page` at its top-left placement. PDF space grows
/// upwards from the bottom-left corner.
fn placement_transform(setup: &DocumentSetup, page: &PageImage) -> ImageTransform {
    let (pixel_width, pixel_height) = page.image.dimensions();
    let natural_width_mm = f64::from(pixel_width) * MM_PER_INCH / f64::from(EMBED_DPI);
    let natural_height_mm = f64::from(pixel_height) * MM_PER_INCH / f64::from(EMBED_DPI);
    let translate_y = setup.page_height_mm - page.y_mm - page.height_mm;

    ImageTransform {
        translate_x: Some(Mm(page.x_mm as f32)),
        translate_y: Some(Mm(translate_y as f32)),
        scale_x: Some((page.width_mm / natural_width_mm) as f32),
        scale_y: Some((page.height_mm / natural_height_mm) as f32),
        dpi: Some(EMBED_DPI),
        ..Default::default()
    }
}

impl DocumentBuilder for PdfBuilder {
    fn add_page(&mut self, page: PageImage) -> Result<(), AssembleError> {
        self.check_page(&page)?;
        let transform = placement_transform(&self.setup, &page);
        let image = Image::from_dynamic_image(&DynamicImage::ImageRgb8(page.image));
        self.pages.push(PreparedPage { image, transform });
        debug!(
            target = "infra::pdf",
            page = self.pages.len(),
            "Page image encoded"
        );
        Ok(())
    }

    fn page_count(&self) -> u32 {
        u32::try_from(self.pages.len()).unwrap_or(u32::MAX)
    }

    fn finish(self: Box<Self>, metadata: DocumentMetadata) -> Result<Vec<u8>, AssembleError> {
        let PdfBuilder { setup, pages } = *self;
        if pages.is_empty() {
            return Err(AssembleError::Page("document has no pages".to_string()));
        }

        let page_width = Mm(setup.page_width_mm as f32);
        let page_height = Mm(setup.page_height_mm as f32);
        let (document, first_page, first_layer) =
            PdfDocument::new(&metadata.title, page_width, page_height, LAYER_NAME);

        for (index, page) in pages.into_iter().enumerate() {
            let layer = if index == 0 {
                document.get_page(first_page).get_layer(first_layer)
            } else {
                let (page_index, layer_index) =
                    document.add_page(page_width, page_height, LAYER_NAME);
                document.get_page(page_index).get_layer(layer_index)
            };
            page.image.add_to_layer(layer, page.transform);
        }

        let mut document = document;
        if !metadata.author.is_empty() {
            document = document.with_author(metadata.author.as_str());
        }
        if !metadata.subject.is_empty() {
            document = document.with_subject(metadata.subject.as_str());
        }
        if !metadata.keywords.is_empty() {
            document = document.with_keywords(metadata.keywords);
        }

        document
            .save_to_bytes()
            .map_err(|err| AssembleError::Serialize(err.to_string()))
    }
}
