use crate::core::error::StoryError;
use crate::core::story::{Illustration, Language, StoryResult};
use crate::utils::image::{aspect_ratio, load_image};
use crate::utils::text::{sanitize_file_name, wrap_text};
use anyhow::{anyhow, Result};
use image::DynamicImage;
use log::{debug, info, warn};
use printpdf::{
    BuiltinFont, Image, ImageTransform, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference,
    PdfLayerReference,
};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::time::Duration;

// A4, millimetres, origin at the bottom-left corner.
const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN_X: f32 = 20.0;
const CONTENT_WIDTH: f32 = 170.0;
const BOTTOM_MARGIN: f32 = 20.0;
const TITLE_TOP: f32 = 30.0;
const BODY_TOP: f32 = TITLE_TOP + 10.0;
const CAPTION_TOP: f32 = 20.0;

const TITLE_FONT_SIZE: f32 = 18.0;
const BODY_FONT_SIZE: f32 = 11.0;
const MIN_BODY_FONT_SIZE: f32 = 6.0;
const FONT_STEP: f32 = 0.5;
const CAPTION_FONT_SIZE: f32 = 12.0;
// 5 mm of leading at 11 pt.
const LINE_HEIGHT_PER_PT: f32 = 5.0 / 11.0;
const IMAGE_DPI: f32 = 300.0;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DocumentConfig {
    /// TrueType font used for every text run, e.g. for Devanagari stories.
    #[serde(default)]
    pub font_path: Option<String>,
    #[serde(default = "default_image_load_timeout")]
    pub image_load_timeout_secs: u64,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            font_path: None,
            image_load_timeout_secs: default_image_load_timeout(),
        }
    }
}

fn default_image_load_timeout() -> u64 {
    10
}

/// True when `language` needs glyphs the built-in Helvetica family lacks and
/// no external font is configured.
pub fn missing_script_font(language: Language, config: &DocumentConfig) -> bool {
    config.font_path.is_none() && language != Language::English
}

/// A finished PDF, ready to be written out.
#[derive(Debug, Clone)]
pub struct Document {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub page_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BodyLayout {
    pub font_size: f32,
    pub lines: Vec<String>,
    pub dropped_lines: usize,
}

impl BodyLayout {
    pub fn line_height(&self) -> f32 {
        self.font_size * LINE_HEIGHT_PER_PT
    }
}

fn lines_that_fit(font_size: f32) -> usize {
    let line_height = font_size * LINE_HEIGHT_PER_PT;
    let usable = PAGE_HEIGHT - BODY_TOP - BOTTOM_MARGIN;
    (usable / line_height).floor() as usize + 1
}

/// Wraps the story to the content width, shrinking the font until it fits
/// the front page. Lines that still overflow at the minimum size are dropped.
pub fn fit_body_text(text: &str) -> BodyLayout {
    let mut font_size = BODY_FONT_SIZE;
    loop {
        let mut lines = wrap_text(text, CONTENT_WIDTH, font_size);
        let capacity = lines_that_fit(font_size);
        if lines.len() <= capacity {
            return BodyLayout { font_size, lines, dropped_lines: 0 };
        }
        if font_size - FONT_STEP < MIN_BODY_FONT_SIZE {
            let dropped_lines = lines.len() - capacity;
            lines.truncate(capacity);
            return BodyLayout { font_size, lines, dropped_lines };
        }
        font_size -= FONT_STEP;
    }
}

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    italic: IndirectFontRef,
}

impl Fonts {
    fn load(doc: &PdfDocumentReference, external: Option<&[u8]>) -> Result<Self> {
        match external {
            Some(bytes) => {
                let font = doc
                    .add_external_font(Cursor::new(bytes))
                    .map_err(|e| anyhow!("Failed to load font: {:?}", e))?;
                Ok(Self {
                    regular: font.clone(),
                    bold: font.clone(),
                    italic: font,
                })
            }
            None => {
                let builtin = |font: BuiltinFont| {
                    doc.add_builtin_font(font)
                        .map_err(|e| anyhow!("Failed to load built-in font: {:?}", e))
                };
                Ok(Self {
                    regular: builtin(BuiltinFont::Helvetica)?,
                    bold: builtin(BuiltinFont::HelveticaBold)?,
                    italic: builtin(BuiltinFont::HelveticaOblique)?,
                })
            }
        }
    }
}

struct ImagePage<'a> {
    caption: String,
    image: Option<&'a DynamicImage>,
}

/// Builds the PDF: one front page with title and story, then one page per
/// illustration. An illustration whose image cannot be decoded within
/// `image_load_timeout_secs` keeps its page and caption but loses the image.
pub async fn assemble_document(
    title: &str,
    story: &StoryResult,
    illustrations: &[Illustration],
    config: &DocumentConfig,
) -> Result<Document, StoryError> {
    if story.is_empty() {
        return Err(StoryError::NothingToExport);
    }

    let limit = Duration::from_secs(config.image_load_timeout_secs);
    let mut decoded = Vec::with_capacity(illustrations.len());
    for illustration in illustrations {
        match load_image(illustration.image.clone(), limit).await {
            Ok(image) => decoded.push(Some(image)),
            Err(e) => {
                warn!(
                    "Error processing image for scene {}: {:#}",
                    illustration.scene_ordinal, e
                );
                decoded.push(None);
            }
        }
    }

    let font_bytes = match &config.font_path {
        Some(path) => Some(
            tokio::fs::read(path)
                .await
                .map_err(|e| StoryError::assembly(format!("Failed to read font {}: {}", path, e)))?,
        ),
        None => None,
    };

    let pages: Vec<ImagePage> = illustrations
        .iter()
        .zip(decoded.iter())
        .map(|(illustration, image)| ImagePage {
            caption: format!("Scene {}: {}", illustration.scene_ordinal, illustration.caption),
            image: image.as_ref(),
        })
        .collect();

    let (bytes, page_count) = render_pdf(title, &story.text, &pages, font_bytes.as_deref())
        .map_err(|e| StoryError::assembly(format!("{:#}", e)))?;

    info!("Assembled PDF with {} pages ({} bytes)", page_count, bytes.len());
    Ok(Document {
        file_name: format!("{}.pdf", sanitize_file_name(title)),
        bytes,
        page_count,
    })
}

fn render_pdf(
    title: &str,
    text: &str,
    pages: &[ImagePage],
    font_bytes: Option<&[u8]>,
) -> Result<(Vec<u8>, usize)> {
    let (doc, page, layer) =
        PdfDocument::new(title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Story");
    let fonts = Fonts::load(&doc, font_bytes)?;

    let front = doc.get_page(page).get_layer(layer);
    front.use_text(
        title,
        TITLE_FONT_SIZE,
        Mm(MARGIN_X),
        Mm(PAGE_HEIGHT - TITLE_TOP),
        &fonts.bold,
    );

    let body = fit_body_text(text);
    if body.dropped_lines > 0 {
        warn!(
            "Story does not fit the front page; dropped {} lines",
            body.dropped_lines
        );
    }
    debug!("Body text: {} lines at {}pt", body.lines.len(), body.font_size);
    let mut y = PAGE_HEIGHT - BODY_TOP;
    for line in &body.lines {
        front.use_text(line.as_str(), body.font_size, Mm(MARGIN_X), Mm(y), &fonts.regular);
        y -= body.line_height();
    }

    let mut page_count = 1;
    for (i, image_page) in pages.iter().enumerate() {
        let (page, layer) = doc.add_page(
            Mm(PAGE_WIDTH),
            Mm(PAGE_HEIGHT),
            format!("Illustration {}", i + 1),
        );
        page_count += 1;
        let layer = doc.get_page(page).get_layer(layer);

        let caption_line_height = CAPTION_FONT_SIZE * LINE_HEIGHT_PER_PT;
        let mut y = PAGE_HEIGHT - CAPTION_TOP;
        for line in wrap_text(&image_page.caption, CONTENT_WIDTH, CAPTION_FONT_SIZE) {
            layer.use_text(line, CAPTION_FONT_SIZE, Mm(MARGIN_X), Mm(y), &fonts.italic);
            y -= caption_line_height;
        }

        if let Some(image) = image_page.image {
            place_image(&layer, image, y - 5.0);
        }
    }

    let bytes = doc
        .save_to_bytes()
        .map_err(|e| anyhow!("Failed to serialize PDF: {:?}", e))?;
    Ok((bytes, page_count))
}

/// Draws `image` CONTENT_WIDTH wide with its top edge at `top`, shrinking it
/// if it would run past the bottom margin.
fn place_image(layer: &PdfLayerReference, image: &DynamicImage, top: f32) {
    let ratio = aspect_ratio(image);
    let mut width = CONTENT_WIDTH;
    let mut height = width / ratio;
    let available = top - BOTTOM_MARGIN;
    if height > available {
        height = available;
        width = height * ratio;
    }

    let native_width = image.width() as f32 / IMAGE_DPI * 25.4;
    let scale = if native_width > 0.0 { width / native_width } else { 1.0 };

    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    Image::from_dynamic_image(&rgb).add_to_layer(
        layer.clone(),
        ImageTransform {
            translate_x: Some(Mm(MARGIN_X)),
            translate_y: Some(Mm(top - height)),
            scale_x: Some(scale),
            scale_y: Some(scale),
            dpi: Some(IMAGE_DPI),
            ..Default::default()
        },
    );
}
