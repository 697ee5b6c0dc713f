use crate::generator::RenderOptions;
use crate::types::{ArticleSummary, NewsletterDocument, NewsletterError, Result};
use chrono::Local;
use printpdf::image_crate::{self, DynamicImage, GenericImageView};
use printpdf::{
    BuiltinFont, Image, ImageTransform, IndirectFontRef, Line, Mm, PdfDocument, PdfDocumentReference,
    PdfLayerIndex, PdfLayerReference, PdfPageIndex, Point,
};
use std::collections::HashMap;
use tracing::{debug, warn};

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 20.0;
const CONTENT_WIDTH: f32 = PAGE_WIDTH - 2.0 * MARGIN;
const MAX_IMAGE_WIDTH_MM: f32 = 120.0;
const MAX_IMAGE_HEIGHT_MM: f32 = 90.0;
const MAX_IMAGE_PIXELS: u64 = 25_000_000;
const PT_TO_MM: f32 = 0.3528;

const TITLE_SIZE: f32 = 20.0;
const SECTION_SIZE: f32 = 15.0;
const ARTICLE_SIZE: f32 = 12.0;
const BODY_SIZE: f32 = 10.0;

/// A rendered PDF plus the article images left out of it.
#[derive(Debug, Clone)]
pub struct PdfRender {
    pub bytes: Vec<u8>,
    pub omitted_images: Vec<String>,
}

/// Lay the document out on A4 pages with the built-in Helvetica fonts.
///
/// `images` maps image URLs to bytes downloaded beforehand. An image that is
/// missing, undecodable, larger than `max_image_bytes` or above 25
/// megapixels is skipped for its article only and listed in
/// [`PdfRender::omitted_images`].
pub fn render_pdf(
    document: &NewsletterDocument,
    options: &RenderOptions,
    images: &HashMap<String, Vec<u8>>,
    max_image_bytes: usize,
) -> Result<PdfRender> {
    let mut writer = PdfWriter::new(&document.title)?;
    let mut omitted_images = Vec::new();

    writer.text_block(&document.title, TITLE_SIZE, true, 0.0);
    if !document.subtitle.trim().is_empty() {
        writer.text_block(&document.subtitle, ARTICLE_SIZE, false, 0.0);
    }
    let generated = document.generated_at.with_timezone(&Local).format("%Y-%m-%d %H:%M");
    writer.text_block(&format!("Generated on: {}", generated), BODY_SIZE, false, 0.0);
    writer.gap(4.0);

    if let Some(introduction) = document.introduction.as_deref().filter(|text| !text.trim().is_empty()) {
        writer.text_block("Introduction", SECTION_SIZE, true, 0.0);
        writer.text_block(introduction, BODY_SIZE, false, 0.0);
        writer.gap(4.0);
    }

    for group in &document.categories {
        writer.text_block(&group.name, SECTION_SIZE, true, 0.0);
        writer.gap(1.0);
        for article in &group.articles {
            if let Some(url) = render_article(&mut writer, article, options, images, max_image_bytes) {
                omitted_images.push(url);
            }
        }
    }

    writer.text_block("Your Interests", SECTION_SIZE, true, 0.0);
    if document.interests.is_empty() {
        writer.text_block("- General news", BODY_SIZE, false, 4.0);
    }
    for interest in &document.interests {
        writer.text_block(&format!("- {}", interest), BODY_SIZE, false, 4.0);
    }

    let bytes = writer.finish()?;
    debug!("Rendered PDF: {} bytes, {} images omitted", bytes.len(), omitted_images.len());
    Ok(PdfRender { bytes, omitted_images })
}

/// Returns the image URL when the article's image had to be left out.
fn render_article(
    writer: &mut PdfWriter,
    article: &ArticleSummary,
    options: &RenderOptions,
    images: &HashMap<String, Vec<u8>>,
    max_image_bytes: usize,
) -> Option<String> {
    let reference = &article.reference;
    writer.text_block(&reference.title, ARTICLE_SIZE, true, 0.0);

    let byline = match reference.published_at {
        Some(published) => format!("{} | {}", reference.source, published.format("%Y-%m-%d")),
        None => reference.source.clone(),
    };
    writer.text_block(&byline, BODY_SIZE - 1.0, false, 0.0);

    let mut omitted = None;
    if options.include_images {
        if let Some(url) = &article.image_url {
            let placed = match images.get(url) {
                Some(bytes) => match decode_image(bytes, max_image_bytes) {
                    Ok(image) => {
                        writer.image(&image);
                        true
                    }
                    Err(reason) => {
                        warn!("Omitting image {} from PDF: {}", url, reason);
                        false
                    }
                },
                None => {
                    warn!("Omitting image {} from PDF: not downloaded", url);
                    false
                }
            };
            if !placed {
                omitted = Some(url.clone());
            }
        }
    }

    writer.text_block(&article.summary, BODY_SIZE, false, 0.0);

    if options.include_key_points && !article.key_points.is_empty() {
        writer.text_block("Key Points:", BODY_SIZE, true, 0.0);
        for point in &article.key_points {
            writer.text_block(&format!("- {}", point), BODY_SIZE, false, 4.0);
        }
    }

    if options.include_quotes {
        for quote in &article.quotes {
            writer.text_block(&format!("\"{}\"", quote.trim().trim_matches('"')), BODY_SIZE, false, 8.0);
        }
    }

    if options.include_links {
        writer.text_block(&format!("Read full article: {}", reference.url), BODY_SIZE - 1.0, false, 0.0);
    }

    writer.separator();
    omitted
}

/// Decode image bytes, enforcing the byte and pixel budgets.
pub fn decode_image(bytes: &[u8], max_image_bytes: usize) -> std::result::Result<DynamicImage, String> {
    if bytes.len() > max_image_bytes {
        return Err(format!("{} bytes exceeds the {} byte limit", bytes.len(), max_image_bytes));
    }
    let image = image_crate::load_from_memory(bytes).map_err(|e| format!("undecodable image: {}", e))?;
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err("empty image".to_string());
    }
    if width as u64 * height as u64 > MAX_IMAGE_PIXELS {
        return Err(format!("{}x{} pixels exceeds the pixel limit", width, height));
    }
    // Alpha channels are flattened; the PDF image stream takes plain RGB.
    Ok(DynamicImage::ImageRgb8(image.to_rgb8()))
}

/// Characters outside Latin-1 that WinAnsiEncoding still covers.
const WIN_ANSI_EXTRAS: &[char] = &[
    '\u{20ac}', '\u{201a}', '\u{0192}', '\u{201e}', '\u{2026}', '\u{2020}', '\u{2021}', '\u{02c6}',
    '\u{2030}', '\u{0160}', '\u{2039}', '\u{0152}', '\u{017d}', '\u{2018}', '\u{2019}', '\u{201c}',
    '\u{201d}', '\u{2022}', '\u{2013}', '\u{2014}', '\u{02dc}', '\u{2122}', '\u{0161}', '\u{203a}',
    '\u{0153}', '\u{017e}', '\u{0178}',
];

/// Reduce text to the WinAnsi character set the built-in fonts are
/// encoded with. Anything else becomes `?`.
pub fn sanitize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\t' | '\n' | '\r' | '\u{a0}' => out.push(' '),
            '\u{2032}' => out.push('\''),
            '\u{2033}' => out.push('"'),
            '\u{2212}' | '\u{2010}' | '\u{2011}' => out.push('-'),
            c if c.is_ascii() && !c.is_ascii_control() => out.push(c),
            '\u{a1}'..='\u{ff}' => out.push(c),
            c if WIN_ANSI_EXTRAS.contains(&c) => out.push(c),
            c if c.is_whitespace() => out.push(' '),
            _ => out.push('?'),
        }
    }
    out
}

/// Greedy word wrap for a proportional font approximated by an average
/// glyph width of half the font size.
pub fn wrap_text(text: &str, font_size: f32, width_mm: f32) -> Vec<String> {
    let char_width = font_size * PT_TO_MM * 0.5;
    let max_chars = ((width_mm / char_width).floor() as usize).max(10);

    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let mut word = word.to_string();
        while word.chars().count() > max_chars {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let head: String = word.chars().take(max_chars).collect();
            word = word.chars().skip(max_chars).collect();
            lines.push(head);
        }
        let word_chars = word.chars().count();
        let current_chars = current.chars().count();
        let needed = if current.is_empty() { word_chars } else { current_chars + 1 + word_chars };
        if needed > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

struct PdfWriter {
    doc: PdfDocumentReference,
    page: PdfPageIndex,
    layer: PdfLayerIndex,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    cursor_y: f32,
    page_count: usize,
}

impl PdfWriter {
    fn new(title: &str) -> Result<Self> {
        let (doc, page, layer) = PdfDocument::new(sanitize_text(title), Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
        let regular = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| NewsletterError::Pdf(format!("{:?}", e)))?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| NewsletterError::Pdf(format!("{:?}", e)))?;

        Ok(Self {
            doc,
            page,
            layer,
            regular,
            bold,
            cursor_y: PAGE_HEIGHT - MARGIN,
            page_count: 1,
        })
    }

    fn layer(&self) -> PdfLayerReference {
        self.doc.get_page(self.page).get_layer(self.layer)
    }

    fn ensure_space(&mut self, height: f32) {
        if self.cursor_y - height >= MARGIN {
            return;
        }
        self.page_count += 1;
        let (page, layer) = self
            .doc
            .add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), format!("Layer {}", self.page_count));
        self.page = page;
        self.layer = layer;
        self.cursor_y = PAGE_HEIGHT - MARGIN;
    }

    fn gap(&mut self, height: f32) {
        self.cursor_y -= height;
    }

    fn text_block(&mut self, text: &str, font_size: f32, bold: bool, indent: f32) {
        let line_height = font_size * PT_TO_MM * 1.4;
        let font = if bold { self.bold.clone() } else { self.regular.clone() };

        for line in wrap_text(&sanitize_text(text), font_size, CONTENT_WIDTH - indent) {
            self.ensure_space(line_height);
            self.cursor_y -= line_height;
            self.layer()
                .use_text(line, font_size, Mm(MARGIN + indent), Mm(self.cursor_y), &font);
        }
        self.cursor_y -= line_height * 0.4;
    }

    fn image(&mut self, image: &DynamicImage) {
        let (width_px, height_px) = image.dimensions();
        let dpi = 300.0_f32
            .max(width_px as f32 * 25.4 / MAX_IMAGE_WIDTH_MM)
            .max(height_px as f32 * 25.4 / MAX_IMAGE_HEIGHT_MM);
        let height_mm = height_px as f32 * 25.4 / dpi;

        self.ensure_space(height_mm + 2.0);
        self.cursor_y -= height_mm;
        Image::from_dynamic_image(image).add_to_layer(
            self.layer(),
            ImageTransform {
                translate_x: Some(Mm(MARGIN)),
                translate_y: Some(Mm(self.cursor_y)),
                dpi: Some(dpi),
                ..Default::default()
            },
        );
        self.cursor_y -= 3.0;
    }

    fn separator(&mut self) {
        self.ensure_space(6.0);
        self.cursor_y -= 2.0;
        let line = Line {
            points: vec![
                (Point::new(Mm(MARGIN), Mm(self.cursor_y)), false),
                (Point::new(Mm(PAGE_WIDTH - MARGIN), Mm(self.cursor_y)), false),
            ],
            is_closed: false,
        };
        self.layer().add_line(line);
        self.cursor_y -= 4.0;
    }

    fn finish(self) -> Result<Vec<u8>> {
        self.doc
            .save_to_bytes()
            .map_err(|e| NewsletterError::Pdf(format!("{:?}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NewsletterConfig;
    use crate::generator::build_document;
    use crate::types::{ArticleReference, CategoryGroup, UserProfile};
    use chrono::Utc;
    use printpdf::image_crate::{ImageOutputFormat, RgbImage};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = DynamicImage::ImageRgb8(RgbImage::new(width, height));
        let mut bytes = Cursor::new(Vec::new());
        image.write_to(&mut bytes, ImageOutputFormat::Png).unwrap();
        bytes.into_inner()
    }

    fn article(title: &str, image_url: Option<&str>) -> ArticleSummary {
        ArticleSummary {
            reference: ArticleReference {
                url: format!("https://example.com/{}", title),
                title: title.to_string(),
                source: "Example".to_string(),
                published_at: None,
                position: 0,
                feed_summary: None,
                feed_image_url: None,
                category_hint: None,
            },
            image_url: image_url.map(str::to_string),
            summary: "A summary \u{201c}with curly quotes\u{201d} and an ellipsis\u{2026}".repeat(5),
            key_points: vec!["Point".to_string()],
            quotes: vec!["Quoted words".to_string()],
            relevance: 1.0,
            matched_interests: Vec::new(),
            degraded: false,
        }
    }

    #[test]
    fn test_sanitize_text_keeps_win_ansi() {
        assert_eq!(sanitize_text("Caf\u{e9} in Z\u{fc}rich, na\u{ef}ve r\u{e9}sum\u{e9}"), "Caf\u{e9} in Z\u{fc}rich, na\u{ef}ve r\u{e9}sum\u{e9}");
        assert_eq!(
            sanitize_text("\u{201c}Hi\u{201d} \u{2014} 5\u{20ac}\u{2026}"),
            "\u{201c}Hi\u{201d} \u{2014} 5\u{20ac}\u{2026}"
        );
        assert_eq!(sanitize_text("tab\there\u{a0}x \u{2212}1"), "tab here x -1");
        assert_eq!(sanitize_text("\u{65e5}\u{672c} \u{1f600}"), "?? ?");
    }

    #[test]
    fn test_accented_text_renders() {
        let mut story = article("na\u{ef}ve r\u{e9}sum\u{e9}", None);
        story.summary = "Caf\u{e9} in Z\u{fc}rich \u{2014} \u{201c}gr\u{fc}\u{df} dich\u{201d}".to_string();
        let document = build_document(
            &NewsletterConfig::default(),
            &UserProfile::new("t", vec!["caf\u{e9}".to_string()]),
            vec![CategoryGroup { name: "Welt".to_string(), articles: vec![story] }],
            None,
            Utc::now(),
        );
        let render = render_pdf(&document, &RenderOptions::default(), &HashMap::new(), 1024).unwrap();
        assert!(render.bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn test_wrap_text_respects_width() {
        let text = "word ".repeat(100);
        let lines = wrap_text(&text, BODY_SIZE, 50.0);
        let max_chars = (50.0 / (BODY_SIZE * PT_TO_MM * 0.5)).floor() as usize;
        assert!(lines.len() > 1);
        assert!(lines.iter().all(|line| line.len() <= max_chars));

        let long = "x".repeat(300);
        assert!(wrap_text(&long, BODY_SIZE, 50.0).iter().all(|line| line.len() <= max_chars));
    }

    #[test]
    fn test_decode_image_limits() {
        let png = png_bytes(4, 4);
        assert!(decode_image(&png, 1024 * 1024).is_ok());
        assert!(decode_image(&png, 10).is_err());
        assert!(decode_image(b"not an image", 1024).is_err());
    }

    #[test]
    fn test_render_pdf_omits_bad_images_only() {
        let mut images = HashMap::new();
        images.insert("https://img.example.com/good.png".to_string(), png_bytes(8, 8));
        images.insert("https://img.example.com/bad.png".to_string(), b"garbage".to_vec());

        let articles = vec![
            article("good", Some("https://img.example.com/good.png")),
            article("bad", Some("https://img.example.com/bad.png")),
            article("missing", Some("https://img.example.com/missing.png")),
        ];
        let document = build_document(
            &NewsletterConfig::default(),
            &UserProfile::new("t", vec!["rust".to_string()]),
            vec![CategoryGroup { name: "Technology".to_string(), articles }],
            Some("Intro".to_string()),
            Utc::now(),
        );

        let render = render_pdf(&document, &RenderOptions::default(), &images, 1024 * 1024).unwrap();
        assert!(render.bytes.starts_with(b"%PDF"));
        assert_eq!(
            render.omitted_images,
            vec!["https://img.example.com/bad.png", "https://img.example.com/missing.png"]
        );
    }

    #[test]
    fn test_render_pdf_spans_pages() {
        let articles = (0..40).map(|i| article(&format!("article-{}", i), None)).collect();
        let document = build_document(
            &NewsletterConfig::default(),
            &UserProfile::new("t", Vec::new()),
            vec![CategoryGroup { name: "General".to_string(), articles }],
            None,
            Utc::now(),
        );
        let render = render_pdf(&document, &RenderOptions::default(), &HashMap::new(), 1024).unwrap();
        assert!(render.bytes.starts_with(b"%PDF"));
        assert!(render.omitted_images.is_empty());
    }
}
