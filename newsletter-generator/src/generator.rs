use crate::config::{NewsletterConfig, SummarizationConfig};
use crate::types::{ArticleSummary, CategoryGroup, NewsletterDocument, OutputFormat, Result, UserProfile};
use chrono::{DateTime, Local, Utc};
use std::fmt::Write as _;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const FALLBACK_DATE_FORMAT: &str = "%Y-%m-%d";

/// Which optional blocks appear for each article.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    pub include_images: bool,
    pub include_quotes: bool,
    pub include_links: bool,
    pub include_key_points: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            include_images: true,
            include_quotes: true,
            include_links: true,
            include_key_points: true,
        }
    }
}

impl RenderOptions {
    pub fn from_config(newsletter: &NewsletterConfig, summarization: &SummarizationConfig) -> Self {
        Self {
            include_images: newsletter.include_images,
            include_quotes: newsletter.include_quotes && summarization.include_quotes,
            include_links: newsletter.include_links,
            include_key_points: summarization.include_key_points,
        }
    }
}

pub fn build_document(
    newsletter: &NewsletterConfig,
    profile: &UserProfile,
    groups: Vec<CategoryGroup>,
    introduction: Option<String>,
    generated_at: DateTime<Utc>,
) -> NewsletterDocument {
    NewsletterDocument {
        title: newsletter.title.clone(),
        subtitle: newsletter.subtitle.clone(),
        generated_at,
        introduction,
        categories: groups,
        profile_name: profile.name.clone(),
        interests: profile.interests.clone(),
    }
}

/// Render the newsletter skeleton: header, optional introduction, one
/// section per category, closing interests section.
pub fn render_markdown(document: &NewsletterDocument, options: &RenderOptions) -> String {
    let mut out = String::new();
    let generated = document.generated_at.with_timezone(&Local);

    let _ = writeln!(out, "# {}\n", document.title);
    if !document.subtitle.trim().is_empty() {
        let _ = writeln!(out, "*{}*\n", document.subtitle);
    }
    let _ = writeln!(out, "*Generated on: {}*\n", generated.format("%Y-%m-%d %H:%M"));

    if let Some(introduction) = document.introduction.as_deref().filter(|text| !text.trim().is_empty()) {
        let _ = writeln!(out, "## Introduction\n\n{}\n", introduction.trim());
    }

    for group in &document.categories {
        let _ = writeln!(out, "## {}\n", group.name);
        for article in &group.articles {
            render_article(&mut out, article, options);
        }
    }

    out.push_str("## Your Interests\n\n");
    if document.interests.is_empty() {
        out.push_str("- General news\n");
    } else {
        for interest in &document.interests {
            let _ = writeln!(out, "- {}", interest);
        }
    }

    out
}

fn render_article(out: &mut String, article: &ArticleSummary, options: &RenderOptions) {
    let reference = &article.reference;

    if options.include_links {
        let _ = writeln!(out, "### [{}]({})\n", escape_link_text(&reference.title), reference.url);
    } else {
        let _ = writeln!(out, "### {}\n", reference.title);
    }

    match reference.published_at {
        Some(published) => {
            let _ = writeln!(out, "*{} | {}*\n", reference.source, published.format("%Y-%m-%d"));
        }
        None => {
            let _ = writeln!(out, "*{}*\n", reference.source);
        }
    }

    if options.include_images {
        if let Some(image_url) = &article.image_url {
            let _ = writeln!(out, "![{}]({})\n", escape_link_text(&reference.title), image_url);
        }
    }

    let _ = writeln!(out, "{}\n", article.summary.trim());

    if options.include_key_points && !article.key_points.is_empty() {
        out.push_str("**Key Points:**\n");
        for point in &article.key_points {
            let _ = writeln!(out, "- {}", point.trim());
        }
        out.push('\n');
    }

    if options.include_quotes {
        for quote in &article.quotes {
            let _ = writeln!(out, "> \"{}\"\n", quote.trim().trim_matches('"'));
        }
    }

    if options.include_links {
        let _ = writeln!(out, "[Read full article]({})\n", reference.url);
    }

    out.push_str("---\n\n");
}

fn escape_link_text(text: &str) -> String {
    text.replace('[', "\\[").replace(']', "\\]")
}

/// `newsletter_<date>.<ext>`, with the date in local time. An unusable
/// date format falls back to `%Y-%m-%d`.
pub fn output_file_name(generated_at: DateTime<Utc>, date_format: &str, format: OutputFormat) -> String {
    let local = generated_at.with_timezone(&Local);

    let mut date = String::new();
    if write!(date, "{}", local.format(date_format)).is_err() || date.trim().is_empty() {
        warn!("Invalid date format {:?}, using {}", date_format, FALLBACK_DATE_FORMAT);
        date.clear();
        let _ = write!(date, "{}", local.format(FALLBACK_DATE_FORMAT));
    }

    let date: String = date
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') || c.is_whitespace() { '-' } else { c })
        .collect();
    format!("newsletter_{}.{}", date, format.extension())
}

/// Write `bytes` to `path` through a temporary sibling and a rename, so a
/// reader never sees a half-written file. Overwrites an existing file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = temp_sibling(path);
    let written = fs::File::create(&tmp_path).and_then(|mut file| {
        file.write_all(bytes)?;
        file.sync_all()
    });

    if let Err(e) = written.and_then(|_| fs::rename(&tmp_path, path)) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }

    debug!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "newsletter".to_string());
    path.with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()))
}

/// One rendered document ready to be written
#[derive(Debug, Clone)]
pub struct RenderedOutput {
    pub format: OutputFormat,
    pub bytes: Vec<u8>,
}

/// Write every rendered output into `output_dir`. Returns the written paths
/// and the formats that could not be written.
pub fn write_outputs(
    output_dir: &Path,
    generated_at: DateTime<Utc>,
    date_format: &str,
    outputs: &[RenderedOutput],
) -> (Vec<(OutputFormat, PathBuf)>, Vec<(OutputFormat, String)>) {
    let mut written = Vec::new();
    let mut failed = Vec::new();

    for output in outputs {
        let path = output_dir.join(output_file_name(generated_at, date_format, output.format));
        match write_atomic(&path, &output.bytes) {
            Ok(()) => {
                info!("Saved {} newsletter to {}", output.format, path.display());
                written.push((output.format, path));
            }
            Err(e) => {
                warn!("Failed to save {} newsletter to {}: {}", output.format, path.display(), e);
                failed.push((output.format, e.to_string()));
            }
        }
    }

    (written, failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ArticleReference;
    use chrono::TimeZone;

    fn summary(title: &str, url: &str) -> ArticleSummary {
        ArticleSummary {
            reference: ArticleReference {
                url: url.to_string(),
                title: title.to_string(),
                source: "Example News".to_string(),
                published_at: Some(Utc.with_ymd_and_hms(2025, 1, 6, 12, 0, 0).unwrap()),
                position: 0,
                feed_summary: None,
                feed_image_url: None,
                category_hint: None,
            },
            image_url: Some("https://example.com/a.jpg".to_string()),
            summary: "A short summary.".to_string(),
            key_points: vec!["First point".to_string()],
            quotes: vec!["A quote worth repeating here".to_string()],
            relevance: 1.0,
            matched_interests: Vec::new(),
            degraded: false,
        }
    }

    fn document() -> NewsletterDocument {
        let profile = UserProfile::new("tester", vec!["rust".to_string(), "space".to_string()]);
        build_document(
            &NewsletterConfig::default(),
            &profile,
            vec![CategoryGroup {
                name: "Technology".to_string(),
                articles: vec![summary("Rust [1.80] ships", "https://example.com/rust")],
            }],
            Some("Hello readers.".to_string()),
            Utc.with_ymd_and_hms(2025, 1, 6, 12, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_render_markdown_full_skeleton() {
        let markdown = render_markdown(&document(), &RenderOptions::default());

        assert!(markdown.starts_with("# Daily Tech Digest\n\n*Your Personalized News Summary*\n\n*Generated on: "));
        assert!(markdown.contains("## Introduction\n\nHello readers.\n"));
        assert!(markdown.contains("## Technology\n\n### [Rust \\[1.80\\] ships](https://example.com/rust)\n"));
        assert!(markdown.contains("*Example News | 2025-01-06*\n"));
        assert!(markdown.contains("![Rust \\[1.80\\] ships](https://example.com/a.jpg)"));
        assert!(markdown.contains("**Key Points:**\n- First point\n"));
        assert!(markdown.contains("> \"A quote worth repeating here\"\n"));
        assert!(markdown.contains("[Read full article](https://example.com/rust)\n\n---\n"));
        assert!(markdown.ends_with("## Your Interests\n\n- rust\n- space\n"));

        let intro = markdown.find("## Introduction").unwrap();
        let section = markdown.find("## Technology").unwrap();
        let interests = markdown.find("## Your Interests").unwrap();
        assert!(intro < section && section < interests);
    }

    #[test]
    fn test_render_markdown_respects_options() {
        let options = RenderOptions {
            include_images: false,
            include_quotes: false,
            include_links: false,
            include_key_points: false,
        };
        let mut document = document();
        document.introduction = None;
        let markdown = render_markdown(&document, &options);

        assert!(markdown.contains("### Rust [1.80] ships\n"));
        assert!(!markdown.contains("## Introduction"));
        assert!(!markdown.contains("!["));
        assert!(!markdown.contains("Key Points"));
        assert!(!markdown.contains("> \""));
        assert!(!markdown.contains("Read full article"));
    }

    #[test]
    fn test_output_file_name() {
        let at = Utc.with_ymd_and_hms(2025, 1, 6, 12, 0, 0).unwrap();
        let local_date = at.with_timezone(&Local).format("%Y-%m-%d").to_string();
        assert_eq!(
            output_file_name(at, "%Y-%m-%d", OutputFormat::Markdown),
            format!("newsletter_{}.md", local_date)
        );
        assert_eq!(
            output_file_name(at, "%Y/%m/%d", OutputFormat::Pdf),
            format!("newsletter_{}.pdf", local_date)
        );
        assert_eq!(
            output_file_name(at, "%Q", OutputFormat::Pdf),
            format!("newsletter_{}.pdf", local_date)
        );
    }

    #[test]
    fn test_write_atomic_overwrites_and_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("newsletter_x.md");

        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
        let entries: Vec<_> = fs::read_dir(path.parent().unwrap()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_write_outputs_reports_failures() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        fs::write(&blocker, b"file").unwrap();

        let outputs = vec![RenderedOutput {
            format: OutputFormat::Markdown,
            bytes: b"# hi".to_vec(),
        }];
        let at = Utc::now();

        let (written, failed) = write_outputs(dir.path(), at, "%Y-%m-%d", &outputs);
        assert_eq!(written.len(), 1);
        assert!(failed.is_empty());

        let (written, failed) = write_outputs(&blocker, at, "%Y-%m-%d", &outputs);
        assert!(written.is_empty());
        assert_eq!(failed.len(), 1);
    }
}
