#![allow(dead_code)]

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use newsletter_generator::config::{ApiProvider, Config};
use newsletter_generator::{FeedSpec, OutputFormat};
use printpdf::image_crate::{DynamicImage, ImageOutputFormat, RgbImage};
use std::io::Cursor;
use std::net::SocketAddr;
use std::path::Path as FsPath;

/// Serves one feed, its article pages, robots.txt and two images (one
/// valid PNG, one garbage) from an ephemeral local port.
pub async fn start_fixture_server() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let app = Router::new()
        .route("/feed.xml", get(feed))
        .route("/robots.txt", get(|| async { "User-agent: *\nDisallow: /private\n" }))
        .route("/articles/:slug", get(article))
        .route("/images/good.png", get(good_image))
        .route("/images/bad.png", get(|| async { ([(header::CONTENT_TYPE, "image/png")], b"garbage".to_vec()) }))
        .with_state(addr);

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

async fn feed(State(addr): State<SocketAddr>) -> Response {
    let item = |slug: &str, title: &str, extra: &str| {
        format!(
            "<item><title>{title}</title><link>http://{addr}/articles/{slug}</link>\
             <description>Feed summary for {title}.</description>\
             <pubDate>Mon, 06 Jan 2025 10:00:00 GMT</pubDate>{extra}</item>"
        )
    };
    let body = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel><title>Fixture News</title><link>http://{addr}/</link>
<description>Local fixture feed</description>
{}{}{}{}{}
</channel></rss>"#,
        item(
            "rust-release",
            "Rust release brings faster builds",
            &format!(r#"<enclosure url="http://{addr}/images/good.png" type="image/png" length="100"/>"#)
        ),
        item("rust-quota", "Rust quota story", ""),
        item("rust-flaky", "Rust flaky answer", ""),
        item("gardening", "Gardening tips for spring", ""),
        item("rust-release", "Rust release brings faster builds", ""),
    );
    ([(header::CONTENT_TYPE, "application/rss+xml")], body).into_response()
}

async fn article(State(addr): State<SocketAddr>, Path(slug): Path<String>) -> Response {
    let (topic, image) = match slug.as_str() {
        "gardening" => ("Tomatoes need sun and water", String::new()),
        "rust-quota" => (
            "The Rust compiler team shipped a new release",
            format!(r#"<meta property="og:image" content="http://{addr}/images/bad.png">"#),
        ),
        _ => ("The Rust compiler team shipped a new release", String::new()),
    };
    let html = format!(
        r#"<html><head><title>{slug}</title>{image}</head><body>
        <nav><p>Menu</p></nav>
        <article>
          <p>{topic}. It was announced on Monday morning.</p>
          <p>The maintainers said "this is the most exciting change in years" during the call.</p>
          <p>Further work is planned. Readers can try it today. More news follows soon.</p>
        </article></body></html>"#
    );
    ([(header::CONTENT_TYPE, "text/html")], html).into_response()
}

async fn good_image() -> Response {
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 8, image_pixel()));
    let mut bytes = Cursor::new(Vec::new());
    match image.write_to(&mut bytes, ImageOutputFormat::Png) {
        Ok(()) => ([(header::CONTENT_TYPE, "image/png")], bytes.into_inner()).into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

fn image_pixel() -> printpdf::image_crate::Rgb<u8> {
    printpdf::image_crate::Rgb([200, 40, 40])
}

pub fn test_config(addr: SocketAddr, output_dir: &FsPath) -> Config {
    let mut config = Config::default();
    config.feeds = vec![
        FeedSpec::Detailed {
            url: format!("http://{}/feed.xml", addr),
            name: Some("Fixture News".to_string()),
            category: None,
        },
        // Nothing listens on port 1
        FeedSpec::Url("http://127.0.0.1:1/feed.xml".to_string()),
    ];
    config.fetching.timeout_seconds = 5;
    config.fetching.retry_delay_ms = 10;
    config.fetching.min_host_interval_ms = 0;
    config.api.provider = ApiProvider::None;
    config.filter.relevance_threshold = 0.5;
    config.newsletter.output_dir = output_dir.to_path_buf();
    config.newsletter.output_formats = vec![OutputFormat::Markdown, OutputFormat::Pdf];
    config
}

pub fn files_in(dir: &FsPath) -> Vec<String> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => Vec::new(),
    }
}
