//! EPUB 3 packaging.
//!
//! Every article becomes a two-document book: a cover page (title,
//! description, cover image) and one chapter holding the whole scraped text.
//!
//! # Container Layout
//!
//! ```text
//! mimetype                  stored, first entry
//! META-INF/container.xml
//! OEBPS/content.opf         metadata, manifest, spine, guide
//! OEBPS/nav.xhtml           TOC + landmarks
//! OEBPS/toc.ncx             EPUB 2 TOC
//! OEBPS/img/cover.{ext}
//! OEBPS/text/cover.xhtml
//! OEBPS/text/chap1.xhtml
//! ```
//!
//! All XML is produced with `quick-xml`, so titles and content are escaped
//! no matter what the site serves.

use crate::error::{Error, Result};
use crate::models::Article;
use crate::utils::{ImageFormat, xml_safe};
use chrono::Utc;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use std::borrow::Cow;
use std::io::{Cursor, Write};
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};
use uuid::Uuid;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

const OPF_PATH: &str = "OEBPS/content.opf";
const XHTML_NS: &str = "http://www.w3.org/1999/xhtml";
const EPUB_OPS_NS: &str = "http://www.idpf.org/2007/ops";

/// Placeholder carried as the English alternate-script title.
pub const ENGLISH_TITLE_PLACEHOLDER: &str = "English title!";

const COVER_PAGE_TITLE: &str = "Cover Page";
const COVER_LANDMARK_TITLE: &str = "cover page";
const CHAPTER_TOC_LABEL: &str = "Chapter 1";
const BODY_LANDMARK_TITLE: &str = "本文";

/// Structural role of a content document, as announced in the landmarks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Landmark {
    Cover,
    BodyMatter,
}

impl Landmark {
    fn epub_type(self) -> &'static str {
        match self {
            Landmark::Cover => "cover",
            Landmark::BodyMatter => "bodymatter",
        }
    }

    /// EPUB 2 `<guide>` reference type.
    fn guide_type(self) -> &'static str {
        match self {
            Landmark::Cover => "cover",
            Landmark::BodyMatter => "text",
        }
    }
}

/// One XHTML document in the spine.
#[derive(Debug)]
struct ContentDocument {
    id: &'static str,
    href: &'static str,
    landmark: Landmark,
    landmark_title: &'static str,
    toc_label: Option<&'static str>,
    xhtml: Vec<u8>,
}

/// Everything needed to lay out one book.
#[derive(Debug)]
struct Book<'a> {
    identifier: String,
    language: &'a str,
    title: &'a str,
    alternate_titles: Vec<(&'a str, &'a str)>,
    modified: String,
    cover_format: ImageFormat,
    cover_image: Vec<u8>,
    documents: Vec<ContentDocument>,
}

impl Book<'_> {
    fn cover_href(&self) -> String {
        format!("img/cover.{}", self.cover_format.extension())
    }
}

/// Builds EPUB files for articles in one target language.
#[derive(Debug, Clone)]
pub struct EbookPackager {
    language: String,
}

impl EbookPackager {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
        }
    }

    /// Package `article` with the image at `cover_path` and write the book to
    /// `output_path`, replacing any existing file.
    ///
    /// The book holds a cover page (title, description, image) and a single
    /// chapter with the whole content, plus the navigation documents. Each
    /// call stamps a fresh `urn:uuid:` identifier.
    ///
    /// # Arguments
    ///
    /// * `article` - Title, description and content of the book
    /// * `cover_path` - JPEG, PNG, GIF or WebP file embedded as the cover
    /// * `output_path` - Where the `.epub` file is written
    ///
    /// # Errors
    ///
    /// Returns [`Error::Packaging`] if:
    /// - The cover cannot be read or is not a supported image
    /// - Any XML document or the zip container fails to serialize
    /// - The output file cannot be written
    #[instrument(level = "info", skip_all, fields(title = %article.title, output = %output_path.display()))]
    pub async fn package(
        &self,
        article: &Article,
        cover_path: &Path,
        output_path: &Path,
    ) -> Result<()> {
        let cover_image = fs::read(cover_path).await.map_err(|e| {
            Error::Packaging(format!(
                "cannot read cover image {}: {e}",
                cover_path.display()
            ))
        })?;
        let cover_format = ImageFormat::sniff(&cover_image).ok_or_else(|| {
            Error::Packaging(format!(
                "{} is not a supported cover image",
                cover_path.display()
            ))
        })?;

        let book = self.layout(article, cover_format, cover_image)?;
        let bytes = write_container(&book)?;

        fs::write(output_path, &bytes).await.map_err(|e| {
            Error::Packaging(format!("cannot write {}: {e}", output_path.display()))
        })?;
        info!(bytes = bytes.len(), identifier = %book.identifier, "Wrote e-book");
        Ok(())
    }

    fn layout<'a>(
        &'a self,
        article: &'a Article,
        cover_format: ImageFormat,
        cover_image: Vec<u8>,
    ) -> Result<Book<'a>> {
        let cover_src = format!("../img/cover.{}", cover_format.extension());
        let documents = vec![
            ContentDocument {
                id: "cover",
                href: "text/cover.xhtml",
                landmark: Landmark::Cover,
                landmark_title: COVER_LANDMARK_TITLE,
                toc_label: None,
                xhtml: cover_page(&self.language, article, &cover_src)?,
            },
            ContentDocument {
                id: "chap1",
                href: "text/chap1.xhtml",
                landmark: Landmark::BodyMatter,
                landmark_title: BODY_LANDMARK_TITLE,
                toc_label: Some(CHAPTER_TOC_LABEL),
                xhtml: chapter_page(&self.language, &article.content)?,
            },
        ];

        Ok(Book {
            identifier: format!("urn:uuid:{}", Uuid::new_v4()),
            language: &self.language,
            title: &article.title,
            alternate_titles: vec![
                ("en", ENGLISH_TITLE_PLACEHOLDER),
                (self.language.as_str(), article.title.as_str()),
            ],
            modified: Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            cover_format,
            cover_image,
            documents,
        })
    }
}

/// Thin wrapper over `quick_xml::Writer` folding its errors into [`Error`].
///
/// Text and attribute values pass through [`xml_safe`], so scraped control
/// characters never make a document ill-formed.
struct XmlDoc {
    writer: Writer<Vec<u8>>,
}

fn xml_error(e: impl std::fmt::Display) -> Error {
    Error::Packaging(format!("XML serialization failed: {e}"))
}

impl XmlDoc {
    fn new() -> Result<Self> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(xml_error)?;
        Ok(Self { writer })
    }

    fn start<'b>(name: &'b str, attrs: &'b [(&'b str, Cow<'b, str>)]) -> BytesStart<'b> {
        BytesStart::new(name).with_attributes(attrs.iter().map(|(k, v)| (*k, v.as_ref())))
    }

    fn clean<'a>(attrs: &[(&'a str, &'a str)]) -> Vec<(&'a str, Cow<'a, str>)> {
        attrs.iter().map(|&(k, v)| (k, xml_safe(v))).collect()
    }

    fn open(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<()> {
        let attrs = Self::clean(attrs);
        self.writer
            .write_event(Event::Start(Self::start(name, &attrs)))
            .map_err(xml_error)
    }

    fn close(&mut self, name: &str) -> Result<()> {
        self.writer
            .write_event(Event::End(BytesEnd::new(name)))
            .map_err(xml_error)
    }

    fn empty(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<()> {
        let attrs = Self::clean(attrs);
        self.writer
            .write_event(Event::Empty(Self::start(name, &attrs)))
            .map_err(xml_error)
    }

    fn text_element(&mut self, name: &str, attrs: &[(&str, &str)], text: &str) -> Result<()> {
        self.open(name, attrs)?;
        self.writer
            .write_event(Event::Text(BytesText::new(&xml_safe(text))))
            .map_err(xml_error)?;
        self.close(name)
    }

    fn finish(self) -> Vec<u8> {
        self.writer.into_inner()
    }
}

fn xhtml_head(doc: &mut XmlDoc, language: &str, title: &str) -> Result<()> {
    doc.open(
        "html",
        &[
            ("xmlns", XHTML_NS),
            ("xmlns:epub", EPUB_OPS_NS),
            ("xml:lang", language),
        ],
    )?;
    doc.open("head", &[])?;
    doc.text_element("title", &[], title)?;
    doc.close("head")
}

fn cover_page(language: &str, article: &Article, cover_src: &str) -> Result<Vec<u8>> {
    let mut doc = XmlDoc::new()?;
    xhtml_head(&mut doc, language, COVER_PAGE_TITLE)?;
    doc.open("body", &[("epub:type", "cover")])?;
    doc.text_element("h1", &[], &article.title)?;
    doc.text_element("h2", &[], &article.description)?;
    doc.empty("img", &[("src", cover_src), ("alt", article.title.as_str())])?;
    doc.close("body")?;
    doc.close("html")?;
    Ok(doc.finish())
}

fn chapter_page(language: &str, content: &str) -> Result<Vec<u8>> {
    let mut doc = XmlDoc::new()?;
    xhtml_head(&mut doc, language, "c1")?;
    doc.open("body", &[("epub:type", "bodymatter")])?;
    doc.text_element("p", &[], content)?;
    doc.close("body")?;
    doc.close("html")?;
    Ok(doc.finish())
}

fn container_xml() -> Result<Vec<u8>> {
    let mut doc = XmlDoc::new()?;
    doc.open(
        "container",
        &[
            ("version", "1.0"),
            ("xmlns", "urn:oasis:names:tc:opendocument:xmlns:container"),
        ],
    )?;
    doc.open("rootfiles", &[])?;
    doc.empty(
        "rootfile",
        &[
            ("full-path", OPF_PATH),
            ("media-type", "application/oebps-package+xml"),
        ],
    )?;
    doc.close("rootfiles")?;
    doc.close("container")?;
    Ok(doc.finish())
}

fn package_opf(book: &Book) -> Result<Vec<u8>> {
    let mut doc = XmlDoc::new()?;
    doc.open(
        "package",
        &[
            ("xmlns", "http://www.idpf.org/2007/opf"),
            ("version", "3.0"),
            ("unique-identifier", "BookId"),
            ("xml:lang", book.language),
        ],
    )?;

    doc.open(
        "metadata",
        &[("xmlns:dc", "http://purl.org/dc/elements/1.1/")],
    )?;
    doc.text_element("dc:identifier", &[("id", "BookId")], &book.identifier)?;
    doc.text_element("dc:title", &[("id", "title")], book.title)?;
    doc.text_element("meta", &[("refines", "#title"), ("property", "title-type")], "main")?;
    doc.text_element("meta", &[("refines", "#title"), ("property", "file-as")], book.title)?;
    doc.text_element("meta", &[("refines", "#title"), ("property", "display-seq")], "1")?;
    for &(lang, title) in &book.alternate_titles {
        doc.text_element(
            "meta",
            &[
                ("refines", "#title"),
                ("property", "alternate-script"),
                ("xml:lang", lang),
            ],
            title,
        )?;
    }
    doc.text_element("dc:language", &[], book.language)?;
    doc.text_element("meta", &[("property", "dcterms:modified")], &book.modified)?;
    doc.empty("meta", &[("name", "cover"), ("content", "cover-image")])?;
    doc.close("metadata")?;

    let cover_href = book.cover_href();
    doc.open("manifest", &[])?;
    doc.empty(
        "item",
        &[
            ("id", "cover-image"),
            ("href", cover_href.as_str()),
            ("media-type", book.cover_format.media_type()),
            ("properties", "cover-image"),
        ],
    )?;
    for document in &book.documents {
        doc.empty(
            "item",
            &[
                ("id", document.id),
                ("href", document.href),
                ("media-type", "application/xhtml+xml"),
            ],
        )?;
    }
    doc.empty(
        "item",
        &[
            ("id", "nav"),
            ("href", "nav.xhtml"),
            ("media-type", "application/xhtml+xml"),
            ("properties", "nav"),
        ],
    )?;
    doc.empty(
        "item",
        &[
            ("id", "ncx"),
            ("href", "toc.ncx"),
            ("media-type", "application/x-dtbncx+xml"),
        ],
    )?;
    doc.close("manifest")?;

    doc.open("spine", &[("toc", "ncx")])?;
    for document in &book.documents {
        doc.empty("itemref", &[("idref", document.id)])?;
    }
    doc.close("spine")?;

    doc.open("guide", &[])?;
    for document in &book.documents {
        doc.empty(
            "reference",
            &[
                ("type", document.landmark.guide_type()),
                ("title", document.landmark_title),
                ("href", document.href),
            ],
        )?;
    }
    doc.close("guide")?;

    doc.close("package")?;
    Ok(doc.finish())
}

fn nav_xhtml(book: &Book) -> Result<Vec<u8>> {
    let mut doc = XmlDoc::new()?;
    xhtml_head(&mut doc, book.language, book.title)?;
    doc.open("body", &[])?;

    doc.open("nav", &[("epub:type", "toc"), ("id", "toc")])?;
    doc.open("ol", &[])?;
    for document in &book.documents {
        if let Some(label) = document.toc_label {
            doc.open("li", &[])?;
            doc.text_element("a", &[("href", document.href)], label)?;
            doc.close("li")?;
        }
    }
    doc.close("ol")?;
    doc.close("nav")?;

    doc.open("nav", &[("epub:type", "landmarks"), ("id", "landmarks")])?;
    doc.open("ol", &[])?;
    for document in &book.documents {
        doc.open("li", &[])?;
        doc.text_element(
            "a",
            &[
                ("epub:type", document.landmark.epub_type()),
                ("href", document.href),
            ],
            document.landmark_title,
        )?;
        doc.close("li")?;
    }
    doc.close("ol")?;
    doc.close("nav")?;

    doc.close("body")?;
    doc.close("html")?;
    Ok(doc.finish())
}

fn toc_ncx(book: &Book) -> Result<Vec<u8>> {
    let mut doc = XmlDoc::new()?;
    doc.open(
        "ncx",
        &[
            ("xmlns", "http://www.daisy.org/z3986/2005/ncx/"),
            ("version", "2005-1"),
        ],
    )?;
    doc.open("head", &[])?;
    doc.empty("meta", &[("name", "dtb:uid"), ("content", book.identifier.as_str())])?;
    doc.empty("meta", &[("name", "dtb:depth"), ("content", "1")])?;
    doc.empty("meta", &[("name", "dtb:totalPageCount"), ("content", "0")])?;
    doc.empty("meta", &[("name", "dtb:maxPageNumber"), ("content", "0")])?;
    doc.close("head")?;

    doc.open("docTitle", &[])?;
    doc.text_element("text", &[], book.title)?;
    doc.close("docTitle")?;

    doc.open("navMap", &[])?;
    let entries = book
        .documents
        .iter()
        .filter_map(|d| d.toc_label.map(|label| (d, label)));
    for (order, (document, label)) in entries.enumerate() {
        let play_order = (order + 1).to_string();
        let id = format!("navPoint-{play_order}");
        doc.open("navPoint", &[("id", id.as_str()), ("playOrder", play_order.as_str())])?;
        doc.open("navLabel", &[])?;
        doc.text_element("text", &[], label)?;
        doc.close("navLabel")?;
        doc.empty("content", &[("src", document.href)])?;
        doc.close("navPoint")?;
    }
    doc.close("navMap")?;

    doc.close("ncx")?;
    Ok(doc.finish())
}

/// Serialize the whole container into memory.
fn write_container(book: &Book) -> Result<Vec<u8>> {
    let zip_error = |e: zip::result::ZipError| Error::Packaging(format!("zip: {e}"));
    let write_error = |e: std::io::Error| Error::Packaging(format!("zip: {e}"));

    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

    // Readers identify the format from this first, uncompressed entry.
    zip.start_file("mimetype", stored).map_err(zip_error)?;
    zip.write_all(b"application/epub+zip").map_err(write_error)?;

    let mut entries: Vec<(String, Vec<u8>)> = vec![
        ("META-INF/container.xml".to_string(), container_xml()?),
        (OPF_PATH.to_string(), package_opf(book)?),
        ("OEBPS/nav.xhtml".to_string(), nav_xhtml(book)?),
        ("OEBPS/toc.ncx".to_string(), toc_ncx(book)?),
    ];
    for document in &book.documents {
        entries.push((format!("OEBPS/{}", document.href), document.xhtml.clone()));
    }

    for (name, body) in &entries {
        zip.start_file(name.as_str(), deflated).map_err(zip_error)?;
        zip.write_all(body).map_err(write_error)?;
    }

    // Images are already compressed.
    zip.start_file(format!("OEBPS/{}", book.cover_href()), stored)
        .map_err(zip_error)?;
    zip.write_all(&book.cover_image).map_err(write_error)?;

    let cursor = zip.finish().map_err(zip_error)?;
    Ok(cursor.into_inner())
}
