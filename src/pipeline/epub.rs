//! EPUB 3 container (with an EPUB 2 NCX for older readers).
//!
//! ## Layout
//!
//! ```text
//! mimetype                      (stored, first entry)
//! META-INF/container.xml
//! OEBPS/content.opf
//! OEBPS/nav.xhtml               (EPUB 3 navigation)
//! OEBPS/toc.ncx                 (EPUB 2 fallback)
//! OEBPS/style.css
//! OEBPS/images/cover.jpg|png    (optional)
//! OEBPS/text/cover.xhtml        (optional)
//! OEBPS/text/chapter_001.xhtml …
//! ```
//!
//! The `mimetype` entry must be the first file in the archive and must not
//! be compressed, otherwise readers that sniff the first bytes reject it.

use crate::pipeline::chapters::Chapter;
use crate::pipeline::extract::CoverImage;
use crate::pipeline::markup::{escape_xml, render_inline};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::io::{Cursor, Write};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Book-level metadata written into the OPF.
#[derive(Debug, Clone)]
pub struct EpubMetadata {
    pub title: String,
    pub author: Option<String>,
    /// BCP 47 tag; the target language when translated, else `"en"`.
    pub language: String,
    /// Input file name, mixed into the identifier.
    pub source_name: String,
    pub modified: DateTime<Utc>,
}

impl EpubMetadata {
    /// Stable identifier: same title + same source file → same id.
    pub fn identifier(&self) -> String {
        book_identifier(&self.title, &self.source_name)
    }
}

/// `urn:pdf2epub:<sha256(title \n source_name)>`.
pub fn book_identifier(title: &str, source_name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(b"\n");
    hasher.update(source_name.as_bytes());
    format!("urn:pdf2epub:{:x}", hasher.finalize())
}

const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>
"#;

const STYLE_CSS: &str = r#"body {
  font-family: Georgia, "Times New Roman", serif;
  line-height: 1.5;
  margin: 0 5%;
}
h1, h2, h3 {
  font-weight: bold;
  text-align: left;
  page-break-after: avoid;
  margin: 1.5em 0 0.75em 0;
}
h1 { font-size: 1.6em; }
h2 { font-size: 1.35em; }
h3 { font-size: 1.15em; }
p {
  text-align: justify;
  text-indent: 1.5em;
  margin: 0;
}
p.first, h1 + p, h2 + p, h3 + p {
  text-indent: 0;
}
div.cover {
  text-align: center;
  margin: 0;
  padding: 0;
}
div.cover img {
  max-width: 100%;
  max-height: 100%;
}
"#;

fn chapter_file(index: usize) -> String {
    format!("chapter_{:03}.xhtml", index + 1)
}

fn heading_tag(chapter: &Chapter) -> &'static str {
    match chapter.level.map(|l| l.depth()) {
        Some(3) => "h3",
        Some(2) => "h2",
        _ => "h1",
    }
}

/// XHTML for one chapter.
pub fn chapter_xhtml(chapter: &Chapter, language: &str) -> String {
    let lang = escape_xml(language);
    let title = escape_xml(&chapter.title);
    let tag = heading_tag(chapter);

    let mut body = String::new();
    body.push_str(&format!("  <{tag}>{}</{tag}>\n", render_inline(&chapter.title)));
    for (i, block) in chapter.blocks.iter().enumerate() {
        if block.text.is_empty() {
            continue;
        }
        let class = if i == 0 { " class=\"first\"" } else { "" };
        body.push_str(&format!("  <p{class}>{}</p>\n", render_inline(&block.text)));
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops" xml:lang="{lang}" lang="{lang}">
<head>
  <meta charset="UTF-8"/>
  <title>{title}</title>
  <link rel="stylesheet" type="text/css" href="../style.css"/>
</head>
<body>
{body}</body>
</html>
"#
    )
}

fn cover_xhtml(cover: &CoverImage, title: &str) -> String {
    let title = escape_xml(title);
    let ext = cover.extension();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<head>
  <meta charset="UTF-8"/>
  <title>{title}</title>
  <link rel="stylesheet" type="text/css" href="../style.css"/>
</head>
<body>
  <div class="cover"><img src="../images/cover.{ext}" alt="{title}"/></div>
</body>
</html>
"#
    )
}

fn nav_xhtml(chapters: &[Chapter], meta: &EpubMetadata) -> String {
    let lang = escape_xml(&meta.language);
    let title = escape_xml(&meta.title);
    let items: String = chapters
        .iter()
        .enumerate()
        .map(|(i, c)| {
            format!(
                "      <li><a href=\"text/{}\">{}</a></li>\n",
                chapter_file(i),
                escape_xml(&c.title)
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops" xml:lang="{lang}" lang="{lang}">
<head>
  <meta charset="UTF-8"/>
  <title>{title}</title>
</head>
<body>
  <nav epub:type="toc" id="toc">
    <h1>{title}</h1>
    <ol>
{items}    </ol>
  </nav>
</body>
</html>
"#
    )
}

fn toc_ncx(chapters: &[Chapter], meta: &EpubMetadata) -> String {
    let id = escape_xml(&meta.identifier());
    let title = escape_xml(&meta.title);
    let points: String = chapters
        .iter()
        .enumerate()
        .map(|(i, c)| {
            format!(
                r#"    <navPoint id="navpoint-{n}" playOrder="{n}">
      <navLabel><text>{label}</text></navLabel>
      <content src="text/{file}"/>
    </navPoint>
"#,
                n = i + 1,
                label = escape_xml(&c.title),
                file = chapter_file(i)
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head>
    <meta name="dtb:uid" content="{id}"/>
    <meta name="dtb:depth" content="1"/>
    <meta name="dtb:totalPageCount" content="0"/>
    <meta name="dtb:maxPageNumber" content="0"/>
  </head>
  <docTitle><text>{title}</text></docTitle>
  <navMap>
{points}  </navMap>
</ncx>
"#
    )
}

fn content_opf(chapters: &[Chapter], meta: &EpubMetadata, cover: Option<&CoverImage>) -> String {
    let id = escape_xml(&meta.identifier());
    let title = escape_xml(&meta.title);
    let lang = escape_xml(&meta.language);
    let modified = meta.modified.format("%Y-%m-%dT%H:%M:%SZ");

    let mut metadata = format!(
        "    <dc:identifier id=\"bookid\">{id}</dc:identifier>\n    \
         <dc:title>{title}</dc:title>\n    \
         <dc:language>{lang}</dc:language>\n"
    );
    if let Some(ref author) = meta.author {
        metadata.push_str(&format!("    <dc:creator>{}</dc:creator>\n", escape_xml(author)));
    }
    metadata.push_str(&format!(
        "    <meta property=\"dcterms:modified\">{modified}</meta>\n"
    ));

    let mut manifest = String::from(
        "    <item id=\"nav\" href=\"nav.xhtml\" media-type=\"application/xhtml+xml\" properties=\"nav\"/>\n    \
         <item id=\"ncx\" href=\"toc.ncx\" media-type=\"application/x-dtbncx+xml\"/>\n    \
         <item id=\"css\" href=\"style.css\" media-type=\"text/css\"/>\n",
    );
    let mut spine = String::new();

    if let Some(cover) = cover {
        metadata.push_str("    <meta name=\"cover\" content=\"cover-image\"/>\n");
        manifest.push_str(&format!(
            "    <item id=\"cover-image\" href=\"images/cover.{}\" media-type=\"{}\" properties=\"cover-image\"/>\n    \
             <item id=\"cover\" href=\"text/cover.xhtml\" media-type=\"application/xhtml+xml\"/>\n",
            cover.extension(),
            cover.media_type
        ));
        spine.push_str("    <itemref idref=\"cover\"/>\n");
    }

    for i in 0..chapters.len() {
        manifest.push_str(&format!(
            "    <item id=\"chapter-{n}\" href=\"text/{file}\" media-type=\"application/xhtml+xml\"/>\n",
            n = i + 1,
            file = chapter_file(i)
        ));
        spine.push_str(&format!("    <itemref idref=\"chapter-{}\"/>\n", i + 1));
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="bookid" xml:lang="{lang}">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
{metadata}  </metadata>
  <manifest>
{manifest}  </manifest>
  <spine toc="ncx">
{spine}  </spine>
</package>
"#
    )
}

/// Assemble the EPUB archive in memory.
///
/// Never fails on empty input: `chapters` may be empty, in which case a
/// single chapter with the book title and no paragraphs is written.
pub fn build_epub(
    chapters: &[Chapter],
    meta: &EpubMetadata,
    cover: Option<&CoverImage>,
) -> Result<Vec<u8>, zip::result::ZipError> {
    let placeholder;
    let chapters = if chapters.is_empty() {
        placeholder = vec![Chapter {
            title: meta.title.clone(),
            level: None,
            blocks: Vec::new(),
        }];
        placeholder.as_slice()
    } else {
        chapters
    };

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file("mimetype", stored)?;
    zip.write_all(b"application/epub+zip")?;

    zip.start_file("META-INF/container.xml", deflated)?;
    zip.write_all(CONTAINER_XML.as_bytes())?;

    zip.start_file("OEBPS/content.opf", deflated)?;
    zip.write_all(content_opf(chapters, meta, cover).as_bytes())?;

    zip.start_file("OEBPS/nav.xhtml", deflated)?;
    zip.write_all(nav_xhtml(chapters, meta).as_bytes())?;

    zip.start_file("OEBPS/toc.ncx", deflated)?;
    zip.write_all(toc_ncx(chapters, meta).as_bytes())?;

    zip.start_file("OEBPS/style.css", deflated)?;
    zip.write_all(STYLE_CSS.as_bytes())?;

    if let Some(cover) = cover {
        // Already-compressed image data; deflating it again gains nothing.
        zip.start_file(format!("OEBPS/images/cover.{}", cover.extension()), stored)?;
        zip.write_all(&cover.bytes)?;
        zip.start_file("OEBPS/text/cover.xhtml", deflated)?;
        zip.write_all(cover_xhtml(cover, &meta.title).as_bytes())?;
    }

    for (i, chapter) in chapters.iter().enumerate() {
        zip.start_file(format!("OEBPS/text/{}", chapter_file(i)), deflated)?;
        zip.write_all(chapter_xhtml(chapter, &meta.language).as_bytes())?;
    }

    let bytes = zip.finish()?.into_inner();
    debug!(
        "EPUB assembled: {} chapters, cover={}, {} bytes",
        chapters.len(),
        cover.is_some(),
        bytes.len()
    );
    Ok(bytes)
}
