// EPUB title rewriting — patches <dc:title> in the OPF package and the NCX docTitle.

use std::io::{Cursor, Read, Write};
use std::sync::LazyLock;

use anyhow::{anyhow, Context, Result};
use regex::{Captures, Regex};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const CONTAINER_PATH: &str = "META-INF/container.xml";
const MIMETYPE_PATH: &str = "mimetype";
const EPUB_MIMETYPE: &str = "application/epub+zip";
const NCX_MEDIA_TYPE: &str = "application/x-dtbncx+xml";

static ROOTFILE_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<rootfile\b[^>]*\bfull-path\s*=\s*["']([^"']+)["']"#).unwrap()
});
static DC_TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<dc:title\b([^>]*)>.*?</dc:title>").unwrap());
static SPINE_TOC_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<spine\b[^>]*\btoc\s*=\s*["']([^"']+)["']"#).unwrap()
});
static ITEM_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<item\b[^>]*>").unwrap());
static DOC_TITLE_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)(<docTitle\b[^>]*>.*?<text\b[^>]*>).*?(</text>.*?</docTitle>)").unwrap()
});

static ID_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\sid\s*=\s*["']([^"']+)["']"#).unwrap());
static HREF_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\shref\s*=\s*["']([^"']+)["']"#).unwrap());
static MEDIA_TYPE_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\smedia-type\s*=\s*["']([^"']+)["']"#).unwrap());

fn xml_attribute(tag: &str, attr: &Regex) -> Option<String> {
    attr.captures(tag).map(|caps| caps[1].to_string())
}

fn escape_xml_text(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Join `href` onto the directory of `base` and resolve `.`/`..` segments.
fn resolve_relative(base: &str, href: &str) -> String {
    let dir = base.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
    let mut parts: Vec<&str> = dir.split('/').filter(|s| !s.is_empty()).collect();
    for segment in href.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

/// Locate the NCX document: the spine's `toc` item first, then any item with the NCX media type.
fn find_ncx_path(opf_xml: &str, opf_path: &str) -> Option<String> {
    let items: Vec<&str> = ITEM_TAG.find_iter(opf_xml).map(|m| m.as_str()).collect();

    let by_spine = SPINE_TOC_ID
        .captures(opf_xml)
        .map(|caps| caps[1].to_string())
        .and_then(|toc_id| {
            items
                .iter()
                .find(|tag| xml_attribute(tag, &ID_ATTR).as_deref() == Some(toc_id.as_str()))
                .and_then(|tag| xml_attribute(tag, &HREF_ATTR))
        });

    let href = by_spine.or_else(|| {
        items
            .iter()
            .find(|tag| xml_attribute(tag, &MEDIA_TYPE_ATTR).as_deref() == Some(NCX_MEDIA_TYPE))
            .and_then(|tag| xml_attribute(tag, &HREF_ATTR))
    })?;

    Some(resolve_relative(opf_path, &href))
}

fn read_entry<R: Read + std::io::Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<String> {
    let mut entry = archive
        .by_name(name)
        .with_context(|| format!("missing {}", name))?;
    let mut content = String::new();
    entry
        .read_to_string(&mut content)
        .with_context(|| format!("{} is not valid UTF-8", name))?;
    Ok(content)
}

/// Return a copy of the EPUB in `data` whose title metadata reads `title`.
///
/// The rebuilt archive keeps every entry, with `mimetype` stored first and
/// uncompressed as EPUB readers expect.
pub fn rewrite_epub_title(data: &[u8], title: &str) -> Result<Vec<u8>> {
    let title = title.trim();
    if title.is_empty() {
        return Err(anyhow!("cannot rewrite EPUB title: title is empty"));
    }

    let mut archive = ZipArchive::new(Cursor::new(data)).context("not a ZIP archive")?;

    let mimetype = read_entry(&mut archive, MIMETYPE_PATH)?;
    if mimetype.trim() != EPUB_MIMETYPE {
        return Err(anyhow!("cannot rewrite EPUB title: invalid mimetype value"));
    }

    let container = read_entry(&mut archive, CONTAINER_PATH)?;
    let opf_path = ROOTFILE_PATH
        .captures(&container)
        .map(|caps| caps[1].to_string())
        .ok_or_else(|| anyhow!("cannot rewrite EPUB title: OPF path not found in container.xml"))?;

    let opf_xml = read_entry(&mut archive, &opf_path)?;
    if !DC_TITLE.is_match(&opf_xml) {
        return Err(anyhow!("cannot rewrite EPUB title: <dc:title> not found in OPF"));
    }

    let escaped = escape_xml_text(title);
    let updated_opf = DC_TITLE
        .replacen(&opf_xml, 1, |caps: &Captures| {
            format!("<dc:title{}>{}</dc:title>", &caps[1], escaped)
        })
        .into_owned();

    let ncx_path = find_ncx_path(&opf_xml, &opf_path);
    let updated_ncx = match ncx_path.as_deref() {
        Some(path) => match read_entry(&mut archive, path) {
            Ok(ncx_xml) if DOC_TITLE_TEXT.is_match(&ncx_xml) => Some(
                DOC_TITLE_TEXT
                    .replacen(&ncx_xml, 1, |caps: &Captures| {
                        format!("{}{}{}", &caps[1], escaped, &caps[2])
                    })
                    .into_owned(),
            ),
            _ => None,
        },
        None => None,
    };
    debug!(
        "rewriting EPUB title opf={} ncx={:?} ncx_updated={}",
        opf_path,
        ncx_path,
        updated_ncx.is_some()
    );

    let mut out = ZipWriter::new(Cursor::new(Vec::new()));
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    out.start_file(MIMETYPE_PATH, stored)?;
    out.write_all(EPUB_MIMETYPE.as_bytes())?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let name = entry.name().to_string();
        if entry.is_dir() || name == MIMETYPE_PATH {
            continue;
        }

        let mut content = Vec::new();
        entry.read_to_end(&mut content)?;

        if name == opf_path {
            content = updated_opf.clone().into_bytes();
        } else if let (Some(ncx), Some(path)) = (updated_ncx.as_ref(), ncx_path.as_deref()) {
            if name == path {
                content = ncx.clone().into_bytes();
            }
        }

        out.start_file(name, deflated)?;
        out.write_all(&content)?;
    }

    Ok(out.finish()?.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::container::{detect_container, ContainerFormat};

    const CONTAINER_XML: &str = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

    const OPF_XML: &str = r#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title id="main">dune (retail)</dc:title>
    <dc:language>en</dc:language>
  </metadata>
  <manifest>
    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
    <item id="ch1" href="text/ch1.xhtml" media-type="application/xhtml+xml"/>
  </manifest>
  <spine toc="ncx"><itemref idref="ch1"/></spine>
</package>"#;

    const NCX_XML: &str = r#"<ncx><docTitle><text>dune (retail)</text></docTitle></ncx>"#;

    fn build_epub(opf: &str) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        zip.start_file("mimetype", stored).unwrap();
        zip.write_all(EPUB_MIMETYPE.as_bytes()).unwrap();
        zip.start_file("META-INF/container.xml", stored).unwrap();
        zip.write_all(CONTAINER_XML.as_bytes()).unwrap();
        zip.start_file("OEBPS/content.opf", stored).unwrap();
        zip.write_all(opf.as_bytes()).unwrap();
        zip.start_file("OEBPS/toc.ncx", stored).unwrap();
        zip.write_all(NCX_XML.as_bytes()).unwrap();
        zip.start_file("OEBPS/text/ch1.xhtml", stored).unwrap();
        zip.write_all(b"<html/>").unwrap();
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn test_rewrite_title_updates_opf_and_ncx() {
        let epub = build_epub(OPF_XML);
        assert_eq!(detect_container(&epub), ContainerFormat::Epub);

        let rewritten = rewrite_epub_title(&epub, " Dune & Sons ").unwrap();
        assert_eq!(detect_container(&rewritten), ContainerFormat::Epub);

        let mut archive = ZipArchive::new(Cursor::new(rewritten.as_slice())).unwrap();
        assert_eq!(archive.by_index(0).unwrap().name(), "mimetype");

        let opf = read_entry(&mut archive, "OEBPS/content.opf").unwrap();
        assert!(opf.contains(r#"<dc:title id="main">Dune &amp; Sons</dc:title>"#));
        assert!(opf.contains("<dc:language>en</dc:language>"));

        let ncx = read_entry(&mut archive, "OEBPS/toc.ncx").unwrap();
        assert_eq!(ncx, "<ncx><docTitle><text>Dune &amp; Sons</text></docTitle></ncx>");

        assert_eq!(read_entry(&mut archive, "OEBPS/text/ch1.xhtml").unwrap(), "<html/>");
    }

    #[test]
    fn test_rewrite_requires_dc_title() {
        let epub = build_epub("<package><metadata/></package>");
        assert!(rewrite_epub_title(&epub, "Dune").is_err());
    }

    #[test]
    fn test_rewrite_rejects_empty_title_and_non_zip() {
        assert!(rewrite_epub_title(&build_epub(OPF_XML), "   ").is_err());
        assert!(rewrite_epub_title(b"%PDF-1.7", "Dune").is_err());
    }

    #[test]
    fn test_find_ncx_path() {
        // Spine toc id wins, attribute order does not matter.
        let opf = r#"<manifest>
            <item href="other.ncx" id="old" media-type="application/x-dtbncx+xml"/>
            <item media-type="application/x-dtbncx+xml" href="nav/toc.ncx" id="ncx"/>
        </manifest><spine toc="ncx"/>"#;
        assert_eq!(find_ncx_path(opf, "OEBPS/content.opf").as_deref(), Some("OEBPS/nav/toc.ncx"));

        // Without a spine toc, the first NCX media type is used.
        let opf = r#"<item id="a" href="a.xhtml" media-type="application/xhtml+xml"/>
            <item id="t" href="toc.ncx" media-type="application/x-dtbncx+xml"/>"#;
        assert_eq!(find_ncx_path(opf, "content.opf").as_deref(), Some("toc.ncx"));

        // `data-id` is not `id`.
        let opf = r#"<item data-id="ncx" href="x.ncx"/><spine toc="ncx"/>"#;
        assert_eq!(find_ncx_path(opf, "content.opf"), None);
    }

    #[test]
    fn test_resolve_relative() {
        assert_eq!(resolve_relative("OEBPS/content.opf", "toc.ncx"), "OEBPS/toc.ncx");
        assert_eq!(resolve_relative("content.opf", "toc.ncx"), "toc.ncx");
        assert_eq!(resolve_relative("a/b/content.opf", "../toc.ncx"), "a/toc.ncx");
    }
}
