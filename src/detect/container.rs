#[derive(Debug, PartialEq)]
pub enum ContainerFormat {
    Epub,
    Pdf,
    Mobi, // MOBI/AZW
    Zip,  // ZIP without an EPUB mimetype entry
    Unknown,
}

const ZIP_LOCAL_HEADER: &[u8; 4] = b"PK\x03\x04";
const EPUB_MIMETYPE: &[u8] = b"application/epub+zip";

/// Detect e-book container format from the downloaded bytes.
pub fn detect_container(data: &[u8]) -> ContainerFormat {
    if data.len() >= 4 && &data[0..4] == ZIP_LOCAL_HEADER {
        if first_entry_is_epub_mimetype(data) {
            return ContainerFormat::Epub;
        }
        return ContainerFormat::Zip;
    }

    if data.starts_with(b"%PDF") {
        return ContainerFormat::Pdf;
    }

    // PalmDB header: type/creator "BOOKMOBI" at offset 60.
    if data.len() >= 68 && &data[60..68] == b"BOOKMOBI" {
        return ContainerFormat::Mobi;
    }

    ContainerFormat::Unknown
}

/// EPUB requires an uncompressed `mimetype` entry first in the archive, so its
/// content sits right after the local file header.
fn first_entry_is_epub_mimetype(data: &[u8]) -> bool {
    // Local file header: 30 fixed bytes, then name, extra field, data.
    if data.len() < 30 {
        return false;
    }
    let method = u16::from_le_bytes([data[8], data[9]]);
    let name_len = u16::from_le_bytes([data[26], data[27]]) as usize;
    let extra_len = u16::from_le_bytes([data[28], data[29]]) as usize;

    let name_end = 30 + name_len;
    if method != 0 || data.len() < name_end || &data[30..name_end] != b"mimetype" {
        return false;
    }

    let content_start = name_end + extra_len;
    data.len() >= content_start + EPUB_MIMETYPE.len()
        && &data[content_start..content_start + EPUB_MIMETYPE.len()] == EPUB_MIMETYPE
}
