use zdl_gateway::detect::container::{detect_container, ContainerFormat};

/// Local file header for a single stored entry followed by its content.
fn zip_entry(name: &str, method: u16, content: &[u8]) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(b"PK\x03\x04");
    data.extend_from_slice(&20u16.to_le_bytes()); // version needed
    data.extend_from_slice(&0u16.to_le_bytes()); // flags
    data.extend_from_slice(&method.to_le_bytes());
    data.extend_from_slice(&[0u8; 16]); // time, date, crc, sizes
    data.extend_from_slice(&(name.len() as u16).to_le_bytes());
    data.extend_from_slice(&0u16.to_le_bytes()); // extra length
    data.extend_from_slice(name.as_bytes());
    data.extend_from_slice(content);
    data
}

#[test]
fn test_detect_epub() {
    let data = zip_entry("mimetype", 0, b"application/epub+zip");
    assert_eq!(detect_container(&data), ContainerFormat::Epub);
}

#[test]
fn test_detect_plain_zip() {
    let data = zip_entry("readme.txt", 0, b"hello");
    assert_eq!(detect_container(&data), ContainerFormat::Zip);

    // A deflated mimetype entry is not a valid EPUB container.
    let data = zip_entry("mimetype", 8, b"application/epub+zip");
    assert_eq!(detect_container(&data), ContainerFormat::Zip);

    let data = zip_entry("mimetype", 0, b"application/zip");
    assert_eq!(detect_container(&data), ContainerFormat::Zip);
}

#[test]
fn test_detect_pdf() {
    assert_eq!(detect_container(b"%PDF-1.4\n..."), ContainerFormat::Pdf);
}

#[test]
fn test_detect_mobi() {
    let mut header = vec![0u8; 128];
    header[60..68].copy_from_slice(b"BOOKMOBI");
    assert_eq!(detect_container(&header), ContainerFormat::Mobi);
}

#[test]
fn test_detect_unknown_and_short_input() {
    assert_eq!(detect_container(b""), ContainerFormat::Unknown);
    assert_eq!(detect_container(b"PK"), ContainerFormat::Unknown);
    assert_eq!(detect_container(b"<html>"), ContainerFormat::Unknown);
    // Truncated local header.
    assert_eq!(detect_container(b"PK\x03\x04\x14\x00"), ContainerFormat::Zip);
}
