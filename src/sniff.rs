use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MimeType {
    Webp,
    Jpeg,
    Png,
    Gif,
    Bmp,
    OctetStream,
}

impl MimeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MimeType::Webp => "image/webp",
            MimeType::Jpeg => "image/jpeg",
            MimeType::Png => "image/png",
            MimeType::Gif => "image/gif",
            MimeType::Bmp => "image/bmp",
            MimeType::OctetStream => "application/octet-stream",
        }
    }
}

impl std::fmt::Display for MimeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// Checked in order, first match wins. WEBP only looks at bytes 8..12 and
// ignores the RIFF header, and PNG skips its leading 0x89.
const SIGNATURES: [(usize, &[u8], MimeType); 5] = [
    (8, b"WEBP", MimeType::Webp),
    (0, b"\xFF\xD8\xFF", MimeType::Jpeg),
    (1, b"PNG", MimeType::Png),
    (0, b"GIF", MimeType::Gif),
    (0, b"BM", MimeType::Bmp),
];

/// The detected type replaces whatever the server declared.
pub fn detect_mime(bytes: &[u8]) -> MimeType {
    SIGNATURES
        .iter()
        .find(|(offset, magic, _)| bytes.get(*offset..*offset + magic.len()) == Some(*magic))
        .map(|(_, _, mime)| *mime)
        .unwrap_or(MimeType::OctetStream)
}
