//! Content type resolution for uploads.
//!
//! A client may declare a MIME type, the payload may be recognisable from its
//! leading bytes or filename extension, and otherwise the generic binary type
//! applies. [`ContentTypeResolver`] consults these sources in a configurable
//! order and reports which one produced the answer.

use serde::{Deserialize, Serialize};

/// MIME type used when nothing better is known
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Where a resolved content type came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentTypeSource {
    /// Supplied by the client with the upload
    Declared,
    /// Inferred from magic bytes or the filename extension
    Sniffed,
    /// Fallback to [`DEFAULT_CONTENT_TYPE`]
    Defaulted,
}

/// A content type together with its provenance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedContentType {
    pub mime: String,
    pub source: ContentTypeSource,
}

/// Resolves the content type of an upload from an ordered list of sources
#[derive(Debug, Clone)]
pub struct ContentTypeResolver {
    order: Vec<ContentTypeSource>,
}

impl ContentTypeResolver {
    pub fn new(order: Vec<ContentTypeSource>) -> Self {
        Self { order }
    }

    /// Resolve a content type, falling back to [`DEFAULT_CONTENT_TYPE`] when no
    /// configured source yields one.
    pub fn resolve(
        &self,
        declared: Option<&str>,
        filename: &str,
        data: &[u8],
    ) -> ResolvedContentType {
        for source in &self.order {
            let mime = match source {
                ContentTypeSource::Declared => declared_type(declared),
                ContentTypeSource::Sniffed => sniff(filename, data),
                ContentTypeSource::Defaulted => Some(DEFAULT_CONTENT_TYPE.to_string()),
            };

            if let Some(mime) = mime {
                return ResolvedContentType {
                    mime,
                    source: *source,
                };
            }
        }

        ResolvedContentType {
            mime: DEFAULT_CONTENT_TYPE.to_string(),
            source: ContentTypeSource::Defaulted,
        }
    }
}

impl Default for ContentTypeResolver {
    fn default() -> Self {
        Self::new(vec![ContentTypeSource::Declared, ContentTypeSource::Sniffed])
    }
}

/// A declared type counts only if it looks like `type/subtype`
fn declared_type(declared: Option<&str>) -> Option<String> {
    let declared = declared?.trim();
    let (kind, subtype) = declared.split_once('/')?;
    if kind.is_empty() || subtype.is_empty() {
        return None;
    }
    Some(declared.to_string())
}

/// Infer a type from magic bytes first, then the filename extension
fn sniff(filename: &str, data: &[u8]) -> Option<String> {
    sniff_magic(data)
        .or_else(|| sniff_extension(filename))
        .map(str::to_string)
}

fn sniff_magic(data: &[u8]) -> Option<&'static str> {
    infer::get(data).map(|kind| kind.mime_type())
}

fn sniff_extension(filename: &str) -> Option<&'static str> {
    let (_, ext) = filename.rsplit_once('.')?;
    let mime = match ext.to_lowercase().as_str() {
        "jpeg" | "jpg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "txt" | "log" => "text/plain",
        "md" => "text/markdown",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "mp4" => "video/mp4",
        "mp3" => "audio/mpeg",
        _ => return None,
    };
    Some(mime)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declared_wins_by_default() {
        let resolver = ContentTypeResolver::default();
        let resolved = resolver.resolve(Some("text/x-custom"), "notes.txt", b"hello");
        assert_eq!(resolved.mime, "text/x-custom");
        assert_eq!(resolved.source, ContentTypeSource::Declared);
    }

    #[test]
    fn test_malformed_declared_type_is_ignored() {
        let resolver = ContentTypeResolver::default();
        let resolved = resolver.resolve(Some("garbage"), "notes.txt", b"hello");
        assert_eq!(resolved.mime, "text/plain");
        assert_eq!(resolved.source, ContentTypeSource::Sniffed);
    }

    #[test]
    fn test_sniffed_before_declared() {
        let resolver =
            ContentTypeResolver::new(vec![ContentTypeSource::Sniffed, ContentTypeSource::Declared]);
        let png = b"\x89PNG\r\n\x1a\n rest of image";
        let resolved = resolver.resolve(Some("application/octet-stream"), "upload.bin", png);
        assert_eq!(resolved.mime, "image/png");
        assert_eq!(resolved.source, ContentTypeSource::Sniffed);
    }

    #[test]
    fn test_magic_bytes_beat_extension() {
        assert_eq!(sniff("photo.png", b"\xff\xd8\xff\xe0").as_deref(), Some("image/jpeg"));
        assert_eq!(sniff("clip.webp", b"RIFF\0\0\0\0WEBPVP8 ").as_deref(), Some("image/webp"));
    }

    #[test]
    fn test_sniffs_formats_without_usable_extension() {
        let resolver = ContentTypeResolver::default();
        let cases: [(&[u8], &str); 4] = [
            (b"ID3\x03\x00\x00\x00\x00\x00\x00", "audio/mpeg"),
            (b"\x00\x00\x00\x18ftypmp42\x00\x00\x00\x00", "video/mp4"),
            (b"\x00asm\x01\x00\x00\x00", "application/wasm"),
            (b"BM\x36\x00\x0c\x00\x00\x00\x00\x00\x36\x00", "image/bmp"),
        ];

        for (data, expected) in cases {
            let resolved = resolver.resolve(None, "upload", data);
            assert_eq!(resolved.mime, expected);
            assert_eq!(resolved.source, ContentTypeSource::Sniffed);
        }
    }

    #[test]
    fn test_extension_is_case_insensitive() {
        assert_eq!(sniff_extension("REPORT.PDF"), Some("application/pdf"));
        assert_eq!(sniff_extension("no_extension"), None);
    }

    #[test]
    fn test_defaulted_when_nothing_matches() {
        let resolver = ContentTypeResolver::default();
        let resolved = resolver.resolve(None, "blob", &[0x00, 0x01]);
        assert_eq!(resolved.mime, DEFAULT_CONTENT_TYPE);
        assert_eq!(resolved.source, ContentTypeSource::Defaulted);
    }

    #[test]
    fn test_declared_only_order_skips_sniffing() {
        let resolver = ContentTypeResolver::new(vec![ContentTypeSource::Declared]);
        let resolved = resolver.resolve(None, "notes.txt", b"hello");
        assert_eq!(resolved.source, ContentTypeSource::Defaulted);
    }

    #[test]
    fn test_source_deserializes_lowercase() {
        let order: Vec<ContentTypeSource> =
            serde_json::from_str(r#"["sniffed", "declared", "defaulted"]"#).unwrap();
        assert_eq!(
            order,
            vec![
                ContentTypeSource::Sniffed,
                ContentTypeSource::Declared,
                ContentTypeSource::Defaulted
            ]
        );
    }
}
