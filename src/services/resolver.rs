use crate::services::error::MediaError;
use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// One format match reported by the signature-database identifier.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct FormatMatch {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub mime: String,
    #[serde(default)]
    pub basis: Option<String>,
    #[serde(default)]
    pub warning: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IdentifierFile {
    #[serde(default)]
    matches: Vec<FormatMatch>,
}

#[derive(Debug, Deserialize)]
struct IdentifierReport {
    #[serde(default)]
    files: Vec<IdentifierFile>,
}

/// Signature-based format identifier reachable over a network call; it
/// accepts a local file path and returns zero or more format matches.
#[async_trait]
pub trait SignatureIdentifier: Send + Sync {
    async fn identify(&self, path: &Path) -> Result<Vec<FormatMatch>, MediaError>;
}

/// HTTP client for a signature-database service. The configured URL carries
/// a `[[PATH]]` placeholder substituted with the escaped sample path.
pub struct SignatureService {
    client: reqwest::Client,
    url_template: String,
    timeout: Duration,
}

impl SignatureService {
    pub fn new(url_template: String, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            url_template,
            timeout,
        }
    }
}

#[async_trait]
impl SignatureIdentifier for SignatureService {
    async fn identify(&self, path: &Path) -> Result<Vec<FormatMatch>, MediaError> {
        let escaped =
            utf8_percent_encode(&path.to_string_lossy(), NON_ALPHANUMERIC).to_string();
        let url = self.url_template.replace("[[PATH]]", &escaped);

        let request = self.client.get(&url).timeout(self.timeout).send();
        let response = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| MediaError::Timeout(self.timeout, format!("identifier call {url}")))?
            .map_err(|e| MediaError::Identification(format!("identifier call {url}: {e}")))?;

        if !response.status().is_success() {
            return Err(MediaError::Identification(format!(
                "identifier call {url}: status {}",
                response.status()
            )));
        }
        let report: IdentifierReport = response
            .json()
            .await
            .map_err(|e| MediaError::Identification(format!("identifier response: {e}")))?;

        Ok(report.files.into_iter().flat_map(|f| f.matches).collect())
    }
}

/// Identifier used when no signature service is configured; resolution then
/// relies on byte-signature sniffing alone.
pub struct NoopIdentifier;

#[async_trait]
impl SignatureIdentifier for NoopIdentifier {
    async fn identify(&self, _path: &Path) -> Result<Vec<FormatMatch>, MediaError> {
        Ok(Vec::new())
    }
}

/// Resolved type of a byte stream.
#[derive(Debug, Clone)]
pub struct ResolvedType {
    pub media_type: String,
    pub media_subtype: String,
    pub mimetype: String,
    pub metadata: serde_json::Value,
}

/// Fixed relevance ranking used to choose the most specific mimetype among
/// candidate identifications. Signature databases may disambiguate a generic
/// octet-stream guess but must never override a more specific one.
pub fn mime_relevance(mimetype: &str) -> i32 {
    if mimetype.is_empty() {
        return 0;
    }
    if mimetype == "application/octet-stream" {
        return 1;
    }
    if mimetype == "text/plain" || mimetype == "audio/mpeg" {
        return 2;
    }
    if mimetype.starts_with("application/") {
        return 3;
    }
    if mimetype.starts_with("text/") {
        return 4;
    }
    100
}

/// Determines type/subtype/mimetype of a byte stream from layered
/// heuristics: magic-number sniffing over the head sample, then the external
/// signature identifier, arbitrated by [`mime_relevance`]. Ties keep the
/// sniffing result.
pub struct TypeResolver {
    identifier: Box<dyn SignatureIdentifier>,
}

impl TypeResolver {
    pub fn new(identifier: Box<dyn SignatureIdentifier>) -> Self {
        Self { identifier }
    }

    pub async fn resolve(
        &self,
        sample: &[u8],
        sample_path: &Path,
    ) -> Result<ResolvedType, MediaError> {
        let sniffed = infer::get(sample)
            .map(|kind| kind.mime_type())
            .unwrap_or("application/octet-stream");

        let matches = self.identifier.identify(sample_path).await?;

        let mut best = sniffed.to_string();
        let mut relevance = mime_relevance(sniffed);
        for candidate in &matches {
            if mime_relevance(&candidate.mime) > relevance {
                best = candidate.mime.clone();
                relevance = mime_relevance(&best);
            }
        }

        let parsed = mime::Mime::from_str(&best).map_err(|e| {
            MediaError::Identification(format!("cannot parse media type {best}: {e}"))
        })?;
        let mut media_type = parsed.type_().as_str().to_string();
        let mut media_subtype = parsed.subtype().as_str().to_lowercase();

        // Fixed reclassification so text-oriented derivative actions apply
        // to PDFs as well.
        if media_type == "application" && media_subtype == "pdf" {
            media_type = "text".to_string();
            media_subtype = "pdf".to_string();
        }

        let metadata = json!({
            "sniff": sniffed,
            "signature": matches
                .iter()
                .map(|m| json!({
                    "id": m.id,
                    "format": m.format,
                    "mime": m.mime,
                    "basis": m.basis,
                    "warning": m.warning,
                }))
                .collect::<Vec<_>>(),
        });

        Ok(ResolvedType {
            media_type,
            media_subtype,
            mimetype: best,
            metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedIdentifier(Vec<FormatMatch>);

    #[async_trait]
    impl SignatureIdentifier for FixedIdentifier {
        async fn identify(&self, _path: &Path) -> Result<Vec<FormatMatch>, MediaError> {
            Ok(self.0.clone())
        }
    }

    fn matches(mimes: &[&str]) -> Vec<FormatMatch> {
        mimes
            .iter()
            .map(|m| FormatMatch {
                mime: m.to_string(),
                ..Default::default()
            })
            .collect()
    }

    // Tiny valid PNG header: enough for signature sniffing.
    const PNG_SAMPLE: &[u8] = &[
        0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0, 0, 0, 0x0d, b'I', b'H', b'D', b'R',
    ];

    #[test]
    fn test_relevance_ordering() {
        assert_eq!(mime_relevance(""), 0);
        assert_eq!(mime_relevance("application/octet-stream"), 1);
        assert_eq!(mime_relevance("text/plain"), 2);
        assert_eq!(mime_relevance("audio/mpeg"), 2);
        assert_eq!(mime_relevance("application/pdf"), 3);
        assert_eq!(mime_relevance("text/html"), 4);
        assert_eq!(mime_relevance("image/png"), 100);
        assert_eq!(mime_relevance("video/mp4"), 100);
    }

    #[tokio::test]
    async fn test_signature_match_beats_generic_sniff() {
        let resolver = TypeResolver::new(Box::new(FixedIdentifier(matches(&["image/tiff"]))));
        let resolved = resolver
            .resolve(b"not a known magic number", Path::new("/tmp/sample"))
            .await
            .unwrap();
        assert_eq!(resolved.mimetype, "image/tiff");
        assert_eq!(resolved.media_type, "image");
        assert_eq!(resolved.media_subtype, "tiff");
    }

    #[tokio::test]
    async fn test_specific_sniff_survives_generic_match() {
        let resolver = TypeResolver::new(Box::new(FixedIdentifier(matches(&[
            "application/octet-stream",
        ]))));
        let resolved = resolver
            .resolve(PNG_SAMPLE, Path::new("/tmp/sample"))
            .await
            .unwrap();
        assert_eq!(resolved.mimetype, "image/png");
    }

    #[tokio::test]
    async fn test_tie_keeps_sniffing_result() {
        let resolver = TypeResolver::new(Box::new(FixedIdentifier(matches(&["image/webp"]))));
        let resolved = resolver
            .resolve(PNG_SAMPLE, Path::new("/tmp/sample"))
            .await
            .unwrap();
        // Both score 100; the earlier (sniffing) result wins.
        assert_eq!(resolved.mimetype, "image/png");
    }

    #[tokio::test]
    async fn test_pdf_is_reclassified_as_text() {
        let resolver = TypeResolver::new(Box::new(FixedIdentifier(matches(&["application/pdf"]))));
        let resolved = resolver
            .resolve(b"%PDF-1.7 maybe", Path::new("/tmp/sample"))
            .await
            .unwrap();
        assert_eq!(resolved.media_type, "text");
        assert_eq!(resolved.media_subtype, "pdf");
        assert_eq!(resolved.mimetype, "application/pdf");
    }

    #[tokio::test]
    async fn test_identifier_failure_propagates() {
        struct FailingIdentifier;
        #[async_trait]
        impl SignatureIdentifier for FailingIdentifier {
            async fn identify(&self, _path: &Path) -> Result<Vec<FormatMatch>, MediaError> {
                Err(MediaError::Identification("boom".into()))
            }
        }

        let resolver = TypeResolver::new(Box::new(FailingIdentifier));
        let err = resolver
            .resolve(PNG_SAMPLE, Path::new("/tmp/sample"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::Identification(_)));
    }
}
