// src/document/decode.rs
//! Byte-to-text decoding over an ordered list of candidate encodings.

use encoding_rs::Encoding;

/// Outcome of decoding one archive entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub text: String,
    pub encoding: String,
    /// A later candidate (or a BOM) was used instead of the first configured encoding.
    pub fallback: bool,
    /// Nothing decoded cleanly; invalid sequences were replaced.
    pub lossy: bool,
}

/// Whether `text` mentions at least one of the domain keywords.
pub fn has_keyword(text: &str, probes: &[String]) -> bool {
    probes.iter().any(|k| text.contains(k.as_str()))
}

/// Decodes `bytes` by BOM first, then by each label in `encodings` order. The
/// first decode without errors that contains a keyword wins. Failing that, the
/// first decode with replacements that still contains a keyword is taken as
/// lossy. When none does, the bytes are decoded as UTF-8 with replacement
/// characters.
pub fn decode_bytes(bytes: &[u8], encodings: &[String], probes: &[String]) -> Decoded {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        let (text, had_errors) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
        if !had_errors {
            tracing::debug!("Decoded by {} byte order mark", encoding.name());
            return Decoded {
                text: text.into_owned(),
                encoding: encoding.name().to_string(),
                fallback: encodings
                    .first()
                    .and_then(|l| Encoding::for_label(l.as_bytes()))
                    .map_or(true, |first| first != encoding),
                lossy: false,
            };
        }
    }

    let candidates: Vec<&'static Encoding> = encodings
        .iter()
        .filter_map(|label| {
            let encoding = Encoding::for_label(label.as_bytes());
            if encoding.is_none() {
                tracing::warn!("Unknown encoding label '{}' in configuration", label);
            }
            encoding
        })
        .collect();

    for (i, encoding) in candidates.iter().enumerate() {
        let (text, had_errors) = encoding.decode_without_bom_handling(bytes);
        if had_errors {
            tracing::trace!("{} decode had errors", encoding.name());
            continue;
        }
        if !has_keyword(&text, probes) {
            tracing::trace!("{} decode has no domain keyword", encoding.name());
            continue;
        }
        return Decoded {
            text: text.into_owned(),
            encoding: encoding.name().to_string(),
            fallback: i > 0,
            lossy: false,
        };
    }

    // A stray invalid byte must not cost the whole document.
    for (i, encoding) in candidates.iter().enumerate() {
        let (text, _) = encoding.decode_without_bom_handling(bytes);
        if has_keyword(&text, probes) {
            tracing::warn!("Decoded as {} with replacement characters", encoding.name());
            return Decoded {
                text: text.into_owned(),
                encoding: encoding.name().to_string(),
                fallback: i > 0,
                lossy: true,
            };
        }
    }

    Decoded {
        text: String::from_utf8_lossy(bytes).into_owned(),
        encoding: "UTF-8".to_string(),
        fallback: true,
        lossy: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::config::EngineConfig;

    fn decode(bytes: &[u8]) -> Decoded {
        let config = EngineConfig::default();
        decode_bytes(bytes, &config.encodings, &config.keyword_probes)
    }

    #[test]
    fn utf8_is_first_choice() {
        let decoded = decode("<P>재무상태표 자산총계</P>".as_bytes());
        assert_eq!(decoded.encoding, "UTF-8");
        assert!(!decoded.fallback);
        assert!(!decoded.lossy);
    }

    #[test]
    fn euc_kr_documents_fall_back() {
        let (bytes, _, _) = encoding_rs::EUC_KR.encode("<P>재무상태표 (단위 : 천원)</P>");
        let decoded = decode(&bytes);
        assert_eq!(decoded.encoding, "EUC-KR");
        assert!(decoded.fallback);
        assert!(decoded.text.contains("재무상태표"));
    }

    #[test]
    fn bom_is_honoured() {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "손익계산서".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        let decoded = decode(&bytes);
        assert_eq!(decoded.encoding, "UTF-16LE");
        assert_eq!(decoded.text, "손익계산서");
    }

    #[test]
    fn stray_invalid_byte_keeps_the_korean_decode() {
        let (body, _, _) = encoding_rs::EUC_KR.encode("<P>재무상태표 자산총계 1,000,000</P>");
        let mut bytes = body.into_owned();
        bytes.extend_from_slice(&[0xFE, 0x20]);
        let decoded = decode(&bytes);
        assert_eq!(decoded.encoding, "EUC-KR");
        assert!(decoded.lossy);
        assert!(decoded.text.contains("자산총계 1,000,000"));
    }

    #[test]
    fn undecodable_bytes_are_lossy_never_fatal() {
        let decoded = decode(&[0x80, 0x81, b'a', 0xFF]);
        assert!(decoded.lossy);
        assert!(decoded.text.contains('\u{FFFD}'));
    }
}
