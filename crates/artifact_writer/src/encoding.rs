use encoding_rs::{Encoding, UTF_8};
use tabular_contract::CodecError;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// A resolved WHATWG encoding label.
///
/// `utf-8-sig` is accepted in addition to the WHATWG labels and produces
/// UTF-8 with a leading byte order mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextEncoding {
    encoding: &'static Encoding,
    bom: bool,
}

impl TextEncoding {
    pub fn resolve(label: &str) -> Result<Self, CodecError> {
        let normalized = label.trim().to_ascii_lowercase().replace('_', "-");
        if matches!(normalized.as_str(), "utf-8-sig" | "utf8-sig" | "utf-8-bom") {
            return Ok(Self {
                encoding: UTF_8,
                bom: true,
            });
        }

        // WHATWG labels use underscores for a few legacy names such as shift_jis.
        let encoding = Encoding::for_label(label.trim().as_bytes())
            .or_else(|| Encoding::for_label(normalized.as_bytes()))
            .ok_or_else(|| CodecError::UnknownEncoding {
                label: label.to_string(),
            })?;

        Ok(Self {
            // UTF-16 cannot be produced by an encoder; encoding_rs maps it to UTF-8.
            encoding: encoding.output_encoding(),
            bom: false,
        })
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.encoding.name()
    }

    #[must_use]
    pub fn has_bom(&self) -> bool {
        self.bom
    }

    /// Encodes `text`, failing when a character has no mapping in the target encoding.
    pub fn encode(&self, text: &str) -> Result<Vec<u8>, CodecError> {
        let (bytes, _, had_unmappable) = self.encoding.encode(text);
        if had_unmappable {
            return Err(CodecError::Unencodable {
                encoding: self.encoding.name().to_string(),
            });
        }

        if self.bom {
            let mut out = Vec::with_capacity(UTF8_BOM.len() + bytes.len());
            out.extend_from_slice(UTF8_BOM);
            out.extend_from_slice(&bytes);
            Ok(out)
        } else {
            Ok(bytes.into_owned())
        }
    }
}
