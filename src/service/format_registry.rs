use std::path::Path;

use crate::error::{ConvertError, Result};
use crate::models::format::{CanonicalFormat, FormatDescriptor};

const ALL_FORMATS: &[CanonicalFormat] = &CanonicalFormat::ALL;

static DESCRIPTORS: [FormatDescriptor; 6] = [
    FormatDescriptor {
        format: CanonicalFormat::Csv,
        extensions: &["csv"],
        aliases: &["csv"],
        convertible_to: ALL_FORMATS,
    },
    FormatDescriptor {
        format: CanonicalFormat::Txt,
        extensions: &["txt"],
        aliases: &["txt"],
        convertible_to: ALL_FORMATS,
    },
    FormatDescriptor {
        format: CanonicalFormat::Tsv,
        extensions: &["tsv"],
        aliases: &["tsv"],
        convertible_to: ALL_FORMATS,
    },
    FormatDescriptor {
        format: CanonicalFormat::Json,
        extensions: &["json"],
        aliases: &["json", "js"],
        convertible_to: ALL_FORMATS,
    },
    FormatDescriptor {
        format: CanonicalFormat::Parquet,
        extensions: &["parquet", "pq", "parq"],
        aliases: &["parquet", "pq", "parq"],
        convertible_to: ALL_FORMATS,
    },
    FormatDescriptor {
        format: CanonicalFormat::Excel,
        extensions: &["xlsx"],
        aliases: &["excel", "ex", "xlsx"],
        convertible_to: ALL_FORMATS,
    },
];

/// 副檔名與格式代號的對照表，啟動時建立一次
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatRegistry;

impl FormatRegistry {
    pub fn new() -> Self {
        FormatRegistry
    }

    pub fn descriptor(&self, format: CanonicalFormat) -> FormatDescriptor {
        DESCRIPTORS
            .iter()
            .find(|d| d.format == format)
            .cloned()
            .unwrap_or_else(|| DESCRIPTORS[0].clone())
    }

    /// 解析 `-i`/`-o` 的格式代號（含別名）
    pub fn parse_token(&self, token: &str) -> Result<FormatDescriptor> {
        let normalized = token.trim().trim_start_matches('.').to_ascii_lowercase();
        DESCRIPTORS
            .iter()
            .find(|d| d.aliases.contains(&normalized.as_str()))
            .cloned()
            .ok_or_else(|| ConvertError::UnsupportedConversion(token.to_string()))
    }

    pub fn from_extension(&self, path: &Path) -> Option<FormatDescriptor> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        DESCRIPTORS
            .iter()
            .find(|d| d.extensions.contains(&ext.as_str()))
            .cloned()
    }

    /// 指定的覆寫格式優先於副檔名判斷
    pub fn resolve(&self, path: &Path, override_token: Option<&str>) -> Result<FormatDescriptor> {
        if let Some(token) = override_token {
            return self.parse_token(token);
        }
        self.from_extension(path)
            .ok_or_else(|| ConvertError::UnknownFormat(path.display().to_string()))
    }

    pub fn validate(&self, input: &FormatDescriptor, output: &FormatDescriptor) -> Result<()> {
        if input.can_convert_to(output) {
            Ok(())
        } else {
            Err(ConvertError::UnsupportedConversion(format!("{} -> {}", input, output)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uppercase_pq_extension_resolves_to_parquet() {
        let registry = FormatRegistry::new();
        let descriptor = registry.resolve(Path::new("data.PQ"), None).unwrap();
        assert_eq!(descriptor.format, CanonicalFormat::Parquet);
    }

    #[test]
    fn unknown_extension_without_override_fails() {
        let registry = FormatRegistry::new();
        let err = registry.resolve(Path::new("data.bin"), None).unwrap_err();
        assert!(matches!(err, ConvertError::UnknownFormat(_)));
        let err = registry.resolve(Path::new("README"), None).unwrap_err();
        assert!(matches!(err, ConvertError::UnknownFormat(_)));
    }

    #[test]
    fn override_takes_precedence_over_extension() {
        let registry = FormatRegistry::new();
        let descriptor = registry.resolve(Path::new("dump.bin"), Some("ex")).unwrap();
        assert_eq!(descriptor.format, CanonicalFormat::Excel);
        let descriptor = registry.resolve(Path::new("data.csv"), Some(" PQ ")).unwrap();
        assert_eq!(descriptor.format, CanonicalFormat::Parquet);
    }

    #[test]
    fn malformed_token_is_unsupported() {
        let registry = FormatRegistry::new();
        let err = registry.parse_token("xml").unwrap_err();
        assert!(matches!(err, ConvertError::UnsupportedConversion(_)));
    }

    #[test]
    fn every_pair_is_permitted() {
        let registry = FormatRegistry::new();
        for input in CanonicalFormat::ALL {
            for output in CanonicalFormat::ALL {
                registry
                    .validate(&registry.descriptor(input), &registry.descriptor(output))
                    .unwrap();
            }
        }
    }
}
