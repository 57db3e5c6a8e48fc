use std::fmt;

/// 正規化後的格式代號
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CanonicalFormat {
    Csv,
    Txt,
    Tsv,
    Json,
    Parquet,
    Excel,
}

impl CanonicalFormat {
    /// 固定順序，也用於多數格式同票時的裁決
    pub const ALL: [CanonicalFormat; 6] = [
        CanonicalFormat::Csv,
        CanonicalFormat::Txt,
        CanonicalFormat::Tsv,
        CanonicalFormat::Json,
        CanonicalFormat::Parquet,
        CanonicalFormat::Excel,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            CanonicalFormat::Csv => "csv",
            CanonicalFormat::Txt => "txt",
            CanonicalFormat::Tsv => "tsv",
            CanonicalFormat::Json => "json",
            CanonicalFormat::Parquet => "parquet",
            CanonicalFormat::Excel => "excel",
        }
    }

    /// 輸出檔案使用的副檔名（不含點）
    pub fn file_extension(&self) -> &'static str {
        match self {
            CanonicalFormat::Excel => "xlsx",
            other => other.id(),
        }
    }

    pub fn is_delimited_text(&self) -> bool {
        matches!(self, CanonicalFormat::Csv | CanonicalFormat::Tsv | CanonicalFormat::Txt)
    }
}

impl fmt::Display for CanonicalFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatDescriptor {
    pub format: CanonicalFormat,
    pub extensions: &'static [&'static str],
    pub aliases: &'static [&'static str],
    pub convertible_to: &'static [CanonicalFormat],
}

impl FormatDescriptor {
    pub fn id(&self) -> &'static str {
        self.format.id()
    }

    pub fn can_convert_to(&self, output: &FormatDescriptor) -> bool {
        self.convertible_to.contains(&output.format)
    }
}

impl fmt::Display for FormatDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}
