//! Page export formats.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Suffix of the per-page metadata sidecar
pub const META_FILE_SUFFIX: &str = "_meta.json";

/// Formats served by `pages/{id}/export/{format}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Markdown,
    Html,
    Pdf,
    Plaintext,
}

impl ExportFormat {
    /// Path segment used by the export endpoint
    pub fn api_name(self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Html => "html",
            Self::Pdf => "pdf",
            Self::Plaintext => "plaintext",
        }
    }

    /// File extension, including the dot
    pub fn extension(self) -> &'static str {
        match self {
            Self::Markdown => ".md",
            Self::Html => ".html",
            Self::Pdf => ".pdf",
            Self::Plaintext => ".txt",
        }
    }

    /// Whether asset links in this format can be rewritten
    pub fn supports_link_rewrite(self) -> bool {
        matches!(self, Self::Markdown)
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.api_name())
    }
}
