use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum card title length in characters.
pub const GEN_TITLE_MAX_CHARS: usize = 80;
/// Accent color used when the model omits one.
pub const GEN_DEFAULT_COLOR: &str = "#5865F2";

/// Validation failures of a model-produced gen response
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GenSchemaError {
    /// `format` names no known format
    #[error("unknown format: {0}")]
    UnknownFormat(String),
    /// The field matching `format` is missing
    #[error("format `{0}` has no matching content field")]
    MissingContent(&'static str),
    /// Title exceeds the limit
    #[error("title is {0} characters, limit is 80")]
    TitleTooLong(usize),
    /// Table without columns or rows
    #[error("data table needs at least one column and one row")]
    EmptyTable,
    /// A row does not have one cell per column
    #[error("row {row} has {found} cells, expected {expected}")]
    RowWidth {
        /// Zero-based row index
        row: usize,
        /// Column count
        expected: usize,
        /// Cells in the row
        found: usize,
    },
}

/// Rich text: explanations, tutorials, how-tos.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleContent {
    /// Markdown body
    pub body: String,
    /// One-line summary
    #[serde(default)]
    pub summary: Option<String>,
}

/// Code block with syntax highlighting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeContent {
    /// Programming language
    pub language: String,
    /// Source code
    pub code: String,
    /// Short explanation
    #[serde(default)]
    pub explanation: Option<String>,
    /// Suggested file name
    #[serde(default)]
    pub filename: Option<String>,
}

/// Tabular data for comparisons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataTableContent {
    /// Column headers
    pub columns: Vec<String>,
    /// Rows, one cell per column
    pub rows: Vec<Vec<String>>,
    /// Table caption
    #[serde(default)]
    pub caption: Option<String>,
}

/// Request for server-side image generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageContent {
    /// Detailed image prompt
    pub prompt: String,
    /// Caption shown under the image
    #[serde(default)]
    pub caption: Option<String>,
}

/// Callout style.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalloutVariant {
    /// Neutral information
    #[default]
    Info,
    /// Caution
    Warning,
    /// Helpful hint
    Tip,
    /// Positive outcome
    Success,
    /// Destructive or risky
    Danger,
}

/// Short advisory, tip or warning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalloutContent {
    /// Style
    #[serde(default)]
    pub variant: CalloutVariant,
    /// Callout title
    pub title: String,
    /// Callout body
    pub body: String,
}

/// Content of a gen response, one variant per format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GenContent {
    /// `article`
    Article(ArticleContent),
    /// `code`
    Code(CodeContent),
    /// `data_table`
    DataTable(DataTableContent),
    /// `image`
    Image(ImageContent),
    /// `callout`
    Callout(CalloutContent),
}

impl GenContent {
    /// Format discriminator.
    #[must_use]
    pub const fn format(&self) -> &'static str {
        match self {
            Self::Article(_) => "article",
            Self::Code(_) => "code",
            Self::DataTable(_) => "data_table",
            Self::Image(_) => "image",
            Self::Callout(_) => "callout",
        }
    }
}

/// The loose JSON shape the model returns: a `format` plus one filled field.
#[derive(Debug, Clone, Deserialize)]
pub struct RawGenResponse {
    format: String,
    title: String,
    #[serde(default)]
    color: Option<String>,
    #[serde(default)]
    footer: Option<String>,
    #[serde(default)]
    article: Option<ArticleContent>,
    #[serde(default)]
    code: Option<CodeContent>,
    #[serde(default)]
    data_table: Option<DataTableContent>,
    #[serde(default)]
    image: Option<ImageContent>,
    #[serde(default)]
    callout: Option<CalloutContent>,
}

/// A validated gen response.
///
/// Serializes back into the loose shape (`format` plus the matching field)
/// so clients read the same structure the model produced.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawGenResponse")]
pub struct GenResponse {
    /// Card title
    pub title: String,
    /// Accent color
    pub color: String,
    /// Small footer text
    pub footer: Option<String>,
    /// Format-specific content
    pub content: GenContent,
}

#[derive(Serialize)]
struct GenResponseWire<'a> {
    format: &'static str,
    title: &'a str,
    color: &'a str,
    footer: Option<&'a str>,
    #[serde(flatten)]
    content: &'a GenContent,
}

impl Serialize for GenResponse {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        GenResponseWire {
            format: self.content.format(),
            title: &self.title,
            color: &self.color,
            footer: self.footer.as_deref(),
            content: &self.content,
        }
        .serialize(serializer)
    }
}

impl TryFrom<RawGenResponse> for GenResponse {
    type Error = GenSchemaError;

    fn try_from(raw: RawGenResponse) -> Result<Self, Self::Error> {
        let title_len = raw.title.chars().count();
        if title_len > GEN_TITLE_MAX_CHARS {
            return Err(GenSchemaError::TitleTooLong(title_len));
        }

        let content = match raw.format.as_str() {
            "article" => raw
                .article
                .map(GenContent::Article)
                .ok_or(GenSchemaError::MissingContent("article"))?,
            "code" => raw
                .code
                .map(GenContent::Code)
                .ok_or(GenSchemaError::MissingContent("code"))?,
            "data_table" => {
                let table = raw
                    .data_table
                    .ok_or(GenSchemaError::MissingContent("data_table"))?;
                validate_table(&table)?;
                GenContent::DataTable(table)
            }
            "image" => raw
                .image
                .map(GenContent::Image)
                .ok_or(GenSchemaError::MissingContent("image"))?,
            "callout" => raw
                .callout
                .map(GenContent::Callout)
                .ok_or(GenSchemaError::MissingContent("callout"))?,
            other => return Err(GenSchemaError::UnknownFormat(other.to_string())),
        };

        Ok(Self {
            title: raw.title,
            color: raw
                .color
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| GEN_DEFAULT_COLOR.to_string()),
            footer: raw.footer,
            content,
        })
    }
}

fn validate_table(table: &DataTableContent) -> Result<(), GenSchemaError> {
    if table.columns.is_empty() || table.rows.is_empty() {
        return Err(GenSchemaError::EmptyTable);
    }
    let expected = table.columns.len();
    match table
        .rows
        .iter()
        .enumerate()
        .find(|(_, row)| row.len() != expected)
    {
        Some((row, cells)) => Err(GenSchemaError::RowWidth {
            row,
            expected,
            found: cells.len(),
        }),
        None => Ok(()),
    }
}

impl GenResponse {
    /// Short plain-text rendering used for chat replies.
    #[must_use]
    pub fn chat_summary(&self) -> String {
        let detail = match &self.content {
            GenContent::Article(a) => a.summary.clone().unwrap_or_default(),
            GenContent::Code(c) => c
                .filename
                .clone()
                .map_or_else(|| format!("{} snippet", c.language), |f| format!("`{f}`")),
            GenContent::DataTable(t) => format!("{} rows x {} columns", t.rows.len(), t.columns.len()),
            GenContent::Image(i) => i.caption.clone().unwrap_or_default(),
            GenContent::Callout(c) => c.title.clone(),
        };
        if detail.is_empty() {
            format!("**{}** ({})", self.title, self.content.format())
        } else {
            format!("**{}** ({}): {detail}", self.title, self.content.format())
        }
    }

    /// Image prompt when the response asks for an image.
    #[must_use]
    pub fn image_prompt(&self) -> Option<&str> {
        match &self.content {
            GenContent::Image(image) => Some(&image.prompt),
            _ => None,
        }
    }
}
