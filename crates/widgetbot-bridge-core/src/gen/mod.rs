//! Structured `/gen` responses and the feed they are appended to.

mod schema;
mod store;

pub use schema::{
    ArticleContent, CalloutContent, CalloutVariant, CodeContent, DataTableContent, GenContent,
    GenResponse, GenSchemaError, ImageContent, RawGenResponse, GEN_DEFAULT_COLOR,
    GEN_TITLE_MAX_CHARS,
};
pub use store::{GenEntry, GenEntryPayload, GenStore, GeneratedImage};
