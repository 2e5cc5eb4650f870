//! Durable artifact writing for tabular datasets.

mod encoding;
mod error;
mod text;
mod writer;

pub use encoding::TextEncoding;
pub use error::WriteError;
pub use text::TextCodec;
pub use writer::{ArtifactWriter, WriteReport};
