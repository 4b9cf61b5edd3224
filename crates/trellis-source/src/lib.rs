mod collections;
mod encoding;
mod file;
mod position;
mod render;
mod system;

pub use collections::FxDashMap;
pub use encoding::decode;
pub use encoding::DecodedText;
pub use encoding::Encoding;
pub use encoding::EncodingError;
pub use file::MarkupSource;
pub use file::SourceId;
pub use position::ByteOffset;
pub use position::LineCol;
pub use position::LineIndex;
pub use position::Span;
pub use render::Diagnostic;
pub use render::DiagnosticAnnotation;
pub use render::DiagnosticRenderer;
pub use render::Severity;
pub use system::FileSystem;
pub use system::InMemoryFileSystem;
pub use system::OsFileSystem;
