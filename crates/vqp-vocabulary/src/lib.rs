//! VQP Vocabulary: Field-to-storage mappings and the vocabulary schema
//! registry.

pub mod error;
pub mod mapping;
pub mod registry;
pub mod source;

pub use error::VocabularyError;
pub use mapping::{
    canonical_vocabulary, standard_section, FlatMapping, StandardMapping, VocabularyMapper,
    VocabularyMapping, STANDARD_SECTIONS,
};
pub use registry::{VocabularyRegistry, DEFAULT_CACHE_TTL};
pub use source::{DirectorySchemaSource, SchemaSource};
