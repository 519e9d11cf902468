//! Translation between protocol field names and vault data paths.
//!
//! The engine has no knowledge of storage layout: it only calls the two
//! pure functions of the installed [`VocabularyMapping`]. For every field a
//! mapping understands, `to_field(&to_data_path(f, v), v) == f` must hold.

use std::fmt;
use std::sync::Arc;

/// Prefix of the HTTPS form of the standard vocabulary URIs.
pub const VOCAB_URL_PREFIX: &str = "https://vqp.dev/vocab/";

/// The standard vocabularies and the vault section each routes to.
pub const STANDARD_SECTIONS: &[(&str, &str)] = &[
    ("vqp:identity:v1", "personal"),
    ("vqp:financial:v1", "financial"),
    ("vqp:health:v1", "health"),
    ("vqp:metrics:v1", "system"),
    ("vqp:academic:v1", "academic"),
    ("vqp:supply-chain:v1", "supply_chain"),
];

/// Normalize `https://vqp.dev/vocab/<name>/v<n>` to `vqp:<name>:v<n>`.
/// Any other URI is returned unchanged.
pub fn canonical_vocabulary(uri: &str) -> String {
    let Some(rest) = uri.strip_prefix(VOCAB_URL_PREFIX) else {
        return uri.to_string();
    };
    let rest = rest.trim_end_matches('/');
    match rest.split_once('/') {
        Some((name, version))
            if !name.is_empty() && version.starts_with('v') && !version.contains('/') =>
        {
            format!("vqp:{}:{}", name, version)
        }
        _ => uri.to_string(),
    }
}

/// Vault section for a standard vocabulary.
pub fn standard_section(vocab: &str) -> Option<&'static str> {
    let canonical = canonical_vocabulary(vocab);
    STANDARD_SECTIONS
        .iter()
        .find(|(uri, _)| *uri == canonical)
        .map(|(_, section)| *section)
}

/// A pair of pure functions between field names and data paths.
pub trait VocabularyMapping: Send + Sync {
    fn to_data_path(&self, field: &str, vocab: &str) -> Vec<String>;

    fn to_field(&self, path: &[String], vocab: &str) -> String;
}

/// Routes known vocabularies to fixed top-level sections.
///
/// `age` under `vqp:identity:v1` lives at `personal.age`; unknown
/// vocabularies keep the field as a single segment.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardMapping;

impl VocabularyMapping for StandardMapping {
    fn to_data_path(&self, field: &str, vocab: &str) -> Vec<String> {
        match standard_section(vocab) {
            Some(section) => std::iter::once(section)
                .chain(field.split('.'))
                .map(str::to_string)
                .collect(),
            None => vec![field.to_string()],
        }
    }

    fn to_field(&self, path: &[String], vocab: &str) -> String {
        match (standard_section(vocab), path.split_first()) {
            (Some(section), Some((head, rest))) if head == section && !rest.is_empty() => {
                rest.join(".")
            }
            _ => path.join("."),
        }
    }
}

/// Dotted field names split into segments, for arbitrary nested stores.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatMapping;

impl VocabularyMapping for FlatMapping {
    fn to_data_path(&self, field: &str, _vocab: &str) -> Vec<String> {
        field.split('.').map(str::to_string).collect()
    }

    fn to_field(&self, path: &[String], _vocab: &str) -> String {
        path.join(".")
    }
}

/// The mapping installed in a deployment.
#[derive(Clone, Default)]
pub enum VocabularyMapper {
    #[default]
    Standard,
    Flat,
    Custom(Arc<dyn VocabularyMapping>),
}

impl fmt::Debug for VocabularyMapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standard => write!(f, "Standard"),
            Self::Flat => write!(f, "Flat"),
            Self::Custom(_) => write!(f, "Custom"),
        }
    }
}

impl VocabularyMapper {
    /// Look up a built-in mapping by its configuration name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "standard" => Some(Self::Standard),
            "flat" => Some(Self::Flat),
            _ => None,
        }
    }

    pub fn custom(mapping: impl VocabularyMapping + 'static) -> Self {
        Self::Custom(Arc::new(mapping))
    }

    pub fn to_data_path(&self, field: &str, vocab: &str) -> Vec<String> {
        match self {
            Self::Standard => StandardMapping.to_data_path(field, vocab),
            Self::Flat => FlatMapping.to_data_path(field, vocab),
            Self::Custom(mapping) => mapping.to_data_path(field, vocab),
        }
    }

    pub fn to_field(&self, path: &[String], vocab: &str) -> String {
        match self {
            Self::Standard => StandardMapping.to_field(path, vocab),
            Self::Flat => FlatMapping.to_field(path, vocab),
            Self::Custom(mapping) => mapping.to_field(path, vocab),
        }
    }

    /// Resolve every field, preserving order.
    pub fn map_fields(&self, fields: &[String], vocab: &str) -> Vec<Vec<String>> {
        fields
            .iter()
            .map(|field| self.to_data_path(field, vocab))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(segments: &[&str]) -> Vec<String> {
        segments.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_canonical_vocabulary() {
        assert_eq!(
            canonical_vocabulary("https://vqp.dev/vocab/identity/v1"),
            "vqp:identity:v1"
        );
        assert_eq!(
            canonical_vocabulary("https://vqp.dev/vocab/supply-chain/v1/"),
            "vqp:supply-chain:v1"
        );
        assert_eq!(canonical_vocabulary("vqp:health:v1"), "vqp:health:v1");
        assert_eq!(
            canonical_vocabulary("https://example.org/vocab"),
            "https://example.org/vocab"
        );
    }

    #[test]
    fn test_standard_sections() {
        let m = StandardMapping;
        assert_eq!(m.to_data_path("age", "vqp:identity:v1"), path(&["personal", "age"]));
        assert_eq!(
            m.to_data_path("annual_income", "https://vqp.dev/vocab/financial/v1"),
            path(&["financial", "annual_income"])
        );
        assert_eq!(
            m.to_data_path("uptime_percentage_24h", "vqp:metrics:v1"),
            path(&["system", "uptime_percentage_24h"])
        );
        assert_eq!(
            m.to_data_path("lab.results", "vqp:health:v1"),
            path(&["health", "lab", "results"])
        );
    }

    #[test]
    fn test_standard_unknown_vocab_single_segment() {
        let m = StandardMapping;
        assert_eq!(
            m.to_data_path("custom.nested.field", "https://example.org/custom"),
            path(&["custom.nested.field"])
        );
    }

    #[test]
    fn test_standard_roundtrip() {
        let m = StandardMapping;
        let fields = ["age", "citizenship", "lab.results.hba1c", "x"];
        let mut vocabs: Vec<&str> = STANDARD_SECTIONS.iter().map(|(v, _)| *v).collect();
        vocabs.push("https://vqp.dev/vocab/academic/v1");
        vocabs.push("urn:example:unknown");
        for vocab in vocabs {
            for field in fields {
                assert_eq!(m.to_field(&m.to_data_path(field, vocab), vocab), field);
            }
        }
    }

    #[test]
    fn test_flat_roundtrip() {
        let m = FlatMapping;
        assert_eq!(m.to_data_path("a.b.c", "any"), path(&["a", "b", "c"]));
        for field in ["a", "a.b", "deep.er.path"] {
            assert_eq!(m.to_field(&m.to_data_path(field, "v"), "v"), field);
        }
    }

    struct Prefixed;

    impl VocabularyMapping for Prefixed {
        fn to_data_path(&self, field: &str, _vocab: &str) -> Vec<String> {
            vec!["records".into(), field.to_string()]
        }

        fn to_field(&self, path: &[String], _vocab: &str) -> String {
            path[1..].join(".")
        }
    }

    #[test]
    fn test_mapper_dispatch_and_map_fields() {
        let fields = vec!["age".to_string(), "citizenship".to_string()];
        assert_eq!(
            VocabularyMapper::Standard.map_fields(&fields, "vqp:identity:v1"),
            vec![path(&["personal", "age"]), path(&["personal", "citizenship"])]
        );
        assert_eq!(
            VocabularyMapper::Flat.map_fields(&fields, "vqp:identity:v1"),
            vec![path(&["age"]), path(&["citizenship"])]
        );
        let custom = VocabularyMapper::custom(Prefixed);
        assert_eq!(custom.to_data_path("age", "v"), path(&["records", "age"]));
        assert_eq!(custom.to_field(&path(&["records", "age"]), "v"), "age");
    }

    #[test]
    fn test_from_name() {
        assert!(matches!(VocabularyMapper::from_name("flat"), Some(VocabularyMapper::Flat)));
        assert!(VocabularyMapper::from_name("other").is_none());
    }
}
