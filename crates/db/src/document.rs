use serde::{de::DeserializeOwned, Serialize};

/// A value that can be stored in a [`crate::Collection`].
///
/// The document body is stored as JSON. The fields listed in `FIELDS` are
/// rendered through [`Document::field`] on every write and kept beside the
/// body, which is what indexes and equality filters run against.
pub trait Document: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Name of the collection holding documents of this type.
    const COLLECTION: &'static str;

    /// Every field name [`Document::field`] can render.
    const FIELDS: &'static [&'static str];

    fn id(&self) -> crate::RecordId;

    /// Render a top-level field for indexing and equality matching.
    /// Absent fields return `None`.
    fn field(&self, name: &str) -> Option<String>;
}

/// How an index constrains or serves its collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    /// Rejects two documents with the same key. Sparse indexes ignore
    /// documents whose indexed fields are all absent.
    Unique { sparse: bool },
    /// Lookup index used to narrow equality filters.
    Secondary,
    /// Fields searched by a `contains` condition.
    Text,
}

/// Declarative index definition, contributed by module migrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: &'static str,
    pub fields: &'static [&'static str],
    pub kind: IndexKind,
}

impl IndexSpec {
    pub const fn unique(name: &'static str, fields: &'static [&'static str]) -> Self {
        Self {
            name,
            fields,
            kind: IndexKind::Unique { sparse: false },
        }
    }

    pub const fn unique_sparse(name: &'static str, fields: &'static [&'static str]) -> Self {
        Self {
            name,
            fields,
            kind: IndexKind::Unique { sparse: true },
        }
    }

    pub const fn secondary(name: &'static str, fields: &'static [&'static str]) -> Self {
        Self {
            name,
            fields,
            kind: IndexKind::Secondary,
        }
    }

    pub const fn text(name: &'static str, fields: &'static [&'static str]) -> Self {
        Self {
            name,
            fields,
            kind: IndexKind::Text,
        }
    }
}
