//! Typed metadata model shared by every storage component.
//!
//! A [`MetadataSchema`] is an ordered list of uniquely-named typed fields.
//! Field order is load-bearing: the storage layer writes metadata columns in
//! declaration order and reads rows back by walking the same order, so a
//! schema must not be reordered once a table holds data.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::errors::{EngineError, Result};

/// Metadata key linking a derived document back to its parent document.
pub const PARENT_DOC_ID_KEY: &str = "parent_doc_id";
/// Metadata key carrying a page or chunk sequence number.
pub const PAGE_NO_KEY: &str = "page_no";
/// Metadata key naming the unit a derived document was cut from.
pub const FILE_SOURCE_KEY: &str = "file_source";

/// Primitive kinds a metadata field can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Int32,
    Int64,
    Float32,
    Float64,
    Bool,
    String,
}

impl FieldKind {
    /// SQL column type used when declaring a column of this kind.
    pub fn sql_type(&self) -> &'static str {
        match self {
            FieldKind::Int32 => "INTEGER",
            FieldKind::Int64 => "BIGINT",
            FieldKind::Float32 => "FLOAT",
            FieldKind::Float64 => "DOUBLE",
            FieldKind::Bool => "BOOL",
            FieldKind::String => "VARCHAR",
        }
    }

    /// Parse a kind from its configuration name.
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "int32" => Ok(FieldKind::Int32),
            "int64" => Ok(FieldKind::Int64),
            "float32" => Ok(FieldKind::Float32),
            "float64" => Ok(FieldKind::Float64),
            "bool" => Ok(FieldKind::Bool),
            "string" => Ok(FieldKind::String),
            other => Err(EngineError::UnknownFieldType { name: other.into() }),
        }
    }
}

impl std::str::FromStr for FieldKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        FieldKind::parse(s)
    }
}

/// A typed metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Bool(bool),
    String(String),
}

impl FieldValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Int32(_) => FieldKind::Int32,
            FieldValue::Int64(_) => FieldKind::Int64,
            FieldValue::Float32(_) => FieldKind::Float32,
            FieldValue::Float64(_) => FieldKind::Float64,
            FieldValue::Bool(_) => FieldKind::Bool,
            FieldValue::String(_) => FieldKind::String,
        }
    }

    /// Default value for a kind, used by the preset-metadata fill step.
    pub fn default_for(kind: FieldKind) -> FieldValue {
        match kind {
            FieldKind::Int32 => FieldValue::Int32(0),
            FieldKind::Int64 => FieldValue::Int64(0),
            FieldKind::Float32 => FieldValue::Float32(0.0),
            FieldKind::Float64 => FieldValue::Float64(0.0),
            FieldKind::Bool => FieldValue::Bool(false),
            FieldKind::String => FieldValue::String(String::new()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }
}

/// A named metadata value attached to a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataField {
    pub name: String,
    pub value: FieldValue,
}

impl MetadataField {
    pub fn new(name: impl Into<String>, value: FieldValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// One declared field of a schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
}

/// A single validation problem found in a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

impl FieldViolation {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Ordered, uniquely-named typed metadata fields.
///
/// A schema with zero fields is the universal "no constraints" schema: any
/// metadata is accepted and none of it is persisted as columns.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataSchema {
    fields: Vec<FieldSpec>,
    // name -> position lookup built once, so validation and row mapping never
    // scan the field list per access
    index: HashMap<String, usize>,
}

impl MetadataSchema {
    /// The universal schema with no declared fields.
    pub fn empty() -> Self {
        Self {
            fields: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Build a schema from declared fields, rejecting duplicate or unusable
    /// column names.
    pub fn new(fields: Vec<FieldSpec>) -> Result<Self> {
        let mut index = HashMap::with_capacity(fields.len());
        for (position, spec) in fields.iter().enumerate() {
            if !is_valid_identifier(&spec.name) {
                return Err(EngineError::Configuration {
                    message: format!("invalid metadata field name: {:?}", spec.name),
                });
            }
            if RESERVED_COLUMNS.contains(&spec.name.as_str()) {
                return Err(EngineError::Configuration {
                    message: format!("metadata field name {:?} collides with a storage column", spec.name),
                });
            }
            if index.insert(spec.name.clone(), position).is_some() {
                return Err(EngineError::Configuration {
                    message: format!("duplicate metadata field name: {:?}", spec.name),
                });
            }
        }
        Ok(Self { fields, index })
    }

    /// Schema holding only the reserved provenance fields used by chunked and
    /// guidance retrievers.
    pub fn with_presets() -> Self {
        let fields = vec![
            FieldSpec {
                name: PARENT_DOC_ID_KEY.into(),
                kind: FieldKind::String,
            },
            FieldSpec {
                name: PAGE_NO_KEY.into(),
                kind: FieldKind::Int32,
            },
            FieldSpec {
                name: FILE_SOURCE_KEY.into(),
                kind: FieldKind::String,
            },
        ];
        let index = fields
            .iter()
            .enumerate()
            .map(|(i, spec)| (spec.name.clone(), i))
            .collect();
        Self { fields, index }
    }

    pub fn builder() -> MetadataSchemaBuilder {
        MetadataSchemaBuilder { fields: Vec::new() }
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Declaration position of a field, if present.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.position(name).map(|i| &self.fields[i])
    }

    /// Validate a document, returning every violation found rather than
    /// stopping at the first.
    pub fn validate(&self, doc: &Document, strict: bool) -> Vec<FieldViolation> {
        match self.check_document(doc, strict) {
            Ok(_) => Vec::new(),
            Err(violations) => violations,
        }
    }

    /// Validate a document and, when it passes, hand back its metadata values
    /// in schema-declared order, ready for column-ordered binding.
    pub fn check_document<'d>(
        &self,
        doc: &'d Document,
        strict: bool,
    ) -> std::result::Result<Vec<&'d FieldValue>, Vec<FieldViolation>> {
        let mut violations = Vec::new();
        if doc.text.trim().is_empty() {
            violations.push(FieldViolation::new("text", "text must not be blank"));
        }

        let mut ordered = Vec::with_capacity(self.fields.len());
        for spec in &self.fields {
            let mut found: Option<&FieldValue> = None;
            let mut occurrences = 0usize;
            for field in &doc.metadata {
                if field.name == spec.name {
                    occurrences += 1;
                    found = Some(&field.value);
                }
            }
            match (occurrences, found) {
                (0, _) => violations.push(FieldViolation::new(
                    spec.name.clone(),
                    "missing required metadata field",
                )),
                (1, Some(value)) if value.kind() != spec.kind => violations.push(FieldViolation::new(
                    spec.name.clone(),
                    format!("expected {:?} value, found {:?}", spec.kind, value.kind()),
                )),
                (1, Some(value)) => ordered.push(value),
                (n, _) => violations.push(FieldViolation::new(
                    spec.name.clone(),
                    format!("metadata field appears {n} times"),
                )),
            }
        }

        // the empty schema is universal, so strict mode has nothing to reject
        if strict && !self.fields.is_empty() {
            for field in &doc.metadata {
                if self.position(&field.name).is_none() {
                    violations.push(FieldViolation::new(
                        field.name.clone(),
                        "metadata field not declared in schema",
                    ));
                }
            }
        }

        if violations.is_empty() {
            Ok(ordered)
        } else {
            Err(violations)
        }
    }
}

/// Builder collecting fields in declaration order.
pub struct MetadataSchemaBuilder {
    fields: Vec<FieldSpec>,
}

impl MetadataSchemaBuilder {
    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            kind,
        });
        self
    }

    pub fn build(self) -> Result<MetadataSchema> {
        MetadataSchema::new(self.fields)
    }
}

/// Ensure the reserved provenance keys are present on a document, defaulting
/// absent ones to empty/zero. Existing values are left untouched.
pub fn fill_preset_metadata(doc: &mut Document) {
    let presets = [
        (PARENT_DOC_ID_KEY, FieldKind::String),
        (PAGE_NO_KEY, FieldKind::Int32),
        (FILE_SOURCE_KEY, FieldKind::String),
    ];
    for (name, kind) in presets {
        if doc.metadata_value(name).is_none() {
            doc.metadata
                .push(MetadataField::new(name, FieldValue::default_for(kind)));
        }
    }
}

// columns every store table owns regardless of schema
const RESERVED_COLUMNS: [&str; 3] = ["id", "text", "vector"];

/// Whether a name is safe to splice into generated SQL as an identifier.
pub(crate) fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_schema() -> MetadataSchema {
        MetadataSchema::builder()
            .field("page_count", FieldKind::Int32)
            .field("source", FieldKind::String)
            .field("score_hint", FieldKind::Float64)
            .build()
            .unwrap()
    }

    fn valid_doc() -> Document {
        let mut doc = Document::new("some text");
        doc.metadata.push(MetadataField::new("page_count", FieldValue::Int32(3)));
        doc.metadata
            .push(MetadataField::new("source", FieldValue::String("a.pdf".into())));
        doc.metadata
            .push(MetadataField::new("score_hint", FieldValue::Float64(0.5)));
        doc
    }

    #[test]
    fn test_sql_type_mapping() {
        assert_eq!(FieldKind::Int32.sql_type(), "INTEGER");
        assert_eq!(FieldKind::Int64.sql_type(), "BIGINT");
        assert_eq!(FieldKind::Float32.sql_type(), "FLOAT");
        assert_eq!(FieldKind::Float64.sql_type(), "DOUBLE");
        assert_eq!(FieldKind::Bool.sql_type(), "BOOL");
        assert_eq!(FieldKind::String.sql_type(), "VARCHAR");
    }

    #[test]
    fn test_unknown_kind_is_fatal() {
        let err = FieldKind::parse("decimal").unwrap_err();
        assert!(matches!(err, EngineError::UnknownFieldType { .. }));
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let result = MetadataSchema::builder()
            .field("source", FieldKind::String)
            .field("source", FieldKind::Int32)
            .build();
        assert!(matches!(result, Err(EngineError::Configuration { .. })));
    }

    #[test]
    fn test_reserved_column_rejected() {
        let result = MetadataSchema::builder().field("id", FieldKind::String).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_valid_document_passes_with_ordered_values() {
        let schema = sample_schema();
        let doc = valid_doc();
        let ordered = schema.check_document(&doc, false).unwrap();
        assert_eq!(ordered.len(), 3);
        assert_eq!(ordered[0], &FieldValue::Int32(3));
        assert_eq!(ordered[2], &FieldValue::Float64(0.5));
    }

    #[test]
    fn test_all_violations_reported_together() {
        let schema = sample_schema();
        let mut doc = Document::new("   ");
        doc.metadata
            .push(MetadataField::new("page_count", FieldValue::String("three".into())));
        let violations = schema.validate(&doc, false);
        // blank text, mistyped page_count, missing source, missing score_hint
        assert_eq!(violations.len(), 4);
        assert!(violations.iter().any(|v| v.field == "text"));
        assert!(violations.iter().any(|v| v.field == "source"));
    }

    #[test]
    fn test_strict_mode_flags_undeclared_fields() {
        let schema = sample_schema();
        let mut doc = valid_doc();
        doc.metadata
            .push(MetadataField::new("extra", FieldValue::Bool(true)));
        assert!(schema.validate(&doc, false).is_empty());
        let violations = schema.validate(&doc, true);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].field, "extra");
    }

    #[test]
    fn test_empty_schema_is_universal() {
        let schema = MetadataSchema::empty();
        let mut doc = Document::new("text");
        doc.metadata
            .push(MetadataField::new("anything", FieldValue::Int64(9)));
        assert!(schema.validate(&doc, true).is_empty());
    }

    #[test]
    fn test_duplicate_metadata_field_flagged() {
        let schema = sample_schema();
        let mut doc = valid_doc();
        doc.metadata
            .push(MetadataField::new("source", FieldValue::String("b.pdf".into())));
        let violations = schema.validate(&doc, false);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("2 times"));
    }

    #[test]
    fn test_preset_fill_defaults_missing_keys() {
        let mut doc = Document::new("chunk");
        doc.metadata
            .push(MetadataField::new(PAGE_NO_KEY, FieldValue::Int32(7)));
        fill_preset_metadata(&mut doc);
        assert_eq!(
            doc.metadata_value(PARENT_DOC_ID_KEY),
            Some(&FieldValue::String(String::new()))
        );
        // preexisting value kept
        assert_eq!(doc.metadata_value(PAGE_NO_KEY), Some(&FieldValue::Int32(7)));
        assert_eq!(
            doc.metadata_value(FILE_SOURCE_KEY),
            Some(&FieldValue::String(String::new()))
        );
    }

    #[test]
    fn test_preset_schema_round_trips_validation() {
        let schema = MetadataSchema::with_presets();
        let mut doc = Document::new("chunk");
        fill_preset_metadata(&mut doc);
        assert!(schema.validate(&doc, true).is_empty());
    }
}
