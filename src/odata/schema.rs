//! Streaming extraction of field records from the backend's `$metadata` XML.
//!
//! The schema document can be large, so it is consumed as a single forward
//! pass over pull-parser events rather than materialized as a DOM. Entity and
//! field filtering happens during the pass; records for excluded entities are
//! never emitted.

use crate::config::IndexingConfig;
use crate::error::OdataError;
use async_trait::async_trait;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::collections::HashSet;
use tokio::io::AsyncBufRead;

/// Sentinel field name marking the one record per entity that describes the
/// table itself rather than a field.
pub const TABLE_HEADER: &str = "TABLE_HEADER";

/// One row of extracted schema knowledge.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRecord {
    /// Technical entity name, e.g. `Catalog_Counterparties`.
    pub entity: String,
    /// Technical field name, or [`TABLE_HEADER`] for the header record.
    pub name: String,
    /// Backend type tag, e.g. `Edm.String`.
    pub data_type: String,
    /// Human-readable text used as the embedding input.
    pub description: String,
    pub is_header: bool,
}

impl FieldRecord {
    fn header(entity: &str) -> Self {
        Self {
            entity: entity.to_string(),
            name: TABLE_HEADER.to_string(),
            data_type: "System".to_string(),
            description: format!("[ENTITY] {}", humanize_entity(entity)),
            is_header: true,
        }
    }

    fn field(entity: &str, name: &str, data_type: &str) -> Self {
        Self {
            entity: entity.to_string(),
            name: name.to_string(),
            data_type: data_type.to_string(),
            description: format!("[FIELD] {} in table {}", name, strip_entity_prefix(entity)),
            is_header: false,
        }
    }
}

/// Result of a schema pass: the records collected, plus the parse failure
/// that ended the pass early, if any. Partial results are kept on failure.
#[derive(Debug)]
pub struct Extraction {
    pub records: Vec<FieldRecord>,
    pub failure: Option<OdataError>,
}

/// Something that can produce the backend's field records.
///
/// Implemented by [`super::ODataClient`] over the live `$metadata` endpoint;
/// the indexing pipeline depends on this seam rather than on HTTP.
#[async_trait]
pub trait SchemaSource: Send + Sync {
    async fn field_records(&self) -> crate::Result<Extraction>;
}

/// Parses an entity/field-oriented XML schema stream into [`FieldRecord`]s.
pub struct SchemaExtractor {
    exclude_entities: Vec<String>,
    exclude_fields: HashSet<String>,
    include_only: Vec<String>,
}

impl SchemaExtractor {
    pub fn new(config: &IndexingConfig) -> Self {
        Self {
            exclude_entities: config.exclude_entities.clone(),
            exclude_fields: config.exclude_fields.iter().cloned().collect(),
            include_only: config.include_only.clone(),
        }
    }

    /// Run the forward pass over `reader`.
    ///
    /// Properties are attributed to the immediately enclosing entity type
    /// only; nested entity types are not supported. On malformed input the
    /// pass ends and the records produced so far are returned alongside the
    /// parse failure.
    pub async fn extract<R>(&self, reader: R) -> Extraction
    where
        R: AsyncBufRead + Unpin,
    {
        let mut xml = Reader::from_reader(reader);
        let mut buf = Vec::new();
        let mut records = Vec::new();
        let mut current: Option<String> = None;

        loop {
            match xml.read_event_into_async(&mut buf).await {
                Ok(Event::Start(element)) => match element.local_name().as_ref() {
                    b"EntityType" => current = self.enter_entity(&element, &mut records),
                    b"Property" => {
                        if let Some(entity) = current.as_deref() {
                            self.push_field(entity, &element, &mut records);
                        }
                    }
                    _ => {}
                },
                Ok(Event::Empty(element)) => match element.local_name().as_ref() {
                    // A self-closing entity type has no properties; it still
                    // gets its header record but never becomes current.
                    b"EntityType" => {
                        self.enter_entity(&element, &mut records);
                    }
                    b"Property" => {
                        if let Some(entity) = current.as_deref() {
                            self.push_field(entity, &element, &mut records);
                        }
                    }
                    _ => {}
                },
                Ok(Event::End(element)) => {
                    if element.local_name().as_ref() == b"EntityType" {
                        current = None;
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(error) => {
                    tracing::error!(
                        %error,
                        records = records.len(),
                        "metadata parse failed, keeping records collected so far"
                    );
                    return Extraction {
                        records,
                        failure: Some(OdataError::SchemaParse(error.to_string())),
                    };
                }
            }
            buf.clear();
        }

        tracing::info!(records = records.len(), "metadata parse complete");
        Extraction { records, failure: None }
    }

    /// Emit the header record for a retained entity and return its name.
    /// Exclusion takes precedence over the allow list.
    fn enter_entity(&self, element: &BytesStart<'_>, records: &mut Vec<FieldRecord>) -> Option<String> {
        let name = attribute(element, b"Name")?;
        let excluded = self.exclude_entities.iter().any(|s| name.contains(s.as_str()));
        let allowed =
            self.include_only.is_empty() || self.include_only.iter().any(|s| *s == name);
        if excluded || !allowed {
            return None;
        }
        records.push(FieldRecord::header(&name));
        Some(name)
    }

    fn push_field(&self, entity: &str, element: &BytesStart<'_>, records: &mut Vec<FieldRecord>) {
        let Some(name) = attribute(element, b"Name") else {
            return;
        };
        if self.exclude_fields.contains(&name) {
            return;
        }
        let data_type = attribute(element, b"Type").unwrap_or_default();
        records.push(FieldRecord::field(entity, &name, &data_type));
    }
}

fn attribute(element: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == key)
        .and_then(|attr| attr.unescape_value().ok())
        .map(|value| value.into_owned())
}

/// Normalized human label for a technical entity name, translating the
/// known backend prefixes.
fn humanize_entity(entity: &str) -> String {
    entity
        .replace("Catalog_", "Catalog ")
        .replace("Document_", "Document ")
}

/// Entity name with the known prefixes stripped, for field descriptions.
fn strip_entity_prefix(entity: &str) -> String {
    entity.replace("Catalog_", "").replace("Document_", "")
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    const SCHEMA: &str = indoc! {r#"
        <edmx:Edmx xmlns:edmx="http://schemas.microsoft.com/ado/2007/06/edmx">
          <edmx:DataServices>
            <Schema xmlns="http://schemas.microsoft.com/ado/2009/11/edm">
              <EntityType Name="Catalog_Items">
                <Key>
                  <PropertyRef Name="Ref_Key"/>
                </Key>
                <Property Name="Ref_Key" Type="Edm.Guid"/>
                <Property Name="Name" Type="Edm.String"/>
              </EntityType>
              <EntityType Name="Document_Deleted">
                <Property Name="Number" Type="Edm.String"/>
              </EntityType>
            </Schema>
          </edmx:DataServices>
        </edmx:Edmx>
    "#};

    fn extractor(config: IndexingConfig) -> SchemaExtractor {
        SchemaExtractor::new(&config)
    }

    #[tokio::test]
    async fn retained_entity_yields_header_then_fields() {
        let config = IndexingConfig {
            exclude_entities: vec!["Deleted".to_string()],
            exclude_fields: vec!["Ref_Key".to_string()],
            ..Default::default()
        };

        let extraction = extractor(config).extract(SCHEMA.as_bytes()).await;
        assert!(extraction.failure.is_none());

        let records = extraction.records;
        assert_eq!(records.len(), 2);
        assert!(records[0].is_header);
        assert_eq!(records[0].entity, "Catalog_Items");
        assert_eq!(records[0].name, TABLE_HEADER);
        assert_eq!(records[0].description, "[ENTITY] Catalog Items");
        assert!(!records[1].is_header);
        assert_eq!(records[1].name, "Name");
        assert_eq!(records[1].data_type, "Edm.String");
        assert_eq!(records[1].description, "[FIELD] Name in table Items");
    }

    #[tokio::test]
    async fn excluded_entity_emits_no_records_at_all() {
        let config = IndexingConfig {
            exclude_entities: vec!["Deleted".to_string()],
            ..Default::default()
        };

        let extraction = extractor(config).extract(SCHEMA.as_bytes()).await;
        assert!(extraction.records.iter().all(|r| r.entity != "Document_Deleted"));
    }

    #[tokio::test]
    async fn exclusion_takes_precedence_over_allow_list() {
        let config = IndexingConfig {
            include_only: vec!["Document_Deleted".to_string()],
            exclude_entities: vec!["Deleted".to_string()],
            ..Default::default()
        };

        let extraction = extractor(config).extract(SCHEMA.as_bytes()).await;
        assert!(extraction.records.is_empty());
    }

    #[tokio::test]
    async fn allow_list_drops_unlisted_entities() {
        let config = IndexingConfig {
            include_only: vec!["Catalog_Items".to_string()],
            ..Default::default()
        };

        let extraction = extractor(config).extract(SCHEMA.as_bytes()).await;
        assert!(extraction.records.iter().all(|r| r.entity == "Catalog_Items"));
        assert_eq!(extraction.records.iter().filter(|r| r.is_header).count(), 1);
    }

    #[tokio::test]
    async fn excluded_field_never_appears_in_any_entity() {
        let config = IndexingConfig {
            exclude_fields: vec!["Ref_Key".to_string(), "Number".to_string()],
            ..Default::default()
        };

        let extraction = extractor(config).extract(SCHEMA.as_bytes()).await;
        assert!(extraction
            .records
            .iter()
            .all(|r| r.name != "Ref_Key" && r.name != "Number"));
    }

    #[tokio::test]
    async fn entity_without_retained_fields_still_yields_header() {
        let xml = indoc! {r#"
            <Schema>
              <EntityType Name="Catalog_Empty"/>
              <EntityType Name="Catalog_OnlyExcluded">
                <Property Name="Ref_Key" Type="Edm.Guid"/>
              </EntityType>
            </Schema>
        "#};
        let config = IndexingConfig {
            exclude_fields: vec!["Ref_Key".to_string()],
            ..Default::default()
        };

        let extraction = extractor(config).extract(xml.as_bytes()).await;
        assert_eq!(extraction.records.len(), 2);
        assert!(extraction.records.iter().all(|r| r.is_header));
    }

    #[tokio::test]
    async fn malformed_input_keeps_partial_records_and_reports_failure() {
        let xml = r#"
            <Schema>
              <EntityType Name="Catalog_Items">
                <Property Name="Name" Type="Edm.String"/>
              </EntityType>
              <EntityType Name="Catalog_Broken">
            </UnbalancedClose>
        "#;

        let extraction = extractor(IndexingConfig::default()).extract(xml.as_bytes()).await;
        assert!(extraction.failure.is_some());
        // Both headers and the one field survived up to the failure point.
        assert!(extraction.records.len() >= 2);
        assert_eq!(extraction.records[0].entity, "Catalog_Items");
    }

    #[test]
    fn entity_prefixes_are_translated() {
        assert_eq!(humanize_entity("Catalog_Warehouses"), "Catalog Warehouses");
        assert_eq!(humanize_entity("Document_SalesOrder"), "Document SalesOrder");
        assert_eq!(strip_entity_prefix("Document_SalesOrder"), "SalesOrder");
    }
}
