// ── MindGraph Graph: Entities ───────────────────────────────────────────────
// Entity CRUD. An entity id is a pure function of (type, normalized name),
// so creating the same entity twice merges instead of duplicating.

use log::{debug, info};
use rusqlite::Connection;
use serde_json::{json, Map, Value};

use crate::atoms::error::GraphResult;
use crate::atoms::results::{EntitySearchResult, FoundOrCreated, MatchedBy, NewEntity};
use crate::atoms::types::{EntityType, RecordSource, RecordStatus, StoredEntity};
use crate::graph::GraphService;
use crate::store::entities::{get_entity_conn, put_entity};
use crate::store::now_ts;

/// `person:fabrizio_rossi` from ("Fabrizio Rossi", Person). Lowercased,
/// spaces to underscores, everything but alphanumerics and underscores
/// stripped.
pub(crate) fn entity_id_for(name: &str, entity_type: EntityType) -> String {
    let normalized: String = name
        .to_lowercase()
        .trim()
        .replace(' ', "_")
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    format!("{}:{}", entity_type.as_str(), normalized)
}

/// Cheap type guess from an id's prefix, for auto-created relationship
/// endpoints where no name context is available.
pub(crate) fn infer_type_from_id(entity_id: &str) -> EntityType {
    let id = entity_id.to_lowercase();
    if matches!(id.as_str(), "self" | "user" | "user_admin" | "me" | "io") {
        return EntityType::Person;
    }
    if id.contains("person:") || id.contains("user:") {
        EntityType::Person
    } else if ["place:", "location:", "city:", "country:"].iter().any(|p| id.contains(p)) {
        EntityType::Location
    } else if ["org:", "company:", "organization:"].iter().any(|p| id.contains(p)) {
        EntityType::Organization
    } else if ["food:", "dish:", "meal:"].iter().any(|p| id.contains(p)) {
        EntityType::Food
    } else if ["vehicle:", "car:", "bike:"].iter().any(|p| id.contains(p)) {
        EntityType::Object
    } else {
        EntityType::Unknown
    }
}

/// Shallow key merge of `add` into `base`; new keys win. Null bases become
/// objects first, non-object values are replaced outright.
pub(crate) fn merge_object(base: &mut Value, add: &Value) {
    let Some(add_map) = add.as_object() else {
        return;
    };
    if !base.is_object() {
        *base = Value::Object(Map::new());
    }
    if let Some(base_map) = base.as_object_mut() {
        for (key, value) in add_map {
            base_map.insert(key.clone(), value.clone());
        }
    }
}

/// Create a minimal placeholder entity if the id is unknown, so
/// relationships never reference dangling endpoints. Returns true if the
/// entity already existed. Runs on the caller's connection so it can sit
/// inside the assertion transaction.
pub(crate) fn ensure_entity_conn(conn: &Connection, entity_id: &str) -> GraphResult<bool> {
    if get_entity_conn(conn, entity_id)?.is_some() {
        return Ok(true);
    }
    let now = now_ts();
    let entity = StoredEntity {
        entity_id: entity_id.to_string(),
        entity_type: infer_type_from_id(entity_id),
        primary_name: entity_id.to_string(),
        aliases: Vec::new(),
        identifiers: Value::Null,
        attributes: json!({ "auto_generated": true }),
        tags: Vec::new(),
        salience: 0.5,
        // Auto-created endpoints start below explicitly asserted entities.
        confidence: 0.7,
        source: RecordSource::Inferred,
        status: RecordStatus::Active,
        created_at: now.clone(),
        updated_at: now,
    };
    put_entity(conn, &entity)?;
    info!(
        "[graph] Auto-created entity {} (type={}, confidence=0.7)",
        entity_id, entity.entity_type
    );
    Ok(false)
}

impl GraphService {
    /// Create an entity, or merge into the existing row when the derived id
    /// already exists (alias union, identifier/attribute merge, confidence
    /// keeps its maximum). Type is inferred when the request leaves it out.
    pub async fn create_entity(&self, request: NewEntity) -> GraphResult<StoredEntity> {
        let mut attributes = request.attributes.clone();

        let entity_type = match request.entity_type {
            Some(t) => t,
            None => {
                let context = request.context.as_deref().unwrap_or("");
                let inference = self.entity_types.infer_type(&request.name, context).await;
                info!(
                    "[graph] Auto-inferred type for '{}': {} (confidence={:.2}, method={:?})",
                    request.name, inference.entity_type, inference.confidence, inference.method
                );
                merge_object(
                    &mut attributes,
                    &json!({
                        "_type_inference": {
                            "inferred_type": inference.entity_type.as_str(),
                            "inference_confidence": inference.confidence,
                            "inference_method": inference.method,
                            "inference_signals": inference.signals,
                            "alternative_types": inference.alternative_types,
                        }
                    }),
                );
                inference.entity_type
            }
        };

        let entity_id = entity_id_for(&request.name, entity_type);
        let now = now_ts();

        match self.store.get_entity(&entity_id)? {
            Some(mut existing) => {
                for alias in &request.aliases {
                    if !existing.aliases.contains(alias) {
                        existing.aliases.push(alias.clone());
                    }
                }
                merge_object(&mut existing.identifiers, &request.identifiers);
                merge_object(&mut existing.attributes, &attributes);
                for tag in &request.tags {
                    if !existing.tags.contains(tag) {
                        existing.tags.push(tag.clone());
                    }
                }
                existing.confidence = existing.confidence.max(request.confidence);
                existing.updated_at = now;
                self.store.put_entity(&existing)?;
                info!("[graph] Entity merged: {}", entity_id);
                Ok(existing)
            }
            None => {
                let entity = StoredEntity {
                    entity_id: entity_id.clone(),
                    entity_type,
                    primary_name: request.name,
                    aliases: request.aliases,
                    identifiers: request.identifiers,
                    attributes,
                    tags: request.tags,
                    salience: request.salience,
                    confidence: request.confidence,
                    source: request.source,
                    status: RecordStatus::Active,
                    created_at: now.clone(),
                    updated_at: now,
                };
                self.store.put_entity(&entity)?;
                info!(
                    "[graph] Entity created: {} ({}, confidence={:.2})",
                    entity_id, entity.entity_type, entity.confidence
                );
                Ok(entity)
            }
        }
    }

    pub fn get_entity(&self, entity_id: &str) -> GraphResult<Option<StoredEntity>> {
        let entity = self.store.get_entity(entity_id)?;
        match &entity {
            Some(e) => debug!("[graph] Entity retrieved: {} ({})", e.entity_id, e.entity_type),
            None => debug!("[graph] Entity not found: {}", entity_id),
        }
        Ok(entity)
    }

    /// Substring search over names, ids and aliases, with exact-match
    /// detection against the primary name or an alias.
    pub fn search_entities(
        &self,
        query: &str,
        entity_type: Option<EntityType>,
        min_confidence: f64,
        limit: usize,
    ) -> GraphResult<EntitySearchResult> {
        let query_lower = query.to_lowercase().trim().to_string();
        let matches = self
            .store
            .search_entities_like(&query_lower, entity_type, min_confidence, limit)?;

        let exact_match = matches
            .iter()
            .find(|e| {
                e.primary_name.to_lowercase() == query_lower
                    || e.aliases.iter().any(|a| a.to_lowercase() == query_lower)
            })
            .cloned();

        debug!(
            "[graph] Entity search '{}': {} matches, exact={}",
            query,
            matches.len(),
            exact_match.is_some()
        );
        Ok(EntitySearchResult { matches, exact_match })
    }

    /// Look the entity up by name first; only create when nothing matches.
    /// A partial match is accepted when one name prefixes the other or the
    /// candidate is well established (confidence > 0.7).
    pub async fn find_or_create_entity(&self, request: NewEntity) -> GraphResult<FoundOrCreated> {
        let search = self.search_entities(&request.name, request.entity_type, 0.3, 5)?;

        if let Some(exact) = search.exact_match {
            let has_enrichment = !request.aliases.is_empty()
                || request.identifiers.is_object()
                || request.attributes.is_object();
            let entity = if has_enrichment {
                let mut enrich = request;
                enrich.name = exact.primary_name.clone();
                enrich.entity_type = Some(exact.entity_type);
                self.create_entity(enrich).await?
            } else {
                exact
            };
            return Ok(FoundOrCreated {
                entity,
                created: false,
                matched_by: MatchedBy::Exact,
            });
        }

        if let Some(best) = search.matches.into_iter().next() {
            let name_lower = request.name.to_lowercase();
            let best_lower = best.primary_name.to_lowercase();
            if best_lower.starts_with(&name_lower)
                || name_lower.starts_with(&best_lower)
                || best.confidence > 0.7
            {
                return Ok(FoundOrCreated {
                    entity: best,
                    created: false,
                    matched_by: MatchedBy::Partial,
                });
            }
        }

        let entity = self.create_entity(request).await?;
        Ok(FoundOrCreated {
            entity,
            created: true,
            matched_by: MatchedBy::Created,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::test_support::{bare_service, service_with_embedder};
    use crate::similarity::fixtures::FixtureEmbedder;

    fn axis_embedder(keyword: &str) -> FixtureEmbedder {
        let mut e = FixtureEmbedder::new().with(keyword, vec![1.0, 0.0, 0.0, 0.0]);
        e.fallback = vec![0.0; 4];
        e
    }

    #[test]
    fn entity_ids_are_stable_and_clean() {
        assert_eq!(
            entity_id_for("Fabrizio Rossi", EntityType::Person),
            "person:fabrizio_rossi"
        );
        assert_eq!(
            entity_id_for("  Pizza Margherita! ", EntityType::Food),
            "food:pizza_margherita"
        );
    }

    #[test]
    fn id_prefix_heuristic() {
        assert_eq!(infer_type_from_id("user_admin"), EntityType::Person);
        assert_eq!(infer_type_from_id("person:marco"), EntityType::Person);
        assert_eq!(infer_type_from_id("city:roma"), EntityType::Location);
        assert_eq!(infer_type_from_id("org:acme"), EntityType::Organization);
        assert_eq!(infer_type_from_id("food:pizza"), EntityType::Food);
        assert_eq!(infer_type_from_id("car:bmw_x3"), EntityType::Object);
        assert_eq!(infer_type_from_id("mystery"), EntityType::Unknown);
    }

    #[tokio::test]
    async fn creating_twice_merges_instead_of_duplicating() {
        let svc = bare_service();
        let first = NewEntity {
            aliases: vec!["Fab".to_string()],
            confidence: 0.8,
            ..NewEntity::typed("Fabrizio", EntityType::Person)
        };
        svc.create_entity(first).await.unwrap();

        let second = NewEntity {
            aliases: vec!["Fabri".to_string()],
            confidence: 0.6,
            ..NewEntity::typed("Fabrizio", EntityType::Person)
        };
        let merged = svc.create_entity(second).await.unwrap();

        assert_eq!(merged.entity_id, "person:fabrizio");
        assert_eq!(merged.aliases, vec!["Fab".to_string(), "Fabri".to_string()]);
        // confidence keeps its maximum across merges
        assert!((merged.confidence - 0.8).abs() < 1e-9);
        assert_eq!(svc.store.count_entities(None).unwrap(), 1);
    }

    #[tokio::test]
    async fn auto_inference_records_provenance() {
        let svc = service_with_embedder(axis_embedder("marco"));
        let entity = svc
            .create_entity(NewEntity::named("Marco"))
            .await
            .unwrap();
        assert_eq!(entity.entity_type, EntityType::Person);
        assert_eq!(entity.entity_id, "person:marco");
        let inference = entity
            .attributes
            .get("_type_inference")
            .expect("inference provenance stored");
        assert_eq!(inference["inferred_type"], "person");
    }

    #[tokio::test]
    async fn ensure_creates_placeholder_endpoint() {
        let svc = bare_service();
        {
            let conn = svc.store.conn.lock();
            assert!(!ensure_entity_conn(&conn, "food:pizza").unwrap());
            assert!(ensure_entity_conn(&conn, "food:pizza").unwrap());
        }
        let entity = svc.store.get_entity("food:pizza").unwrap().unwrap();
        assert_eq!(entity.entity_type, EntityType::Food);
        assert!((entity.confidence - 0.7).abs() < 1e-9);
        assert_eq!(entity.attributes["auto_generated"], true);
    }

    #[tokio::test]
    async fn find_or_create_prefers_exact_then_partial() {
        let svc = bare_service();
        svc.create_entity(NewEntity::typed("Fabrizio Rossi", EntityType::Person))
            .await
            .unwrap();

        let partial = svc
            .find_or_create_entity(NewEntity::typed("Fabrizio", EntityType::Person))
            .await
            .unwrap();
        assert!(!partial.created);
        assert_eq!(partial.matched_by, MatchedBy::Partial);

        let exact = svc
            .find_or_create_entity(NewEntity::typed("Fabrizio Rossi", EntityType::Person))
            .await
            .unwrap();
        assert_eq!(exact.matched_by, MatchedBy::Exact);

        let created = svc
            .find_or_create_entity(NewEntity::typed("Giulia", EntityType::Person))
            .await
            .unwrap();
        assert!(created.created);
        assert_eq!(created.matched_by, MatchedBy::Created);
    }

    #[tokio::test]
    async fn search_reports_alias_exact_match() {
        let svc = bare_service();
        let entity = NewEntity {
            aliases: vec!["Giò".to_string()],
            ..NewEntity::typed("Giovanna Bianchi", EntityType::Person)
        };
        svc.create_entity(entity).await.unwrap();

        let result = svc.search_entities("giò", None, 0.0, 10).unwrap();
        assert!(result.exact_match.is_some());
        let result = svc.search_entities("giovanna", None, 0.0, 10).unwrap();
        assert_eq!(result.matches.len(), 1);
        assert!(result.exact_match.is_none());
    }
}
