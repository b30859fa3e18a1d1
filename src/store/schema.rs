// ── MindGraph Store: Database Schema ────────────────────────────────────────
//
// Tables:
//   - entities: typed nodes with aliases, identifiers, salience, confidence
//   - relationships: normalized edges, current state only (last value wins)
//   - relationship_events: append-only assertion history per relationship
//
// All statements are idempotent (CREATE IF NOT EXISTS). The partial UNIQUE
// index on the active triple turns the at-most-one-active-relationship
// invariant into a database guarantee.

use log::info;
use rusqlite::Connection;

use crate::atoms::error::GraphResult;

pub(crate) fn run_migrations(conn: &Connection) -> GraphResult<()> {
    info!("[store] Running graph schema migrations");
    conn.execute_batch(GRAPH_SCHEMA)?;
    Ok(())
}

const GRAPH_SCHEMA: &str = "
    -- ═══════════════════════════════════════════════════════════════
    -- Entities
    -- entity_id is a pure function of type + normalized name
    -- (person:fabrizio_rossi), making creation idempotent.
    -- ═══════════════════════════════════════════════════════════════
    CREATE TABLE IF NOT EXISTS entities (
        entity_id TEXT PRIMARY KEY,
        entity_type TEXT NOT NULL DEFAULT 'unknown',
        primary_name TEXT NOT NULL,

        -- JSON columns
        aliases_json TEXT NOT NULL DEFAULT '[]',
        identifiers_json TEXT NOT NULL DEFAULT '{}',
        attributes_json TEXT NOT NULL DEFAULT '{}',
        tags_json TEXT NOT NULL DEFAULT '[]',

        salience REAL NOT NULL DEFAULT 0.5,
        confidence REAL NOT NULL DEFAULT 1.0,

        source TEXT NOT NULL DEFAULT 'extraction',
        status TEXT NOT NULL DEFAULT 'active',

        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_entities_type
        ON entities(entity_type);
    CREATE INDEX IF NOT EXISTS idx_entities_name
        ON entities(primary_name);
    CREATE INDEX IF NOT EXISTS idx_entities_status
        ON entities(status);

    -- ═══════════════════════════════════════════════════════════════
    -- Relationships (current state; history lives in the event log)
    -- ═══════════════════════════════════════════════════════════════
    CREATE TABLE IF NOT EXISTS relationships (
        rel_id TEXT PRIMARY KEY,
        from_entity_id TEXT NOT NULL,
        to_entity_id TEXT NOT NULL,

        -- Normalized category, NOT the raw predicate
        relation_type TEXT NOT NULL,
        original_predicate TEXT NOT NULL DEFAULT '',
        source_sentence TEXT,
        metadata_json TEXT NOT NULL DEFAULT '{}',

        strength REAL NOT NULL DEFAULT 1.0,
        confidence REAL NOT NULL DEFAULT 1.0,
        valence TEXT NOT NULL DEFAULT 'neutral',
        intensity REAL NOT NULL DEFAULT 0.5,
        evidence_count INTEGER NOT NULL DEFAULT 1,

        source TEXT NOT NULL DEFAULT 'extraction',
        status TEXT NOT NULL DEFAULT 'active',
        last_reinforced TEXT,

        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_rel_from
        ON relationships(from_entity_id);
    CREATE INDEX IF NOT EXISTS idx_rel_to
        ON relationships(to_entity_id);
    CREATE INDEX IF NOT EXISTS idx_rel_type
        ON relationships(relation_type);
    CREATE INDEX IF NOT EXISTS idx_rel_status
        ON relationships(status);

    -- At most one ACTIVE relationship per (from, to, category).
    -- Repeated assertions reinforce that row instead of inserting.
    CREATE UNIQUE INDEX IF NOT EXISTS idx_rel_active_triple
        ON relationships(from_entity_id, to_entity_id, relation_type)
        WHERE status = 'active';

    -- ═══════════════════════════════════════════════════════════════
    -- Relationship Events (Append-Only)
    -- Deleting a relationship cascades here; events are never updated.
    -- ═══════════════════════════════════════════════════════════════
    CREATE TABLE IF NOT EXISTS relationship_events (
        event_id TEXT PRIMARY KEY,
        rel_id TEXT NOT NULL REFERENCES relationships(rel_id) ON DELETE CASCADE,

        predicate TEXT NOT NULL,
        -- Signed valence: -1.0 .. +1.0
        valence REAL NOT NULL DEFAULT 0.0,
        intensity REAL NOT NULL DEFAULT 0.5,
        source_sentence TEXT,

        timestamp TEXT NOT NULL,
        normalization_method TEXT NOT NULL DEFAULT 'direct',
        normalization_confidence REAL NOT NULL DEFAULT 1.0,
        metadata_json TEXT NOT NULL DEFAULT '{}'
    );

    CREATE INDEX IF NOT EXISTS idx_events_rel
        ON relationship_events(rel_id);
    CREATE INDEX IF NOT EXISTS idx_events_time
        ON relationship_events(timestamp);
";
