// ── MindGraph Normalize ─────────────────────────────────────────────────────
// Normalization services: raw predicates → relation categories, and
// entity names → entity types. Both are constructed explicitly with an
// injected embedding provider and NEVER return errors — anything that
// fails degrades to a low-confidence default instead.

pub mod entity_type;
pub mod predicate;
