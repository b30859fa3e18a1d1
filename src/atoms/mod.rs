// ── MindGraph Atoms ─────────────────────────────────────────────────────────
// Pure data types shared across the engine. No business logic here:
// structs and enums live in atoms/, behavior lives in the service modules.

pub mod error;
pub mod results;
pub mod types;
