//! TrailCommand wire models
//!
//! REST bodies and realtime event payloads exchanged with the TrailCommand
//! server. Field names follow the server's JSON exactly, which mixes
//! `snake_case` and `camelCase`.

pub mod models;
