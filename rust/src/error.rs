use thiserror::Error;

use crate::db::DbError;

/// Failures inside the spawn core
///
/// None of these cross the async boundary: completion handlers log them
/// and drop the affected construction chain.
#[derive(Debug, Error)]
pub enum SpawnError {
    #[error(transparent)]
    Db(#[from] DbError),

    /// Query came back with no rows
    #[error("no rows returned for {0}")]
    MissingData(&'static str),

    /// Family id with no matching npc variant
    #[error("unknown npc family {0}")]
    UnknownFamily(u32),

    /// Family that is known but cannot be built through this path
    #[error("npc family {0} is not supported here")]
    UnsupportedFamily(&'static str),

    /// Target entity was destroyed before the step completed
    #[error("object {0} no longer exists")]
    ObjectGone(u64),

    /// Id resolved to an object of the wrong kind
    #[error("object {id} is a {found}, expected {expected}")]
    WrongObjectType {
        id: u64,
        expected: &'static str,
        found: &'static str,
    },

    /// Id already registered in the world
    #[error("object id {0} is already registered")]
    DuplicateObject(u64),

    /// Position outside the zone's spatial index
    #[error("object {id} at ({x}, {z}) is outside the zone")]
    OutOfBounds { id: u64, x: f32, z: f32 },

    #[error("ephemeral id pool exhausted")]
    IdPoolExhausted,

    #[error("spawn definition {0} was never loaded")]
    UnknownDefinition(u32),
}
