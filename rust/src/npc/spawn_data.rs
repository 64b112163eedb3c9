use serde::Serialize;

use crate::db::schema::BoundRow;
use crate::db::DbError;

/// One lair type a spawn definition can place
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LairTypeEntry {
    pub spawn_group_id: u32,
    /// Row in the `lairs` table; what `spawn_lair` is asked for
    pub lair_id: u32,
    pub template_id: u32,
    pub creature_group_id: u32,
}

impl LairTypeEntry {
    pub fn from_row(row: &BoundRow) -> Result<Self, DbError> {
        Ok(Self {
            spawn_group_id: row.u32("spawn_group_id")?,
            lair_id: row.u32("lair_id")?,
            template_id: row.u32("template_id")?,
            creature_group_id: row.u32("creature_group_id")?,
        })
    }
}

/// A spawn area as stored in the `spawns` table
///
/// Loaded once per zone start; regions keep only its id and look it up.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpawnDefinition {
    pub id: u32,
    pub pos_x: f32,
    pub pos_z: f32,
    pub width: u32,
    pub height: u32,
    pub density: u32,
    pub lair_types: Vec<LairTypeEntry>,
}

impl SpawnDefinition {
    pub fn from_row(row: &BoundRow) -> Result<Self, DbError> {
        Ok(Self {
            id: row.u32("spawn_id")?,
            pos_x: row.f32("pos_x")?,
            pos_z: row.f32("pos_z")?,
            width: row.u32("width")?,
            height: row.u32("height")?,
            density: row.u32("density")?,
            lair_types: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema;
    use crate::db::Value;

    #[test]
    fn test_definition_from_spawn_row() {
        let row = vec![
            Value::Integer(3),
            Value::Real(-120.0),
            Value::Real(64.5),
            Value::Integer(200),
            Value::Integer(150),
            Value::Integer(50),
        ];
        let definition = SpawnDefinition::from_row(&schema::SPAWN.bind(&row).unwrap()).unwrap();
        assert_eq!(definition.id, 3);
        assert_eq!(definition.pos_x, -120.0);
        assert_eq!(definition.height, 150);
        assert!(definition.lair_types.is_empty());
    }

    #[test]
    fn test_lair_type_from_group_row() {
        let row = vec![
            Value::Integer(11),
            Value::Integer(12),
            Value::Integer(13),
            Value::Integer(14),
        ];
        let entry = LairTypeEntry::from_row(&schema::SPAWN_GROUP.bind(&row).unwrap()).unwrap();
        assert_eq!(
            entry,
            LairTypeEntry {
                spawn_group_id: 11,
                lair_id: 12,
                template_id: 13,
                creature_group_id: 14,
            }
        );
    }
}
