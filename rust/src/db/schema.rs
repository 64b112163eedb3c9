//! Positional row bindings
//!
//! Each query's SELECT list and its `RowSchema` are a boundary contract:
//! fields are pulled by column index, so reordering a SELECT requires
//! updating the matching schema below in the same change.

use std::collections::HashMap;

use super::{DbError, Value};

/// Storage class of a bound field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    U8,
    U16,
    U32,
    U64,
    F32,
    /// Text clipped to the binding width in bytes
    Text,
}

impl FieldKind {
    fn name(self) -> &'static str {
        match self {
            FieldKind::U8 => "u8",
            FieldKind::U16 => "u16",
            FieldKind::U32 => "u32",
            FieldKind::U64 => "u64",
            FieldKind::F32 => "f32",
            FieldKind::Text => "text",
        }
    }
}

/// One (logical field, byte width, source column) descriptor
#[derive(Debug, Clone, Copy)]
pub struct FieldBinding {
    pub field: &'static str,
    pub kind: FieldKind,
    pub width: usize,
    pub column: usize,
}

const fn bind(field: &'static str, kind: FieldKind, width: usize, column: usize) -> FieldBinding {
    FieldBinding { field, kind, width, column }
}

/// Ordered list of field bindings applied to one row
#[derive(Debug, Clone, Copy)]
pub struct RowSchema {
    pub name: &'static str,
    pub fields: &'static [FieldBinding],
}

/// Typed value extracted through a binding
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Unsigned(u64),
    Float(f32),
    Text(String),
}

/// Row after schema binding, addressed by logical field name
#[derive(Debug, Clone, Default)]
pub struct BoundRow {
    fields: HashMap<&'static str, Field>,
}

impl RowSchema {
    /// Apply every binding to `row`
    pub fn bind(&self, row: &[Value]) -> Result<BoundRow, DbError> {
        let mut fields = HashMap::with_capacity(self.fields.len());
        for binding in self.fields {
            let value = row.get(binding.column).ok_or(DbError::MissingColumn {
                field: binding.field,
                column: binding.column,
            })?;
            fields.insert(binding.field, extract(binding, value)?);
        }
        Ok(BoundRow { fields })
    }
}

fn extract(binding: &FieldBinding, value: &Value) -> Result<Field, DbError> {
    let mismatch = || DbError::TypeMismatch {
        field: binding.field,
        column: binding.column,
        expected: binding.kind.name(),
        found: value.type_name(),
    };

    match binding.kind {
        FieldKind::U8 | FieldKind::U16 | FieldKind::U32 | FieldKind::U64 => {
            let raw = match value {
                Value::Integer(i) if *i >= 0 => *i as u64,
                Value::Null => 0,
                _ => return Err(mismatch()),
            };
            // Narrow to the declared width like a fixed-size column would.
            let masked = match binding.kind {
                FieldKind::U8 => raw & 0xFF,
                FieldKind::U16 => raw & 0xFFFF,
                FieldKind::U32 => raw & 0xFFFF_FFFF,
                _ => raw,
            };
            Ok(Field::Unsigned(masked))
        }
        FieldKind::F32 => match value {
            Value::Real(f) => Ok(Field::Float(*f as f32)),
            Value::Integer(i) => Ok(Field::Float(*i as f32)),
            Value::Null => Ok(Field::Float(0.0)),
            _ => Err(mismatch()),
        },
        FieldKind::Text => match value {
            Value::Text(s) => Ok(Field::Text(clip(s, binding.width))),
            Value::Null => Ok(Field::Text(String::new())),
            _ => Err(mismatch()),
        },
    }
}

fn clip(s: &str, width: usize) -> String {
    if s.len() <= width {
        return s.to_string();
    }
    let mut end = width;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

impl BoundRow {
    fn get(&self, field: &'static str) -> Result<&Field, DbError> {
        self.fields
            .get(field)
            .ok_or(DbError::MissingColumn { field, column: usize::MAX })
    }

    pub fn u64(&self, field: &'static str) -> Result<u64, DbError> {
        match self.get(field)? {
            Field::Unsigned(v) => Ok(*v),
            other => Err(field_mismatch(field, "unsigned", other)),
        }
    }

    pub fn u32(&self, field: &'static str) -> Result<u32, DbError> {
        self.u64(field).map(|v| v as u32)
    }

    pub fn u16(&self, field: &'static str) -> Result<u16, DbError> {
        self.u64(field).map(|v| v as u16)
    }

    pub fn u8(&self, field: &'static str) -> Result<u8, DbError> {
        self.u64(field).map(|v| v as u8)
    }

    pub fn f32(&self, field: &'static str) -> Result<f32, DbError> {
        match self.get(field)? {
            Field::Float(v) => Ok(*v),
            other => Err(field_mismatch(field, "float", other)),
        }
    }

    pub fn text(&self, field: &'static str) -> Result<String, DbError> {
        match self.get(field)? {
            Field::Text(v) => Ok(v.clone()),
            other => Err(field_mismatch(field, "text", other)),
        }
    }
}

fn field_mismatch(field: &'static str, expected: &'static str, found: &Field) -> DbError {
    DbError::TypeMismatch {
        field,
        column: usize::MAX,
        expected,
        found: match found {
            Field::Unsigned(_) => "unsigned",
            Field::Float(_) => "float",
            Field::Text(_) => "text",
        },
    }
}

// ============================================================================
// SPAWN DEFINITIONS
// ============================================================================

/// `SELECT s.id, s.spawn_x, s.spawn_z, s.spawn_width, s.spawn_length, s.spawn_density`
pub const SPAWN: RowSchema = RowSchema {
    name: "spawns",
    fields: &[
        bind("spawn_id", FieldKind::U32, 4, 0),
        bind("pos_x", FieldKind::F32, 4, 1),
        bind("pos_z", FieldKind::F32, 4, 2),
        bind("width", FieldKind::U32, 4, 3),
        bind("height", FieldKind::U32, 4, 4),
        bind("density", FieldKind::U32, 4, 5),
    ],
};

/// `SELECT sg.id, l.id, l.lair_template, l.creature_group`
pub const SPAWN_GROUP: RowSchema = RowSchema {
    name: "spawn_groups",
    fields: &[
        bind("spawn_group_id", FieldKind::U32, 4, 0),
        bind("lair_id", FieldKind::U32, 4, 1),
        bind("template_id", FieldKind::U32, 4, 2),
        bind("creature_group_id", FieldKind::U32, 4, 3),
    ],
};

// ============================================================================
// LAIRS
// ============================================================================

/// Lair row head: `lairs.creature_spawn_region, lairs.lair_template,
/// lairs.creature_group, lairs.family`
pub const LAIR_TEMPLATE: RowSchema = RowSchema {
    name: "lair_template",
    fields: &[
        bind("creature_spawn_region", FieldKind::U64, 8, 0),
        bind("template_id", FieldKind::U64, 8, 1),
        bind("creature_group", FieldKind::U32, 4, 2),
        bind("family", FieldKind::U32, 4, 3),
    ],
};

/// Lair row tail: `lair_templates.lair_object_string, lair_templates.stf_name,
/// lair_templates.stf_file, faction.name`
pub const LAIR_APPEARANCE: RowSchema = RowSchema {
    name: "lair_appearance",
    fields: &[
        bind("model", FieldKind::Text, 255, 4),
        bind("species", FieldKind::Text, 255, 5),
        bind("species_group", FieldKind::Text, 255, 6),
        bind("faction", FieldKind::Text, 32, 7),
    ],
};

/// `SELECT creature_groups.creature_id`
pub const CREATURE_GROUP: RowSchema = RowSchema {
    name: "creature_groups",
    fields: &[bind("creature_id", FieldKind::U64, 8, 0)],
};

// ============================================================================
// NPC TEMPLATES
// ============================================================================

/// Creature/npc template columns 0..=10
pub const NPC_TEMPLATE: RowSchema = RowSchema {
    name: "npc_template",
    fields: &[
        bind("species_id", FieldKind::U64, 8, 0),
        bind("loot_group_id", FieldKind::U64, 8, 1),
        bind("posture", FieldKind::U8, 1, 2),
        bind("state", FieldKind::U64, 8, 3),
        bind("level", FieldKind::U16, 2, 4),
        bind("model", FieldKind::Text, 255, 5),
        bind("species", FieldKind::Text, 255, 6),
        bind("species_group", FieldKind::Text, 255, 7),
        bind("faction", FieldKind::Text, 32, 8),
        bind("mood_id", FieldKind::U8, 1, 9),
        bind("scale", FieldKind::F32, 4, 10),
    ],
};

/// Family id trails the template columns
pub const NPC_IDENTIFIER: RowSchema = RowSchema {
    name: "npc_identifier",
    fields: &[bind("family", FieldKind::U32, 4, 11)],
};

/// `SELECT attributes.name, <table>.value, attributes.internal`
pub const ATTRIBUTE: RowSchema = RowSchema {
    name: "attributes",
    fields: &[
        bind("name", FieldKind::Text, 255, 0),
        bind("value", FieldKind::Text, 255, 1),
        bind("internal", FieldKind::U8, 1, 2),
    ],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_spawn_row() {
        let row = vec![
            Value::Integer(7),
            Value::Real(100.5),
            Value::Integer(-40),
            Value::Integer(200),
            Value::Integer(300),
            Value::Integer(60),
        ];
        let bound = SPAWN.bind(&row).unwrap();
        assert_eq!(bound.u32("spawn_id").unwrap(), 7);
        assert_eq!(bound.f32("pos_x").unwrap(), 100.5);
        assert_eq!(bound.f32("pos_z").unwrap(), -40.0);
        assert_eq!(bound.u32("density").unwrap(), 60);
    }

    #[test]
    fn test_short_row_reports_missing_column() {
        let row = vec![Value::Integer(1), Value::Integer(2)];
        let err = SPAWN_GROUP.bind(&row).unwrap_err();
        assert!(matches!(err, DbError::MissingColumn { column: 2, .. }));
    }

    #[test]
    fn test_text_where_integer_expected() {
        let row = vec![Value::Text("nope".into())];
        let err = CREATURE_GROUP.bind(&row).unwrap_err();
        assert!(matches!(err, DbError::TypeMismatch { field: "creature_id", .. }));
    }

    #[test]
    fn test_text_clipped_to_width() {
        let long = "x".repeat(40);
        let mut row = vec![Value::Null; 8];
        row[7] = Value::Text(long);
        let bound = LAIR_APPEARANCE.bind(&row).unwrap();
        assert_eq!(bound.text("faction").unwrap().len(), 32);
        assert_eq!(bound.text("model").unwrap(), "");
    }

    #[test]
    fn test_family_column_follows_template() {
        let mut row = vec![Value::Null; 12];
        row[11] = Value::Integer(4);
        assert_eq!(NPC_IDENTIFIER.bind(&row).unwrap().u32("family").unwrap(), 4);
    }
}
