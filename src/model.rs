//! Schema entities shown on the canvas.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::measure::TextMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// (name, schema) pair identifying a table within the table collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableKey {
    pub name: String,
    pub schema: String,
}

impl TableKey {
    pub fn new(name: impl Into<String>, schema: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: schema.into(),
        }
    }
}

impl fmt::Display for TableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    pub name: String,
    pub schema: String,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub columns: Vec<Column>,
    /// Relations starting at one of this table's columns
    #[serde(default)]
    pub from_relations: Vec<Relation>,
    /// Relations ending at one of this table's columns
    #[serde(default)]
    pub to_relations: Vec<Relation>,
}

impl Table {
    pub fn new(name: impl Into<String>, schema: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: schema.into(),
            x: 0.0,
            y: 0.0,
            columns: Vec::new(),
            from_relations: Vec::new(),
            to_relations: Vec::new(),
        }
    }

    pub fn key(&self) -> TableKey {
        TableKey::new(self.name.clone(), self.schema.clone())
    }

    /// Identity match on (name, schema); other fields are ignored.
    pub fn is(&self, key: &TableKey) -> bool {
        self.name == key.name && self.schema == key.schema
    }

    pub fn position(&self) -> Position {
        Position::new(self.x, self.y)
    }

    /// Moves the table and its columns by the same delta.
    pub fn set_position(&mut self, position: Position) {
        let dx = position.x - self.x;
        let dy = position.y - self.y;
        self.x = position.x;
        self.y = position.y;
        for column in &mut self.columns {
            column.x += dx;
            column.y += dy;
        }
    }

    /// Changes the name and re-keys the columns' back-references, including the
    /// endpoint copies held in this table's relation lists.
    pub fn rename(&mut self, new_name: &str) {
        let old = self.key();
        self.name = new_name.to_string();
        for column in &mut self.columns {
            column.table.name = self.name.clone();
        }
        for relation in self
            .from_relations
            .iter_mut()
            .chain(self.to_relations.iter_mut())
        {
            relation.retarget_table(&old, new_name);
        }
    }

    pub fn relations_mut(&mut self) -> impl Iterator<Item = &mut Relation> {
        self.from_relations
            .iter_mut()
            .chain(self.to_relations.iter_mut())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub index: usize,
    pub table: TableKey,
    pub name: String,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
}

impl Column {
    /// Column at `index` within `table`, positioned relative to the table's origin.
    pub fn new(index: usize, table: &Table, name: impl Into<String>, metrics: &TextMetrics) -> Self {
        let offset = metrics.column_offset(index);
        Self {
            index,
            table: table.key(),
            name: name.into(),
            x: table.x + offset.x,
            y: table.y + offset.y,
        }
    }

    pub fn position(&self) -> Position {
        Position::new(self.x, self.y)
    }
}

/// Directed link between two columns, possibly across tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub from: Column,
    pub to: Column,
}

impl Relation {
    pub fn new(from: Column, to: Column) -> Self {
        Self { from, to }
    }

    /// Points endpoints on table `old` at its new name. Returns whether
    /// anything changed.
    pub fn retarget_table(&mut self, old: &TableKey, new_name: &str) -> bool {
        let mut changed = false;
        for column in [&mut self.from, &mut self.to] {
            if column.table == *old {
                column.table.name = new_name.to_string();
                changed = true;
            }
        }
        changed
    }

    /// Renames endpoints matching column `index` of `table`. Returns whether
    /// anything changed.
    pub fn rename_column(&mut self, table: &TableKey, index: usize, new_name: &str) -> bool {
        let mut changed = false;
        for column in [&mut self.from, &mut self.to] {
            if column.table == *table && column.index == index && column.name != new_name {
                column.name = new_name.to_string();
                changed = true;
            }
        }
        changed
    }
}

/// Most recently touched entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Highlighted {
    Table(Table),
    Column(Column),
}

/// Entity whose inline rename editor should open, and where.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rename {
    pub table: Table,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<Column>,
    pub position: Position,
}

impl Rename {
    pub fn table(table: Table) -> Self {
        let position = table.position();
        Self {
            table,
            column: None,
            position,
        }
    }

    pub fn column(table: Table, column: Column) -> Self {
        let position = column.position();
        Self {
            table,
            column: Some(column),
            position,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_identity_ignores_position() {
        let mut table = Table::new("users", "dbo");
        table.set_position(Position::new(40.0, 80.0));
        assert!(table.is(&TableKey::new("users", "dbo")));
        assert!(!table.is(&TableKey::new("users", "audit")));
        assert!(!table.is(&TableKey::new("Users", "dbo")));
    }

    #[test]
    fn test_column_position_follows_table() {
        let metrics = TextMetrics::default();
        let mut table = Table::new("users", "dbo");
        table.set_position(Position::new(100.0, 50.0));
        let column = Column::new(1, &table, "email", &metrics);
        assert_eq!(column.x, 100.0);
        assert_eq!(column.y, 50.0 + metrics.column_offset(1).y);

        table.columns.push(column);
        table.set_position(Position::new(110.0, 40.0));
        assert_eq!(table.columns[0].x, 110.0);
        assert_eq!(table.columns[0].y, 40.0 + metrics.column_offset(1).y);
    }

    #[test]
    fn test_rename_rekeys_columns() {
        let metrics = TextMetrics::default();
        let mut table = Table::new("users", "dbo");
        let column = Column::new(0, &table, "id", &metrics);
        table.columns.push(column);

        table.rename("accounts");
        assert_eq!(table.name, "accounts");
        assert_eq!(table.columns[0].table, TableKey::new("accounts", "dbo"));
    }

    #[test]
    fn test_rename_rekeys_relation_endpoints() {
        let metrics = TextMetrics::default();
        let mut users = Table::new("users", "dbo");
        let orders = Table::new("orders", "dbo");
        let id = Column::new(0, &users, "id", &metrics);
        let fk = Column::new(0, &orders, "user_id", &metrics);
        users.columns.push(id.clone());
        users.to_relations.push(Relation::new(fk.clone(), id));

        users.rename("accounts");
        let relation = &users.to_relations[0];
        assert_eq!(relation.to, users.columns[0]);
        assert_eq!(relation.from, fk);
    }

    #[test]
    fn test_relation_rename_column_matches_index() {
        let metrics = TextMetrics::default();
        let table = Table::new("t", "dbo");
        let a = Column::new(0, &table, "a", &metrics);
        let b = Column::new(1, &table, "b", &metrics);
        let mut relation = Relation::new(a, b);

        assert!(relation.rename_column(&table.key(), 1, "beta"));
        assert_eq!(relation.to.name, "beta");
        assert_eq!(relation.from.name, "a");
        assert!(!relation.rename_column(&TableKey::new("t", "audit"), 0, "x"));
    }

    #[test]
    fn test_minimal_table_json() {
        let table: Table = serde_json::from_str(r#"{"name":"users","schema":"dbo"}"#).unwrap();
        assert_eq!(table, Table::new("users", "dbo"));
    }

    #[test]
    fn test_highlighted_json_is_tagged() {
        let json = serde_json::to_string(&Highlighted::Table(Table::new("users", "dbo"))).unwrap();
        assert!(json.contains(r#""kind":"table""#));
        assert!(json.contains(r#""fromRelations":[]"#));
    }

    #[test]
    fn test_key_display() {
        assert_eq!(TableKey::new("users", "dbo").to_string(), "dbo.users");
    }
}
