//! Mutation protocol for the table, relation and UI hint stores.
//!
//! Every operation reads a snapshot of the committed collection, edits the
//! copy and writes the whole collection back. Tables are located by
//! (name, schema), never by the identity of the value passed in, so callers
//! may hold stale copies.

use tracing::{debug, warn};

use crate::config::BuilderConfig;
use crate::model::{Column, Highlighted, Position, Relation, Rename, Table, TableKey};
use crate::state::{State, StateRegistry};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BuilderError {
    #[error("Table not found: {0}")]
    TableNotFound(TableKey),
    #[error("Table already exists: {0}")]
    DuplicateTable(TableKey),
    #[error("Column index {index} out of range for {table} ({len} columns)")]
    ColumnOutOfRange {
        table: TableKey,
        index: usize,
        len: usize,
    },
}

pub struct BuilderService {
    tables: State<Vec<Table>>,
    relations: State<Vec<Relation>>,
    highlighted: State<Highlighted>,
    rename: State<Rename>,
    config: BuilderConfig,
    table_counter: i64,
    column_counter: i64,
}

impl BuilderService {
    /// Wires the service to its stores and resets the table collection to empty.
    pub fn new(
        tables: State<Vec<Table>>,
        relations: State<Vec<Relation>>,
        highlighted: State<Highlighted>,
        rename: State<Rename>,
        config: BuilderConfig,
    ) -> Self {
        tables.set(Vec::new());
        Self {
            table_counter: config.first_table_suffix,
            column_counter: config.first_column_suffix,
            tables,
            relations,
            highlighted,
            rename,
            config,
        }
    }

    pub fn from_registry(registry: &StateRegistry, config: BuilderConfig) -> Self {
        Self::new(
            registry.tables().clone(),
            registry.relations().clone(),
            registry.highlighted().clone(),
            registry.rename().clone(),
            config,
        )
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    pub fn set_tables(&self, tables: &[Table]) {
        debug!(count = tables.len(), "tables replaced");
        self.tables.set(tables.to_vec());
    }

    /// Adds `table`, or an auto-named one, at `position` (origin by default).
    ///
    /// The name counter advances on every call, even when `table` is given.
    /// Auto-naming skips names already taken; an explicit duplicate is an error.
    pub fn add_table(
        &mut self,
        table: Option<Table>,
        position: Option<Position>,
    ) -> Result<Table, BuilderError> {
        let mut tables = self.snapshot_tables();
        let mut untitled = self.next_table_name();

        let mut table = match table {
            Some(table) => {
                let key = table.key();
                if tables.iter().any(|t| t.is(&key)) {
                    return Err(BuilderError::DuplicateTable(key));
                }
                table
            }
            None => {
                let schema = self.config.default_schema.clone();
                while tables
                    .iter()
                    .any(|t| t.name == untitled && t.schema == schema)
                {
                    untitled = self.next_table_name();
                }
                Table::new(untitled, schema)
            }
        };
        let key = table.key();

        table.set_position(position.unwrap_or_default());

        self.highlighted.set(Highlighted::Table(table.clone()));
        tables.push(table.clone());
        self.tables.set(tables);
        self.rename.set(Rename::table(table.clone()));

        debug!(table = %key, x = table.x, y = table.y, "table added");
        Ok(table)
    }

    /// Renames the committed table matching `table` and highlights the
    /// argument as it was before the rename.
    pub fn rename_table(&self, table: &Table, new_name: &str) -> Result<(), BuilderError> {
        let mut tables = self.snapshot_tables();
        let key = table.key();
        let target = tables
            .iter_mut()
            .find(|t| t.is(&key))
            .ok_or_else(|| BuilderError::TableNotFound(key.clone()))?;

        target.rename(new_name);

        // Relation endpoints are copies; re-key them wherever they are held.
        for t in &mut tables {
            for relation in t.relations_mut() {
                relation.retarget_table(&key, new_name);
            }
        }
        let mut relations = self.relations.take().unwrap_or_default();
        let mut relations_changed = false;
        for relation in &mut relations {
            relations_changed |= relation.retarget_table(&key, new_name);
        }

        self.tables.set(tables);
        if relations_changed {
            self.relations.set(relations);
        }
        self.highlighted.set(Highlighted::Table(table.clone()));

        debug!(table = %key, new_name, "table renamed");
        Ok(())
    }

    /// Appends a column named `column_name`. Does nothing if the table is not
    /// in the committed collection.
    pub fn add_column(&self, table: &Table, column_name: &str) -> Option<Column> {
        let mut tables = self.snapshot_tables();
        let key = table.key();
        let Some(target) = tables.iter_mut().find(|t| t.is(&key)) else {
            warn!(table = %key, column = column_name, "add_column: table not found");
            return None;
        };

        let column = Column::new(
            target.columns.len(),
            target,
            column_name,
            &self.config.metrics,
        );
        target.columns.push(column.clone());

        self.tables.set(tables);
        self.highlighted.set(Highlighted::Column(column.clone()));
        self.rename
            .set(Rename::column(table.clone(), column.clone()));

        debug!(table = %key, column = column_name, index = column.index, "column added");
        Some(column)
    }

    /// Like [`add_column`](Self::add_column) with a name from the column counter.
    pub fn add_untitled_column(&mut self, table: &Table) -> Option<Column> {
        let name = self.next_column_name();
        self.add_column(table, &name)
    }

    /// Records a relation from `from` to `to`.
    ///
    /// The relation always joins the relation collection. Each endpoint table
    /// found in the committed collection also gets it in its own list; a
    /// missing endpoint table is skipped without error.
    pub fn add_relation(&self, from: &Column, to: &Column) -> Relation {
        let mut relations = self.relations.take().unwrap_or_default();
        let mut tables = self.snapshot_tables();

        let relation = Relation::new(from.clone(), to.clone());

        match tables.iter_mut().find(|t| t.is(&from.table)) {
            Some(from_table) => from_table.from_relations.push(relation.clone()),
            None => warn!(table = %from.table, "add_relation: source table not found"),
        }
        match tables.iter_mut().find(|t| t.is(&to.table)) {
            Some(to_table) => to_table.to_relations.push(relation.clone()),
            None => warn!(table = %to.table, "add_relation: target table not found"),
        }

        relations.push(relation.clone());
        self.relations.set(relations);
        self.tables.set(tables);
        self.highlighted.set(Highlighted::Column(from.clone()));

        debug!(
            from = %from.table,
            from_column = %from.name,
            to = %to.table,
            to_column = %to.name,
            "relation added"
        );
        relation
    }

    /// Renames the column at `column.index` in the committed table. The index
    /// is trusted as given; the table lookup is guarded.
    pub fn rename_column(
        &self,
        table: &Table,
        column: &Column,
        new_name: &str,
    ) -> Result<(), BuilderError> {
        let mut tables = self.snapshot_tables();
        let key = table.key();
        let Some(target) = tables.iter_mut().find(|t| t.is(&key)) else {
            warn!(table = %key, "rename_column: table not found");
            return Ok(());
        };

        let len = target.columns.len();
        let slot = target
            .columns
            .get_mut(column.index)
            .ok_or_else(|| BuilderError::ColumnOutOfRange {
                table: key.clone(),
                index: column.index,
                len,
            })?;
        slot.name = new_name.to_string();
        let renamed = slot.clone();

        for t in &mut tables {
            for relation in t.relations_mut() {
                relation.rename_column(&key, column.index, new_name);
            }
        }
        let mut relations = self.relations.take().unwrap_or_default();
        let mut relations_changed = false;
        for relation in &mut relations {
            relations_changed |= relation.rename_column(&key, column.index, new_name);
        }

        self.tables.set(tables);
        if relations_changed {
            self.relations.set(relations);
        }
        self.highlighted.set(Highlighted::Column(renamed));

        debug!(table = %key, index = column.index, new_name, "column renamed");
        Ok(())
    }

    fn snapshot_tables(&self) -> Vec<Table> {
        self.tables.take().unwrap_or_default()
    }

    fn next_table_name(&mut self) -> String {
        let name = format!("{}{}", self.config.table_prefix, self.table_counter);
        self.table_counter += 1;
        name
    }

    fn next_column_name(&mut self) -> String {
        let name = format!("{}{}", self.config.column_prefix, self.column_counter);
        self.column_counter += 1;
        name
    }
}
