//! Serialized mutation requests.
//!
//! Consumers never call the builder service directly. They hold a
//! [`CommandSender`] and enqueue [`Command`]s; the [`Dispatcher`] owns the
//! service and applies queued commands one at a time, in order. Commands
//! enqueued by store subscribers while a command is being applied run later
//! in the same pass.

use serde::{Deserialize, Serialize};
use std::sync::mpsc::{self, Receiver, Sender};
use tracing::{debug, warn};

use crate::builder::{BuilderError, BuilderService};
use crate::model::{Column, Position, Table};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    SetTables {
        tables: Vec<Table>,
    },
    AddTable {
        #[serde(default)]
        table: Option<Table>,
        #[serde(default)]
        position: Option<Position>,
    },
    RenameTable {
        table: Table,
        new_name: String,
    },
    /// Without a name the column is auto-named from the column counter.
    AddColumn {
        table: Table,
        #[serde(default)]
        name: Option<String>,
    },
    AddRelation {
        from: Column,
        to: Column,
    },
    RenameColumn {
        table: Table,
        column: Column,
        new_name: String,
    },
}

impl Command {
    pub fn from_json(input: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(input)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SetTables { .. } => "set_tables",
            Self::AddTable { .. } => "add_table",
            Self::RenameTable { .. } => "rename_table",
            Self::AddColumn { .. } => "add_column",
            Self::AddRelation { .. } => "add_relation",
            Self::RenameColumn { .. } => "rename_column",
        }
    }
}

impl BuilderService {
    pub fn apply(&mut self, command: Command) -> Result<(), BuilderError> {
        match command {
            Command::SetTables { tables } => self.set_tables(&tables),
            Command::AddTable { table, position } => {
                self.add_table(table, position)?;
            }
            Command::RenameTable { table, new_name } => self.rename_table(&table, &new_name)?,
            Command::AddColumn {
                table,
                name: Some(name),
            } => {
                self.add_column(&table, &name);
            }
            Command::AddColumn { table, name: None } => {
                self.add_untitled_column(&table);
            }
            Command::AddRelation { from, to } => {
                self.add_relation(&from, &to);
            }
            Command::RenameColumn {
                table,
                column,
                new_name,
            } => self.rename_column(&table, &column, &new_name)?,
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Command queue closed")]
pub struct QueueClosed;

/// Cloneable handle for enqueuing commands.
#[derive(Debug, Clone)]
pub struct CommandSender {
    inner: Sender<Command>,
}

impl CommandSender {
    pub fn send(&self, command: Command) -> Result<(), QueueClosed> {
        self.inner.send(command).map_err(|_| QueueClosed)
    }
}

#[derive(Debug, Default)]
pub struct DispatchReport {
    pub applied: usize,
    pub failed: Vec<BuilderError>,
}

impl DispatchReport {
    pub fn is_ok(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Single writer for a [`BuilderService`].
pub struct Dispatcher {
    service: BuilderService,
    sender: Sender<Command>,
    receiver: Receiver<Command>,
}

impl Dispatcher {
    pub fn new(service: BuilderService) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            service,
            sender,
            receiver,
        }
    }

    pub fn sender(&self) -> CommandSender {
        CommandSender {
            inner: self.sender.clone(),
        }
    }

    pub fn service(&self) -> &BuilderService {
        &self.service
    }

    /// Applies queued commands until the queue is empty.
    pub fn run_pending(&mut self) -> DispatchReport {
        let mut report = DispatchReport::default();

        while let Ok(command) = self.receiver.try_recv() {
            let op = command.name();
            match self.service.apply(command) {
                Ok(()) => {
                    debug!(op, "command applied");
                    report.applied += 1;
                }
                Err(err) => {
                    warn!(op, error = %err, "command rejected");
                    report.failed.push(err);
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuilderConfig;
    use crate::model::{Highlighted, TableKey};
    use crate::state::StateRegistry;

    fn setup() -> (StateRegistry, Dispatcher) {
        let registry = StateRegistry::new();
        let service = BuilderService::from_registry(&registry, BuilderConfig::default());
        (registry, Dispatcher::new(service))
    }

    #[test]
    fn test_parse_commands() {
        let add = Command::from_json(r#"{"op":"add_table"}"#).unwrap();
        assert_eq!(
            add,
            Command::AddTable {
                table: None,
                position: None
            }
        );

        let column = Command::from_json(
            r#"{"op":"add_column","table":{"name":"users","schema":"dbo"},"name":"id"}"#,
        )
        .unwrap();
        assert_eq!(column.name(), "add_column");
    }

    #[test]
    fn test_unknown_op_rejected() {
        assert!(Command::from_json(r#"{"op":"drop_table"}"#).is_err());
    }

    #[test]
    fn test_commands_apply_in_order() {
        let (registry, mut dispatcher) = setup();
        let sender = dispatcher.sender();

        let users = Table::new("users", "dbo");
        sender
            .send(Command::AddTable {
                table: Some(users.clone()),
                position: Some(Position::new(10.0, 20.0)),
            })
            .unwrap();
        sender
            .send(Command::AddColumn {
                table: users.clone(),
                name: Some("id".into()),
            })
            .unwrap();
        sender
            .send(Command::RenameTable {
                table: users.clone(),
                new_name: "accounts".into(),
            })
            .unwrap();

        let report = dispatcher.run_pending();
        assert_eq!(report.applied, 3);
        assert!(report.is_ok());

        let tables = registry.tables().take().unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].name, "accounts");
        assert_eq!(tables[0].columns.len(), 1);
    }

    #[test]
    fn test_failed_command_does_not_stop_queue() {
        let (registry, mut dispatcher) = setup();
        let sender = dispatcher.sender();

        sender
            .send(Command::RenameTable {
                table: Table::new("ghost", "dbo"),
                new_name: "x".into(),
            })
            .unwrap();
        sender
            .send(Command::AddTable {
                table: None,
                position: None,
            })
            .unwrap();

        let report = dispatcher.run_pending();
        assert_eq!(report.applied, 1);
        assert_eq!(
            report.failed,
            vec![BuilderError::TableNotFound(TableKey::new("ghost", "dbo"))]
        );
        assert_eq!(registry.tables().take().unwrap().len(), 1);
    }

    #[test]
    fn test_subscriber_commands_run_after_trigger() {
        let (registry, mut dispatcher) = setup();
        let sender = dispatcher.sender();

        // Every new table gets an `id` column, queued from the highlight observer.
        let follow_up = dispatcher.sender();
        let _sub = registry.highlighted().subscribe(move |h: &Highlighted| {
            if let Highlighted::Table(table) = h {
                if table.columns.is_empty() {
                    let _ = follow_up.send(Command::AddColumn {
                        table: table.clone(),
                        name: Some("id".into()),
                    });
                }
            }
        });

        sender
            .send(Command::AddTable {
                table: None,
                position: None,
            })
            .unwrap();
        let report = dispatcher.run_pending();
        assert_eq!(report.applied, 2);

        let tables = registry.tables().take().unwrap();
        assert_eq!(tables[0].columns.len(), 1);
        assert_eq!(tables[0].columns[0].name, "id");
    }

    #[test]
    fn test_add_column_without_name_uses_counter() {
        let (registry, mut dispatcher) = setup();
        let sender = dispatcher.sender();
        sender
            .send(Command::from_json(r#"{"op":"add_table","table":{"name":"t","schema":"dbo"}}"#).unwrap())
            .unwrap();
        sender
            .send(Command::from_json(r#"{"op":"add_column","table":{"name":"t","schema":"dbo"}}"#).unwrap())
            .unwrap();
        dispatcher.run_pending();

        let tables = registry.tables().take().unwrap();
        assert_eq!(tables[0].columns[0].name, "column-1");
    }

    #[test]
    fn test_send_after_dispatcher_dropped() {
        let (_registry, dispatcher) = setup();
        let sender = dispatcher.sender();
        drop(dispatcher);
        assert!(sender.send(Command::SetTables { tables: vec![] }).is_err());
    }
}
