//! Pure functions generating the per-channel table DDL.
//!
//! Every deployed channel gets its own set of five tables, suffixed with
//! its channel id (hyphens replaced by underscores, since SQLite table
//! names can't contain them unless quoted everywhere). `sqlx::migrate!()`
//! only covers the static engine-wide schema in `migrations/`; these
//! tables are created at deploy time instead, the same way the teacher's
//! migration files declare indexes alongside each table.

use crate::domain_types::ChannelId;

/// Names of the five tables for a given channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelTableNames<'a> {
    suffix: &'a str,
}

impl<'a> ChannelTableNames<'a> {
    #[must_use]
    pub fn new(suffix: &'a str) -> Self {
        Self { suffix }
    }

    #[must_use]
    pub fn messages(&self) -> String {
        format!("d_m_{}", self.suffix)
    }

    #[must_use]
    pub fn connector_messages(&self) -> String {
        format!("d_mm_{}", self.suffix)
    }

    #[must_use]
    pub fn content(&self) -> String {
        format!("d_mc_{}", self.suffix)
    }

    #[must_use]
    pub fn attachments(&self) -> String {
        format!("d_ma_{}", self.suffix)
    }

    #[must_use]
    pub fn statistics(&self) -> String {
        format!("d_ms_{}", self.suffix)
    }
}

/// Returns the `CREATE TABLE IF NOT EXISTS` statements for `channel`'s five
/// tables, in dependency order (messages before the tables that reference
/// `message_id`).
#[must_use]
pub fn create_statements(channel: ChannelId) -> Vec<String> {
    let suffix = channel.table_suffix();
    let names = ChannelTableNames::new(&suffix);

    vec![
        format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id INTEGER PRIMARY KEY,
                server_id TEXT NOT NULL,
                received_date INTEGER NOT NULL,
                processed INTEGER NOT NULL DEFAULT 0,
                original_id INTEGER,
                import_id TEXT
            )",
            names.messages()
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {} (
                message_id INTEGER NOT NULL,
                metadata_id INTEGER NOT NULL,
                connector_name TEXT NOT NULL,
                received_date INTEGER NOT NULL,
                send_date INTEGER,
                response_date INTEGER,
                status TEXT NOT NULL,
                send_attempts INTEGER NOT NULL DEFAULT 0,
                error_code INTEGER,
                PRIMARY KEY (message_id, metadata_id),
                FOREIGN KEY (message_id) REFERENCES {} (id)
            )",
            names.connector_messages(),
            names.messages()
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {} (
                message_id INTEGER NOT NULL,
                metadata_id INTEGER NOT NULL,
                content_type INTEGER NOT NULL,
                content BLOB NOT NULL,
                data_type TEXT,
                encrypted INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (message_id, metadata_id, content_type),
                FOREIGN KEY (message_id) REFERENCES {} (id)
            )",
            names.content(),
            names.messages()
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {} (
                attachment_id TEXT NOT NULL,
                segment_no INTEGER NOT NULL,
                data BLOB NOT NULL,
                PRIMARY KEY (attachment_id, segment_no)
            )",
            names.attachments()
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {} (
                metadata_id INTEGER NOT NULL,
                server_id TEXT NOT NULL,
                received INTEGER NOT NULL DEFAULT 0,
                filtered INTEGER NOT NULL DEFAULT 0,
                sent INTEGER NOT NULL DEFAULT 0,
                error INTEGER NOT NULL DEFAULT 0,
                queued INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (metadata_id, server_id)
            )",
            names.statistics()
        ),
    ]
}

/// The `DROP TABLE` statements for `channel`'s tables, in reverse
/// dependency order, used when undeploying with data removal.
#[must_use]
pub fn drop_statements(channel: ChannelId) -> Vec<String> {
    let suffix = channel.table_suffix();
    let names = ChannelTableNames::new(&suffix);
    vec![
        format!("DROP TABLE IF EXISTS {}", names.statistics()),
        format!("DROP TABLE IF EXISTS {}", names.attachments()),
        format!("DROP TABLE IF EXISTS {}", names.content()),
        format!("DROP TABLE IF EXISTS {}", names.connector_messages()),
        format!("DROP TABLE IF EXISTS {}", names.messages()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_statements_reference_the_channel_suffix() {
        let channel = ChannelId::generate();
        let statements = create_statements(channel);
        assert_eq!(statements.len(), 5);
        let suffix = channel.table_suffix();
        for statement in &statements {
            assert!(statement.contains(&suffix));
        }
    }

    #[test]
    fn drop_statements_are_the_reverse_of_creation_order() {
        let channel = ChannelId::generate();
        let dropped = drop_statements(channel);
        assert_eq!(dropped.len(), 5);
        assert!(dropped[0].contains("d_ms_"));
        assert!(dropped[4].contains("d_m_"));
    }
}
