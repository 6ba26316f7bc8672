//! SQLite schema of a listening timeline database.
//!
//! Inputs (`batches`, `source_files`, `raw_listens`) are written by importers.
//! Outputs (`listens`, `listen_dates`) are only ever replaced as a whole by a
//! timeline rebuild.

use crate::sqlite_column;
use crate::sqlite_persistence::{
    Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP,
};

const BATCH_FK: ForeignKey = ForeignKey {
    foreign_table: "batches",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Cascade,
};

const SOURCE_FILE_FK: ForeignKey = ForeignKey {
    foreign_table: "source_files",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Cascade,
};

// =============================================================================
// Version 0 - Inputs and outputs
// =============================================================================

const BATCHES_TABLE_V0: Table = Table {
    name: "batches",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("path", &SqlType::Text, non_null = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("start_time", &SqlType::Text),
        // 1 when start_time was given at registration, 0 when derived from files
        sqlite_column!(
            "start_time_declared",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("intake_order", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[],
    unique_constraints: &[&["path"], &["intake_order"]],
};

const SOURCE_FILES_TABLE: Table = Table {
    name: "source_files",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!(
            "batch_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&BATCH_FK)
        ),
        sqlite_column!("file_name", &SqlType::Text, non_null = true),
        sqlite_column!("start_time", &SqlType::Text),
    ],
    indices: &[],
    unique_constraints: &[&["batch_id", "file_name"]],
};

/// Raw listens are stored as handed over, nulls included; validation happens
/// when a rebuild reads them.
const RAW_LISTENS_TABLE: Table = Table {
    name: "raw_listens",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!(
            "source_file_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&SOURCE_FILE_FK)
        ),
        sqlite_column!("position", &SqlType::Integer, non_null = true),
        sqlite_column!("end_time", &SqlType::Text),
        sqlite_column!("artist_name", &SqlType::Text),
        sqlite_column!("track_name", &SqlType::Text),
        sqlite_column!("ms_played", &SqlType::Integer),
    ],
    indices: &[("idx_raw_listens_source", "source_file_id, position")],
    unique_constraints: &[],
};

const LISTENS_TABLE: Table = Table {
    name: "listens",
    columns: &[
        sqlite_column!("position", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("end_time", &SqlType::Text, non_null = true),
        // UTC calendar date of end_time, YYYY-MM-DD
        sqlite_column!("date", &SqlType::Text, non_null = true),
        sqlite_column!("artist_name", &SqlType::Text, non_null = true),
        sqlite_column!("track_name", &SqlType::Text, non_null = true),
        sqlite_column!("ms_played", &SqlType::Integer, non_null = true),
    ],
    indices: &[
        ("idx_listens_date", "date"),
        ("idx_listens_artist_track", "artist_name, track_name"),
    ],
    unique_constraints: &[],
};

const LISTEN_DATES_TABLE: Table = Table {
    name: "listen_dates",
    columns: &[
        sqlite_column!("date", &SqlType::Text, is_primary_key = true),
        sqlite_column!("has_listen", &SqlType::Integer, non_null = true),
        sqlite_column!("is_missing", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_listen_dates_flags", "has_listen, is_missing")],
    unique_constraints: &[],
};

// =============================================================================
// Version 1 - Batch download date
// =============================================================================

const BATCHES_TABLE_V1: Table = Table {
    name: "batches",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("path", &SqlType::Text, non_null = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("start_time", &SqlType::Text),
        sqlite_column!(
            "start_time_declared",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("intake_order", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!("download_date", &SqlType::Text),
    ],
    indices: &[],
    unique_constraints: &[&["path"], &["intake_order"]],
};

fn migrate_v0_to_v1(conn: &rusqlite::Connection) -> anyhow::Result<()> {
    conn.execute("ALTER TABLE batches ADD COLUMN download_date TEXT", [])?;
    Ok(())
}

pub const VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 0,
        tables: &[
            BATCHES_TABLE_V0,
            SOURCE_FILES_TABLE,
            RAW_LISTENS_TABLE,
            LISTENS_TABLE,
            LISTEN_DATES_TABLE,
        ],
        migration: None,
    },
    VersionedSchema {
        version: 1,
        tables: &[
            BATCHES_TABLE_V1,
            SOURCE_FILES_TABLE,
            RAW_LISTENS_TABLE,
            LISTENS_TABLE,
            LISTEN_DATES_TABLE,
        ],
        migration: Some(migrate_v0_to_v1),
    },
];
