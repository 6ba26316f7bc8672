mod versioned_schema;

pub use versioned_schema::{
    open_file, open_versioned, Column, ForeignKey, ForeignKeyOnChange, SqlType, Table,
    VersionedSchema, BASE_DB_VERSION, DEFAULT_TIMESTAMP,
};
