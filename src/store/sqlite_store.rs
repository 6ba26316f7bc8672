use super::schema::VERSIONED_SCHEMAS;
use super::{CalendarQuery, TimelineStore};
use crate::history::{
    Batch, CalendarDay, CanonicalListenRecord, NewBatch, RawListenEntry, RawListenRow,
    SourceFile, TimelineInputs,
};
use crate::sqlite_persistence::{open_file, open_versioned};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{params, params_from_iter, types::Type, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

const BATCH_COLUMNS: &str = "id, path, name, start_time, download_date, intake_order";
const SOURCE_FILE_COLUMNS: &str = "id, batch_id, file_name, start_time";
const LISTEN_COLUMNS: &str = "position, end_time, artist_name, track_name, ms_played";
const DATE_FORMAT: &str = "%Y-%m-%d";

pub struct SqliteTimelineStore {
    conn: Arc<Mutex<Connection>>,
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn parse_datetime(raw: &str) -> chrono::ParseResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc))
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn conversion_error(row: &Row, column: &str, err: chrono::ParseError) -> rusqlite::Error {
    let index = row.as_ref().column_index(column).unwrap_or_default();
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(err))
}

fn get_datetime(row: &Row, column: &str) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(column)?;
    parse_datetime(&raw).map_err(|e| conversion_error(row, column, e))
}

fn get_optional_datetime(row: &Row, column: &str) -> rusqlite::Result<Option<DateTime<Utc>>> {
    row.get::<_, Option<String>>(column)?
        .map(|raw| parse_datetime(&raw).map_err(|e| conversion_error(row, column, e)))
        .transpose()
}

fn get_date(row: &Row, column: &str) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(column)?;
    NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(|e| conversion_error(row, column, e))
}

fn get_optional_date(row: &Row, column: &str) -> rusqlite::Result<Option<NaiveDate>> {
    row.get::<_, Option<String>>(column)?
        .map(|raw| {
            NaiveDate::parse_from_str(&raw, DATE_FORMAT)
                .map_err(|e| conversion_error(row, column, e))
        })
        .transpose()
}

impl SqliteTimelineStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        let mut conn = open_file(path)?;
        open_versioned(&mut conn, VERSIONED_SCHEMAS)
            .with_context(|| format!("Failed to prepare timeline database at {:?}", path))?;
        info!("Opened timeline database at {:?}", path);
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        open_versioned(&mut conn, VERSIONED_SCHEMAS)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn row_to_batch(row: &Row) -> rusqlite::Result<Batch> {
        Ok(Batch {
            id: row.get("id")?,
            path: row.get("path")?,
            name: row.get("name")?,
            start_time: get_optional_datetime(row, "start_time")?,
            download_date: get_optional_date(row, "download_date")?,
            intake_order: row.get("intake_order")?,
        })
    }

    fn row_to_source_file(row: &Row) -> rusqlite::Result<SourceFile> {
        Ok(SourceFile {
            id: row.get("id")?,
            batch_id: row.get("batch_id")?,
            file_name: row.get("file_name")?,
            start_time: get_optional_datetime(row, "start_time")?,
        })
    }

    fn row_to_raw_listen(row: &Row) -> rusqlite::Result<RawListenRow> {
        Ok(RawListenRow {
            source_file_id: row.get("source_file_id")?,
            position: row.get("position")?,
            entry: RawListenEntry {
                end_time: get_optional_datetime(row, "end_time")?,
                artist_name: row.get("artist_name")?,
                track_name: row.get("track_name")?,
                ms_played: row.get("ms_played")?,
            },
        })
    }

    fn row_to_listen(row: &Row) -> rusqlite::Result<CanonicalListenRecord> {
        Ok(CanonicalListenRecord {
            position: row.get("position")?,
            end_time: get_datetime(row, "end_time")?,
            artist_name: row.get("artist_name")?,
            track_name: row.get("track_name")?,
            ms_played: row.get("ms_played")?,
        })
    }

    fn row_to_calendar_day(row: &Row) -> rusqlite::Result<CalendarDay> {
        Ok(CalendarDay {
            date: get_date(row, "date")?,
            has_listen: row.get("has_listen")?,
            is_missing: row.get("is_missing")?,
        })
    }

    fn query_batches(conn: &Connection) -> Result<Vec<Batch>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM batches ORDER BY intake_order",
            BATCH_COLUMNS
        ))?;
        let batches = stmt
            .query_map([], Self::row_to_batch)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read batches")?;
        Ok(batches)
    }

    fn query_source_files(conn: &Connection) -> Result<Vec<SourceFile>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM source_files ORDER BY id",
            SOURCE_FILE_COLUMNS
        ))?;
        let files = stmt
            .query_map([], Self::row_to_source_file)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read source files")?;
        Ok(files)
    }

    fn query_raw_listens(conn: &Connection) -> Result<Vec<RawListenRow>> {
        let mut stmt = conn.prepare(
            "SELECT source_file_id, position, end_time, artist_name, track_name, ms_played
             FROM raw_listens ORDER BY source_file_id, position, id",
        )?;
        let rows = stmt
            .query_map([], Self::row_to_raw_listen)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read raw listens")?;
        Ok(rows)
    }

    fn query_listens<P: rusqlite::Params>(
        &self,
        where_clause: &str,
        params: P,
    ) -> Result<Vec<CanonicalListenRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM listens {} ORDER BY position",
            LISTEN_COLUMNS, where_clause
        ))?;
        let listens = stmt
            .query_map(params, Self::row_to_listen)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read listens")?;
        Ok(listens)
    }
}

impl TimelineStore for SqliteTimelineStore {
    fn register_batch(&self, batch: &NewBatch) -> Result<Batch> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let intake_order: i64 = tx.query_row(
            "SELECT COALESCE(MAX(intake_order) + 1, 0) FROM batches",
            [],
            |row| row.get(0),
        )?;
        tx.execute(
            "INSERT INTO batches (path, name, start_time, start_time_declared, intake_order, download_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                batch.path,
                batch.name,
                batch.start_time.as_ref().map(format_datetime),
                batch.start_time.is_some(),
                intake_order,
                batch.download_date.map(format_date),
            ],
        )
        .with_context(|| format!("Failed to register batch {}", batch.path))?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        info!(
            "Registered batch {} ({}) with intake order {}",
            id, batch.name, intake_order
        );
        Ok(Batch {
            id,
            path: batch.path.clone(),
            name: batch.name.clone(),
            start_time: batch.start_time,
            download_date: batch.download_date,
            intake_order,
        })
    }

    fn add_source_file(
        &self,
        batch_id: i64,
        file_name: &str,
        entries: &[RawListenEntry],
    ) -> Result<SourceFile> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let (start_declared, batch_start): (bool, Option<String>) = tx
            .query_row(
                "SELECT start_time_declared, start_time FROM batches WHERE id = ?1",
                params![batch_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
            .with_context(|| format!("Unknown batch {}", batch_id))?;

        let start_time = entries.iter().filter_map(|e| e.end_time).min();
        tx.execute(
            "INSERT INTO source_files (batch_id, file_name, start_time) VALUES (?1, ?2, ?3)",
            params![batch_id, file_name, start_time.as_ref().map(format_datetime)],
        )
        .with_context(|| format!("Failed to add source file {} to batch {}", file_name, batch_id))?;
        let file_id = tx.last_insert_rowid();

        {
            let mut stmt = tx.prepare(
                "INSERT INTO raw_listens (source_file_id, position, end_time, artist_name, track_name, ms_played)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for (position, entry) in entries.iter().enumerate() {
                stmt.execute(params![
                    file_id,
                    position as i64,
                    entry.end_time.as_ref().map(format_datetime),
                    entry.artist_name,
                    entry.track_name,
                    entry.ms_played,
                ])?;
            }
        }

        // An undeclared batch start follows its earliest file
        if !start_declared {
            let current = batch_start
                .as_deref()
                .map(parse_datetime)
                .transpose()
                .with_context(|| format!("Batch {} has an unreadable start time", batch_id))?;
            let earliest = match (current, start_time) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
            if earliest != current {
                tx.execute(
                    "UPDATE batches SET start_time = ?1 WHERE id = ?2",
                    params![earliest.as_ref().map(format_datetime), batch_id],
                )?;
            }
        }
        tx.commit()?;

        debug!(
            "Stored source file {} ({}) of batch {} with {} entries",
            file_id,
            file_name,
            batch_id,
            entries.len()
        );
        Ok(SourceFile {
            id: file_id,
            batch_id,
            file_name: file_name.to_string(),
            start_time,
        })
    }

    fn list_batches(&self) -> Result<Vec<Batch>> {
        let conn = self.conn.lock().unwrap();
        Self::query_batches(&conn)
    }

    fn list_source_files(&self) -> Result<Vec<SourceFile>> {
        let conn = self.conn.lock().unwrap();
        Self::query_source_files(&conn)
    }

    fn load_inputs(&self) -> Result<TimelineInputs> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let inputs = TimelineInputs {
            batches: Self::query_batches(&tx)?,
            files: Self::query_source_files(&tx)?,
            rows: Self::query_raw_listens(&tx)?,
        };
        tx.commit()?;
        Ok(inputs)
    }

    fn replace_timeline(
        &self,
        listens: &[CanonicalListenRecord],
        calendar: &[CalendarDay],
    ) -> Result<()> {
        if let Some(day) = calendar.iter().find(|d| d.has_listen && d.is_missing) {
            bail!("Refusing to store {} as both listened and missing", day.date);
        }

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM listens", [])?;
        tx.execute("DELETE FROM listen_dates", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO listens (position, end_time, date, artist_name, track_name, ms_played)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for listen in listens {
                stmt.execute(params![
                    listen.position,
                    format_datetime(&listen.end_time),
                    format_date(listen.date()),
                    listen.artist_name,
                    listen.track_name,
                    listen.ms_played,
                ])
                .with_context(|| format!("Failed to store listen {}", listen.position))?;
            }

            let mut stmt = tx.prepare(
                "INSERT INTO listen_dates (date, has_listen, is_missing) VALUES (?1, ?2, ?3)",
            )?;
            for day in calendar {
                stmt.execute(params![format_date(day.date), day.has_listen, day.is_missing])
                    .with_context(|| format!("Failed to store calendar day {}", day.date))?;
            }
        }
        tx.commit()?;

        debug!(
            "Replaced timeline with {} listens and {} calendar days",
            listens.len(),
            calendar.len()
        );
        Ok(())
    }

    fn count_listens(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM listens", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn get_listens(&self, offset: usize, limit: usize) -> Result<Vec<CanonicalListenRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM listens ORDER BY position LIMIT ?1 OFFSET ?2",
            LISTEN_COLUMNS
        ))?;
        let listens = stmt
            .query_map(params![limit as i64, offset as i64], Self::row_to_listen)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read listens")?;
        Ok(listens)
    }

    fn get_listens_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<CanonicalListenRecord>> {
        self.query_listens(
            "WHERE date >= ?1 AND date <= ?2",
            params![format_date(from), format_date(to)],
        )
    }

    fn get_listens_by_artist(&self, artist_name: &str) -> Result<Vec<CanonicalListenRecord>> {
        self.query_listens("WHERE artist_name = ?1", params![artist_name])
    }

    fn get_listens_by_track(
        &self,
        artist_name: &str,
        track_name: &str,
    ) -> Result<Vec<CanonicalListenRecord>> {
        self.query_listens(
            "WHERE artist_name = ?1 AND track_name = ?2",
            params![artist_name, track_name],
        )
    }

    fn get_calendar(&self, query: &CalendarQuery) -> Result<Vec<CalendarDay>> {
        let mut clauses = Vec::new();
        let mut values = Vec::new();
        if let Some(has_listen) = query.has_listen {
            values.push(has_listen);
            clauses.push(format!("has_listen = ?{}", values.len()));
        }
        if let Some(is_missing) = query.is_missing {
            values.push(is_missing);
            clauses.push(format!("is_missing = ?{}", values.len()));
        }
        let mut sql = String::from("SELECT date, has_listen, is_missing FROM listen_dates");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY date");

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&sql)?;
        let days = stmt
            .query_map(params_from_iter(values.iter()), Self::row_to_calendar_day)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read calendar")?;
        Ok(days)
    }
}
