//! CSV import of interaction and catalog rows.
//!
//! Columns are matched by header name, so MovieLens-style dumps
//! (`userId,movieId,rating,timestamp`) and plain exports
//! (`user_id,item_id,timestamp`) both load without a mapping file.

use crate::models::{InteractionRow, ItemMeta};
use crate::storage::SqliteRowStore;
use crate::{Error, Result, current_timestamp};
use serde::Serialize;
use std::io::Read;

/// Rows written per transaction.
const BATCH_SIZE: usize = 1_000;

/// Outcome of an import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportStats {
    /// Data rows read.
    pub read: usize,
    /// Rows that created a new record.
    pub imported: usize,
    /// Rows already present or filtered out.
    pub skipped: usize,
}

#[derive(Debug, Default)]
struct InteractionColumns {
    user_id: Option<usize>,
    item_id: Option<usize>,
    timestamp: Option<usize>,
    rating: Option<usize>,
}

impl InteractionColumns {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self> {
        let mut map = Self::default();
        for (i, header) in headers.iter().enumerate() {
            match normalize(header).as_str() {
                "userid" | "user" => map.user_id = Some(i),
                "itemid" | "item" | "movieid" | "movie" => map.item_id = Some(i),
                "timestamp" | "ts" | "time" | "createdat" => map.timestamp = Some(i),
                "rating" | "score" => map.rating = Some(i),
                _ => {},
            }
        }
        if map.user_id.is_none() || map.item_id.is_none() {
            return Err(Error::InvalidInput(
                "interaction CSV needs 'user_id' and 'item_id' columns".to_string(),
            ));
        }
        Ok(map)
    }
}

#[derive(Debug, Default)]
struct ItemColumns {
    id: Option<usize>,
    title: Option<usize>,
    category: Option<usize>,
}

impl ItemColumns {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self> {
        let mut map = Self::default();
        for (i, header) in headers.iter().enumerate() {
            match normalize(header).as_str() {
                "id" | "itemid" | "movieid" => map.id = Some(i),
                "title" | "name" => map.title = Some(i),
                "category" | "genre" | "genres" => map.category = Some(i),
                _ => {},
            }
        }
        if map.id.is_none() {
            return Err(Error::InvalidInput(
                "catalog CSV needs an 'id' column".to_string(),
            ));
        }
        Ok(map)
    }
}

fn normalize(header: &str) -> String {
    header
        .chars()
        .filter(|c| *c != '_' && *c != '-' && !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Loads CSV rows into a [`SqliteRowStore`].
#[derive(Debug, Clone)]
pub struct CsvImporter {
    delimiter: u8,
    min_rating: Option<f64>,
}

impl Default for CsvImporter {
    fn default() -> Self {
        Self {
            delimiter: b',',
            min_rating: None,
        }
    }
}

impl CsvImporter {
    /// Creates a comma-delimited importer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the field delimiter.
    #[must_use]
    pub const fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Only rows with `rating >= min` count as likes.
    ///
    /// Rows without a rating column are unaffected.
    #[must_use]
    pub const fn with_min_rating(mut self, min: f64) -> Self {
        self.min_rating = Some(min);
        self
    }

    fn reader<R: Read>(&self, input: R) -> csv::Reader<R> {
        csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .delimiter(self.delimiter)
            .from_reader(input)
    }

    /// Imports interaction rows.
    ///
    /// A missing timestamp defaults to now. Malformed rows abort the import;
    /// batches committed before the failure stay committed.
    ///
    /// # Errors
    ///
    /// Returns an error on unreadable input, a malformed row, or a store failure.
    pub fn import_interactions<R: Read>(
        &self,
        input: R,
        store: &SqliteRowStore,
    ) -> Result<ImportStats> {
        let mut reader = self.reader(input);
        let headers = reader
            .headers()
            .map_err(|e| Error::operation("read_csv_headers", e))?
            .clone();
        let columns = InteractionColumns::from_headers(&headers)?;
        let now = current_timestamp();

        let mut stats = ImportStats::default();
        let mut batch = Vec::with_capacity(BATCH_SIZE);
        for (index, record) in reader.records().enumerate() {
            let record = record.map_err(|e| Error::operation("read_csv", e))?;
            let line = index + 2;
            stats.read += 1;

            if let (Some(min), Some(rating)) = (self.min_rating, field(&record, columns.rating)) {
                let rating: f64 = parse_field(line, "rating", rating)?;
                if rating < min {
                    continue;
                }
            }

            let user_id = required(&record, columns.user_id, line, "user_id")?;
            let item_id = required(&record, columns.item_id, line, "item_id")?;
            let timestamp = field(&record, columns.timestamp)
                .map(|ts| parse_field(line, "timestamp", ts))
                .transpose()?
                .unwrap_or(now);
            batch.push(InteractionRow::new(user_id, item_id, timestamp));

            if batch.len() == BATCH_SIZE {
                stats.imported += store.insert_interactions(&batch)?;
                batch.clear();
            }
        }
        stats.imported += store.insert_interactions(&batch)?;
        stats.skipped = stats.read - stats.imported;

        tracing::info!(
            read = stats.read,
            imported = stats.imported,
            skipped = stats.skipped,
            "Imported interactions"
        );
        Ok(stats)
    }

    /// Imports catalog rows, replacing existing metadata for the same id.
    ///
    /// Missing titles become `"Unknown {id}"`, missing categories `"Unknown"`.
    ///
    /// # Errors
    ///
    /// Returns an error on unreadable input, a malformed row, or a store failure.
    pub fn import_items<R: Read>(&self, input: R, store: &SqliteRowStore) -> Result<ImportStats> {
        let mut reader = self.reader(input);
        let headers = reader
            .headers()
            .map_err(|e| Error::operation("read_csv_headers", e))?
            .clone();
        let columns = ItemColumns::from_headers(&headers)?;

        let mut items = Vec::new();
        for (index, record) in reader.records().enumerate() {
            let record = record.map_err(|e| Error::operation("read_csv", e))?;
            let id = required(&record, columns.id, index + 2, "id")?;
            let fallback = ItemMeta::unknown(id);
            items.push(ItemMeta::new(
                id,
                field(&record, columns.title).map_or(fallback.title, str::to_string),
                field(&record, columns.category).map_or(fallback.category, primary_category),
            ));
        }
        let imported = store.upsert_items(&items)?;

        tracing::info!(imported, "Imported catalog items");
        Ok(ImportStats {
            read: items.len(),
            imported,
            skipped: 0,
        })
    }
}

/// First entry of a `|`-separated genre list (`"Comedy|Drama"` → `"Comedy"`).
fn primary_category(value: &str) -> String {
    value.split('|').next().unwrap_or(value).trim().to_string()
}

fn field(record: &csv::StringRecord, index: Option<usize>) -> Option<&str> {
    index
        .and_then(|i| record.get(i))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn required(record: &csv::StringRecord, index: Option<usize>, line: usize, name: &str) -> Result<u64> {
    let value = field(record, index)
        .ok_or_else(|| Error::InvalidInput(format!("line {line}: missing {name}")))?;
    parse_field(line, name, value)
}

fn parse_field<T: std::str::FromStr>(line: usize, name: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::InvalidInput(format!("line {line}: invalid {name} '{value}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::RowSource;

    #[test]
    fn test_import_movielens_ratings() {
        let store = SqliteRowStore::in_memory().unwrap();
        let csv = "userId,movieId,rating,timestamp\n1,10,4.0,100\n1,11,2.0,101\n2,10,5.0,102\n2,10,5.0,103\n";
        let stats = CsvImporter::new()
            .with_min_rating(3.5)
            .import_interactions(csv.as_bytes(), &store)
            .unwrap();
        assert_eq!(stats, ImportStats { read: 4, imported: 2, skipped: 2 });
        assert_eq!(
            store.interactions().unwrap(),
            vec![InteractionRow::new(1, 10, 100), InteractionRow::new(2, 10, 102)]
        );
    }

    #[test]
    fn test_import_tab_separated_without_timestamp() {
        let store = SqliteRowStore::in_memory().unwrap();
        let tsv = "user_id\titem_id\n7\t70\n";
        let stats = CsvImporter::new()
            .with_delimiter(b'\t')
            .import_interactions(tsv.as_bytes(), &store)
            .unwrap();
        assert_eq!(stats.imported, 1);
        assert!(store.interactions().unwrap()[0].timestamp > 0);
    }

    #[test]
    fn test_missing_columns_are_rejected() {
        let store = SqliteRowStore::in_memory().unwrap();
        let result = CsvImporter::new().import_interactions("user,rating\n1,5\n".as_bytes(), &store);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_negative_id_is_rejected() {
        let store = SqliteRowStore::in_memory().unwrap();
        let result =
            CsvImporter::new().import_interactions("user_id,item_id\n-1,5\n".as_bytes(), &store);
        assert!(matches!(result, Err(Error::InvalidInput(msg)) if msg.contains("line 2")));
    }

    #[test]
    fn test_import_items() {
        let store = SqliteRowStore::in_memory().unwrap();
        let csv = "movieId,title,genres\n1,Toy Story (1995),Animation|Comedy\n2,,\n";
        let stats = CsvImporter::new().import_items(csv.as_bytes(), &store).unwrap();
        assert_eq!(stats.imported, 2);
        let catalog = store.catalog().unwrap();
        assert_eq!(catalog[0], ItemMeta::new(1, "Toy Story (1995)", "Animation"));
        assert_eq!(catalog[1], ItemMeta::unknown(2));
    }
}
