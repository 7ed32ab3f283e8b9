//! Index statistics.
//!
//! A quick summary of what has been ingested: chunk and document counts,
//! the index dimension, and a per-document breakdown. Used by
//! `massist stats` to confirm uploads are reaching the index.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::db;
use crate::store::{ChunkStore, SqliteStore};

struct DocumentStats {
    source_document: String,
    chunk_count: i64,
    last_ingested_ms: i64,
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());

    let total_chunks = store.count().await?;
    let total_docs = store.document_count().await?;
    let dims = store.dims().await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("manual-assist Index Stats");
    println!("=========================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Documents:   {}", total_docs);
    println!("  Chunks:      {}", total_chunks);
    println!(
        "  Dimension:   {}",
        dims.map(|d| d.to_string())
            .unwrap_or_else(|| "(empty index)".to_string())
    );

    let rows = sqlx::query(
        r#"
        SELECT source_document,
               COUNT(*) AS chunk_count,
               MAX(created_at) AS last_ingested
        FROM chunks
        GROUP BY source_document
        ORDER BY chunk_count DESC, source_document
        "#,
    )
    .fetch_all(&pool)
    .await?;

    let documents: Vec<DocumentStats> = rows
        .iter()
        .map(|row| DocumentStats {
            source_document: row.get("source_document"),
            chunk_count: row.get("chunk_count"),
            last_ingested_ms: row.get("last_ingested"),
        })
        .collect();

    if !documents.is_empty() {
        println!();
        println!("  By document:");
        println!("  {:<48} {:>8}   {}", "DOCUMENT", "CHUNKS", "INGESTED");
        println!("  {}", "-".repeat(76));

        for d in &documents {
            println!(
                "  {:<48} {:>8}   {}",
                d.source_document,
                d.chunk_count,
                format_ts_relative(d.last_ingested_ms / 1000)
            );
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let delta = now - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_format_ts_relative() {
        let now = chrono::Utc::now().timestamp();
        assert_eq!(format_ts_relative(now), "just now");
        assert_eq!(format_ts_relative(now - 7200), "2 hours ago");
        assert_eq!(format_ts_relative(now - 86400), "1 day ago");
    }
}
