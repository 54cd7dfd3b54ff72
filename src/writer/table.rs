use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Write serializable rows as CSV with a header taken from the field names.
pub fn write_table_csv<T: Serialize>(rows: &[T], output_path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(output_path)
        .with_context(|| format!("Failed to create {:?}", output_path))?;
    for row in rows {
        writer
            .serialize(row)
            .with_context(|| format!("Failed to write row to {:?}", output_path))?;
    }
    writer.flush().context("Failed to flush CSV writer")?;
    Ok(())
}

pub fn write_json<T: Serialize + ?Sized>(value: &T, output_path: &Path) -> Result<()> {
    let file = File::create(output_path)
        .with_context(|| format!("Failed to create {:?}", output_path))?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)
        .with_context(|| format!("Failed to write {:?}", output_path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::{ChangeTypeRow, MetricRow};
    use tempfile::TempDir;

    #[test]
    fn test_write_table_csv() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("stats_change_type.csv");
        let rows = vec![
            ChangeTypeRow {
                label: "built-up to forest".to_string(),
                area_ha: 0.02,
                emissions: -3.64,
            },
            ChangeTypeRow {
                label: "forest to grass".to_string(),
                area_ha: 0.01,
                emissions: 0.92,
            },
        ];
        write_table_csv(&rows, &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "Change,Area [ha],Total emissions [t]");
        assert_eq!(lines[1], "built-up to forest,0.02,-3.64");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_write_json() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("summary.json");
        let rows = vec![MetricRow {
            metric: "Net emissions [t]".to_string(),
            value: -2.7,
        }];
        write_json(&rows, &path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value[0]["Metric name"], "Net emissions [t]");
        assert_eq!(value[0]["Value"], -2.7);
    }
}
