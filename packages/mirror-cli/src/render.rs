//! Output rendering for mirror listings: table, json, and csv.

use anyhow::{bail, Result};
use chrono::SecondsFormat;
use clap::ValueEnum;
use colored::Colorize;
use mirror_core::{changelog_summary, MirrorArtifact};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

fn field_value(artifact: &MirrorArtifact, field: &str) -> Result<String> {
    Ok(match field {
        "id" => artifact.id.to_string(),
        "date" => artifact
            .created_at
            .to_rfc3339_opts(SecondsFormat::Secs, true),
        "changelog" => changelog_summary(&artifact.changelog),
        "dir" => artifact.storage_dir.display().to_string(),
        "url" => artifact.storage_dir_relative.clone(),
        _ => bail!("unknown field: {field} (expected id, date, changelog, dir, url)"),
    })
}

pub fn print(mirrors: &[MirrorArtifact], fields: &[String], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => print_table(mirrors, fields),
        OutputFormat::Json => print_json(mirrors, fields),
        OutputFormat::Csv => print_csv(mirrors, fields),
    }
}

fn print_table(mirrors: &[MirrorArtifact], fields: &[String]) -> Result<()> {
    let mut rows = Vec::with_capacity(mirrors.len());
    for mirror in mirrors {
        let row = fields
            .iter()
            .map(|f| field_value(mirror, f))
            .collect::<Result<Vec<_>>>()?;
        rows.push(row);
    }

    let widths: Vec<usize> = fields
        .iter()
        .enumerate()
        .map(|(i, field)| {
            rows.iter()
                .map(|r| r[i].len())
                .chain([field.len()])
                .max()
                .unwrap_or(0)
        })
        .collect();

    let header = fields
        .iter()
        .zip(&widths)
        .map(|(field, width)| format!("{field:<width$}"))
        .collect::<Vec<_>>()
        .join("  ");
    println!("{}", header.bold());

    for row in rows {
        let line = row
            .iter()
            .zip(&widths)
            .map(|(value, width)| format!("{value:<width$}"))
            .collect::<Vec<_>>()
            .join("  ");
        println!("{line}");
    }
    Ok(())
}

fn print_json(mirrors: &[MirrorArtifact], fields: &[String]) -> Result<()> {
    let mut items = Vec::with_capacity(mirrors.len());
    for mirror in mirrors {
        let mut object = serde_json::Map::new();
        for field in fields {
            object.insert(field.clone(), field_value(mirror, field)?.into());
        }
        items.push(serde_json::Value::Object(object));
    }
    println!("{}", serde_json::to_string_pretty(&items)?);
    Ok(())
}

fn print_csv(mirrors: &[MirrorArtifact], fields: &[String]) -> Result<()> {
    println!(
        "{}",
        fields
            .iter()
            .map(|f| csv_escape(f))
            .collect::<Vec<_>>()
            .join(",")
    );
    for mirror in mirrors {
        let row = fields
            .iter()
            .map(|f| field_value(mirror, f).map(|v| csv_escape(&v)))
            .collect::<Result<Vec<_>>>()?;
        println!("{}", row.join(","));
    }
    Ok(())
}

fn csv_escape(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use mirror_core::{ChangelogEntry, MirrorId, MirrorStatus};

    fn artifact() -> MirrorArtifact {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        MirrorArtifact {
            id: MirrorId::new(),
            created_at: ts,
            started_at: ts,
            ended_at: ts,
            status: MirrorStatus::Private,
            storage_dir: "/srv/uploads/mirrors/2024/05/1/12-00-00".into(),
            storage_dir_relative: "/mirrors/2024/05/1/12-00-00".into(),
            changelog: vec![
                ChangelogEntry::new(ts, "Post X published"),
                ChangelogEntry::new(ts, "Post Y updated"),
            ],
        }
    }

    #[test]
    fn test_field_values() {
        let artifact = artifact();
        assert_eq!(
            field_value(&artifact, "date").unwrap(),
            "2024-05-01T12:00:00Z"
        );
        assert_eq!(
            field_value(&artifact, "changelog").unwrap(),
            "Post X published, Post Y updated"
        );
        assert_eq!(
            field_value(&artifact, "url").unwrap(),
            "/mirrors/2024/05/1/12-00-00"
        );
        assert!(field_value(&artifact, "bogus").is_err());
    }

    #[test]
    fn test_csv_escaping() {
        assert_eq!(csv_escape("plain"), "plain");
        assert_eq!(csv_escape("a,b"), "\"a,b\"");
        assert_eq!(csv_escape("say \"hi\""), "\"say \"\"hi\"\"\"");
    }
}
