//! `callsheet allocate` — append an uploaded contact list to a caller.
//!
//! Uploads are JSONL (one [`Payload`] object per line) or a CSV sheet with
//! a header row. `name` is required either way and blank lines are ignored.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use callsheet_core::engine::allocate;
use callsheet_core::model::Payload;
use clap::{Args, ValueEnum};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::output::{OutputMode, pretty_kv, render_mode};
use crate::project::Project;

#[derive(Args, Debug)]
pub struct AllocateArgs {
    /// Email of the caller receiving the rows.
    #[arg(long, value_name = "EMAIL")]
    pub to: String,

    /// Upload file; omit to read from stdin.
    #[arg(value_name = "PATH")]
    pub input: Option<PathBuf>,

    /// Upload format. Defaults to csv for `.csv` files and jsonl otherwise.
    #[arg(long, value_enum, value_name = "FORMAT")]
    pub upload_format: Option<UploadFormat>,

    /// Skip malformed lines instead of rejecting the upload.
    /// Defaults to `[import] skip_invalid` in the project config.
    #[arg(long)]
    pub skip_invalid: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum UploadFormat {
    Jsonl,
    Csv,
}

impl UploadFormat {
    fn for_input(explicit: Option<Self>, input: Option<&Path>) -> Self {
        explicit.unwrap_or_else(|| {
            let is_csv = input
                .and_then(Path::extension)
                .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
            if is_csv { Self::Csv } else { Self::Jsonl }
        })
    }
}

/// One row of a contact sheet. Column names follow the exported call
/// sheets; bookkeeping columns (`Sl.no`, `S/T/SF`, `Regards`, ...) are
/// ignored.
#[derive(Debug, Deserialize)]
struct SheetRow {
    #[serde(alias = "Name", default)]
    name: String,
    #[serde(alias = "Phone Number", alias = "Phone", default)]
    phone: Option<String>,
    #[serde(alias = "Membershipnumber", alias = "Membership Number", default)]
    membership_number: Option<String>,
    #[serde(alias = "Sex", default)]
    sex: Option<String>,
    #[serde(alias = "Designation", default)]
    designation: Option<String>,
    #[serde(alias = "Org", alias = "Organization", default)]
    organization: Option<String>,
    #[serde(alias = "Location", default)]
    location: Option<String>,
}

impl From<SheetRow> for Payload {
    fn from(row: SheetRow) -> Self {
        Self {
            name: row.name,
            phone: row.phone,
            membership_number: row.membership_number,
            sex: row.sex,
            designation: row.designation,
            organization: row.organization,
            location: row.location,
        }
    }
}

#[derive(Debug, Serialize)]
struct SkippedLine {
    line: usize,
    reason: String,
}

#[derive(Debug, Serialize)]
struct AllocateOutput {
    email: String,
    allocated: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    first_serial: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_serial: Option<u32>,
    skipped: Vec<SkippedLine>,
}

/// Parsed upload: rows to allocate plus the lines that were dropped.
#[derive(Debug, Default)]
struct Upload {
    rows: Vec<Payload>,
    skipped: Vec<SkippedLine>,
}

impl Upload {
    fn keep(
        &mut self,
        line_no: usize,
        row: std::result::Result<Payload, String>,
        skip_invalid: bool,
    ) -> Result<()> {
        match row.and_then(require_name) {
            Ok(payload) => self.rows.push(payload),
            Err(reason) if skip_invalid => {
                warn!(line = line_no, %reason, "skipping upload line");
                self.skipped.push(SkippedLine {
                    line: line_no,
                    reason,
                });
            }
            Err(reason) => anyhow::bail!("invalid upload line {line_no}: {reason}"),
        }
        Ok(())
    }
}

fn parse_upload(reader: impl BufRead, skip_invalid: bool) -> Result<Upload> {
    let mut upload = Upload::default();
    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.with_context(|| format!("failed to read upload line {line_no}"))?;
        if line.trim().is_empty() {
            continue;
        }
        let row = serde_json::from_str::<Payload>(&line).map_err(|err| err.to_string());
        upload.keep(line_no, row, skip_invalid)?;
    }
    Ok(upload)
}

fn parse_sheet(reader: impl io::Read, skip_invalid: bool) -> Result<Upload> {
    let mut sheet = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = sheet
        .headers()
        .context("failed to read upload header row")?
        .clone();

    let mut upload = Upload::default();
    for (idx, record) in sheet.records().enumerate() {
        // Header is line 1.
        let fallback = idx + 2;
        let (line_no, row) = match record {
            Ok(record) => (
                sheet_line(record.position(), fallback),
                record
                    .deserialize::<SheetRow>(Some(&headers))
                    .map(Payload::from)
                    .map_err(|err| err.to_string()),
            ),
            Err(err) if err.is_io_error() => {
                return Err(err).context("failed to read upload");
            }
            Err(err) => (sheet_line(err.position(), fallback), Err(err.to_string())),
        };
        upload.keep(line_no, row, skip_invalid)?;
    }
    Ok(upload)
}

fn sheet_line(position: Option<&csv::Position>, fallback: usize) -> usize {
    position
        .and_then(|pos| usize::try_from(pos.line()).ok())
        .unwrap_or(fallback)
}

fn require_name(mut payload: Payload) -> std::result::Result<Payload, String> {
    payload.name = payload.name.trim().to_string();
    if payload.name.is_empty() {
        return Err("missing contact name".to_string());
    }
    Ok(payload)
}

pub fn run_allocate(args: &AllocateArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let project = Project::discover(project_root)?;
    let skip_invalid = args.skip_invalid || project.config.import.skip_invalid;

    let format = UploadFormat::for_input(args.upload_format, args.input.as_deref());

    let upload = match (args.input.as_ref(), format) {
        (Some(path), format) => {
            let file = File::open(path)
                .with_context(|| format!("failed to open upload {}", path.display()))?;
            match format {
                UploadFormat::Jsonl => parse_upload(BufReader::new(file), skip_invalid)?,
                UploadFormat::Csv => parse_sheet(BufReader::new(file), skip_invalid)?,
            }
        }
        (None, UploadFormat::Jsonl) => parse_upload(io::stdin().lock(), skip_invalid)?,
        (None, UploadFormat::Csv) => parse_sheet(io::stdin().lock(), skip_invalid)?,
    };

    let (_lock, ledger) = project.open_for_write()?;
    let items = allocate(&ledger, &args.to, upload.rows)?;

    let out = AllocateOutput {
        email: args.to.clone(),
        allocated: items.len(),
        first_serial: items.first().map(|item| item.serial_no),
        last_serial: items.last().map(|item| item.serial_no),
        skipped: upload.skipped,
    };
    render_mode(
        output,
        &out,
        |out, w| {
            writeln!(w, "{}\t{}\t{}", out.email, out.allocated, out.skipped.len())
        },
        |out, w| {
            match (out.first_serial, out.last_serial) {
                (Some(first), Some(last)) => writeln!(
                    w,
                    "✓ Allocated {} rows to {} (serials {first}-{last})",
                    out.allocated, out.email
                )?,
                _ => writeln!(w, "Nothing to allocate to {}", out.email)?,
            }
            if !out.skipped.is_empty() {
                pretty_kv(w, "Skipped", out.skipped.len().to_string())?;
                for skipped in &out.skipped {
                    writeln!(w, "  line {}: {}", skipped.line, skipped.reason)?;
                }
            }
            Ok(())
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rows_and_ignores_blank_lines() {
        let input = "{\"name\":\"Ana\",\"phone\":\"555-0100\"}\n\n{\"name\":\" Bo \"}\n";
        let upload = parse_upload(input.as_bytes(), false).unwrap();
        assert_eq!(upload.rows.len(), 2);
        assert_eq!(upload.rows[0].phone.as_deref(), Some("555-0100"));
        assert_eq!(upload.rows[1].name, "Bo");
        assert!(upload.skipped.is_empty());
    }

    #[test]
    fn malformed_line_rejects_upload_by_default() {
        let input = "{\"name\":\"Ana\"}\nnot json\n";
        let err = parse_upload(input.as_bytes(), false).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn skip_invalid_reports_dropped_lines() {
        let input = "{\"name\":\"Ana\"}\n{\"phone\":\"555\"}\nnot json\n{\"name\":\"Cy\"}\n";
        let upload = parse_upload(input.as_bytes(), true).unwrap();
        let names: Vec<&str> = upload.rows.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Ana", "Cy"]);
        let lines: Vec<usize> = upload.skipped.iter().map(|s| s.line).collect();
        assert_eq!(lines, vec![2, 3]);
        assert_eq!(upload.skipped[0].reason, "missing contact name");
    }

    const SHEET: &str = "Sl.no,Name,Phone Number,Membershipnumber,Sex,Designation,Org,Location,S/T/SF,Regards,New Location
1, Meera ,98450 11223,M-17,F,Teacher,Union,Mysuru,,,
2,Ravi,,M-18,,,,Hubli,S,called,
";

    #[test]
    fn sheet_columns_map_onto_payload() {
        let upload = parse_sheet(SHEET.as_bytes(), false).unwrap();
        assert_eq!(upload.rows.len(), 2);
        let meera = &upload.rows[0];
        assert_eq!(meera.name, "Meera");
        assert_eq!(meera.phone.as_deref(), Some("98450 11223"));
        assert_eq!(meera.membership_number.as_deref(), Some("M-17"));
        assert_eq!(meera.organization.as_deref(), Some("Union"));
        assert_eq!(meera.location.as_deref(), Some("Mysuru"));
        assert_eq!(upload.rows[1].phone, None);
        assert_eq!(upload.rows[1].location.as_deref(), Some("Hubli"));
    }

    #[test]
    fn sheet_rows_without_name_are_reported_by_line() {
        let input = "Name,Phone Number\nAna,1\n,2\nCy,3\n";
        let err = parse_sheet(input.as_bytes(), false).unwrap_err();
        assert!(err.to_string().contains("line 3"), "{err}");

        let upload = parse_sheet(input.as_bytes(), true).unwrap();
        let names: Vec<&str> = upload.rows.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Ana", "Cy"]);
        assert_eq!(upload.skipped[0].line, 3);
        assert_eq!(upload.skipped[0].reason, "missing contact name");
    }

    #[test]
    fn ragged_sheet_row_is_rejected() {
        let input = "Name,Phone Number\nAna,1\nBo,2,extra\n";
        let upload = parse_sheet(input.as_bytes(), true).unwrap();
        assert_eq!(upload.rows.len(), 1);
        assert_eq!(upload.skipped[0].line, 3);
    }

    #[test]
    fn format_follows_extension_unless_given() {
        let csv = Path::new("contacts.CSV");
        let jsonl = Path::new("contacts.jsonl");
        assert_eq!(UploadFormat::for_input(None, Some(csv)), UploadFormat::Csv);
        assert_eq!(UploadFormat::for_input(None, Some(jsonl)), UploadFormat::Jsonl);
        assert_eq!(UploadFormat::for_input(None, None), UploadFormat::Jsonl);
        assert_eq!(
            UploadFormat::for_input(Some(UploadFormat::Csv), Some(jsonl)),
            UploadFormat::Csv
        );
    }
}
