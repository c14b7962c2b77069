use flatline_archive::ScanReport;
use flatline_convert::ConversionStats;
use tabled::{
    Table, Tabled,
    settings::{Panel, Style},
};

#[derive(Debug, Clone, Default)]
pub struct Formatter {
    pub header: Option<String>,
    pub footer: Option<String>,
}

impl Formatter {
    pub fn build<T: Tabled, I: IntoIterator<Item = T>>(self, data: I) -> Table {
        let mut table = Table::new(data);
        if let Some(header) = self.header {
            table.with(Panel::header(header));
        }
        if let Some(footer) = self.footer {
            table.with(Panel::footer(footer));
        }

        table.with(Style::sharp());
        table
    }
}

#[derive(Debug, Tabled)]
pub struct GroupRow {
    #[tabled(rename = "Group")]
    pub group: String,
    #[tabled(rename = "Files")]
    pub files: usize,
    #[tabled(rename = "Size")]
    pub size: String,
}

#[derive(Debug, Tabled)]
pub struct ConvertedRow {
    #[tabled(rename = "Group")]
    pub group: String,
    #[tabled(rename = "Converted")]
    pub files: usize,
}

pub fn scan_table(report: &ScanReport) -> Table {
    let rows = report.groups.iter().map(|(group, summary)| GroupRow {
        group: group.clone(),
        files: summary.count,
        size: human_bytes(summary.total_bytes),
    });

    let mut footer = format!(
        "{} documents, {} in {} archives",
        report.entries.len(),
        human_bytes(report.total_bytes),
        report.archives_visited
    );
    if !report.skipped.is_empty() {
        footer.push_str(&format!(", {} skipped", report.skipped.len()));
    }

    Formatter {
        header: Some("Document groups".to_string()),
        footer: Some(footer),
    }
    .build(rows)
}

pub fn stats_table(stats: &ConversionStats) -> Table {
    let rows = stats.per_group.iter().map(|(group, files)| ConvertedRow {
        group: group.clone(),
        files: *files,
    });

    let footer = format!(
        "{}/{} converted, {} failed, {} skipped, {} rows in {:.1}s",
        stats.success,
        stats.total,
        stats.failed,
        stats.skipped,
        stats.total_rows,
        stats.duration_ms as f64 / 1000.0
    );

    Formatter {
        header: Some("Converted files".to_string()),
        footer: Some(footer),
    }
    .build(rows)
}

pub fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
