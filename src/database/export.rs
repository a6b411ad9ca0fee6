use crate::types::{format_timestamp, Sample, StoreRecord};

pub const CSV_HEADER: &str = "ax,ay,az,magnitude,timestamp\n";

pub fn csv_row(sample: &Sample) -> String {
    format!(
        "{},{},{},{},{}\n",
        sample.ax(),
        sample.ay(),
        sample.az(),
        sample.magnitude(),
        format_timestamp(sample.timestamp())
    )
}

/// 完整 CSV 的逐行输出：表头 + 每条记录一行，顺序与传入一致
pub fn csv_lines(records: Vec<StoreRecord>) -> impl Iterator<Item = String> {
    std::iter::once(CSV_HEADER.to_string()).chain(records.into_iter().map(|r| csv_row(&r.sample)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Reading;
    use chrono::{DateTime, Utc};

    fn record(id: i64, ax: f64) -> StoreRecord {
        let ts = DateTime::parse_from_rfc3339("2026-10-19T08:00:00.5Z").unwrap().with_timezone(&Utc);
        StoreRecord { id, sample: Sample::new(Reading::new(ax, 0.0, 0.0), ts) }
    }

    #[test]
    fn empty_store_yields_header_only() {
        let text: String = csv_lines(Vec::new()).collect();
        assert_eq!(text, "ax,ay,az,magnitude,timestamp\n");
    }

    #[test]
    fn one_line_per_record_in_given_order() {
        let records = vec![record(1, 3.0), record(2, 1.5), record(3, -4.0)];
        let text: String = csv_lines(records).collect();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[1], "3,0,0,3,2026-10-19T08:00:00.500000Z");
        assert_eq!(lines[2], "1.5,0,0,1.5,2026-10-19T08:00:00.500000Z");
        assert!(lines[3].starts_with("-4,0,0,4,"));
    }
}
