use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell as TableCell, CellAlignment, ContentArrangement, Table};

use crate::dashboard::Snapshot;
use crate::models::domain::IpFamily;
use crate::view::SPEED_HEADERS;

/// Text rendering of one family's panel: KPI line, host table and pie shares.
pub fn render_family(snapshot: &Snapshot, family: IpFamily) -> String {
    let prefix = family.key_prefix();
    let mut out = String::new();

    let kpi = |name: &str| {
        snapshot
            .kpi_text(&format!("{prefix}speed-{name}"))
            .unwrap_or("0")
            .to_string()
    };
    out.push_str(&format!(
        "[{family}] {} hosts, {} download speed, {} upload speed\n",
        kpi("host"),
        kpi("rx-max"),
        kpi("tx-max"),
    ));

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(SPEED_HEADERS);

    match snapshot.tables.get(&format!("{prefix}speed-data")) {
        Some(data) if !data.rows.is_empty() => {
            for row in &data.rows {
                table.add_row(row.iter().enumerate().map(|(i, cell)| {
                    let aligned = TableCell::new(&cell.text);
                    if i == 0 {
                        aligned
                    } else {
                        aligned.set_alignment(CellAlignment::Right)
                    }
                }));
            }
        }
        Some(data) => {
            table.add_row(vec![data.placeholder.as_deref().unwrap_or("")]);
        }
        None => {
            table.add_row(vec!["Collecting data..."]);
        }
    }
    out.push_str(&table.to_string());
    out.push('\n');

    for (title, key) in [("Download", "rx"), ("Upload", "tx")] {
        if let Some(slices) = snapshot.charts.get(&format!("{prefix}speed-{key}-pie")) {
            let total: f64 = slices.iter().map(|s| s.value).sum();
            let shares: Vec<String> = slices
                .iter()
                .map(|s| {
                    let pct = if total > 0.0 { s.value / total * 100.0 } else { 0.0 };
                    format!("{} {pct:.1}%", s.label)
                })
                .collect();
            out.push_str(&format!("{title} speed / host: {}\n", shares.join(", ")));
        }
    }

    out
}

pub fn print_snapshot(snapshot: &Snapshot) {
    for family in IpFamily::ALL {
        println!("{}", render_family(snapshot, family));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::PieSlice;
    use crate::dashboard::{DashboardView, SharedSnapshot};
    use crate::view::{Cell, View};

    #[test]
    fn renders_kpis_rows_and_shares() {
        let shared = SharedSnapshot::new();
        let mut view = DashboardView::new(shared.clone());
        view.update_table(
            "speed-data",
            &[vec![Cell::text("10.0.0.2"), Cell::number(100, "100 bps".to_string())]],
            Some("No data recorded yet."),
        );
        view.set_kpi("speed-host", Some("1"));
        view.set_kpi("speed-rx-max", Some("100 bps"));
        let _chart = view.create_pie(
            "speed-rx-pie",
            &[PieSlice::new(3.0, "10.0.0.2"), PieSlice::new(1.0, "10.0.0.3")],
        );

        let text = render_family(&shared.read(), IpFamily::Ipv4);
        assert!(text.starts_with("[ipv4] 1 hosts, 100 bps download speed, 0 upload speed"));
        assert!(text.contains("10.0.0.2"));
        assert!(text.contains("100 bps"));
        assert!(text.contains("Download speed / host: 10.0.0.2 75.0%, 10.0.0.3 25.0%"));
        assert!(!text.contains("Upload speed / host"));
    }

    #[test]
    fn empty_table_shows_placeholder() {
        let shared = SharedSnapshot::new();
        let mut view = DashboardView::new(shared.clone());
        assert!(render_family(&shared.read(), IpFamily::Ipv6).contains("Collecting data..."));

        view.update_table("ipv6-speed-data", &[], Some("No data recorded yet."));
        assert!(render_family(&shared.read(), IpFamily::Ipv6).contains("No data recorded yet."));
    }
}
