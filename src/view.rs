//! The speed panel controller: turns poll responses and dataset queries into
//! table rows, pie charts and KPI labels, and pushes them through a [`View`].

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use crate::chart::{pie_data, Chart, ChartRegistry, PieSlice};
use crate::dataset::{Columns, Grouping, Record, RecordOrder, RowFilter, TrafficDataset};
use crate::format;
use crate::hosts::HostDirectory;
use crate::models::domain::{IpFamily, PollResponse};
use crate::models::dto::DetailRequest;
use crate::oui::OuiTable;

pub const SPEED_HEADERS: [&str; 7] = [
    "Host",
    "Upload Speed (Bit/s)",
    "Upload (Bytes)",
    "Upload (Packets)",
    "Download Speed (Bit/s)",
    "Download (Bytes)",
    "Download (Packets)",
];

pub const DETAIL_HEADERS: [&str; 5] = [
    "Conn.",
    "Down. (Bytes)",
    "Down. (Pkts.)",
    "Up. (Bytes)",
    "Up. (Pkts.)",
];

pub const NO_DATA: &str = "No data recorded yet.";

const NULL_MAC: &str = "00:00:00:00:00:00";
const DETAIL_RX_PIE: &str = "bubble-pie1";
const DETAIL_TX_PIE: &str = "bubble-pie2";
const DETAIL_HOSTNAME: &str = "bubble-hostname";
const DETAIL_VENDOR: &str = "bubble-vendor";

/// A table cell: the raw value used for sorting plus its display text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cell {
    pub value: Value,
    pub text: String,
}

impl Cell {
    pub fn text(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            value: Value::String(text.clone()),
            text,
        }
    }

    pub fn number(value: impl Into<Value>, text: String) -> Self {
        Self {
            value: value.into(),
            text,
        }
    }
}

pub type TableRow = Vec<Cell>;

/// Where rendered output goes.
pub trait View {
    type Chart: Chart;

    fn update_table(&mut self, table: &str, rows: &[TableRow], placeholder: Option<&str>);

    fn create_pie(&mut self, canvas: &str, slices: &[PieSlice]) -> Self::Chart;

    /// `None` hides the label and keeps its previous text.
    fn set_kpi(&mut self, id: &str, text: Option<&str>);
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostDetail {
    pub key: String,
    pub column: String,
    pub label: String,
    pub rows: Vec<TableRow>,
    pub rx_pie: Vec<PieSlice>,
    pub tx_pie: Vec<PieSlice>,
    pub hostname: Option<String>,
    pub vendor: Option<String>,
}

/// Owns every piece of panel state: live charts, host identities, the
/// traffic dataset and the OUI table.
pub struct SpeedView<V: View> {
    view: V,
    charts: ChartRegistry<V::Chart>,
    hosts: HostDirectory,
    dataset: TrafficDataset,
    oui: OuiTable,
    seen: HashMap<IpFamily, Vec<String>>,
}

impl<V: View> SpeedView<V> {
    pub fn new(view: V, oui: OuiTable) -> Self {
        Self {
            view,
            charts: ChartRegistry::new(),
            hosts: HostDirectory::new(),
            dataset: TrafficDataset::default(),
            oui,
            seen: HashMap::new(),
        }
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn charts(&self) -> &ChartRegistry<V::Chart> {
        &self.charts
    }

    pub fn hosts(&self) -> &HostDirectory {
        &self.hosts
    }

    pub fn hosts_mut(&mut self) -> &mut HostDirectory {
        &mut self.hosts
    }

    pub fn oui(&self) -> &OuiTable {
        &self.oui
    }

    pub fn dataset(&self) -> &TrafficDataset {
        &self.dataset
    }

    pub fn set_dataset(&mut self, dataset: TrafficDataset) {
        self.dataset = dataset;
    }

    /// IPs with traffic in the last rendered responses.
    pub fn seen_ips(&self) -> impl Iterator<Item = &str> {
        self.seen.values().flatten().map(String::as_str)
    }

    /// Draws a pie under `key`, replacing whatever chart was there.
    pub fn pie(&mut self, key: &str, slices: Vec<PieSlice>) -> Vec<PieSlice> {
        let data = pie_data(slices);
        let view = &mut self.view;
        self.charts.replace(key, || view.create_pie(key, &data));
        data
    }

    pub fn kpi(&mut self, id: &str, v1: Option<&str>, v2: Option<&str>, v3: Option<&str>) {
        let text = format::kpi_phrase(v1, v2, v3);
        self.view.set_kpi(id, text.as_deref());
    }

    /// Renders one family's speed report. Returns the number of rows shown, or
    /// `None` when the response was malformed and nothing was rendered.
    pub fn render_host_speed(&mut self, response: &Value, family: IpFamily) -> Option<usize> {
        let response = match PollResponse::from_value(response) {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(%family, error = %e, "invalid data format");
                return None;
            }
        };

        let mut rows = Vec::new();
        let mut rx_data = Vec::new();
        let mut tx_data = Vec::new();
        let mut rx_total = 0.0;
        let mut tx_total = 0.0;
        let mut seen = Vec::new();

        for rec in response.data.iter().filter(|r| !r.is_idle()) {
            rows.push(vec![
                self.host_cell(&rec.ip),
                Cell::number(rec.outgoing.rate, format::bitrate(rec.outgoing.rate)),
                Cell::number(rec.outgoing.total_bytes, format::bytes(rec.outgoing.total_bytes)),
                Cell::number(rec.outgoing.total_packets, format::packets(rec.outgoing.total_packets)),
                Cell::number(rec.incoming.rate, format::bitrate(rec.incoming.rate)),
                Cell::number(rec.incoming.total_bytes, format::bytes(rec.incoming.total_bytes)),
                Cell::number(rec.incoming.total_packets, format::packets(rec.incoming.total_packets)),
            ]);

            rx_total += rec.incoming.rate;
            tx_total += rec.outgoing.rate;
            rx_data.push(PieSlice::new(rec.incoming.rate, rec.ip.clone()));
            tx_data.push(PieSlice::new(rec.outgoing.rate, rec.ip.clone()));
            seen.push(rec.ip.clone());
        }

        let prefix = family.key_prefix();
        let shown = rows.len();

        self.view
            .update_table(&format!("{prefix}speed-data"), &rows, Some(NO_DATA));
        self.pie(&format!("{prefix}speed-rx-pie"), rx_data);
        self.pie(&format!("{prefix}speed-tx-pie"), tx_data);
        let (rx_max, tx_max, hosts) = (format::bitrate(rx_total), format::bitrate(tx_total), shown.to_string());
        self.kpi(&format!("{prefix}speed-rx-max"), Some(rx_max.as_str()), None, None);
        self.kpi(&format!("{prefix}speed-tx-max"), Some(tx_max.as_str()), None, None);
        self.kpi(&format!("{prefix}speed-host"), Some(hosts.as_str()), None, None);

        self.seen.insert(family, seen);
        tracing::debug!(%family, hosts = shown, "rendered host speed");
        Some(shown)
    }

    /// Drill-down for one MAC or IP: its traffic grouped by `request.col`,
    /// download/upload pies, host name and vendor.
    pub fn render_host_detail(&mut self, request: &DetailRequest) -> HostDetail {
        let key = request.key.trim_start_matches('#');
        let col = request.col.as_str();
        let label = request.label.clone().unwrap_or_else(|| col.to_string());

        let belongs_to_key = |c: &Columns, r: &[Value]| {
            (c.get_str(r, "mac") == Some(key) || c.get_str(r, "ip") == Some(key))
                && (c.get_u64(r, "rx_bytes") > 0 || c.get_u64(r, "tx_bytes") > 0)
        };
        let by_total_desc = |a: &Record, b: &Record| b.total_bytes().cmp(&a.total_bytes());
        let filter: &RowFilter<'_> = &belongs_to_key;
        let order: &RecordOrder<'_> = &by_total_desc;

        let detail = self
            .dataset
            .query(Some(filter), &Grouping::columns([col]), Some(order));

        let mut rows = Vec::with_capacity(detail.len());
        let mut rx_data = Vec::with_capacity(detail.len());
        let mut tx_data = Vec::with_capacity(detail.len());

        for rec in &detail {
            let name = rec.display(col).unwrap_or_else(|| "other".to_string());
            let (conns, rx_bytes, rx_pkts) = (rec.get_u64("conns"), rec.get_u64("rx_bytes"), rec.get_u64("rx_pkts"));
            let (tx_bytes, tx_pkts) = (rec.get_u64("tx_bytes"), rec.get_u64("tx_pkts"));

            rows.push(vec![
                Cell::text(name.clone()),
                Cell::number(conns, format::count(conns)),
                Cell::number(rx_bytes, format::bytes(rx_bytes)),
                Cell::number(rx_pkts, format::packets(rx_pkts)),
                Cell::number(tx_bytes, format::bytes(tx_bytes)),
                Cell::number(tx_pkts, format::packets(tx_pkts)),
            ]);

            rx_data.push(PieSlice::new(rx_bytes as f64, format!("{name}: {}", format::bytes(rx_bytes))));
            tx_data.push(PieSlice::new(tx_bytes as f64, format!("{name}: {}", format::bytes(tx_bytes))));
        }

        self.view.update_table("bubble-data", &rows, None);
        let rx_pie = self.pie(DETAIL_RX_PIE, rx_data);
        let tx_pie = self.pie(DETAIL_TX_PIE, tx_data);

        let mac = key.to_uppercase();
        let (hostname, vendor) = if mac != NULL_MAC {
            let hostname = self
                .hosts
                .name_for_mac(&mac)
                .or_else(|| {
                    detail
                        .iter()
                        .filter_map(|r| r.get_str("ip"))
                        .find_map(|ip| self.hosts.name_for_ip(ip))
                })
                .map(str::to_string);
            let vendor = self.oui.lookup(&mac).map(str::to_string);
            (hostname, vendor)
        } else {
            (None, None)
        };

        self.kpi(DETAIL_HOSTNAME, hostname.as_deref(), None, None);
        self.kpi(DETAIL_VENDOR, vendor.as_deref(), None, None);

        HostDetail {
            key: key.to_string(),
            column: col.to_string(),
            label,
            rows,
            rx_pie,
            tx_pie,
            hostname,
            vendor,
        }
    }

    fn host_cell(&self, ip: &str) -> Cell {
        let text = match self.hosts.name_for_ip(ip) {
            Some(name) => format!("{} ({ip})", format::hostname(Some(name))),
            None => ip.to_string(),
        };
        Cell {
            value: Value::String(ip.to_string()),
            text,
        }
    }
}

impl<V: View> Drop for SpeedView<V> {
    fn drop(&mut self) {
        self.charts.clear();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::chart::Color;
    use crate::oui::OuiEntry;
    use serde_json::json;

    #[derive(Debug, Default)]
    pub(crate) struct RecordingView {
        pub tables: Vec<(String, Vec<TableRow>)>,
        pub pies: Vec<(String, Vec<PieSlice>)>,
        pub kpis: Vec<(String, Option<String>)>,
    }

    pub(crate) struct NullChart;

    impl Chart for NullChart {
        fn destroy(&mut self) {}
    }

    impl View for RecordingView {
        type Chart = NullChart;

        fn update_table(&mut self, table: &str, rows: &[TableRow], _placeholder: Option<&str>) {
            self.tables.push((table.to_string(), rows.to_vec()));
        }

        fn create_pie(&mut self, canvas: &str, slices: &[PieSlice]) -> NullChart {
            self.pies.push((canvas.to_string(), slices.to_vec()));
            NullChart
        }

        fn set_kpi(&mut self, id: &str, text: Option<&str>) {
            self.kpis.push((id.to_string(), text.map(str::to_string)));
        }
    }

    impl RecordingView {
        pub(crate) fn kpi(&self, id: &str) -> Option<&str> {
            self.kpis
                .iter()
                .rev()
                .find(|(k, _)| k == id)
                .and_then(|(_, v)| v.as_deref())
        }
    }

    fn controller() -> SpeedView<RecordingView> {
        let oui = OuiTable::from_entries(vec![OuiEntry::new(0xaabbcc000000, 24, "Example Corp.")]);
        let mut view = SpeedView::new(RecordingView::default(), oui);
        view.set_dataset(
            TrafficDataset::from_json(
                &json!({
                    "columns": ["mac", "ip", "layer7", "conns", "rx_bytes", "rx_pkts", "tx_bytes", "tx_pkts"],
                    "data": [
                        ["aa:bb:cc:00:00:01", "10.0.0.2", "HTTPS", 2, 4096, 4, 1024, 2],
                        ["aa:bb:cc:00:00:01", "10.0.0.2", "DNS", 1, 100, 1, 50, 1],
                        ["aa:bb:cc:00:00:01", "10.0.0.2", "HTTPS", 1, 4096, 4, 0, 0],
                        ["aa:bb:cc:00:00:01", "10.0.0.2", null, 1, 0, 0, 0, 0],
                        ["aa:bb:cc:00:00:02", "10.0.0.3", "HTTPS", 1, 10, 1, 10, 1]
                    ]
                })
                .to_string(),
            )
            .unwrap(),
        );
        view
    }

    fn response(records: Value) -> Value {
        json!({ "status": "success", "data": records })
    }

    #[test]
    fn renders_one_row_per_active_host() {
        let mut view = controller();
        let shown = view.render_host_speed(
            &response(json!([
                {"ip": "10.0.0.2",
                 "incoming": {"rate": 100, "total_bytes": 2048, "total_packets": 2},
                 "outgoing": {"rate": 0, "total_bytes": 0, "total_packets": 0}},
                {"ip": "10.0.0.3",
                 "incoming": {"rate": 100, "total_bytes": 0, "total_packets": 0},
                 "outgoing": {"rate": 0, "total_bytes": 0, "total_packets": 0}}
            ])),
            IpFamily::Ipv4,
        );
        assert_eq!(shown, Some(1));

        let (table, rows) = &view.view().tables[0];
        assert_eq!(table, "speed-data");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0].text, "10.0.0.2");
        assert_eq!(rows[0][4].text, "100 bps");
        assert_eq!(rows[0][5].text, "2.00 KB");

        assert_eq!(view.view().kpi("speed-rx-max"), Some("100 bps"));
        assert_eq!(view.view().kpi("speed-tx-max"), Some("0 bps"));
        assert_eq!(view.view().kpi("speed-host"), Some("1"));

        // upload rates are all zero
        let (_, tx_pie) = view.view().pies.iter().find(|(k, _)| k == "speed-tx-pie").unwrap();
        assert_eq!(tx_pie[0].label, "no traffic");
        assert_eq!(view.seen_ips().collect::<Vec<_>>(), ["10.0.0.2"]);
    }

    #[test]
    fn ipv6_uses_prefixed_keys() {
        let mut view = controller();
        view.render_host_speed(&response(json!([])), IpFamily::Ipv6);
        assert_eq!(view.view().tables[0].0, "ipv6-speed-data");
        assert_eq!(view.view().kpi("ipv6-speed-host"), Some("0"));
        assert!(view.charts().get("ipv6-speed-rx-pie").is_some());
    }

    #[test]
    fn malformed_response_renders_nothing() {
        let mut view = controller();
        assert_eq!(view.render_host_speed(&json!({"status": "error"}), IpFamily::Ipv4), None);
        assert_eq!(view.render_host_speed(&json!({"status": "success", "data": 3}), IpFamily::Ipv4), None);
        assert!(view.view().tables.is_empty());
        assert!(view.view().pies.is_empty());
        assert!(view.view().kpis.is_empty());
    }

    #[test]
    fn float_counters_do_not_drop_the_family() {
        let mut view = controller();
        let shown = view.render_host_speed(
            &response(json!([
                {"ip": "10.0.0.2",
                 "incoming": {"rate": 100, "total_bytes": 2048, "total_packets": 2},
                 "outgoing": {"rate": 0, "total_bytes": 0, "total_packets": 0}},
                {"ip": "10.0.0.3",
                 "incoming": {"rate": 1.5, "total_bytes": 1024.0, "total_packets": null},
                 "outgoing": {"rate": 0, "total_bytes": 0, "total_packets": 0}}
            ])),
            IpFamily::Ipv4,
        );
        assert_eq!(shown, Some(2));
        let rows = &view.view().tables[0].1;
        assert_eq!(rows[1][4].text, "1.5 bps");
        assert_eq!(rows[1][5].text, "1024 B");
    }

    #[test]
    fn falsy_group_values_are_labelled_other() {
        let mut view = controller();
        view.set_dataset(
            TrafficDataset::from_json(
                &json!({
                    "columns": ["mac", "ip", "port", "conns", "rx_bytes", "rx_pkts", "tx_bytes", "tx_pkts"],
                    "data": [
                        ["aa:bb:cc:00:00:01", "10.0.0.2", 0, 1, 500, 5, 0, 0],
                        ["aa:bb:cc:00:00:01", "10.0.0.2", 443, 1, 100, 1, 0, 0]
                    ]
                })
                .to_string(),
            )
            .unwrap(),
        );
        let detail = view.render_host_detail(&DetailRequest {
            key: "aa:bb:cc:00:00:01".to_string(),
            col: "port".to_string(),
            label: None,
        });
        let names: Vec<_> = detail.rows.iter().map(|r| r[0].text.as_str()).collect();
        assert_eq!(names, ["other", "443"]);
    }

    #[test]
    fn known_hosts_are_named_in_the_host_column() {
        let mut view = controller();
        view.hosts_mut().insert_name("10.0.0.2", "laptop.lan");
        view.render_host_speed(
            &response(json!([{"ip": "10.0.0.2",
                "incoming": {"rate": 1, "total_bytes": 1, "total_packets": 1},
                "outgoing": {"rate": 1, "total_bytes": 1, "total_packets": 1}}])),
            IpFamily::Ipv4,
        );
        let cell = &view.view().tables[0].1[0][0];
        assert_eq!(cell.text, "laptop (10.0.0.2)");
        assert_eq!(cell.value, json!("10.0.0.2"));
    }

    #[test]
    fn repeated_renders_keep_one_chart_per_key() {
        let mut view = controller();
        for _ in 0..3 {
            view.render_host_speed(&response(json!([])), IpFamily::Ipv4);
        }
        assert_eq!(view.charts().len(), 2);
    }

    #[test]
    fn host_detail_groups_by_requested_column() {
        let mut view = controller();
        view.hosts_mut().insert_name("10.0.0.2", "laptop");
        let detail = view.render_host_detail(&DetailRequest {
            key: "#aa:bb:cc:00:00:01".to_string(),
            col: "layer7".to_string(),
            label: Some("Protocol".to_string()),
        });

        assert_eq!(detail.key, "aa:bb:cc:00:00:01");
        assert_eq!(detail.label, "Protocol");
        // the idle row is filtered out, the two HTTPS rows are merged
        assert_eq!(detail.rows.len(), 2);
        assert_eq!(detail.rows[0][0].text, "HTTPS");
        assert_eq!(detail.rows[0][1].text, "3 ");
        assert_eq!(detail.rows[0][2].text, "8.00 KB");
        assert_eq!(detail.rows[1][0].text, "DNS");

        assert_eq!(detail.rx_pie[0].label, "HTTPS: 8.00 KB");
        assert_eq!(detail.rx_pie[0].hue, Some(0));
        assert_eq!(detail.rx_pie[1].color, Some(Color::Hsl { hue: 120, saturation: 80, lightness: 50 }));

        assert_eq!(detail.hostname.as_deref(), Some("laptop"));
        assert_eq!(detail.vendor.as_deref(), Some("Example Corp."));
        assert_eq!(view.view().kpi("bubble-vendor"), Some("Example Corp."));
    }

    #[test]
    fn host_detail_prefers_lease_name_for_mac() {
        let mut view = controller();
        view.hosts_mut().apply_leases("0 aa:bb:cc:00:00:01 10.0.0.2 workstation *\n");
        view.hosts_mut().insert_name("10.0.0.2", "other-name");
        let detail = view.render_host_detail(&DetailRequest {
            key: "aa:bb:cc:00:00:01".to_string(),
            col: "ip".to_string(),
            label: None,
        });
        assert_eq!(detail.hostname.as_deref(), Some("workstation"));
        assert_eq!(detail.label, "ip");
    }

    #[test]
    fn host_detail_by_ip_without_traffic_falls_back() {
        let mut view = controller();
        let detail = view.render_host_detail(&DetailRequest {
            key: "10.9.9.9".to_string(),
            col: "mac".to_string(),
            label: None,
        });
        assert!(detail.rows.is_empty());
        assert_eq!(detail.rx_pie.len(), 1);
        assert_eq!(detail.rx_pie[0].label, "no traffic");
        assert_eq!(detail.hostname, None);
        assert_eq!(detail.vendor, None);
    }

    #[test]
    fn null_mac_clears_identity_kpis() {
        let mut view = controller();
        view.hosts_mut().insert_info(
            NULL_MAC,
            crate::hosts::HostInfo { name: Some("ghost".into()), ip: None },
        );
        let detail = view.render_host_detail(&DetailRequest {
            key: NULL_MAC.to_string(),
            col: "ip".to_string(),
            label: None,
        });
        assert_eq!(detail.hostname, None);
        assert_eq!(view.view().kpi("bubble-hostname"), None);
    }
}
