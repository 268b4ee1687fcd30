//! Shared snapshot of everything the panel currently shows. The terminal
//! printer and the HTTP API both read from it.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::chart::{Chart, PieSlice};
use crate::view::{TableRow, View};

#[derive(Debug, Default, Clone, Serialize)]
pub struct TableSnapshot {
    pub rows: Vec<TableRow>,
    pub placeholder: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct KpiSnapshot {
    pub text: Option<String>,
    pub visible: bool,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct Snapshot {
    pub updated_at: Option<DateTime<Utc>>,
    pub tables: BTreeMap<String, TableSnapshot>,
    pub charts: BTreeMap<String, Vec<PieSlice>>,
    pub kpis: BTreeMap<String, KpiSnapshot>,
}

impl Snapshot {
    pub fn kpi_text(&self, id: &str) -> Option<&str> {
        self.kpis
            .get(id)
            .filter(|k| k.visible)
            .and_then(|k| k.text.as_deref())
    }
}

#[derive(Debug, Default, Clone)]
pub struct SharedSnapshot(Arc<RwLock<Snapshot>>);

impl SharedSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Snapshot> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Snapshot> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// [`View`] that records into a [`SharedSnapshot`].
#[derive(Debug, Clone)]
pub struct DashboardView {
    snapshot: SharedSnapshot,
}

impl DashboardView {
    pub fn new(snapshot: SharedSnapshot) -> Self {
        Self { snapshot }
    }

    pub fn snapshot(&self) -> &SharedSnapshot {
        &self.snapshot
    }
}

/// A pie published in the snapshot; destroying it withdraws it.
#[derive(Debug)]
pub struct DashboardChart {
    key: String,
    snapshot: SharedSnapshot,
}

impl Chart for DashboardChart {
    fn destroy(&mut self) {
        self.snapshot.write().charts.remove(&self.key);
    }
}

impl View for DashboardView {
    type Chart = DashboardChart;

    fn update_table(&mut self, table: &str, rows: &[TableRow], placeholder: Option<&str>) {
        let mut snapshot = self.snapshot.write();
        snapshot.tables.insert(
            table.to_string(),
            TableSnapshot {
                rows: rows.to_vec(),
                placeholder: placeholder.map(str::to_string),
            },
        );
        snapshot.updated_at = Some(Utc::now());
    }

    fn create_pie(&mut self, canvas: &str, slices: &[PieSlice]) -> DashboardChart {
        self.snapshot
            .write()
            .charts
            .insert(canvas.to_string(), slices.to_vec());
        DashboardChart {
            key: canvas.to_string(),
            snapshot: self.snapshot.clone(),
        }
    }

    fn set_kpi(&mut self, id: &str, text: Option<&str>) {
        let mut snapshot = self.snapshot.write();
        let kpi = snapshot.kpis.entry(id.to_string()).or_default();
        match text {
            Some(text) => {
                kpi.text = Some(text.to_string());
                kpi.visible = true;
            }
            None => kpi.visible = false,
        }
    }
}
