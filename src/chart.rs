//! Pie chart data and the registry of live chart instances.

use std::collections::HashMap;
use std::fmt;

use serde::{Serialize, Serializer};

const NO_TRAFFIC_COLOR: &str = "#cccccc";
const MAX_HUE: f64 = 120.0;

#[derive(Debug, Clone, PartialEq)]
pub enum Color {
    Hex(String),
    Hsl { hue: u32, saturation: u8, lightness: u8 },
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::Hex(hex) => f.write_str(hex),
            Color::Hsl {
                hue,
                saturation,
                lightness,
            } => write!(f, "hsl({hue}, {saturation}%, {lightness}%)"),
        }
    }
}

impl Serialize for Color {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PieSlice {
    pub value: f64,
    pub label: String,
    pub color: Option<Color>,
    /// Hue assigned when no explicit colour was given.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hue: Option<u32>,
}

impl PieSlice {
    pub fn new(value: f64, label: impl Into<String>) -> Self {
        Self {
            value,
            label: label.into(),
            color: None,
            hue: None,
        }
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color = Some(color);
        self
    }
}

/// Prepares slices for drawing: largest first, colours spread over the hue
/// range `[0, 120]`, and a single gray slice when there is no traffic at all.
pub fn pie_data(mut slices: Vec<PieSlice>) -> Vec<PieSlice> {
    let total: f64 = slices.iter().map(|s| s.value).sum();

    slices.sort_by(|a, b| b.value.total_cmp(&a.value));

    if total == 0.0 {
        slices = vec![PieSlice::new(1.0, "no traffic").with_color(Color::Hex(NO_TRAFFIC_COLOR.to_string()))];
    }

    let steps = slices.len().saturating_sub(1);
    for (i, slice) in slices.iter_mut().enumerate() {
        if slice.color.is_none() {
            let hue = if steps == 0 {
                0
            } else {
                (MAX_HUE / steps as f64 * i as f64) as u32
            };
            slice.color = Some(Color::Hsl {
                hue,
                saturation: 80,
                lightness: 50,
            });
            slice.hue = Some(hue);
        }
    }

    slices
}

/// A drawn chart that holds resources until destroyed.
pub trait Chart {
    fn destroy(&mut self);
}

/// At most one live chart per element key.
pub struct ChartRegistry<C: Chart> {
    charts: HashMap<String, C>,
}

impl<C: Chart> Default for ChartRegistry<C> {
    fn default() -> Self {
        Self {
            charts: HashMap::new(),
        }
    }
}

impl<C: Chart> ChartRegistry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Destroys the chart registered under `key`, then creates and registers
    /// its replacement.
    pub fn replace(&mut self, key: &str, create: impl FnOnce() -> C) -> &mut C {
        if let Some(mut old) = self.charts.remove(key) {
            old.destroy();
            tracing::trace!(key, "destroyed previous chart");
        }
        self.charts.entry(key.to_string()).or_insert_with(create)
    }

    pub fn get(&self, key: &str) -> Option<&C> {
        self.charts.get(key)
    }

    pub fn len(&self) -> usize {
        self.charts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.charts.is_empty()
    }

    pub fn clear(&mut self) {
        for (_, mut chart) in self.charts.drain() {
            chart.destroy();
        }
    }
}
