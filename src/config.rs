use crate::ir::StepKind;
use crate::theme::Theme;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepSize {
    pub width: f64,
    pub height: f64,
}

impl StepSize {
    const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSizes {
    pub process: StepSize,
    pub decision: StepSize,
    pub start: StepSize,
    pub end: StepSize,
    pub file: StepSize,
    pub loop_start: StepSize,
    pub loop_end: StepSize,
    pub database: StepSize,
}

impl StepSizes {
    pub fn get(&self, kind: StepKind) -> StepSize {
        match kind {
            StepKind::Process => self.process,
            StepKind::Decision => self.decision,
            StepKind::Start => self.start,
            StepKind::End => self.end,
            StepKind::File => self.file,
            StepKind::LoopStart => self.loop_start,
            StepKind::LoopEnd => self.loop_end,
            StepKind::Database => self.database,
        }
    }

    fn get_mut(&mut self, kind: StepKind) -> &mut StepSize {
        match kind {
            StepKind::Process => &mut self.process,
            StepKind::Decision => &mut self.decision,
            StepKind::Start => &mut self.start,
            StepKind::End => &mut self.end,
            StepKind::File => &mut self.file,
            StepKind::LoopStart => &mut self.loop_start,
            StepKind::LoopEnd => &mut self.loop_end,
            StepKind::Database => &mut self.database,
        }
    }
}

impl Default for StepSizes {
    fn default() -> Self {
        Self {
            process: StepSize::new(160.0, 60.0),
            decision: StepSize::new(120.0, 120.0),
            start: StepSize::new(140.0, 50.0),
            end: StepSize::new(140.0, 50.0),
            file: StepSize::new(150.0, 60.0),
            loop_start: StepSize::new(150.0, 56.0),
            loop_end: StepSize::new(150.0, 56.0),
            database: StepSize::new(120.0, 80.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Cross-axis offset of the first lane.
    pub lane_origin: f64,
    /// Fixed padding between consecutive lanes on the cross axis.
    pub lane_gap: f64,
    pub lane_thickness: f64,
    /// Space reserved for the lane title before the first row.
    pub lane_header: f64,
    pub lane_padding: f64,
    /// Cell stride along y for vertical diagrams.
    pub row_stride: f64,
    /// Cell stride along x for horizontal diagrams.
    pub column_stride: f64,
    pub min_lane_length: f64,
    pub step_sizes: StepSizes,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            lane_origin: 0.0,
            lane_gap: 16.0,
            lane_thickness: 240.0,
            lane_header: 48.0,
            lane_padding: 16.0,
            row_stride: 140.0,
            column_stride: 200.0,
            min_lane_length: 600.0,
            step_sizes: StepSizes::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryConfig {
    pub capacity: usize,
    /// `None` keeps every audit entry.
    pub audit_capacity: Option<usize>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: 50,
            audit_capacity: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub theme: Theme,
    pub layout: LayoutConfig,
    pub history: HistoryConfig,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ThemeVariables {
    lane_palette: Option<Vec<String>>,
    process_fill: Option<String>,
    process_text: Option<String>,
    decision_fill: Option<String>,
    decision_text: Option<String>,
    start_fill: Option<String>,
    start_text: Option<String>,
    end_fill: Option<String>,
    end_text: Option<String>,
    file_fill: Option<String>,
    file_text: Option<String>,
    loop_fill: Option<String>,
    loop_text: Option<String>,
    database_fill: Option<String>,
    database_text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SizeOverride {
    width: Option<f64>,
    height: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct LayoutConfigFile {
    lane_origin: Option<f64>,
    lane_gap: Option<f64>,
    lane_thickness: Option<f64>,
    lane_header: Option<f64>,
    lane_padding: Option<f64>,
    row_stride: Option<f64>,
    column_stride: Option<f64>,
    min_lane_length: Option<f64>,
    step_sizes: Option<std::collections::BTreeMap<String, SizeOverride>>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct HistoryConfigFile {
    capacity: Option<usize>,
    audit_capacity: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    theme: Option<String>,
    theme_variables: Option<ThemeVariables>,
    layout: Option<LayoutConfigFile>,
    history: Option<HistoryConfigFile>,
}

fn positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v > 0.0)
}

fn non_negative(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v >= 0.0)
}

pub fn parse_config(contents: &str) -> anyhow::Result<Config> {
    let parsed: ConfigFile = match serde_json::from_str(contents) {
        Ok(parsed) => parsed,
        Err(json_err) => json5::from_str(contents)
            .map_err(|_| anyhow::anyhow!("invalid config file: {json_err}"))?,
    };

    let mut config = Config::default();

    if let Some(theme_name) = parsed.theme.as_deref() {
        match theme_name {
            "contrast" | "high-contrast" => config.theme = Theme::contrast(),
            "standard" | "default" => config.theme = Theme::standard(),
            other => log::warn!(theme = other; "unknown theme name, keeping default"),
        }
    }

    if let Some(vars) = parsed.theme_variables {
        if let Some(v) = vars.lane_palette.filter(|p| !p.is_empty()) {
            config.theme.lane_palette = v;
        }
        if let Some(v) = vars.process_fill {
            config.theme.process.fill = v;
        }
        if let Some(v) = vars.process_text {
            config.theme.process.text = v;
        }
        if let Some(v) = vars.decision_fill {
            config.theme.decision.fill = v;
        }
        if let Some(v) = vars.decision_text {
            config.theme.decision.text = v;
        }
        if let Some(v) = vars.start_fill {
            config.theme.start.fill = v;
        }
        if let Some(v) = vars.start_text {
            config.theme.start.text = v;
        }
        if let Some(v) = vars.end_fill {
            config.theme.end.fill = v;
        }
        if let Some(v) = vars.end_text {
            config.theme.end.text = v;
        }
        if let Some(v) = vars.file_fill {
            config.theme.file.fill = v;
        }
        if let Some(v) = vars.file_text {
            config.theme.file.text = v;
        }
        if let Some(v) = vars.loop_fill {
            config.theme.loop_start.fill = v.clone();
            config.theme.loop_end.fill = v;
        }
        if let Some(v) = vars.loop_text {
            config.theme.loop_start.text = v.clone();
            config.theme.loop_end.text = v;
        }
        if let Some(v) = vars.database_fill {
            config.theme.database.fill = v;
        }
        if let Some(v) = vars.database_text {
            config.theme.database.text = v;
        }
    }

    if let Some(layout) = parsed.layout {
        if let Some(v) = non_negative(layout.lane_origin) {
            config.layout.lane_origin = v;
        }
        if let Some(v) = non_negative(layout.lane_gap) {
            config.layout.lane_gap = v;
        }
        if let Some(v) = positive(layout.lane_thickness) {
            config.layout.lane_thickness = v;
        }
        if let Some(v) = non_negative(layout.lane_header) {
            config.layout.lane_header = v;
        }
        if let Some(v) = non_negative(layout.lane_padding) {
            config.layout.lane_padding = v;
        }
        if let Some(v) = positive(layout.row_stride) {
            config.layout.row_stride = v;
        }
        if let Some(v) = positive(layout.column_stride) {
            config.layout.column_stride = v;
        }
        if let Some(v) = positive(layout.min_lane_length) {
            config.layout.min_lane_length = v;
        }
        for (name, size) in layout.step_sizes.unwrap_or_default() {
            let Some(kind) = StepKind::from_name(&name) else {
                log::warn!(kind = name.as_str(); "ignoring size override for unknown step kind");
                continue;
            };
            let entry = config.layout.step_sizes.get_mut(kind);
            if let Some(v) = positive(size.width) {
                entry.width = v;
            }
            if let Some(v) = positive(size.height) {
                entry.height = v;
            }
        }
    }

    if let Some(history) = parsed.history {
        if let Some(v) = history.capacity {
            config.history.capacity = v;
        }
        if let Some(v) = history.audit_capacity {
            config.history.audit_capacity = Some(v);
        }
    }

    Ok(config)
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let contents = std::fs::read_to_string(path)?;
    parse_config(&contents)
}
