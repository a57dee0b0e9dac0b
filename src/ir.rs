use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_TITLE: &str = "Untitled swimlane";
pub const CONNECTION_LABEL_MAX_CHARS: usize = 50;
pub const MARKER_SIZE_MIN: f64 = 4.0;
pub const MARKER_SIZE_MAX: f64 = 64.0;
pub const MARKER_SIZE_DEFAULT: f64 = 12.0;

pub fn new_id(prefix: &str) -> String {
    format!("{prefix}_{}", Uuid::new_v4().simple())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Vertical,
    Horizontal,
}

impl Orientation {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "TD" | "TB" => Some(Self::Vertical),
            "LR" => Some(Self::Horizontal),
            _ => None,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "vertical" => Some(Self::Vertical),
            "horizontal" => Some(Self::Horizontal),
            _ => None,
        }
    }

    pub fn token(self) -> &'static str {
        match self {
            Self::Vertical => "TD",
            Self::Horizontal => "LR",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vertical => "vertical",
            Self::Horizontal => "horizontal",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepKind {
    #[default]
    Process,
    Decision,
    Start,
    End,
    File,
    LoopStart,
    LoopEnd,
    Database,
}

impl StepKind {
    pub const ALL: [StepKind; 8] = [
        StepKind::Process,
        StepKind::Decision,
        StepKind::Start,
        StepKind::End,
        StepKind::File,
        StepKind::LoopStart,
        StepKind::LoopEnd,
        StepKind::Database,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "process" => Some(Self::Process),
            "decision" => Some(Self::Decision),
            "start" => Some(Self::Start),
            "end" => Some(Self::End),
            "file" => Some(Self::File),
            "loop-start" | "loopstart" => Some(Self::LoopStart),
            "loop-end" | "loopend" => Some(Self::LoopEnd),
            "database" => Some(Self::Database),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Process => "process",
            Self::Decision => "decision",
            Self::Start => "start",
            Self::End => "end",
            Self::File => "file",
            Self::LoopStart => "loop-start",
            Self::LoopEnd => "loop-end",
            Self::Database => "database",
        }
    }

    pub fn default_title(self) -> &'static str {
        match self {
            Self::Process => "Process",
            Self::Decision => "Decision?",
            Self::Start => "Start",
            Self::End => "End",
            Self::File => "Document",
            Self::LoopStart => "Loop",
            Self::LoopEnd => "Loop end",
            Self::Database => "Database",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Marker {
    #[default]
    None,
    Arrow,
    Dot,
}

impl Marker {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "none" => Some(Self::None),
            "arrow" => Some(Self::Arrow),
            "dot" | "circle" => Some(Self::Dot),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lane {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub order: u32,
    pub color: String,
    pub width: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub id: String,
    pub lane_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub order: u32,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub kind: StepKind,
    pub text_color: String,
    pub fill_color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control: Option<Point>,
    #[serde(default)]
    pub start_marker: Marker,
    #[serde(default = "default_end_marker")]
    pub end_marker: Marker,
    #[serde(default = "default_marker_size")]
    pub marker_size: f64,
    #[serde(default)]
    pub label: String,
}

fn default_end_marker() -> Marker {
    Marker::Arrow
}

fn default_marker_size() -> f64 {
    MARKER_SIZE_DEFAULT
}

/// Identity of a connection for the no-duplicate invariant.
pub type ConnectionKey<'a> = (&'a str, &'a str, Option<&'a str>, Option<&'a str>);

impl Connection {
    pub fn new(source_id: &str, target_id: &str) -> Self {
        Self {
            id: new_id("conn"),
            source_id: source_id.to_string(),
            target_id: target_id.to_string(),
            source_handle: None,
            target_handle: None,
            control: None,
            start_marker: Marker::None,
            end_marker: Marker::Arrow,
            marker_size: MARKER_SIZE_DEFAULT,
            label: String::new(),
        }
    }

    pub fn key(&self) -> ConnectionKey<'_> {
        (
            self.source_id.as_str(),
            self.target_id.as_str(),
            self.source_handle.as_deref(),
            self.target_handle.as_deref(),
        )
    }

    pub fn touches(&self, step_id: &str) -> bool {
        self.source_id == step_id || self.target_id == step_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseGroup {
    pub id: String,
    pub title: String,
    pub start_row: u32,
    pub end_row: u32,
}

impl PhaseGroup {
    pub fn contains(&self, row: u32) -> bool {
        self.start_row <= row && row <= self.end_row
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagram {
    pub id: String,
    pub title: String,
    pub orientation: Orientation,
    pub lanes: Vec<Lane>,
    pub steps: Vec<Step>,
    pub connections: Vec<Connection>,
    #[serde(default)]
    pub phase_groups: Vec<PhaseGroup>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Diagram {
    pub fn empty(title: &str, orientation: Orientation) -> Self {
        let now = Utc::now();
        Self {
            id: new_id("diagram"),
            title: title.to_string(),
            orientation,
            lanes: Vec::new(),
            steps: Vec::new(),
            connections: Vec::new(),
            phase_groups: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn lane(&self, id: &str) -> Option<&Lane> {
        self.lanes.iter().find(|lane| lane.id == id)
    }

    pub fn lane_mut(&mut self, id: &str) -> Option<&mut Lane> {
        self.lanes.iter_mut().find(|lane| lane.id == id)
    }

    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|step| step.id == id)
    }

    pub fn step_mut(&mut self, id: &str) -> Option<&mut Step> {
        self.steps.iter_mut().find(|step| step.id == id)
    }

    pub fn connection(&self, id: &str) -> Option<&Connection> {
        self.connections.iter().find(|conn| conn.id == id)
    }

    pub fn connection_mut(&mut self, id: &str) -> Option<&mut Connection> {
        self.connections.iter_mut().find(|conn| conn.id == id)
    }

    pub fn phase_group(&self, id: &str) -> Option<&PhaseGroup> {
        self.phase_groups.iter().find(|group| group.id == id)
    }

    pub fn phase_group_mut(&mut self, id: &str) -> Option<&mut PhaseGroup> {
        self.phase_groups.iter_mut().find(|group| group.id == id)
    }

    pub fn lanes_by_order(&self) -> Vec<&Lane> {
        let mut lanes: Vec<&Lane> = self.lanes.iter().collect();
        lanes.sort_by_key(|lane| lane.order);
        lanes
    }

    /// Steps of a lane sorted by `order`.
    pub fn steps_in_lane(&self, lane_id: &str) -> Vec<&Step> {
        let mut steps: Vec<&Step> = self
            .steps
            .iter()
            .filter(|step| step.lane_id == lane_id)
            .collect();
        steps.sort_by_key(|step| step.order);
        steps
    }

    pub fn row_is_occupied(&self, row: u32) -> bool {
        self.steps.iter().any(|step| step.order == row)
    }
}
