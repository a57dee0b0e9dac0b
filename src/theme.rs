use crate::ir::StepKind;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KindColors {
    pub fill: String,
    pub text: String,
}

impl KindColors {
    fn new(fill: &str, text: &str) -> Self {
        Self {
            fill: fill.to_string(),
            text: text.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Theme {
    pub lane_palette: Vec<String>,
    pub process: KindColors,
    pub decision: KindColors,
    pub start: KindColors,
    pub end: KindColors,
    pub file: KindColors,
    pub loop_start: KindColors,
    pub loop_end: KindColors,
    pub database: KindColors,
}

impl Theme {
    pub fn standard() -> Self {
        Self {
            lane_palette: [
                "#E3F2FD", "#E8F5E9", "#FFF3E0", "#F3E5F5", "#E0F7FA", "#FBE9E7",
            ]
            .iter()
            .map(|value| value.to_string())
            .collect(),
            process: KindColors::new("#FFFFFF", "#1F2937"),
            decision: KindColors::new("#FEF3C7", "#78350F"),
            start: KindColors::new("#DCFCE7", "#14532D"),
            end: KindColors::new("#FEE2E2", "#7F1D1D"),
            file: KindColors::new("#E0E7FF", "#312E81"),
            loop_start: KindColors::new("#F3E8FF", "#581C87"),
            loop_end: KindColors::new("#F3E8FF", "#581C87"),
            database: KindColors::new("#CFFAFE", "#164E63"),
        }
    }

    pub fn contrast() -> Self {
        Self {
            lane_palette: ["#FFFFFF", "#D9D9D9"]
                .iter()
                .map(|value| value.to_string())
                .collect(),
            process: KindColors::new("#FFFFFF", "#000000"),
            decision: KindColors::new("#FFE066", "#000000"),
            start: KindColors::new("#000000", "#FFFFFF"),
            end: KindColors::new("#000000", "#FFFFFF"),
            file: KindColors::new("#FFFFFF", "#000000"),
            loop_start: KindColors::new("#BFBFBF", "#000000"),
            loop_end: KindColors::new("#BFBFBF", "#000000"),
            database: KindColors::new("#FFFFFF", "#000000"),
        }
    }

    /// Deterministic lane color for a lane position; cycles through the palette.
    pub fn lane_color(&self, position: usize) -> String {
        if self.lane_palette.is_empty() {
            return "#FFFFFF".to_string();
        }
        self.lane_palette[position % self.lane_palette.len()].clone()
    }

    pub fn kind_colors(&self, kind: StepKind) -> &KindColors {
        match kind {
            StepKind::Process => &self.process,
            StepKind::Decision => &self.decision,
            StepKind::Start => &self.start,
            StepKind::End => &self.end,
            StepKind::File => &self.file,
            StepKind::LoopStart => &self.loop_start,
            StepKind::LoopEnd => &self.loop_end,
            StepKind::Database => &self.database,
        }
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self::standard()
    }
}
