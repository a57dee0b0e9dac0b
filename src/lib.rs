pub mod audit;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod history;
pub mod ir;
pub mod layout;
pub mod layout_dump;
pub mod model;
pub mod parser;
pub mod render;
pub mod sanitize;
pub mod selection;
pub mod store;
pub mod theme;

#[cfg(feature = "cli")]
pub use cli::run;
pub use config::{Config, load_config, parse_config};
pub use error::{CommandError, FormatError, TargetType};
pub use ir::{Connection, Diagram, Lane, Marker, Orientation, PhaseGroup, Point, Step, StepKind};
pub use parser::parse_document;
pub use render::render_document;
pub use selection::{Selection, SelectionTarget};
pub use store::{ConnectionPatch, Endpoints, LanePatch, PhasePatch, Store, StepPatch};
