mod flow_data;
mod marker;
mod output_trim;
mod switcher;

pub use flow_data::FlowData;
pub use marker::{Evaluation, Marker, Status};
pub use output_trim::trim_tail;
pub use switcher::{resolve_actions, SwitchKind, Switcher};
