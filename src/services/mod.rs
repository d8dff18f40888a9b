pub mod cell_events;
pub mod evaluation;
