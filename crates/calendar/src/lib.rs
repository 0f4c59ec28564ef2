//! Calendar windowing and event projection over scheduled automation work.

pub mod projector;
pub mod window;

pub use projector::{
    merge_events, project_events, project_followups, CalendarEvent, CalendarEventKind,
};
pub use window::{navigate, window_for, Direction, Granularity, TimeWindow};
