//! Deliverable selection: which artifact types the operator wants per stage.

mod selection;

pub use selection::{
    missing_deliverables, DeliverableProgress, DeliverableSelection, DeliverableState,
    DeliverableStatusItem, SelectionEntry,
};
