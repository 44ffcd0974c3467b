use crate::ElementId;

/// First id handed out by the default allocator. Zero stays unused so it can
/// act as an "unassigned" marker in host code.
pub const DEFAULT_FIRST_ELEMENT_ID: ElementId = 1;

/// Idle budget used by [`Runtime::run_idle_for`](crate::Runtime::run_idle_for).
/// Roughly a quarter of a 60 Hz frame.
pub const DEFAULT_IDLE_BUDGET_MILLIS: u64 = 4;

/// Tunables for a [`Runtime`](crate::Runtime).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Seed of the default id allocator. Ignored when a custom allocator is supplied.
    pub first_element_id: ElementId,
    /// Remove registry entries of dropped subscribers during idle time.
    pub sweep_registry_on_idle: bool,
    /// Drain pending binding syncs in `begin_render_pass`.
    pub sync_on_render_pass: bool,
    pub idle_budget_millis: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            first_element_id: DEFAULT_FIRST_ELEMENT_ID,
            sweep_registry_on_idle: true,
            sync_on_render_pass: true,
            idle_budget_millis: DEFAULT_IDLE_BUDGET_MILLIS,
        }
    }
}
