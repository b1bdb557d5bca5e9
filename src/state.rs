//! Per-receiver cycle state and request options.

use crate::decoder::CycleStateDelta;

/// Run used until the first metadata frame arrives.
pub const PLACEHOLDER_RUN: u32 = 123_456_789;

/// Mode used until the first metadata frame carrying one arrives.
pub const PLACEHOLDER_MODE: &str = "B";

/// State carried from one cycle to the next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleState {
    pub run: u32,
    pub mode: String,
    /// Ask the aggregator for schemas on the next request.
    pub schema_needed: bool,
    /// At least one metadata frame has been received.
    pub metadata_seen: bool,
}

impl CycleState {
    pub fn new(request_schema: bool) -> Self {
        Self {
            run: PLACEHOLDER_RUN,
            mode: PLACEHOLDER_MODE.to_string(),
            schema_needed: request_schema,
            metadata_seen: false,
        }
    }

    /// Fold in what a decoded message reported.
    ///
    /// A metadata frame without a mode keeps the previous mode.
    pub fn apply(&mut self, delta: CycleStateDelta) {
        if let Some(update) = delta.metadata {
            self.run = update.run;
            if let Some(mode) = update.mode {
                self.mode = mode;
            }
            self.metadata_seen = true;
        }
        if delta.schema_needed {
            self.schema_needed = true;
        }
    }
}

/// Static request flags, fixed at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Selection filter forwarded to the aggregator.
    pub select: Option<String>,
    /// Ask the aggregator to reset after answering.
    pub reset_on_request: bool,
}

impl RequestOptions {
    /// Build the option string for the next request.
    ///
    /// Consumes the schema request: once sent, `schema_needed` is cleared.
    pub fn build(&self, state: &mut CycleState) -> String {
        let mut options = String::new();
        if let Some(select) = self.select.as_deref().filter(|s| !s.is_empty()) {
            options.push_str(" -select=");
            options.push_str(select);
        }
        if self.reset_on_request {
            options.push_str(" -ResetOnRequest");
        }
        if state.schema_needed {
            options.push_str(" -SchemaOnRequest");
            state.schema_needed = false;
        }
        options
    }
}
