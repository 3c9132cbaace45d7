//! Mobile/desktop layout switching on a single viewport breakpoint.

use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    Mobile,
    Desktop,
}

impl Layout {
    pub fn for_width(width: u32, breakpoint: u32) -> Self {
        if width < breakpoint {
            Self::Mobile
        } else {
            Self::Desktop
        }
    }

    pub fn as_class(self) -> &'static str {
        match self {
            Self::Mobile => "layout-mobile",
            Self::Desktop => "layout-desktop",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Pending {
    width: u32,
    deadline_ms: u64,
}

/// Coalesces resize bursts: every event restarts the debounce window and
/// only the settled width is compared against the breakpoint.
#[derive(Debug, Clone)]
pub struct BreakpointTracker {
    breakpoint: u32,
    debounce_ms: u64,
    current: Layout,
    last_width: u32,
    pending: Option<Pending>,
}

impl BreakpointTracker {
    pub fn new(breakpoint: u32, debounce_ms: u32, initial_width: u32) -> Self {
        Self {
            breakpoint,
            debounce_ms: u64::from(debounce_ms),
            current: Layout::for_width(initial_width, breakpoint),
            last_width: initial_width,
            pending: None,
        }
    }

    pub fn current(&self) -> Layout {
        self.current
    }

    pub fn last_width(&self) -> u32 {
        self.last_width
    }

    /// Records a resize and returns the time at which it may settle.
    pub fn on_resize(&mut self, width: u32, now_ms: u64) -> u64 {
        let deadline_ms = now_ms.saturating_add(self.debounce_ms);
        self.pending = Some(Pending { width, deadline_ms });
        deadline_ms
    }

    /// Returns the new layout once the debounce window has elapsed and the
    /// settled width sits on the other side of the breakpoint.
    pub fn settle(&mut self, now_ms: u64) -> Option<Layout> {
        let pending = self.pending?;
        if now_ms < pending.deadline_ms {
            return None;
        }
        self.pending = None;
        self.last_width = pending.width;

        let next = Layout::for_width(pending.width, self.breakpoint);
        if next == self.current {
            return None;
        }
        debug!(width = pending.width, layout = ?next, "crossed layout breakpoint");
        self.current = next;
        Some(next)
    }
}
