//! Refresh cadence, counted in supervisor cycles.

/// Decides on which cycles the credential refresh runs.
///
/// The first cycle always refreshes. After that a refresh is due once
/// `every` cycles have passed since the previous one; `every == 0` means
/// never again.
#[derive(Debug, Clone)]
pub struct RefreshSchedule {
    every: u32,
    cycles_since_refresh: Option<u32>,
}

impl RefreshSchedule {
    pub fn new(every: u32) -> Self {
        Self {
            every,
            cycles_since_refresh: None,
        }
    }

    /// Refresh only once, on the first cycle.
    pub fn once() -> Self {
        Self::new(0)
    }

    /// Advance by one cycle; returns whether a refresh is due on it.
    pub fn tick(&mut self) -> bool {
        let Some(since) = self.cycles_since_refresh else {
            self.cycles_since_refresh = Some(0);
            return true;
        };

        let since = since.saturating_add(1);
        if self.every > 0 && since >= self.every {
            self.cycles_since_refresh = Some(0);
            true
        } else {
            self.cycles_since_refresh = Some(since);
            false
        }
    }
}
