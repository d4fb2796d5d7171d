use anyhow::bail;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Starting,
    Detecting,
    Forwarding,
    Proceeding,
    Daemonizing,
    Running,
    ShuttingDown,
    Terminated,
}

impl Phase {
    fn can_advance_to(self, next: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, next),
            (Starting, Detecting)
                | (Starting, Terminated)
                | (Detecting, Forwarding)
                | (Detecting, Proceeding)
                | (Detecting, Terminated)
                | (Forwarding, Terminated)
                | (Proceeding, Daemonizing)
                | (Proceeding, Running)
                | (Proceeding, Terminated)
                | (Daemonizing, Running)
                | (Daemonizing, Terminated)
                | (Running, ShuttingDown)
                | (Running, Terminated)
                | (ShuttingDown, Terminated)
        )
    }
}

/// Startup/shutdown phase tracker; refuses transitions the supervisor
/// should never make.
#[derive(Debug)]
pub struct Lifecycle {
    phase: Phase,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            phase: Phase::Starting,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn advance(&mut self, next: Phase) -> anyhow::Result<()> {
        if !self.phase.can_advance_to(next) {
            bail!("illegal lifecycle transition {:?} -> {:?}", self.phase, next);
        }
        log::debug!("lifecycle: {:?} -> {:?}", self.phase, next);
        self.phase = next;
        Ok(())
    }

    /// Jump to `Terminated` from wherever we are (error exits).
    pub fn terminate(&mut self) {
        if self.phase != Phase::Terminated {
            log::debug!("lifecycle: {:?} -> Terminated", self.phase);
            self.phase = Phase::Terminated;
        }
    }
}
