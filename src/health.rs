//! Component bring-up with retries, and what a failure means for the robot.

use heapless::Vec;

use crate::config::{INIT_RETRY_DELAY_MS, MAX_INIT_RETRIES};

pub const MAX_COMPONENTS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ComponentPriority {
    /// Startup cannot continue without it
    Critical,
    /// Runs with reduced functionality
    Important,
    Optional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FailureAction {
    /// Component came up
    None,
    /// Stop before leaving Init
    Halt,
    Degrade,
    Ignore,
}

impl FailureAction {
    pub fn for_priority(priority: ComponentPriority) -> Self {
        match priority {
            ComponentPriority::Critical => FailureAction::Halt,
            ComponentPriority::Important => FailureAction::Degrade,
            ComponentPriority::Optional => FailureAction::Ignore,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u8,
    pub delay_ms: u64,
}

/// Result of a retried initialisation and how many retries it took.
#[derive(Debug)]
pub struct InitOutcome<T, E> {
    pub result: Result<T, E>,
    pub retries: u8,
}

impl RetryPolicy {
    pub const fn new() -> Self {
        Self {
            attempts: MAX_INIT_RETRIES,
            delay_ms: INIT_RETRY_DELAY_MS,
        }
    }

    /// Call `init` until it succeeds or the attempts run out, with `pause`
    /// between attempts (never after the last one).
    pub fn run<T, E>(
        &self,
        name: &str,
        mut init: impl FnMut() -> Result<T, E>,
        mut pause: impl FnMut(u64),
    ) -> InitOutcome<T, E> {
        let attempts = self.attempts.max(1);
        let mut attempt = 0;
        loop {
            match init() {
                Ok(v) => {
                    return InitOutcome {
                        result: Ok(v),
                        retries: attempt,
                    }
                }
                Err(e) => {
                    warn!("{} init failed (attempt {}/{})", name, attempt + 1, attempts);
                    attempt += 1;
                    if attempt >= attempts {
                        return InitOutcome {
                            result: Err(e),
                            retries: attempt,
                        };
                    }
                    pause(self.delay_ms);
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ComponentRecord {
    pub name: &'static str,
    pub priority: ComponentPriority,
    pub initialized: bool,
    pub retries: u8,
}

/// Bring-up results of every component, in registration order.
pub struct HealthRegistry {
    components: Vec<ComponentRecord, MAX_COMPONENTS>,
    /// A critical failure that did not fit in `components`
    untracked_halt: bool,
}

impl HealthRegistry {
    pub const fn new() -> Self {
        Self {
            components: Vec::new(),
            untracked_halt: false,
        }
    }

    /// Store an outcome and decide what it means. A name recorded twice
    /// keeps the latest outcome.
    pub fn record(
        &mut self,
        name: &'static str,
        priority: ComponentPriority,
        initialized: bool,
        retries: u8,
    ) -> FailureAction {
        let entry = ComponentRecord {
            name,
            priority,
            initialized,
            retries,
        };
        match self.components.iter_mut().find(|c| c.name == name) {
            Some(existing) => *existing = entry,
            None => {
                if self.components.push(entry).is_err() {
                    warn!("health registry full, {} not tracked", name);
                    if !initialized && priority == ComponentPriority::Critical {
                        self.untracked_halt = true;
                    }
                }
            }
        }

        if initialized {
            info!("{} up (retries: {})", name, retries);
            return FailureAction::None;
        }

        let action = FailureAction::for_priority(priority);
        match action {
            FailureAction::Halt => {
                error!("critical component {} failed, halting", name)
            }
            FailureAction::Degrade => {
                warn!("{} failed, continuing with limited functionality", name)
            }
            _ => info!("optional {} failed, continuing", name),
        }
        action
    }

    /// Convenience over [`HealthRegistry::record`] for a retried init.
    pub fn record_outcome<T, E>(
        &mut self,
        name: &'static str,
        priority: ComponentPriority,
        outcome: &InitOutcome<T, E>,
    ) -> FailureAction {
        self.record(name, priority, outcome.result.is_ok(), outcome.retries)
    }

    pub fn is_operational(&self, name: &str) -> bool {
        self.components
            .iter()
            .any(|c| c.name == name && c.initialized)
    }

    /// A critical component failed.
    pub fn halted(&self) -> bool {
        self.untracked_halt
            || self
                .components
                .iter()
                .any(|c| !c.initialized && c.priority == ComponentPriority::Critical)
    }

    /// A non-critical component failed.
    pub fn degraded(&self) -> bool {
        self.components
            .iter()
            .any(|c| !c.initialized && c.priority != ComponentPriority::Critical)
    }

    pub fn components(&self) -> &[ComponentRecord] {
        &self.components
    }

    pub fn log_report(&self) {
        info!("=== system health ===");
        info!("halted: {}, components: {}", self.halted(), self.components.len());
        for c in self.components.iter() {
            info!(
                "  {}: {} (retries: {}, priority: {})",
                c.name,
                if c.initialized { "OK" } else { "FAILED" },
                c.retries,
                c.priority
            );
        }
    }
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}
