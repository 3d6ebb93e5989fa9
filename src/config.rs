use crate::types::DeviceRequirement;

/// What to do with a tracking capability freed by a disconnect reassignment.
///
/// When the device holding tracking unplugs and its slot is moved to a
/// replacement, the capability is lost at the hardware level. Whether it is
/// re-offered to the replacement is a policy choice, not an inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReacquirePolicy {
    /// Leave the capability free until the next explicit or opportunistic
    /// reinit claims it.
    #[default]
    Idle,
    /// Reinitialize the replacement binding right away so it may claim.
    Reinit,
}

/// Arbiter configuration.
#[derive(Debug, Clone)]
pub struct ArbiterConfig {
    /// Maximum number of viewer slots. Must be at least 1.
    pub max_slots: usize,
    /// Minimum devices the host application wants. Only selects the
    /// user-facing requirement label; no effect on arbitration.
    pub min_devices: usize,
    /// Policy for tracking freed by a disconnect reassignment.
    pub reacquire: ReacquirePolicy,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            max_slots: 2,
            min_devices: 1,
            reacquire: ReacquirePolicy::Idle,
        }
    }
}

impl ArbiterConfig {
    /// "Requires device" vs "device optional" label for the host UI.
    pub fn requirement_label(&self) -> DeviceRequirement {
        if self.min_devices > 0 {
            DeviceRequirement::Required
        } else {
            DeviceRequirement::Optional
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = ArbiterConfig::default();
        assert_eq!(cfg.max_slots, 2);
        assert_eq!(cfg.min_devices, 1);
        assert_eq!(cfg.reacquire, ReacquirePolicy::Idle);
        assert_eq!(cfg.requirement_label(), DeviceRequirement::Required);
    }

    #[test]
    fn test_optional_label() {
        let cfg = ArbiterConfig {
            min_devices: 0,
            ..Default::default()
        };
        assert_eq!(cfg.requirement_label(), DeviceRequirement::Optional);
    }
}
