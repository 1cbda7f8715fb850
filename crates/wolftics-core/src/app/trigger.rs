//! Trigger - フラッシュを起こす外部シグナル

use std::fmt;

/// Why a flush attempt is being made.
///
/// | trigger           | forced | prefers beacon |
/// |-------------------|--------|----------------|
/// | `Periodic`        | no     | no             |
/// | `Threshold`       | no     | no             |
/// | `PageExit`        | yes    | yes            |
/// | `NetworkRestored` | yes    | no             |
/// | `Manual`          | yes    | no             |
/// | `FollowUp`        | no     | no             |
///
/// Forced triggers ignore the backoff gate; the single-flight guard still
/// applies to all of them. `Manual` is the embedder's explicit `flush()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    Periodic,
    Threshold,
    PageExit,
    NetworkRestored,
    Manual,
    FollowUp,
}

impl Trigger {
    pub fn is_forced(self) -> bool {
        !matches!(self, Trigger::Periodic | Trigger::Threshold | Trigger::FollowUp)
    }

    pub fn prefers_best_effort(self) -> bool {
        matches!(self, Trigger::PageExit)
    }

    /// Trigger for the immediate extra attempt after a resolved batch.
    ///
    /// A page-exit drain stays a page-exit drain so it keeps using the beacon.
    /// Failed attempts never get one; they wait for the backoff gate.
    pub fn follow_up(self) -> Trigger {
        match self {
            Trigger::PageExit => Trigger::PageExit,
            _ => Trigger::FollowUp,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Trigger::Periodic => "periodic",
            Trigger::Threshold => "threshold",
            Trigger::PageExit => "page_exit",
            Trigger::NetworkRestored => "network_restored",
            Trigger::Manual => "manual",
            Trigger::FollowUp => "follow_up",
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Trigger::Periodic, false, false)]
    #[case(Trigger::Threshold, false, false)]
    #[case(Trigger::PageExit, true, true)]
    #[case(Trigger::NetworkRestored, true, false)]
    #[case(Trigger::Manual, true, false)]
    #[case(Trigger::FollowUp, false, false)]
    fn trigger_flags(#[case] trigger: Trigger, #[case] forced: bool, #[case] beacon: bool) {
        assert_eq!(trigger.is_forced(), forced);
        assert_eq!(trigger.prefers_best_effort(), beacon);
    }

    #[test]
    fn page_exit_follow_ups_stay_page_exit() {
        assert_eq!(Trigger::PageExit.follow_up(), Trigger::PageExit);
        assert_eq!(Trigger::Threshold.follow_up(), Trigger::FollowUp);
    }
}
