//! Exit code logic for the downloader process.
//!
//! Maps a finished run to the process exit outcome and tracks Ctrl-C
//! presses while a run is in flight.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::ProcessExit;

/// Marks the run as interrupted.
///
/// Returns `true` when the flag was already set, i.e. this is a repeated
/// interrupt and the caller should stop waiting for in-flight attempts.
pub(crate) fn register_interrupt(flag: &AtomicBool) -> bool {
    flag.swap(true, Ordering::SeqCst)
}

/// Determines the process exit outcome once every record has an outcome.
///
/// Individual download failures do not change the exit status; they are
/// reported in the summary and the failure log instead.
pub(crate) fn determine_exit_outcome(interrupted: bool) -> ProcessExit {
    if interrupted {
        ProcessExit::Interrupted
    } else {
        ProcessExit::Success
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::{determine_exit_outcome, register_interrupt};
    use crate::ProcessExit;

    #[test]
    fn test_first_interrupt_sets_flag_second_is_repeated() {
        let flag = AtomicBool::new(false);
        assert!(!register_interrupt(&flag));
        assert!(flag.load(Ordering::SeqCst));
        assert!(register_interrupt(&flag));
        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn test_exit_outcome_success_when_run_completes() {
        assert_eq!(determine_exit_outcome(false), ProcessExit::Success);
    }

    #[test]
    fn test_exit_outcome_interrupted() {
        assert_eq!(determine_exit_outcome(true), ProcessExit::Interrupted);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(ProcessExit::Success.code(), 0);
        assert_eq!(ProcessExit::Failure.code(), 1);
        assert_eq!(ProcessExit::Interrupted.code(), 130);
    }
}
