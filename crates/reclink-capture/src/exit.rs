//! Process outcome → recording outcome.

use std::process::ExitStatus;

/// Exit code of a process that handled SIGINT and exited on its own.
pub const SIGINT_EXIT_CODE: i32 = 130;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitClass {
    Completed,
    /// Human-readable cause, e.g. `exit code 1`.
    Failed(String),
}

pub fn classify(status: ExitStatus) -> ExitClass {
    if let Some(code) = status.code() {
        return match code {
            0 | SIGINT_EXIT_CODE => ExitClass::Completed,
            code => ExitClass::Failed(format!("exit code {code}")),
        };
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return if signal == libc::SIGINT {
                ExitClass::Completed
            } else {
                ExitClass::Failed(format!("terminated by signal {signal}"))
            };
        }
    }

    ExitClass::Failed("unknown exit status".to_string())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;

    // Raw wait(2) status: exit code in the high byte, signal in the low bits.
    fn exited(code: i32) -> ExitStatus {
        ExitStatus::from_raw(code << 8)
    }

    fn signalled(signal: i32) -> ExitStatus {
        ExitStatus::from_raw(signal)
    }

    #[test]
    fn clean_and_interrupted_exits_complete() {
        assert_eq!(classify(exited(0)), ExitClass::Completed);
        assert_eq!(classify(exited(130)), ExitClass::Completed);
        assert_eq!(classify(signalled(libc::SIGINT)), ExitClass::Completed);
    }

    #[test]
    fn other_exits_fail() {
        assert_eq!(
            classify(exited(1)),
            ExitClass::Failed("exit code 1".to_string())
        );
        assert_eq!(
            classify(signalled(libc::SIGKILL)),
            ExitClass::Failed(format!("terminated by signal {}", libc::SIGKILL))
        );
    }
}
