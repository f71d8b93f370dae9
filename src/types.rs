use std::fmt;
use std::str::FromStr;

/// How many processes may run at the same time.
///
/// - `Auto`: half the available CPUs (at least one).
/// - `Fixed(n)`: exactly `n` workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobCount {
    Auto,
    Fixed(usize),
}

impl JobCount {
    /// Number of workers this setting resolves to on the current machine.
    pub fn resolve(self) -> usize {
        match self {
            JobCount::Fixed(n) => n.max(1),
            JobCount::Auto => std::thread::available_parallelism()
                .map(|n| n.get() / 2)
                .unwrap_or(1)
                .max(1),
        }
    }
}

impl Default for JobCount {
    fn default() -> Self {
        JobCount::Fixed(1)
    }
}

impl FromStr for JobCount {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        if s == "auto" {
            return Ok(JobCount::Auto);
        }
        match s.parse::<usize>() {
            Ok(0) => Err("jobs must be >= 1 (got 0)".to_string()),
            Ok(n) => Ok(JobCount::Fixed(n)),
            Err(_) => Err(format!(
                "invalid jobs value: {s} (expected a positive number or \"auto\")"
            )),
        }
    }
}

impl fmt::Display for JobCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobCount::Auto => write!(f, "auto"),
            JobCount::Fixed(n) => write!(f, "{n}"),
        }
    }
}

/// What the scheduler does once a process fails.
///
/// - `FailFast`: stop starting new processes, let the running ones finish.
/// - `KeepGoing`: keep starting every process whose inputs are available and
///   report all failures together at the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    #[default]
    FailFast,
    KeepGoing,
}

impl FailurePolicy {
    pub fn from_keep_going(keep_going: bool) -> Self {
        if keep_going {
            FailurePolicy::KeepGoing
        } else {
            FailurePolicy::FailFast
        }
    }
}
