use std::time::Duration;

/// Either a concrete bound or "no limit".
///
/// Mirrors the `int | unbounded` / `duration | unbounded` shape used
/// throughout a `Worker`'s configuration: every cap a loop might hit is one
/// of these, checked the same way regardless of whether it is a count or a
/// duration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bound<T> {
    Unbounded,
    Limit(T),
}

impl<T> Bound<T> {
    pub fn limit(value: T) -> Self {
        Bound::Limit(value)
    }

    pub fn is_unbounded(&self) -> bool {
        matches!(self, Bound::Unbounded)
    }
}

impl Bound<u64> {
    /// `current < limit`, always true when unbounded.
    pub fn allows(&self, current: u64) -> bool {
        match self {
            Bound::Unbounded => true,
            Bound::Limit(limit) => current < *limit,
        }
    }
}

impl Bound<Duration> {
    /// `elapsed < limit`, always true when unbounded.
    pub fn allows(&self, elapsed: Duration) -> bool {
        match self {
            Bound::Unbounded => true,
            Bound::Limit(limit) => elapsed < *limit,
        }
    }
}

/// Per-section timeout configuration. Each section may have its own bound,
/// or none at all.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timeouts {
    pub pre_run: Bound<Duration>,
    pub run: Bound<Duration>,
    pub post_run: Bound<Duration>,
    pub on_finish: Bound<Duration>,
    pub result: Bound<Duration>,
    pub error: Bound<Duration>,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            pre_run: Bound::Unbounded,
            run: Bound::Unbounded,
            post_run: Bound::Unbounded,
            on_finish: Bound::Unbounded,
            result: Bound::Unbounded,
            error: Bound::Unbounded,
        }
    }
}

/// Configuration for one `Worker` run.
///
/// Invariants: `lives >= 1`; no duration field is negative (enforced by
/// `Duration`'s own type); `runs` is either positive or unbounded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    pub runs: Bound<u64>,
    pub join_in: Bound<Duration>,
    pub lives: u32,
    pub timeouts: Timeouts,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            runs: Bound::Unbounded,
            join_in: Bound::Unbounded,
            lives: 1,
            timeouts: Timeouts::default(),
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for [`Config`], following the same explicit-fields style as the
/// rest of this crate's public API - no hidden defaults beyond
/// [`Config::default`]'s.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: ConfigOverrides,
}

#[derive(Debug, Default)]
struct ConfigOverrides {
    runs: Option<Bound<u64>>,
    join_in: Option<Bound<Duration>>,
    lives: Option<u32>,
    timeouts: Option<Timeouts>,
}

impl ConfigBuilder {
    pub fn runs(mut self, runs: Bound<u64>) -> Self {
        self.config.runs = Some(runs);
        self
    }

    pub fn join_in(mut self, join_in: Bound<Duration>) -> Self {
        self.config.join_in = Some(join_in);
        self
    }

    /// Panics if `lives` is zero; `lives >= 1` is a hard invariant of a
    /// runnable `Config`.
    pub fn lives(mut self, lives: u32) -> Self {
        assert!(lives >= 1, "lives must be >= 1");
        self.config.lives = Some(lives);
        self
    }

    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.config.timeouts = Some(timeouts);
        self
    }

    pub fn build(self) -> Config {
        let defaults = Config::default();
        Config {
            runs: self.config.runs.unwrap_or(defaults.runs),
            join_in: self.config.join_in.unwrap_or(defaults.join_in),
            lives: self.config.lives.unwrap_or(defaults.lives),
            timeouts: self.config.timeouts.unwrap_or(defaults.timeouts),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_unbounded_and_single_life() {
        let config = Config::default();
        assert_eq!(config.lives, 1);
        assert!(config.runs.is_unbounded());
        assert!(config.join_in.is_unbounded());
    }

    #[test]
    fn builder_overrides_only_what_is_set() {
        let config = Config::builder().runs(Bound::limit(10)).lives(3).build();
        assert_eq!(config.runs, Bound::Limit(10));
        assert_eq!(config.lives, 3);
        assert!(config.join_in.is_unbounded());
    }

    #[test]
    #[should_panic(expected = "lives must be >= 1")]
    fn builder_rejects_zero_lives() {
        Config::builder().lives(0).build();
    }

    #[test]
    fn bound_allows_respects_limit() {
        assert!(Bound::Unbounded.allows(1_000_000u64));
        assert!(Bound::Limit(5u64).allows(4));
        assert!(!Bound::Limit(5u64).allows(5));
    }
}
