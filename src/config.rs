//! Types for global one-time configuration of the runtime parameters used by
//! the thread local caches and the default domain.

use core::time::Duration;

// defines `RETIRE_THRESHOLD`, which can be set through the
// `HAZPTR_RETIRE_THRESHOLD` environment variable at build time
include!(concat!(env!("OUT_DIR"), "/build_constants.rs"));

const DEFAULT_MAX_FILLS: u16 = 10;
const DEFAULT_FILL_PERIOD: Duration = Duration::from_millis(1);
const DEFAULT_RECLAIM_THRESHOLD: u32 = 1000;

////////////////////////////////////////////////////////////////////////////////////////////////////
// Config
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Runtime configuration parameters.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Config {
    retire_threshold: u32,
    max_fills: u16,
    fill_period: Duration,
    reclaim_threshold: u32,
}

/********** impl Default **************************************************************************/

impl Default for Config {
    #[inline]
    fn default() -> Self {
        ConfigBuilder::new().build()
    }
}

/********** impl inherent *************************************************************************/

impl Config {
    /// Creates a new [`Config`] with the given parameters
    ///
    /// # Panics
    ///
    /// This function panics, if `retire_threshold` or `max_fills` is 0.
    #[inline]
    pub fn with_params(
        retire_threshold: u32,
        max_fills: u16,
        fill_period: Duration,
        reclaim_threshold: u32,
    ) -> Self {
        assert!(retire_threshold > 0, "retire threshold must be greater than 0");
        assert!(max_fills > 0, "max fills must be greater than 0");
        Self { retire_threshold, max_fills, fill_period, reclaim_threshold }
    }

    /// Returns the number of records a thread retires privately before they
    /// are pushed to the domain in one batch.
    #[inline]
    pub fn retire_threshold(&self) -> u32 {
        self.retire_threshold
    }

    /// Returns the number of bulk refills of a thread's record cache that are
    /// tolerated within one [`fill_period`][Config::fill_period].
    #[inline]
    pub fn max_fills(&self) -> u16 {
        self.max_fills
    }

    /// Returns the observation window for counting bulk refills.
    #[inline]
    pub fn fill_period(&self) -> Duration {
        self.fill_period
    }

    /// Returns the minimum number of retired records the default domain
    /// accumulates before it attempts to reclaim any of them.
    ///
    /// The effective threshold grows with the number of hazard records, it is
    /// at least twice that number.
    #[inline]
    pub fn reclaim_threshold(&self) -> u32 {
        self.reclaim_threshold
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// ConfigBuilder
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A builder type for gradually initializing a [`Config`].
#[derive(Copy, Clone, Debug, Default)]
pub struct ConfigBuilder {
    retire_threshold: Option<u32>,
    max_fills: Option<u16>,
    fill_period: Option<Duration>,
    reclaim_threshold: Option<u32>,
}

impl ConfigBuilder {
    /// Creates a new [`ConfigBuilder`] with default values.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the private retire threshold.
    #[inline]
    pub fn retire_threshold(mut self, retire_threshold: u32) -> Self {
        self.retire_threshold = Some(retire_threshold);
        self
    }

    /// Sets the number of tolerated bulk refills per fill period.
    #[inline]
    pub fn max_fills(mut self, max_fills: u16) -> Self {
        self.max_fills = Some(max_fills);
        self
    }

    /// Sets the fill period.
    #[inline]
    pub fn fill_period(mut self, fill_period: Duration) -> Self {
        self.fill_period = Some(fill_period);
        self
    }

    /// Sets the reclaim threshold of the default domain.
    #[inline]
    pub fn reclaim_threshold(mut self, reclaim_threshold: u32) -> Self {
        self.reclaim_threshold = Some(reclaim_threshold);
        self
    }

    /// Consumes the [`ConfigBuilder`] and returns a initialized [`Config`].
    ///
    /// Unspecified parameters are initialized with their default values.
    #[inline]
    pub fn build(self) -> Config {
        Config::with_params(
            self.retire_threshold.unwrap_or(RETIRE_THRESHOLD),
            self.max_fills.unwrap_or(DEFAULT_MAX_FILLS),
            self.fill_period.unwrap_or(DEFAULT_FILL_PERIOD),
            self.reclaim_threshold.unwrap_or(DEFAULT_RECLAIM_THRESHOLD),
        )
    }
}

#[cfg(test)]
mod tests {
    use core::time::Duration;

    use super::{Config, ConfigBuilder};

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.max_fills(), 10);
        assert_eq!(config.fill_period(), Duration::from_millis(1));
        assert_eq!(config.reclaim_threshold(), 1000);
        assert!(config.retire_threshold() > 0);
    }

    #[test]
    fn builder() {
        let config = ConfigBuilder::new().retire_threshold(4).max_fills(2).build();
        assert_eq!(config.retire_threshold(), 4);
        assert_eq!(config.max_fills(), 2);
        assert_eq!(config.reclaim_threshold(), Config::default().reclaim_threshold());
    }

    #[test]
    #[should_panic]
    fn zero_threshold() {
        let _ = ConfigBuilder::new().retire_threshold(0).build();
    }
}
