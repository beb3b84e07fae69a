//! Pipeline configuration: a plain data struct paired with a `Default`
//! impl rather than a builder.

/// Which critical points the detector should keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CriticalPointType {
    /// Every detected critical point, unconditionally.
    All,
    /// Only points whose interpolated Hessian is negative-definite.
    Maximum,
}

impl Default for CriticalPointType {
    fn default() -> Self {
        CriticalPointType::All
    }
}

/// Pipeline-wide configuration.
#[derive(Debug, Clone)]
pub struct Options {
    /// `all` or `maximum`.
    pub critical_point_type: CriticalPointType,
    /// Drop trajectories whose peak `val` does not exceed this threshold.
    pub value_threshold: f64,
    /// Drop trajectories with fewer vertices than this.
    pub length_threshold: usize,
    /// Enable k-d tree rebalancing between detection and convergence.
    pub load_balancing: bool,
    /// Worker pool size for the detector and relation builder.
    pub nthreads: usize,
    /// Number of ranks; one [`crate::block::Block`] per rank.
    pub nblocks: usize,
    /// Ghost layer margin used when partitioning the lattice.
    pub ghost_margin: i64,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            critical_point_type: CriticalPointType::default(),
            value_threshold: f64::NEG_INFINITY,
            length_threshold: 2,
            load_balancing: true,
            nthreads: 1,
            nblocks: 1,
            ghost_margin: 1,
        }
    }
}

impl Options {
    /// Validates cross-field invariants that must be caught before the
    /// pipeline starts.
    pub fn validate(&self) -> Result<(), crate::error::CritraceError> {
        if self.nblocks == 0 {
            return Err(crate::error::CritraceError::InvalidInput(
                "nblocks must be at least 1".to_string(),
            ));
        }
        if self.nthreads == 0 {
            return Err(crate::error::CritraceError::InvalidInput(
                "nthreads must be at least 1".to_string(),
            ));
        }
        if self.ghost_margin < 0 {
            return Err(crate::error::CritraceError::InvalidInput(
                "ghost_margin must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_are_valid() {
        assert!(Options::default().validate().is_ok());
    }

    #[test]
    fn zero_blocks_is_invalid() {
        let mut opts = Options::default();
        opts.nblocks = 0;
        assert!(opts.validate().is_err());
    }
}
