/// Conditions the measurement core reports back to its callers.
///
/// None of these are fatal. The core logs each one where it happens; the
/// value is returned so the firmware can count or surface it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CoreError {
    /// The IMU flagged the accelerometer or gyroscope data as invalid.
    InvalidImuSample,
    /// The filter covariance stopped being positive semi-definite and was
    /// reset to its low-confidence value.
    FilterReset,
    /// A downstream channel was full and the sample was dropped.
    ChannelFull,
    /// The data path is disabled and the sample was discarded.
    Disabled,
}

impl core::fmt::Display for CoreError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            CoreError::InvalidImuSample => write!(f, "invalid IMU sample"),
            CoreError::FilterReset => write!(f, "orientation filter reset"),
            CoreError::ChannelFull => write!(f, "channel full, sample dropped"),
            CoreError::Disabled => write!(f, "data path disabled"),
        }
    }
}
