//! Recovery policies for codec errors.

/// How a connection responds to a codec error.
///
/// [`CodecError::default_recovery_policy`](crate::codec::CodecError::default_recovery_policy)
/// returns the recommended policy for each error. Endpoints may escalate
/// frame-scoped errors to [`RecoveryPolicy::Disconnect`] through
/// [`ConnectionConfig::violation_policy`](crate::connection::ConnectionConfig::violation_policy).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RecoveryPolicy {
    /// Discard the offending frame, report it, and keep reading.
    ///
    /// Only meaningful for errors that leave the stream aligned on a frame
    /// boundary, such as unknown opcodes or bad trailers.
    #[default]
    Drop,

    /// Terminate the connection.
    ///
    /// Required once framing state is lost or the transport has failed.
    Disconnect,
}

impl RecoveryPolicy {
    /// Returns the policy name as a static string for metrics and logging.
    ///
    /// # Examples
    ///
    /// ```
    /// use packetwire::codec::RecoveryPolicy;
    ///
    /// assert_eq!(RecoveryPolicy::Drop.as_str(), "drop");
    /// assert_eq!(RecoveryPolicy::Disconnect.as_str(), "disconnect");
    /// ```
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Drop => "drop",
            Self::Disconnect => "disconnect",
        }
    }
}
