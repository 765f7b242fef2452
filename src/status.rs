use core::fmt::{self, Display, Formatter};

/// SMTP reply codes used by the engine.
///
/// Codes outside this set (embedder conventions such as 513 or 554) round-trip
/// through the `Unknown` variant.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Debug)]
pub enum Status {
    ServiceReady,
    ServiceClosing,
    Ok,
    StartMailInput,
    Unavailable,
    PrematureCommand,
    TlsUnavailable,
    UnknownCommand,
    SyntaxError,
    NotImplemented,
    BadSequence,
    Error,
    ExceededStorage,
    TransactionFailed,
    UnknownOption,
    Unknown(u16),
}

impl Status {
    /// Checks if the status is a permanent rejection
    #[must_use]
    pub fn is_permanent(self) -> bool {
        u16::from(self) >= 500
    }

    /// Checks if the status is a temporary rejection
    #[must_use]
    pub fn is_temporary(self) -> bool {
        (400..500).contains(&u16::from(self))
    }
}

impl From<u16> for Status {
    fn from(value: u16) -> Self {
        match value {
            220 => Self::ServiceReady,
            221 => Self::ServiceClosing,
            250 => Self::Ok,
            354 => Self::StartMailInput,
            421 => Self::Unavailable,
            453 => Self::PrematureCommand,
            454 => Self::TlsUnavailable,
            500 => Self::UnknownCommand,
            501 => Self::SyntaxError,
            502 => Self::NotImplemented,
            503 => Self::BadSequence,
            550 => Self::Error,
            552 => Self::ExceededStorage,
            554 => Self::TransactionFailed,
            555 => Self::UnknownOption,
            _ => Self::Unknown(value),
        }
    }
}

impl From<Status> for u16 {
    fn from(value: Status) -> Self {
        match value {
            Status::ServiceReady => 220,
            Status::ServiceClosing => 221,
            Status::Ok => 250,
            Status::StartMailInput => 354,
            Status::Unavailable => 421,
            Status::PrematureCommand => 453,
            Status::TlsUnavailable => 454,
            Status::UnknownCommand => 500,
            Status::SyntaxError => 501,
            Status::NotImplemented => 502,
            Status::BadSequence => 503,
            Status::Error => 550,
            Status::ExceededStorage => 552,
            Status::TransactionFailed => 554,
            Status::UnknownOption => 555,
            Status::Unknown(v) => v,
        }
    }
}

impl Display for Status {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(fmt, "{}", u16::from(*self))
    }
}

#[cfg(test)]
mod test {
    use super::Status;

    #[test]
    fn status() {
        assert!(Status::Error.is_permanent());
        assert!(!Status::Error.is_temporary());

        assert!(Status::Unavailable.is_temporary());
        assert!(!Status::Unavailable.is_permanent());

        assert_eq!(Status::from(550), Status::Error);
        assert_eq!(u16::from(Status::Error), 550);

        assert_eq!(Status::from(513), Status::Unknown(513));
        assert_eq!(u16::from(Status::Unknown(513)), 513);
    }
}
