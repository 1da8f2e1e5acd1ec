//! Disque command registry
//!
//! Each command carries an optional affinity descriptor telling the router
//! where job IDs sit in its argument list.

use std::fmt;
use std::str::FromStr;

use crate::utils::DisqueError;

/// Where job IDs appear in a command's arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AffinityDescriptor {
    /// Distance between consecutive job IDs
    pub stride: usize,
    /// `false`: only the first argument is a job ID
    pub repeating: bool,
}

impl AffinityDescriptor {
    /// A single job ID in first position
    pub const fn single() -> Self {
        Self {
            stride: 1,
            repeating: false,
        }
    }

    /// A job ID every `stride` arguments, starting at the first
    pub const fn every(stride: usize) -> Self {
        Self {
            stride: if stride == 0 { 1 } else { stride },
            repeating: true,
        }
    }

    /// Descriptor for a command name, if it is a known job-ID command
    pub fn for_command(name: &str) -> Option<Self> {
        Command::parse(name).and_then(|cmd| cmd.affinity())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    // === Jobs ===
    AddJob,
    GetJob,
    AckJob,
    FastAck,
    Working,
    Nack,
    DelJob,
    Show,
    JScan,

    // === Queues ===
    QLen,
    QStat,
    QPeek,
    Enqueue,
    Dequeue,
    QScan,
    Pause,

    // === Server ===
    Info,
    Hello,
    Ping,
}

impl Command {
    pub const ALL: [Command; 19] = [
        Command::AddJob,
        Command::GetJob,
        Command::AckJob,
        Command::FastAck,
        Command::Working,
        Command::Nack,
        Command::DelJob,
        Command::Show,
        Command::JScan,
        Command::QLen,
        Command::QStat,
        Command::QPeek,
        Command::Enqueue,
        Command::Dequeue,
        Command::QScan,
        Command::Pause,
        Command::Info,
        Command::Hello,
        Command::Ping,
    ];

    /// Parse command name (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "addjob" => Some(Self::AddJob),
            "getjob" => Some(Self::GetJob),
            "ackjob" => Some(Self::AckJob),
            "fastack" => Some(Self::FastAck),
            "working" => Some(Self::Working),
            "nack" => Some(Self::Nack),
            "deljob" => Some(Self::DelJob),
            "show" => Some(Self::Show),
            "jscan" => Some(Self::JScan),
            "qlen" => Some(Self::QLen),
            "qstat" => Some(Self::QStat),
            "qpeek" => Some(Self::QPeek),
            "enqueue" => Some(Self::Enqueue),
            "dequeue" => Some(Self::Dequeue),
            "qscan" => Some(Self::QScan),
            "pause" => Some(Self::Pause),
            "info" => Some(Self::Info),
            "hello" => Some(Self::Hello),
            "ping" => Some(Self::Ping),
            _ => None,
        }
    }

    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AddJob => "ADDJOB",
            Self::GetJob => "GETJOB",
            Self::AckJob => "ACKJOB",
            Self::FastAck => "FASTACK",
            Self::Working => "WORKING",
            Self::Nack => "NACK",
            Self::DelJob => "DELJOB",
            Self::Show => "SHOW",
            Self::JScan => "JSCAN",
            Self::QLen => "QLEN",
            Self::QStat => "QSTAT",
            Self::QPeek => "QPEEK",
            Self::Enqueue => "ENQUEUE",
            Self::Dequeue => "DEQUEUE",
            Self::QScan => "QSCAN",
            Self::Pause => "PAUSE",
            Self::Info => "INFO",
            Self::Hello => "HELLO",
            Self::Ping => "PING",
        }
    }

    /// Job-ID layout of the arguments; `None` routes randomly
    pub fn affinity(&self) -> Option<AffinityDescriptor> {
        match self {
            Self::AckJob | Self::FastAck | Self::Nack | Self::Enqueue | Self::Dequeue | Self::DelJob => {
                Some(AffinityDescriptor::every(1))
            }
            Self::Working | Self::Show => Some(AffinityDescriptor::single()),
            _ => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = DisqueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| DisqueError::UnknownCommand(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(Command::parse("ackjob"), Some(Command::AckJob));
        assert_eq!(Command::parse("AckJob"), Some(Command::AckJob));
        assert_eq!("QLEN".parse::<Command>().unwrap(), Command::QLen);
        assert!(matches!(
            "FLUSHALL".parse::<Command>(),
            Err(DisqueError::UnknownCommand(ref name)) if name == "FLUSHALL"
        ));
    }

    #[test]
    fn test_names_round_trip() {
        for cmd in Command::ALL {
            assert_eq!(Command::parse(cmd.as_str()), Some(cmd));
            assert_eq!(cmd.to_string(), cmd.as_str());
        }
    }

    #[test]
    fn test_affinity_table() {
        assert_eq!(Command::Show.affinity(), Some(AffinityDescriptor::single()));
        assert_eq!(
            Command::AckJob.affinity(),
            Some(AffinityDescriptor {
                stride: 1,
                repeating: true
            })
        );
        assert_eq!(Command::AddJob.affinity(), None);
        assert_eq!(Command::GetJob.affinity(), None);

        assert_eq!(
            AffinityDescriptor::for_command("fastack"),
            Some(AffinityDescriptor::every(1))
        );
        assert_eq!(AffinityDescriptor::for_command("qlen"), None);
        assert_eq!(AffinityDescriptor::for_command("nosuch"), None);
    }

    #[test]
    fn test_zero_stride_is_clamped() {
        assert_eq!(AffinityDescriptor::every(0).stride, 1);
    }
}
