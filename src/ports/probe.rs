use crate::domain::stream::SourceInfo;
use async_trait::async_trait;
use std::error::Error;
use std::fmt;

/// Polls a source locator until it exposes both a video and an audio
/// elementary stream, within a bounded retry budget.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SourceProbe: Send + Sync {
    async fn probe(&self, input_url: &str) -> Result<SourceInfo, ProbeError>;
}

#[derive(Debug)]
pub enum ProbeError {
    /// The retry budget was exhausted without the source becoming ready.
    NeverReady { attempts: u32 },
    Io(std::io::Error),
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeError::NeverReady { attempts } => {
                write!(f, "source not ready after {} attempts", attempts)
            }
            ProbeError::Io(e) => write!(f, "probe io error: {}", e),
        }
    }
}

impl Error for ProbeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ProbeError::Io(e) => Some(e),
            ProbeError::NeverReady { .. } => None,
        }
    }
}

impl From<std::io::Error> for ProbeError {
    fn from(err: std::io::Error) -> Self {
        ProbeError::Io(err)
    }
}
