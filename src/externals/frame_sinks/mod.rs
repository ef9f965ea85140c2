use std::{path::PathBuf, time::Duration};

use tracing::info;

use crate::ports::FrameSink;

use self::{archive::FrameArchive, classifier::ClassifierClient, logging::LoggingFrameSink};

pub mod archive;
pub mod classifier;
pub mod logging;

/// Every consumer a forwarded frame is handed to.
pub struct FrameSinkModule {
    pub sinks: Vec<Box<dyn FrameSink>>,
}

impl FrameSinkModule {
    /// The logging sink is always present. Archive and classifier are added
    /// when configured.
    pub fn initialize(
        capture_dir: Option<PathBuf>,
        classifier_url: Option<String>,
        classifier_timeout: Duration,
    ) -> Self {
        let mut sinks: Vec<Box<dyn FrameSink>> = vec![Box::new(LoggingFrameSink)];

        if let Some(directory) = capture_dir {
            info!("Archiving frames to {}.", directory.display());
            sinks.push(Box::new(FrameArchive::new(directory)));
        }

        if let Some(url) = classifier_url {
            info!("Forwarding frames to classifier at {}.", url);
            sinks.push(Box::new(ClassifierClient::new(url, classifier_timeout)));
        }

        Self { sinks }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_sink_is_always_present() {
        let module = FrameSinkModule::initialize(None, None, Duration::from_secs(1));
        let names: Vec<_> = module.sinks.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["logging"]);
    }

    #[test]
    fn test_configured_sinks_are_added() {
        let module = FrameSinkModule::initialize(
            Some(PathBuf::from("/tmp/captures")),
            Some("http://localhost:5000/predict".to_string()),
            Duration::from_secs(1),
        );
        let names: Vec<_> = module.sinks.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["logging", "archive", "classifier"]);
    }
}
