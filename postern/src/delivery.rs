use std::{path::PathBuf, sync::Arc};

use postern_smtp::delivery::{DirectorySink, MailSink, MemorySink};
use serde::Deserialize;

/// Where accepted mail is delivered, as selected in the configuration file.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
pub enum Delivery {
    /// Keep mail in memory; it is lost when the server stops.
    #[default]
    Memory,
    /// Write each message to a file in this directory.
    Directory(PathBuf),
}

impl Delivery {
    ///
    /// Create the sink shared by every session
    ///
    /// # Errors
    /// If the delivery directory cannot be created
    ///
    pub fn sink(&self) -> std::io::Result<Arc<dyn MailSink>> {
        Ok(match self {
            Self::Memory => Arc::new(MemorySink::new()),
            Self::Directory(path) => {
                let sink = DirectorySink::new(path);
                sink.init()?;
                Arc::new(sink)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::Delivery;

    #[test]
    fn directory_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spool").join("mail");

        Delivery::Directory(path.clone()).sink().unwrap();
        assert!(path.is_dir());
    }

    #[test]
    fn delivery_from_ron() {
        assert_eq!(ron::from_str::<Delivery>("Memory").unwrap(), Delivery::Memory);
        assert_eq!(
            ron::from_str::<Delivery>(r#"Directory("/var/spool/postern")"#).unwrap(),
            Delivery::Directory("/var/spool/postern".into())
        );
    }
}
