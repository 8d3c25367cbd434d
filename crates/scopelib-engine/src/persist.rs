//! Saving and restoring instrument settings.
//!
//! The file holds one line per save group. Each line is a compound command
//! that sets every setting of the group, e.g.
//! `CH1:POS 0.5;:CH1:SCA 0.1`, so restoring is a plain replay.

use std::path::PathBuf;

use tracing::{error, info, warn};

use scopelib_core::error::{Error, Result};
use scopelib_core::model::CommandId;
use scopelib_core::params::Param;

use crate::engine::Engine;
use crate::protocol::make_query;

/// Separator between the settings of one group.
const SEPARATOR: &str = ";:";

impl Engine {
    /// The settings file: `FilePath` if set, else the configured default.
    fn settings_path(&self) -> Result<PathBuf> {
        let path = self.registry.get_string(Param::FilePath, 0);
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path.trim()));
        }
        self.config_path
            .clone()
            .ok_or_else(|| Error::InvalidParameter("no settings file configured".into()))
    }

    /// Query every saved setting and render the file contents.
    async fn collect_settings(&mut self) -> Result<String> {
        let mut out = String::new();
        for group in self.model.save_groups.clone() {
            let mut line = Vec::with_capacity(group.settings.len());
            for (id, channel) in group.settings {
                let cmd = match self.dispatch.command_for(id, channel.saturating_sub(1)) {
                    Ok(cmd) => cmd,
                    Err(Error::Unsupported(_)) => continue,
                    Err(e) => return Err(e),
                };
                let value = self.dispatch.query(&make_query(&cmd)).await?;
                line.push(format!("{cmd} {}", value.trim()));
            }
            out.push_str(&line.join(SEPARATOR));
            out.push('\n');
        }
        Ok(out)
    }

    /// Save the current settings. A failed query leaves the file untouched.
    pub(crate) async fn save_settings(&mut self) -> Result<()> {
        let path = self.settings_path()?;
        let contents = self.collect_settings().await?;
        tokio::fs::write(&path, contents).await?;
        info!(path = %path.display(), "settings saved");
        self.registry
            .set_string(Param::Message, 0, format!("saved {}", path.display()));
        Ok(())
    }

    /// Replay a settings file, then reinitialize and refresh.
    pub(crate) async fn restore_settings(&mut self) -> Result<()> {
        let path = self.settings_path()?;
        let contents = tokio::fs::read_to_string(&path).await?;
        let mut lines = 0;
        for line in contents.lines().map(str::trim).filter(|l| !l.is_empty()) {
            lines += 1;
            if let Err(e) = self.dispatch.write(line).await {
                warn!(error = %e, line, "restore write failed");
            }
        }
        let expected = self.model.save_groups.len();
        if lines != expected {
            error!(
                path = %path.display(),
                lines,
                expected,
                "settings file does not match this model"
            );
        }
        self.dispatch.write_command(CommandId::Init, 0).await;
        self.update().await;
        info!(path = %path.display(), "settings restored");
        self.registry
            .set_string(Param::Message, 0, format!("restored {}", path.display()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::EngineConfig;
    use crate::testing::{engine, engine_with};
    use scopelib_core::params::Param;
    use scopelib_test_harness::MockTransport;

    fn with_path(mock: MockTransport, path: std::path::PathBuf) -> crate::engine::Engine {
        engine_with(
            mock,
            EngineConfig {
                config_path: Some(path),
                ..EngineConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn save_writes_one_line_per_group() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scope.cfg");

        let mut mock = MockTransport::new();
        mock.expect(b"CH1:POS?\n", b"0.5\n");
        mock.expect(b"CH1:SCA?\n", b"1.0E-1\n");
        mock.expect(b"TRIG:A:LEV?\n", b"0.25\n");
        mock.expect(b"TRIG:A:MOD?\n", b"AUTO\n");
        let mut e = with_path(mock, path.clone());

        e.save_settings().await.unwrap();
        let saved = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            saved,
            "CH1:POS 0.5;:CH1:SCA 1.0E-1\nTRIG:A:LEV 0.25;:TRIG:A:MOD AUTO\n"
        );
    }

    #[tokio::test]
    async fn failed_query_aborts_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scope.cfg");

        let mut mock = MockTransport::new();
        mock.expect(b"CH1:POS?\n", b"0.5\n");
        mock.expect(b"CH1:SCA?\n", b"");
        let mut e = with_path(mock, path.clone());

        assert!(e.save_settings().await.is_err());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn file_path_parameter_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chosen.cfg");
        std::fs::write(&path, "CH1:POS 1.0;:CH1:SCA 0.2\nTRIG:A:LEV 0.1\n").unwrap();

        let mut mock = MockTransport::new();
        mock.expect(b"CH1:POS 1.0;:CH1:SCA 0.2\n", b"");
        mock.expect(b"TRIG:A:LEV 0.1\n", b"");
        mock.expect(b"*CLS; :HEAD OFF\n", b"");
        let handle = mock.handle();
        let mut e = with_path(mock, dir.path().join("unused.cfg"));
        e.registry
            .set_string(Param::FilePath, 0, path.display().to_string());

        e.restore_settings().await.unwrap();
        let sent = handle.sent_lines();
        assert_eq!(sent[0], "CH1:POS 1.0;:CH1:SCA 0.2");
        assert_eq!(sent[1], "TRIG:A:LEV 0.1");
        assert_eq!(sent[2], "*CLS; :HEAD OFF");
        // The full refresh follows; the mock has no replies for it.
        assert!(sent.len() > 3);
    }

    #[tokio::test]
    async fn restore_with_wrong_line_count_still_replays() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.cfg");
        std::fs::write(&path, "\nCH1:POS 1.0\n\n").unwrap();

        let mut mock = MockTransport::new();
        mock.expect(b"CH1:POS 1.0\n", b"");
        let handle = mock.handle();
        let mut e = with_path(mock, path);

        e.restore_settings().await.unwrap();
        assert_eq!(handle.sent_lines()[0], "CH1:POS 1.0");
    }

    #[tokio::test]
    async fn missing_path_is_an_error() {
        let mut e = engine(MockTransport::new());
        assert!(e.save_settings().await.is_err());
        assert!(e.restore_settings().await.is_err());
    }
}
