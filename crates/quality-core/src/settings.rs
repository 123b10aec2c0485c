use clap::Parser;
use std::path::{Path, PathBuf};

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Daily waste, defect and revision correlation study
#[derive(Parser, Debug, Clone)]
#[command(
    name = "quality-study",
    about = "Daily waste, defect and revision correlation study",
    version
)]
pub struct Settings {
    /// Directory holding the source workbooks
    #[arg(long, default_value = "data")]
    pub data_dir: PathBuf,

    /// Directory the charts and the correlation report are written to
    #[arg(long, default_value = "data")]
    pub output_dir: PathBuf,

    /// Logging level
    #[arg(long, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"])]
    pub log_level: String,

    /// Log file path
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Do not write correlations.json
    #[arg(long)]
    pub no_report: bool,
}

/// File name of the correlation report inside the output directory.
pub const REPORT_FILE_NAME: &str = "correlations.json";

// ── Settings impl ──────────────────────────────────────────────────────────────

impl Settings {
    /// Parse the process arguments and apply the `--debug` override.
    pub fn load() -> Self {
        Self::resolve(Settings::parse())
    }

    /// Same as [`load`](Self::load) but from an explicit argument list.
    pub fn load_from_args<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Settings::try_parse_from(args).map(Self::resolve)
    }

    fn resolve(mut settings: Settings) -> Settings {
        // --debug overrides log level.
        if settings.debug {
            settings.log_level = "DEBUG".to_string();
        }
        settings
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Path of a generated artifact inside the output directory.
    pub fn artifact(&self, file_name: &str) -> PathBuf {
        self.output_dir.join(file_name)
    }

    /// Where the correlation report goes, or `None` with `--no-report`.
    pub fn report_path(&self) -> Option<PathBuf> {
        (!self.no_report).then(|| self.artifact(REPORT_FILE_NAME))
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
