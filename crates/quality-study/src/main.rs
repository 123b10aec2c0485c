mod bootstrap;

use anyhow::{Context, Result};
use quality_chart::SvgRenderer;
use quality_core::settings::Settings;
use quality_data::study::{run_study, StudyReport, StudySources};

fn main() -> Result<()> {
    let settings = Settings::load();

    bootstrap::setup_logging(&settings.log_level, settings.log_file.as_deref())?;
    bootstrap::ensure_output_dir(settings.output_dir())?;

    tracing::info!("Quality study v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Data: {}, Output: {}",
        settings.data_dir().display(),
        settings.output_dir().display()
    );

    let sources = StudySources::load(settings.data_dir()).with_context(|| {
        format!(
            "failed to load source workbooks from {}",
            settings.data_dir().display()
        )
    })?;

    let mut renderer = SvgRenderer::default();
    let report =
        run_study(sources, settings.output_dir(), &mut renderer).context("study aborted")?;

    if let Some(path) = settings.report_path() {
        report
            .save_to(&path)
            .with_context(|| format!("failed to write report {}", path.display()))?;
        tracing::info!("Report saved to {}", path.display());
    }

    print_summary(&report);
    Ok(())
}

/// Print one line per correlation to stdout.
fn print_summary(report: &StudyReport) {
    println!("{} charts written", report.charts.len());
    for c in &report.correlations {
        let value = c
            .coefficient
            .map(|r| format!("{:+.4}", r))
            .unwrap_or_else(|| "undefined".to_string());
        println!(
            "  {:02}  {:>11} vs {:<11} r = {:>7}  {:<12} ({} days)",
            c.step,
            c.column_a,
            c.column_b,
            value,
            c.strength,
            c.rows
        );
    }
}
