//! CLI Command Implementations

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::chain::render;
use crate::config::EngineConfig;
use crate::dsp::registry::descriptors;
use crate::engine::io::{export_audio, import_audio, ExportFormat};
use crate::metering::{LoudnessAnalysis, Platform};
use crate::rack::Rack;

/// Print the descriptor table
pub fn list_modules() -> Result<()> {
    let json = serde_json::to_string_pretty(&descriptors())?;
    println!("{}", json);
    Ok(())
}

/// Render one file through a rack
pub fn render_file(
    config: &EngineConfig,
    input: &Path,
    output: &Path,
    rack_path: Option<&Path>,
    bit_depth: Option<u16>,
) -> Result<()> {
    let rack = match rack_path {
        Some(path) => load_rack(path)?,
        None => Rack::new(),
    };
    let format = ExportFormat::new(bit_depth.unwrap_or(config.export_bit_depth))?;
    let digest = render_one(config, &rack, input, output, format)?;

    println!("Rendered: {} -> {}", input.display(), output.display());
    println!("Modules: {}", rack.len());
    println!("SHA-256: {}", digest);
    Ok(())
}

/// Print loudness, true peak and per-platform penalties
pub fn analyze_file(input: &Path, json: bool) -> Result<()> {
    let buffer =
        import_audio(input).with_context(|| format!("failed to read {}", input.display()))?;
    let analysis = LoudnessAnalysis::analyze(&buffer);

    if json {
        println!("{}", serde_json::to_string_pretty(&analysis)?);
        return Ok(());
    }

    println!("File: {}", input.display());
    println!("Integrated: {:.1} LUFS", analysis.integrated_lufs);
    println!("True peak: {:.1} dBTP", analysis.true_peak_db);
    for platform in Platform::ALL {
        println!(
            "  {:<12} target {:>5.1} LUFS  penalty {:>5.1} dB",
            platform.to_string(),
            platform.target_lufs(),
            analysis.compliance.get(platform)
        );
    }
    if analysis.compliance.is_compliant() {
        println!("Compliant on every platform");
    }
    Ok(())
}

/// Render every WAV under `input_dir` into `output_dir`
pub fn batch(config: &EngineConfig, input_dir: &Path, output_dir: &Path, rack_path: &Path) -> Result<()> {
    let rack = load_rack(rack_path)?;
    let format = config.export_format()?;

    let inputs: Vec<PathBuf> = WalkDir::new(input_dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"))
        })
        .collect();
    info!(count = inputs.len(), dir = %input_dir.display(), "batch render started");

    let mut failed = 0;
    for input in &inputs {
        let relative = input.strip_prefix(input_dir).unwrap_or(input);
        let output = output_dir.join(relative);
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        match render_one(config, &rack, input, &output, format) {
            Ok(_) => println!("Rendered: {}", output.display()),
            Err(err) => {
                failed += 1;
                warn!(input = %input.display(), error = %err, "batch item failed");
                println!("Failed: {} ({:#})", input.display(), err);
            }
        }
    }

    println!("{} rendered, {} failed", inputs.len() - failed, failed);
    if failed > 0 {
        anyhow::bail!("{} of {} files failed", failed, inputs.len());
    }
    Ok(())
}

fn load_rack(path: &Path) -> Result<Rack> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("failed to read rack {}", path.display()))?;
    let mut rack = Rack::new();
    rack.load_json(&json)
        .with_context(|| format!("invalid rack {}", path.display()))?;
    Ok(rack)
}

fn render_one(
    config: &EngineConfig,
    rack: &Rack,
    input: &Path,
    output: &Path,
    format: ExportFormat,
) -> Result<String> {
    let buffer =
        import_audio(input).with_context(|| format!("failed to read {}", input.display()))?;
    let rendered = render(&buffer, &rack.snapshot(), config.block_size)
        .with_context(|| format!("failed to render {}", input.display()))?;
    export_audio(&rendered.buffer, output, format)
        .with_context(|| format!("failed to write {}", output.display()))?;
    info!(
        input = %input.display(),
        output = %output.display(),
        latency_samples = rendered.latency_samples,
        "rendered"
    );
    Ok(rendered.digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::registry::ModuleType;
    use crate::engine::io::generate_stereo_test_tone;
    use tempfile::tempdir;

    fn write_rack(dir: &Path) -> PathBuf {
        let mut rack = Rack::new();
        rack.add(ModuleType::Compressor);
        rack.add(ModuleType::Limiter);
        let path = dir.join("rack.json");
        fs::write(&path, rack.to_json().unwrap()).unwrap();
        path
    }

    #[test]
    fn test_render_file_writes_output() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in.wav");
        let output = dir.path().join("out.wav");
        let tone = generate_stereo_test_tone(440.0, 440.0, 0.25, 48000);
        export_audio(&tone, &input, ExportFormat::default()).unwrap();

        let rack = write_rack(dir.path());
        render_file(&EngineConfig::default(), &input, &output, Some(rack.as_path()), Some(16)).unwrap();

        let written = import_audio(&output).unwrap();
        assert_eq!(written.len(), tone.len());
    }

    #[test]
    fn test_batch_keeps_layout() {
        let dir = tempdir().unwrap();
        let input_dir = dir.path().join("in");
        let nested = input_dir.join("album");
        fs::create_dir_all(&nested).unwrap();
        let tone = generate_stereo_test_tone(220.0, 220.0, 0.1, 48000);
        export_audio(&tone, &nested.join("one.wav"), ExportFormat::default()).unwrap();
        export_audio(&tone, &input_dir.join("two.WAV"), ExportFormat::default()).unwrap();
        fs::write(input_dir.join("notes.txt"), "skip me").unwrap();

        let output_dir = dir.path().join("out");
        let rack = write_rack(dir.path());
        batch(&EngineConfig::default(), &input_dir, &output_dir, &rack).unwrap();

        assert!(output_dir.join("album").join("one.wav").exists());
        assert!(output_dir.join("two.WAV").exists());
        assert!(!output_dir.join("notes.txt").exists());
    }

    #[test]
    fn test_bad_rack_reports_context() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rack.json");
        fs::write(&path, r#"[{"id": "x", "type": "reverb"}]"#).unwrap();
        let err = load_rack(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("invalid rack"));
    }
}
