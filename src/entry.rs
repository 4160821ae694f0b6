use anyhow::{anyhow, Context, Result};
use crossbeam::thread;
use nalgebra::Vector3;
use std::path::Path;

use crate::fitting::config::FitConfig;
use crate::fitting::progress::{MultiTaskProgress, ProgressSink};
use crate::fitting::PathFitter;
use crate::io::input::TracedPath;
use crate::io::output::{write_cross_sections, write_diagnostics_json, write_refined_csv, RefinedPath};
use crate::io::volume::Volume;

/// Loads a slice stack and a traced path from disk, fits the path and writes
/// `<name>_fitted.csv` and `<name>_diagnostics.json` (plus cross-section PNGs
/// when `config.keep_cross_sections` is set) into `output_dir`.
pub fn run_fit_files(
    slice_dir: &str,
    spacing: (f64, f64, f64),
    path_csv: &str,
    output_dir: &str,
    config: &FitConfig,
) -> Result<RefinedPath> {
    let spacing = Vector3::new(spacing.0, spacing.1, spacing.2);
    let volume = Volume::from_slice_dir(slice_dir, spacing)
        .with_context(|| format!("Failed to load volume from {}", slice_dir))?;
    let path = TracedPath::read_csv(path_csv, 0, spacing)
        .with_context(|| format!("Failed to load path from {}", path_csv))?;

    let outcome = PathFitter::new(&volume, &path)?
        .with_config(config.clone())?
        .fit()
        .with_context(|| format!("Fitting {} failed", path.name))?;

    let out = Path::new(output_dir);
    std::fs::create_dir_all(out)
        .with_context(|| format!("Failed to create output directory {}", output_dir))?;
    write_refined_csv(&outcome.refined, out.join(format!("{}_fitted.csv", path.name)))
        .context("write_refined_csv failed")?;
    write_diagnostics_json(
        &outcome.diagnostics,
        out.join(format!("{}_diagnostics.json", path.name)),
    )
    .context("write_diagnostics_json failed")?;
    if let Some(sections) = &outcome.cross_sections {
        write_cross_sections(sections, out.join(format!("{}_sections", path.name)), "node")
            .context("write_cross_sections failed")?;
    }

    Ok(outcome.refined)
}

/// Fits several paths against the same volume on scoped threads, one
/// progress task per path. Each entry is the `(refined, success)` pair of
/// the path at the same index.
pub fn fit_paths_concurrently(
    volume: &Volume,
    paths: &[TracedPath],
    config: &FitConfig,
    progress: &MultiTaskProgress,
) -> Result<Vec<(Option<RefinedPath>, bool)>> {
    config.validate()?;

    let results = thread::scope(|s| {
        let handles: Vec<_> = paths
            .iter()
            .enumerate()
            .map(|(task, path)| {
                s.spawn(move |_| match PathFitter::new(volume, path) {
                    Ok(fitter) => fitter
                        .with_config(config.clone())
                        .map(|f| f.with_progress(progress, task).call())
                        .unwrap_or((None, false)),
                    Err(e) => {
                        log::warn!("Skipping {}: {}", path.name, e);
                        (None, false)
                    }
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().map_err(|_| anyhow!("path fitting thread panicked")))
            .collect::<Result<Vec<_>>>()
    })
    .map_err(|_| anyhow!("path fitting scope panicked"))??;

    progress.done();
    let succeeded = results.iter().filter(|(_, ok)| *ok).count();
    log::info!("Fitted {}/{} paths", succeeded, paths.len());
    Ok(results)
}

#[cfg(test)]
mod entry_tests {
    use super::*;
    use crate::fitting::config::FitScope;
    use crate::io::input::PathNode;
    use crate::utils::test_utils::{straight_positions, tube_volume};
    use image::{GrayImage, Luma};

    fn path_at(id: u32, x: f64, y: f64) -> TracedPath {
        let nodes = straight_positions(Vector3::new(x, y, 2.0), Vector3::new(0.0, 0.0, 1.0), 12)
            .into_iter()
            .map(|p| PathNode::new(p.x, p.y, p.z))
            .collect();
        TracedPath::new(id, nodes, Vector3::new(1.0, 1.0, 1.0))
    }

    #[test]
    fn test_concurrent_fits_keep_order_and_report_failures() {
        let volume = tube_volume(32, 32, 16, 4.0, 200, 10);
        let mut refitted = path_at(3, 16.0, 16.0);
        refitted.fitted_from = Some(1);
        let paths = vec![path_at(1, 16.0, 16.0), refitted, path_at(2, 17.0, 16.0)];
        let config = FitConfig {
            max_radius: 20,
            scope: FitScope::RadiiAndMidpoints,
            ..FitConfig::default()
        };
        let progress = MultiTaskProgress::new(paths.len());

        let results = fit_paths_concurrently(&volume, &paths, &config, &progress).unwrap();
        assert_eq!(results.len(), 3);
        assert!(results[0].1 && !results[1].1 && results[2].1);
        assert!(results[1].0.is_none());
        assert_eq!(results[2].0.as_ref().unwrap().name, "Fitted Path [2]");
        assert_eq!(progress.overall(), 1.0);
    }

    #[test]
    fn test_file_run_writes_outputs() {
        let base = std::env::temp_dir().join("pathfitrs_entry_test");
        let slices = base.join("slices");
        let out = base.join("out");
        std::fs::create_dir_all(&slices).unwrap();

        for z in 0..14 {
            let img = GrayImage::from_fn(28, 28, |x, y| {
                let (dx, dy) = (x as f64 - 14.0, y as f64 - 14.0);
                Luma([if dx * dx + dy * dy <= 16.0 { 220 } else { 15 }])
            });
            img.save(slices.join(format!("slice_{:02}.png", z))).unwrap();
        }
        let csv = base.join("trace.csv");
        let rows: String = (2..12).map(|z| format!("14,14,{}\n", z)).collect();
        std::fs::write(&csv, format!("x,y,z\n{}", rows)).unwrap();

        let config = FitConfig {
            max_radius: 16,
            keep_cross_sections: true,
            ..FitConfig::default()
        };
        let refined = run_fit_files(
            slices.to_str().unwrap(),
            (1.0, 1.0, 1.0),
            csv.to_str().unwrap(),
            out.to_str().unwrap(),
            &config,
        )
        .unwrap();

        assert!(!refined.is_empty());
        assert!(out.join("trace_fitted.csv").exists());
        assert!(out.join("trace_diagnostics.json").exists());
        assert!(out.join("trace_sections").join("node_00.png").exists());
        std::fs::remove_dir_all(&base).ok();
    }
}
