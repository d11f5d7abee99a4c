use std::path::PathBuf;

use anyhow::Context;
use async_std::path::Path;
use clap::{value_parser, Arg, ArgAction, ArgMatches};
use log::{error, info, warn};

use envbake::{
    irradiance::DEFAULT_SAMPLE_DELTA, prefilter::DEFAULT_SAMPLE_COUNT, BakeConfig, Baker, CompressionQuality,
    CpuBackend, GpuBackend, RenderBackend,
};

fn command() -> clap::Command {
    clap::Command::new("envbake")
        .about("Bakes environment, irradiance and prefiltered specular cubemaps from an HDR panorama")
        .arg(
            Arg::new("input-image")
                .required(true)
                .help("Equirectangular environment map to process"),
        )
        .arg(
            Arg::new("resolution")
                .required(true)
                .value_parser(value_parser!(u32))
                .help("Edge length of the environment cubemap, a power of two"),
        )
        .arg(
            Arg::new("max-radiance")
                .value_parser(value_parser!(f32))
                .help("Clamp radiance to this value, unclamped if omitted"),
        )
        .arg(
            Arg::new("input")
                .long("input")
                .short('i')
                .action(ArgAction::Append)
                .help("Another panorama to bake in the same run, each one gets its own subdirectory"),
        )
        .arg(
            Arg::new("output-dir")
                .long("output-dir")
                .short('o')
                .default_value(".")
                .help("Directory the .cubemap files are written to"),
        )
        .arg(
            Arg::new("backend")
                .long("backend")
                .value_parser(["gpu", "cpu"])
                .default_value("gpu")
                .help("Run the convolutions through wgpu or on the CPU"),
        )
        .arg(
            Arg::new("quality")
                .long("quality")
                .value_parser(CompressionQuality::NAMES)
                .default_value("basic")
                .help("BC6H encoder effort"),
        )
        .arg(
            Arg::new("irradiance-sample-delta")
                .long("irradiance-sample-delta")
                .value_parser(value_parser!(f32))
                .help("Angular step in radians of the irradiance hemisphere walk"),
        )
        .arg(
            Arg::new("prefilter-samples")
                .long("prefilter-samples")
                .value_parser(value_parser!(u32))
                .help("GGX samples per prefiltered texel"),
        )
}

fn bake_config(args: &ArgMatches) -> Result<BakeConfig, String> {
    let resolution = *args.get_one::<u32>("resolution").ok_or("missing resolution")?;
    let mut config = BakeConfig::new(resolution);

    if let Some(&max_radiance) = args.get_one::<f32>("max-radiance") {
        if max_radiance <= 0. {
            return Err(format!("Max radiance must be positive, got {max_radiance}"));
        }
        config.max_radiance = max_radiance;
    }
    if let Some(quality) = args.get_one::<String>("quality") {
        config.quality = quality.parse().map_err(|err| format!("{err}"))?;
    }
    config.irradiance.sample_delta = args
        .get_one::<f32>("irradiance-sample-delta")
        .copied()
        .unwrap_or(DEFAULT_SAMPLE_DELTA);
    config.prefilter.sample_count = args
        .get_one::<u32>("prefilter-samples")
        .copied()
        .unwrap_or(DEFAULT_SAMPLE_COUNT);
    if let Some(dir) = args.get_one::<String>("output-dir") {
        config.output_dir = PathBuf::from(dir);
    }

    config.validate().map_err(|err| err.to_string())?;
    Ok(config)
}

/// The positional input followed by every `--input`, in command line order.
fn inputs(args: &ArgMatches) -> Vec<PathBuf> {
    let positional = args.get_many::<String>("input-image").into_iter().flatten();
    let extra = args.get_many::<String>("input").into_iter().flatten();
    positional.chain(extra).map(PathBuf::from).collect()
}

async fn bake<B: RenderBackend>(backend: B, config: BakeConfig, inputs: Vec<PathBuf>) -> anyhow::Result<()> {
    std::fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("Couldn't create output directory {}", config.output_dir.display()))?;

    let mut baker = Baker::new(backend, config)?;
    let report = baker.bake_batch(&inputs).context("Couldn't bake")?;
    for assets in &report.baked {
        info!(
            "Baked {}, {} and {}",
            assets.environment.display(),
            assets.irradiance.display(),
            assets.prefiltered.display()
        );
    }
    for (path, err) in &report.skipped {
        warn!("Skipped {}: {}", path.display(), err);
    }
    if report.baked.is_empty() {
        if let Some((path, err)) = report.skipped.into_iter().next() {
            return Err(err).with_context(|| format!("Couldn't load {}", path.display()));
        }
    }
    Ok(())
}

#[async_std::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    // Usage and validation problems are reported without failing the run
    let args = match command().try_get_matches() {
        Ok(args) => args,
        Err(err) => {
            let _ = err.print();
            return Ok(());
        }
    };
    let config = match bake_config(&args) {
        Ok(config) => config,
        Err(message) => {
            println!("{message}");
            return Ok(());
        }
    };

    let input = inputs(&args);
    for path in &input {
        if !Path::new(path).exists().await {
            println!("Input image file \"{}\" doesn't exist", path.display());
            return Ok(());
        }
    }

    let result = match args.get_one::<String>("backend").map(String::as_str) {
        Some("cpu") => bake(CpuBackend::new(), config, input).await,
        _ => {
            let backend = match GpuBackend::new().await {
                Ok(backend) => backend,
                Err(err) => {
                    error!("{err}");
                    eprintln!("{err}");
                    std::process::exit(-1);
                }
            };
            bake(backend, config, input).await
        }
    };

    if let Err(err) = &result {
        error!("{err:#}");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(args: &[&str]) -> Result<ArgMatches, String> {
        command()
            .try_get_matches_from(std::iter::once("envbake").chain(args.iter().copied()))
            .map_err(|err| err.to_string())
    }

    fn parse(args: &[&str]) -> Result<BakeConfig, String> {
        bake_config(&matches(args)?)
    }

    #[test]
    fn positional_arguments() {
        let config = parse(&["sky.hdr", "256", "500"]).unwrap();
        assert_eq!(config.base_resolution, 256);
        assert_eq!(config.max_radiance, 500.);
        assert_eq!(config.quality, CompressionQuality::Basic);
    }

    #[test]
    fn unclamped_by_default() {
        let config = parse(&["sky.hdr", "64"]).unwrap();
        assert_eq!(config.max_radiance, 0.);
        assert_eq!(config.prefilter.sample_count, DEFAULT_SAMPLE_COUNT);
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(parse(&["sky.hdr", "100"]).is_err());
        assert!(parse(&["sky.hdr", "64", "-3"]).is_err());
        assert!(parse(&["sky.hdr"]).is_err());
        assert!(parse(&["sky.hdr", "64", "--quality", "ultra"]).is_err());
    }

    #[test]
    fn options_reach_the_config() {
        let config = parse(&[
            "sky.hdr",
            "128",
            "--quality",
            "very-fast",
            "--prefilter-samples",
            "64",
            "--irradiance-sample-delta",
            "0.1",
            "-o",
            "out",
        ])
        .unwrap();
        assert_eq!(config.quality, CompressionQuality::VeryFast);
        assert_eq!(config.prefilter.sample_count, 64);
        assert_eq!(config.irradiance.sample_delta, 0.1);
        assert_eq!(config.output_dir, PathBuf::from("out"));
    }

    #[test]
    fn extra_inputs_follow_the_positional_one() {
        let args = matches(&["sky.hdr", "64", "--input", "dusk.exr", "-i", "noon.hdr"]).unwrap();
        assert_eq!(
            inputs(&args),
            ["sky.hdr", "dusk.exr", "noon.hdr"].map(PathBuf::from).to_vec()
        );
        let args = matches(&["sky.hdr", "64"]).unwrap();
        assert_eq!(inputs(&args), vec![PathBuf::from("sky.hdr")]);
    }
}
