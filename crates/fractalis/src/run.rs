use std::path::Path;

use anyhow::{bail, Context, Result};
use catalog::{FractalCatalog, FractalDefinition};
use renderer::compile::{assemble_fragment, validate_program, FractalSnippets, VERTEX_SHADER_GLSL};
use renderer::{Configuration, FractalSource, Palette, Point, PreviewConfig, Rgba};
use tracing_subscriber::EnvFilter;

use crate::cli::{PaletteArgs, RunArgs};
use crate::paths::AppPaths;
use crate::settings::Settings;

const DEFAULT_SURFACE_SIZE: (u32, u32) = (800, 800);

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

pub fn run(args: RunArgs) -> Result<()> {
    let paths = AppPaths::discover()?;
    let settings = Settings::load_or_default(&paths.settings_file())?;
    tracing::debug!(
        config = %paths.config_dir().display(),
        ?settings,
        "resolved fractalis paths"
    );

    let catalog = load_catalog(&paths, args.catalog.as_deref())?;
    let palette_name = args.palette.as_deref().or(settings.palette.as_deref());
    let palette = match palette_name {
        Some(name) => resolve_palette(name)?,
        None => Palette::default(),
    };

    let initial = args
        .fractal
        .clone()
        .or_else(|| settings.fractal.clone())
        .unwrap_or_else(|| "mandelbrot".to_string());
    let Some(definition) = catalog.get(&initial) else {
        bail!(
            "unknown fractal '{initial}'; available: {}",
            catalog.keys().collect::<Vec<_>>().join(", ")
        );
    };

    let configuration = apply_overrides(
        settings.view,
        &args,
        settings.preset || args.preset,
        definition,
    );
    configuration
        .validate()
        .context("invalid initial view configuration")?;

    let surface_size = args
        .size
        .or(settings.size.map(|[width, height]| (width, height)))
        .unwrap_or(DEFAULT_SURFACE_SIZE);

    tracing::info!(
        fractal = %initial,
        width = surface_size.0,
        height = surface_size.1,
        iterations = configuration.iterations,
        "starting fractal preview"
    );

    renderer::run_preview(PreviewConfig {
        surface_size,
        fractals: catalog.iter().map(fractal_source).collect(),
        initial_fractal: Some(initial),
        configuration,
        palette,
    })
}

pub fn list(args: &RunArgs) -> Result<()> {
    let paths = AppPaths::discover()?;
    let catalog = load_catalog(&paths, args.catalog.as_deref())?;

    println!("Fractals:");
    for definition in catalog.iter() {
        println!(
            "  {:<16} {:<20} c={} p={}",
            definition.key,
            definition.name,
            Point::from(definition.default_c),
            Point::from(definition.default_p)
        );
    }
    Ok(())
}

/// Builds every catalog program through the shader front end without a GPU.
pub fn check(args: &RunArgs) -> Result<()> {
    let paths = AppPaths::discover()?;
    let catalog = load_catalog(&paths, args.catalog.as_deref())?;

    let mut failures = 0usize;
    for definition in catalog.iter() {
        let outcome = assemble_fragment(&FractalSnippets::new(&definition.setup, &definition.next))
            .and_then(|fragment| validate_program(VERTEX_SHADER_GLSL, &fragment).map(|_| ()));
        match outcome {
            Ok(()) => println!("  ok    {}", definition.key),
            Err(err) => {
                failures += 1;
                println!("  FAIL  {}", definition.key);
                for line in err.to_string().lines() {
                    println!("        {line}");
                }
            }
        }
    }

    println!("{} fractals checked, {failures} failed", catalog.len());
    if failures > 0 {
        bail!("{failures} fractal program(s) failed to build");
    }
    Ok(())
}

pub fn print_palette(args: &PaletteArgs) -> Result<()> {
    let palette = resolve_palette(&args.name)?;
    let data = palette
        .generate(args.steps)
        .with_context(|| format!("failed to generate palette '{}'", args.name))?;
    for texel in data.chunks_exact(4) {
        println!("{}", Rgba::new(texel[0], texel[1], texel[2], texel[3]));
    }
    Ok(())
}

/// Built-in catalog, then the user's `fractals.toml`, then `--catalog`.
fn load_catalog(paths: &AppPaths, extra: Option<&Path>) -> Result<FractalCatalog> {
    let mut catalog = FractalCatalog::builtin().context("built-in fractal catalog is invalid")?;

    let user_file = paths.catalog_file();
    if user_file.is_file() {
        catalog.merge(FractalCatalog::load(&user_file)?);
    }
    if let Some(path) = extra {
        catalog.merge(FractalCatalog::load(path)?);
    }
    Ok(catalog)
}

fn resolve_palette(name: &str) -> Result<Palette> {
    if let Some(palette) = Palette::builtin(name) {
        return Ok(palette);
    }
    let path = Path::new(name);
    if path.is_file() {
        return Palette::load(path);
    }
    bail!(
        "unknown palette '{name}'; expected one of {} or a palette file",
        Palette::BUILTIN_NAMES.join(", ")
    )
}

fn apply_overrides(
    mut config: Configuration,
    args: &RunArgs,
    preset: bool,
    definition: &FractalDefinition,
) -> Configuration {
    if preset {
        config.load_preset(
            Point::from(definition.default_c),
            Point::from(definition.default_p),
        );
    }
    if let Some(center) = args.center {
        config.center = center;
    }
    if let Some(axis_length) = args.axis_length {
        config.axis_length = axis_length;
    }
    if let Some(iterations) = args.iterations {
        config.iterations = iterations;
    }
    if let Some(c) = args.c {
        config.c = c;
    }
    if let Some(p) = args.p {
        config.p = p;
    }
    config
}

fn fractal_source(definition: &FractalDefinition) -> FractalSource {
    FractalSource {
        key: definition.key.clone(),
        name: definition.name.clone(),
        setup: definition.setup.clone(),
        next: definition.next.clone(),
        default_c: Point::from(definition.default_c),
        default_p: Point::from(definition.default_p),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn julia() -> FractalDefinition {
        FractalCatalog::builtin()
            .unwrap()
            .get("julia")
            .cloned()
            .unwrap()
    }

    #[test]
    fn flags_override_preset_values() {
        let args = RunArgs {
            c: Some(Point::new(0.25, 0.5)),
            iterations: Some(64),
            ..RunArgs::default()
        };
        let config = apply_overrides(Configuration::default(), &args, true, &julia());
        assert_eq!(config.c, Point::new(0.25, 0.5));
        assert_eq!(config.p, Point::ORIGIN);
        assert_eq!(config.iterations, 64);
        assert_eq!(config.axis_length, 4.0);
    }

    #[test]
    fn preset_loads_catalog_parameters() {
        let config =
            apply_overrides(Configuration::default(), &RunArgs::default(), true, &julia());
        assert_eq!(config.c, Point::new(-1.0, 0.0));
    }

    #[test]
    fn resolves_builtin_and_rejects_unknown_palettes() {
        assert_eq!(resolve_palette("rainbow").unwrap(), Palette::rainbow());
        let err = resolve_palette("no-such-palette").unwrap_err();
        assert!(err.to_string().contains("unknown palette"));
    }

    #[test]
    fn converts_catalog_entries() {
        let source = fractal_source(&julia());
        assert_eq!(source.key, "julia");
        assert_eq!(source.default_c, Point::new(-1.0, 0.0));
    }
}
