use std::path::PathBuf;

use clap::{Parser, Subcommand};
use renderer::Point;

#[derive(Parser, Debug)]
#[command(
    name = "fractalis",
    author,
    version,
    about = "GPU escape-time fractal explorer"
)]
pub struct Cli {
    #[command(flatten)]
    pub run: RunArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Parser, Debug, Default)]
pub struct RunArgs {
    /// Fractal shown first (see `fractalis list`).
    #[arg(long, short = 'f', value_name = "KEY")]
    pub fractal: Option<String>,

    /// Window size in pixels (e.g. `800x800`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_surface_size)]
    pub size: Option<(u32, u32)>,

    /// Iteration budget; also the palette resolution.
    #[arg(long, value_name = "COUNT", value_parser = parse_iterations)]
    pub iterations: Option<u32>,

    /// Center of the view in the complex plane.
    #[arg(long, value_name = "X,Y", value_parser = parse_point, allow_hyphen_values = true)]
    pub center: Option<Point>,

    /// Width and height of the view in complex-plane units.
    #[arg(long, value_name = "LENGTH", value_parser = parse_axis_length)]
    pub axis_length: Option<f64>,

    /// Fractal parameter `c` (the Julia constant for Julia-type fractals).
    #[arg(long = "c", value_name = "X,Y", value_parser = parse_point, allow_hyphen_values = true)]
    pub c: Option<Point>,

    /// Fractal parameter `p` (Phoenix feedback constant).
    #[arg(long = "p", value_name = "X,Y", value_parser = parse_point, allow_hyphen_values = true)]
    pub p: Option<Point>,

    /// Start with the selected fractal's preset `c` and `p`.
    #[arg(long)]
    pub preset: bool,

    /// Built-in palette name (`default`, `rainbow`) or a palette TOML file.
    #[arg(long, value_name = "NAME|FILE", env = "FRACTALIS_PALETTE")]
    pub palette: Option<String>,

    /// Extra fractal catalog merged over the built-in and user catalogs.
    #[arg(long, value_name = "FILE", env = "FRACTALIS_CATALOG")]
    pub catalog: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the available fractals and their preset parameters.
    List,
    /// Compile and link every fractal program without opening a window.
    Check,
    /// Print a palette lookup table, one RGBA texel per line.
    Palette(PaletteArgs),
}

#[derive(Parser, Debug)]
pub struct PaletteArgs {
    /// Built-in palette name or palette TOML file.
    #[arg(value_name = "NAME|FILE", default_value = "default")]
    pub name: String,

    /// Number of texels to generate.
    #[arg(long, value_name = "COUNT", default_value_t = 16, value_parser = parse_iterations)]
    pub steps: u32,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_surface_size(value: &str) -> Result<(u32, u32), String> {
    let trimmed = value.trim();
    let (width, height) = trimmed
        .split_once(['x', 'X', '×'])
        .ok_or_else(|| "expected WxH format, e.g. 800x800".to_string())?;

    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| format!("invalid width '{}'", width.trim()))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| format!("invalid height '{}'", height.trim()))?;

    if width == 0 || height == 0 {
        return Err("surface dimensions must be greater than zero".to_string());
    }
    Ok((width, height))
}

pub fn parse_point(value: &str) -> Result<Point, String> {
    let (x, y) = value
        .trim()
        .split_once(',')
        .ok_or_else(|| format!("expected X,Y but got '{value}'"))?;
    let parse = |part: &str| -> Result<f64, String> {
        let number: f64 = part
            .trim()
            .parse()
            .map_err(|_| format!("invalid number '{}'", part.trim()))?;
        if number.is_finite() {
            Ok(number)
        } else {
            Err(format!("'{}' is not a finite number", part.trim()))
        }
    };
    Ok(Point::new(parse(x)?, parse(y)?))
}

pub fn parse_iterations(value: &str) -> Result<u32, String> {
    let count: u32 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid iteration count '{value}'"))?;
    if count == 0 {
        return Err("iteration count must be greater than zero".to_string());
    }
    Ok(count)
}

pub fn parse_axis_length(value: &str) -> Result<f64, String> {
    let length: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid axis length '{value}'"))?;
    if !(length.is_finite() && length > 0.0) {
        return Err("axis length must be a finite value greater than zero".to_string());
    }
    Ok(length)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_surface_sizes() {
        assert_eq!(parse_surface_size("800x600").unwrap(), (800, 600));
        assert_eq!(parse_surface_size(" 1024 X 768 ").unwrap(), (1024, 768));
        assert!(parse_surface_size("800").is_err());
        assert!(parse_surface_size("0x600").is_err());
        assert!(parse_surface_size("axb").is_err());
    }

    #[test]
    fn parses_points() {
        assert_eq!(parse_point("-0.75,0.1").unwrap(), Point::new(-0.75, 0.1));
        assert_eq!(parse_point(" 1 , -2 ").unwrap(), Point::new(1.0, -2.0));
        assert!(parse_point("1").is_err());
        assert!(parse_point("1,nope").is_err());
        assert!(parse_point("inf,0").is_err());
    }

    #[test]
    fn rejects_degenerate_view_values() {
        assert_eq!(parse_iterations("512").unwrap(), 512);
        assert!(parse_iterations("0").is_err());
        assert!(parse_iterations("-4").is_err());
        assert_eq!(parse_axis_length("0.5").unwrap(), 0.5);
        assert!(parse_axis_length("0").is_err());
        assert!(parse_axis_length("NaN").is_err());
    }

    #[test]
    fn accepts_negative_coordinates_as_values() {
        let cli = Cli::try_parse_from([
            "fractalis",
            "--fractal",
            "julia",
            "--center",
            "-0.5,0.25",
            "--c",
            "-0.8,0.156",
            "--iterations",
            "512",
        ])
        .unwrap();
        assert_eq!(cli.run.fractal.as_deref(), Some("julia"));
        assert_eq!(cli.run.center, Some(Point::new(-0.5, 0.25)));
        assert_eq!(cli.run.c, Some(Point::new(-0.8, 0.156)));
        assert_eq!(cli.run.iterations, Some(512));
        assert!(cli.command.is_none());
    }

    #[test]
    fn parses_palette_subcommand() {
        let cli = Cli::try_parse_from(["fractalis", "palette", "rainbow", "--steps", "4"]).unwrap();
        match cli.command {
            Some(Command::Palette(args)) => {
                assert_eq!(args.name, "rainbow");
                assert_eq!(args.steps, 4);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
