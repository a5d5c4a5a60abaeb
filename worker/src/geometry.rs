use std::{env, fs::File, io, io::BufReader, path::Path, str::FromStr};

use comms::specs::{DispatcherSpec, GeometrySpec};
use model::Geometry;

/// Reads the dispatcher's geometry from the environment.
///
/// `DISPATCHER_SPEC` names the dispatcher's JSON spec, whose `geometry` is the starting
/// point. `INPUT_PLANES`, `BOARD_SIZE` and `VALUE_HIDDEN` override single dimensions.
/// Without any of them the geometry is the default `GeometrySpec`.
///
/// # Returns
/// The geometry or an `InvalidInput` error naming the variable that doesn't parse.
pub fn geometry_from_env() -> io::Result<Geometry> {
    let base = match env::var("DISPATCHER_SPEC") {
        Ok(path) => spec_geometry(path)?,
        Err(_) => GeometrySpec::default(),
    };

    geometry_from(base, |key| env::var(key).ok())
}

/// Reads the `geometry` of the dispatcher spec at `path`.
pub fn spec_geometry(path: impl AsRef<Path>) -> io::Result<GeometrySpec> {
    let spec: DispatcherSpec = serde_json::from_reader(BufReader::new(File::open(path)?))?;
    Ok(spec.geometry)
}

/// Applies the overrides found through `lookup` to `base`.
pub fn geometry_from(
    base: GeometrySpec,
    lookup: impl Fn(&str) -> Option<String>,
) -> io::Result<Geometry> {
    Ok(Geometry {
        input_planes: parse_or(&lookup, "INPUT_PLANES", base.input_planes)?,
        board_size: parse_or(&lookup, "BOARD_SIZE", base.board_size)?,
        value_hidden: parse_or(&lookup, "VALUE_HIDDEN", base.value_hidden)?,
    })
}

/// Parses the variable `key`, falling back to `default` if it is unset.
pub fn parse_or<T: FromStr>(
    lookup: impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> io::Result<T> {
    match lookup(key) {
        Some(value) => value.parse().map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, format!("invalid {key}: {value:?}"))
        }),
        None => Ok(default),
    }
}
