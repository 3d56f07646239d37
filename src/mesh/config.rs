use super::{
    cell::BoundingBox,
    error::{MeshError, Result},
    position::GridSize,
};

use json::JsonValue;
use std::fs::read_to_string;

/// Bounding box used when a configuration doesn't provide one
pub const DEFAULT_BOX: [f64; 4] = [0.0, 1.0, 0.0, 1.0];

/// Everything needed to construct a [`Mesh`](super::Mesh)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeshConfig {
    pub bbox: BoundingBox,
    pub grid: Option<GridSize>,
}

impl MeshConfig {
    /// Validate a bounding box and optional grid
    pub fn new(bbox: &[f64], grid: Option<GridSize>) -> Result<Self> {
        let bbox = BoundingBox::new(bbox)?;
        if let Some(grid) = grid {
            grid.validate(bbox.dim())?;
        }
        Ok(Self { bbox, grid })
    }

    /// Parse a mesh configuration from a JSON string
    ///
    /// ```text
    /// {
    ///     "box": [x0, x1, y0, y1],
    ///     "grid_size": [nx, ny]
    /// }
    /// ```
    ///
    /// `box` may also be `[x0, x1]` with `grid_size` as `[nx]` or `nx`. Both fields are optional:
    /// `box` defaults to the unit square and the root is not gridded without `grid_size`.
    pub fn from_json(contents: &str) -> Result<Self> {
        let config = json::parse(contents)?;
        if !config.is_object() {
            return Err(MeshError::Config(
                "expected a JSON object with 'box' and 'grid_size' fields".to_owned(),
            ));
        }

        let bbox = match &config["box"] {
            JsonValue::Null => DEFAULT_BOX.to_vec(),
            bounds => parse_array(bounds, "box", JsonValue::as_f64)?,
        };

        let grid = match &config["grid_size"] {
            JsonValue::Null => None,
            size => match size.as_usize() {
                Some(nx) => Some(GridSize::One(nx)),
                None => match parse_array(size, "grid_size", JsonValue::as_usize)?.as_slice() {
                    &[nx] => Some(GridSize::One(nx)),
                    &[nx, ny] => Some(GridSize::Two(nx, ny)),
                    _ => {
                        return Err(MeshError::MalformedGrid(format!(
                            "{}; expected [nx] or [nx, ny]",
                            size.dump()
                        )))
                    }
                },
            },
        };

        Self::new(&bbox, grid)
    }

    /// Read and parse a JSON mesh configuration file (see [`MeshConfig::from_json`])
    pub fn from_file(path: impl AsRef<str>) -> Result<Self> {
        let contents = read_to_string(path.as_ref())?;
        Self::from_json(&contents)
    }
}

fn parse_array<T>(
    value: &JsonValue,
    field: &str,
    parse: impl Fn(&JsonValue) -> Option<T>,
) -> Result<Vec<T>> {
    if !value.is_array() {
        return Err(MeshError::Config(format!(
            "'{}' must be an array; found {}",
            field,
            value.dump()
        )));
    }
    value
        .members()
        .map(|member| {
            parse(member).ok_or_else(|| {
                MeshError::Config(format!("invalid entry in '{}': {}", field, member.dump()))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_config() {
        let config =
            MeshConfig::from_json(r#"{ "box": [0.0, 2.0, -1.0, 1.0], "grid_size": [4, 2] }"#)
                .unwrap();
        assert_eq!(config.bbox.x, [0.0, 2.0]);
        assert_eq!(config.bbox.y, Some([-1.0, 1.0]));
        assert_eq!(config.grid, Some(GridSize::Two(4, 2)));
    }

    #[test]
    fn defaults() {
        let config = MeshConfig::from_json("{}").unwrap();
        assert_eq!(config.bbox.to_vec(), DEFAULT_BOX.to_vec());
        assert_eq!(config.grid, None);

        let interval = MeshConfig::from_json(r#"{ "box": [0, 4], "grid_size": 4 }"#).unwrap();
        assert_eq!(interval.bbox.dim(), 1);
        assert_eq!(interval.grid, Some(GridSize::One(4)));
    }

    #[test]
    fn malformed_configs() {
        assert!(matches!(
            MeshConfig::from_json("{ box: }"),
            Err(MeshError::Config(_))
        ));
        assert!(matches!(
            MeshConfig::from_json("[0, 1]"),
            Err(MeshError::Config(_))
        ));
        assert!(matches!(
            MeshConfig::from_json(r#"{ "box": "unit" }"#),
            Err(MeshError::Config(_))
        ));
        assert!(matches!(
            MeshConfig::from_json(r#"{ "box": [1, 0] }"#),
            Err(MeshError::MalformedBox(_))
        ));
        assert!(matches!(
            MeshConfig::from_json(r#"{ "grid_size": [2, 2, 2] }"#),
            Err(MeshError::MalformedGrid(_))
        ));
        // a 1D grid beneath a 2D box
        assert!(matches!(
            MeshConfig::from_json(r#"{ "grid_size": [3] }"#),
            Err(MeshError::MalformedGrid(_))
        ));
        assert!(matches!(
            MeshConfig::from_file("./no_such_config.json"),
            Err(MeshError::Io(_))
        ));
    }
}
