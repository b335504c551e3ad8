//! Generic parameters functions
//!
//! Two flavours of parameters are supported:
//!
//! - Typed parameter structs, deserialised straight from a TOML file with
//!   [`load`].
//! - Named gain vectors with defaults, held in a [`ParameterMap`]. A
//!   controller registers the defaults it needs with
//!   [`ParameterMap::set_default`] and any value already present (for example
//!   from a TOML file) takes precedence over the default. Maps are grouped by
//!   namespace in a [`ParameterRepository`], usually one namespace per
//!   controller.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::Vector3;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::read_to_string;
use thiserror::Error;
use toml;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A set of named scalar or vector parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterMap {
    values: BTreeMap<String, ParamValue>,
}

/// A collection of parameter maps indexed by namespace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterRepository {
    namespaces: BTreeMap<String, ParameterMap>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// An error that occurs during loading of a parameter file.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("The software root environment variable (WBC_SW_ROOT) is not set")]
    SwRootNotSet,

    #[error("Cannot load the parmeter file: {0}")]
    FileLoadError(std::io::Error),

    #[error("Cannot read the parameter file: {0}")]
    DeserialiseError(toml::de::Error),
}

/// An error that occurs when reading a value out of a `ParameterMap`.
#[derive(Debug, Error, PartialEq)]
pub enum ParamError {
    #[error("No parameter named \"{0}\" and no default has been set")]
    Missing(String),

    #[error("Parameter \"{name}\" has {found} element(s), expected {expected}")]
    WrongShape {
        name: String,
        expected: usize,
        found: usize,
    },
}

/// A single parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Scalar(f64),
    Vector(Vec<f64>),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ParamValue {
    fn from_slice(values: &[f64]) -> Self {
        match values {
            [v] => ParamValue::Scalar(*v),
            _ => ParamValue::Vector(values.to_vec()),
        }
    }

    fn len(&self) -> usize {
        match self {
            ParamValue::Scalar(_) => 1,
            ParamValue::Vector(v) => v.len(),
        }
    }
}

impl ParameterMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a default value for the parameter.
    ///
    /// Has no effect if the parameter already has a value.
    pub fn set_default(&mut self, name: &str, values: &[f64]) {
        self.values
            .entry(name.to_string())
            .or_insert_with(|| ParamValue::from_slice(values));
    }

    /// Overwrite the value of a parameter.
    pub fn set(&mut self, name: &str, values: &[f64]) {
        self.values
            .insert(name.to_string(), ParamValue::from_slice(values));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Get a scalar parameter.
    pub fn get(&self, name: &str) -> Result<f64, ParamError> {
        match self.values.get(name) {
            Some(ParamValue::Scalar(v)) => Ok(*v),
            Some(ParamValue::Vector(v)) if v.len() == 1 => Ok(v[0]),
            Some(other) => Err(ParamError::WrongShape {
                name: name.to_string(),
                expected: 1,
                found: other.len(),
            }),
            None => Err(ParamError::Missing(name.to_string())),
        }
    }

    /// Get a vector parameter of any length.
    pub fn get_vector(&self, name: &str) -> Result<Vec<f64>, ParamError> {
        match self.values.get(name) {
            Some(ParamValue::Scalar(v)) => Ok(vec![*v]),
            Some(ParamValue::Vector(v)) => Ok(v.clone()),
            None => Err(ParamError::Missing(name.to_string())),
        }
    }

    /// Get a vector parameter which must have exactly three elements.
    pub fn get_vector3(&self, name: &str) -> Result<Vector3<f64>, ParamError> {
        let v = self.get_vector(name)?;

        if v.len() != 3 {
            return Err(ParamError::WrongShape {
                name: name.to_string(),
                expected: 3,
                found: v.len(),
            });
        }

        Ok(Vector3::new(v[0], v[1], v[2]))
    }

    /// Iterate over the names of all parameters in the map.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.values.keys().map(|k| k.as_str())
    }
}

impl ParameterRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a repository from a TOML string, one table per namespace.
    pub fn from_toml_str(s: &str) -> Result<Self, LoadError> {
        toml::from_str(s).map_err(LoadError::DeserialiseError)
    }

    /// Get the map for the given namespace, creating it if needed.
    pub fn namespace_mut(&mut self, namespace: &str) -> &mut ParameterMap {
        self.namespaces.entry(namespace.to_string()).or_default()
    }

    pub fn namespace(&self, namespace: &str) -> Option<&ParameterMap> {
        self.namespaces.get(namespace)
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Load a parameter file
///
/// The file path is relative to the "$WBC_SW_ROOT/params" directory
pub fn load<P>(param_file_path: &str) -> Result<P, LoadError>
where
    P: DeserializeOwned,
{
    let mut path = crate::host::get_sw_root().map_err(|_| LoadError::SwRootNotSet)?;
    path.push("params");
    path.push(param_file_path);

    let params_str = read_to_string(path).map_err(LoadError::FileLoadError)?;

    toml::from_str(params_str.as_str()).map_err(LoadError::DeserialiseError)
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_defaults_do_not_override() {
        let mut map = ParameterMap::new();
        map.set("com_position_proportional_gains", &[0.0, 0.0, 4000.0]);

        map.set_default("com_position_proportional_gains", &[0.0, 0.0, 5000.0]);
        map.set_default("com_position_max_integral_error", &[0.0]);

        assert_eq!(
            map.get_vector3("com_position_proportional_gains").unwrap(),
            Vector3::new(0.0, 0.0, 4000.0)
        );
        assert_eq!(map.get("com_position_max_integral_error").unwrap(), 0.0);
    }

    #[test]
    fn test_shape_errors() {
        let mut map = ParameterMap::new();
        map.set("gains", &[1.0, 2.0]);

        assert_eq!(
            map.get_vector3("gains"),
            Err(ParamError::WrongShape {
                name: "gains".into(),
                expected: 3,
                found: 2
            })
        );
        assert!(map.get("gains").is_err());
        assert_eq!(
            map.get("not_there"),
            Err(ParamError::Missing("not_there".into()))
        );
    }

    #[test]
    fn test_repository_from_toml() {
        let repo = ParameterRepository::from_toml_str(
            r#"
            [stand]
            body_orientation_proportional_gains = [5000.0, 5000.0, 2500.0]
            body_orientation_max_integral_error = 0.5

            [step]
            swing_ground_clearance = 0.1
            "#,
        )
        .unwrap();

        let stand = repo.namespace("stand").unwrap();
        assert_eq!(
            stand
                .get_vector3("body_orientation_proportional_gains")
                .unwrap(),
            Vector3::new(5000.0, 5000.0, 2500.0)
        );
        assert_eq!(stand.get("body_orientation_max_integral_error").unwrap(), 0.5);
        assert_eq!(
            repo.namespace("step")
                .unwrap()
                .get("swing_ground_clearance")
                .unwrap(),
            0.1
        );
        assert!(repo.namespace("walk").is_none());
    }
}
