//! Configuration types for hydro runs.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Top-level configuration for one subdomain of a hydro run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HydroConfig {
    /// Mesh dimensions and chunking.
    pub mesh: MeshConfig,
    /// Courant safety factor.
    pub cfl: f64,
    /// Volume-change safety factor.
    pub cflv: f64,
    /// Initial density for every zone.
    pub density_init: f64,
    /// Initial specific internal energy for every zone.
    pub energy_init: f64,
    /// Optional rectangular region with its own initial state.
    #[serde(default)]
    pub subregion: Option<Subregion>,
    /// Initial radial speed of every point (0 leaves the mesh at rest).
    #[serde(default)]
    pub radial_velocity_init: f64,
    /// Reflecting boundary planes `x = c`.
    #[serde(default)]
    pub bcx: Vec<f64>,
    /// Reflecting boundary planes `y = c`.
    #[serde(default)]
    pub bcy: Vec<f64>,
    /// Index of this subdomain within the run.
    #[serde(default)]
    pub subdomain_id: usize,
    /// Total number of subdomains taking part in global reductions.
    #[serde(default = "default_num_subdomains")]
    pub num_subdomains: usize,
    /// Global time-step control.
    #[serde(default)]
    pub driver: DriverConfig,
}

fn default_num_subdomains() -> usize {
    1
}

impl Default for HydroConfig {
    fn default() -> Self {
        Self {
            mesh: MeshConfig::default(),
            cfl: 0.6,
            cflv: 0.1,
            density_init: 1.0,
            energy_init: 0.0,
            subregion: None,
            radial_velocity_init: 0.0,
            bcx: vec![0.0, 1.0],
            bcy: vec![0.0, 1.0],
            subdomain_id: 0,
            num_subdomains: 1,
            driver: DriverConfig::default(),
        }
    }
}

/// Rectangular mesh generation parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshConfig {
    /// Zones along X (the radial direction).
    pub nzones_x: usize,
    /// Zones along Y (the axial direction).
    pub nzones_y: usize,
    /// Extent along X.
    pub len_x: f64,
    /// Extent along Y.
    pub len_y: f64,
    /// Zones (and points) per parallel chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

fn default_chunk_size() -> usize {
    64
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            nzones_x: 16,
            nzones_y: 16,
            len_x: 1.0,
            len_y: 1.0,
            chunk_size: default_chunk_size(),
        }
    }
}

/// Region `[xmin, xmax] x [ymin, ymax]` initialized with its own state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subregion {
    pub xmin: f64,
    pub xmax: f64,
    pub ymin: f64,
    pub ymax: f64,
    pub density_init_sub: f64,
    pub energy_init_sub: f64,
}

impl Subregion {
    /// Whether `(x, y)` lies strictly inside the region, widened by `1e-12`.
    #[inline]
    pub fn contains(&self, x: f64, y: f64) -> bool {
        const EPS: f64 = 1e-12;
        x > self.xmin - EPS && x < self.xmax + EPS && y > self.ymin - EPS && y < self.ymax + EPS
    }
}

/// Global time-step control used by the driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Stop time.
    pub tstop: f64,
    /// Stop cycle.
    pub cstop: u64,
    /// Largest time step ever taken.
    pub dtmax: f64,
    /// Time step of the first cycle.
    pub dtinit: f64,
    /// Largest growth factor between consecutive time steps.
    pub dtfac: f64,
    /// Log progress every this many cycles.
    pub dtreport: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            tstop: 1.0,
            cstop: 1000,
            dtmax: 1.0,
            dtinit: 1e-3,
            dtfac: 1.2,
            dtreport: 10,
        }
    }
}

impl HydroConfig {
    /// Load and validate a configuration from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        let config: HydroConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mesh.nzones_x == 0 || self.mesh.nzones_y == 0 {
            return Err(ConfigError::InvalidDimensions);
        }
        if !(self.mesh.len_x > 0.0 && self.mesh.len_y > 0.0) {
            return Err(ConfigError::InvalidExtent);
        }
        if self.mesh.chunk_size == 0 {
            return Err(ConfigError::InvalidChunkSize);
        }
        if !(self.cfl > 0.0) || !(self.cflv > 0.0) {
            return Err(ConfigError::InvalidSafetyFactor);
        }
        if !(self.density_init > 0.0) {
            return Err(ConfigError::InvalidDensity(self.density_init));
        }
        if let Some(sub) = &self.subregion {
            if !(sub.density_init_sub > 0.0) {
                return Err(ConfigError::InvalidDensity(sub.density_init_sub));
            }
            if sub.xmin > sub.xmax || sub.ymin > sub.ymax {
                return Err(ConfigError::InvalidSubregion);
            }
        }
        if self.num_subdomains == 0 || self.subdomain_id >= self.num_subdomains {
            return Err(ConfigError::InvalidSubdomain {
                id: self.subdomain_id,
                count: self.num_subdomains,
            });
        }
        let d = &self.driver;
        if !(d.dtinit > 0.0) || !(d.dtmax > 0.0) || !(d.dtfac > 0.0) {
            return Err(ConfigError::InvalidTimeStep);
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Zone counts (nzones_x, nzones_y) must be non-zero")]
    InvalidDimensions,
    #[error("Mesh extents (len_x, len_y) must be positive")]
    InvalidExtent,
    #[error("Chunk size must be non-zero")]
    InvalidChunkSize,
    #[error("Safety factors cfl and cflv must be positive")]
    InvalidSafetyFactor,
    #[error("Initial density must be positive, got {0}")]
    InvalidDensity(f64),
    #[error("Subregion bounds are inverted")]
    InvalidSubregion,
    #[error("Subdomain {id} is out of range for {count} subdomains")]
    InvalidSubdomain { id: usize, count: usize },
    #[error("Driver time steps (dtinit, dtmax, dtfac) must be positive")]
    InvalidTimeStep,
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_is_valid() {
        assert!(HydroConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_zones() {
        let mut config = HydroConfig::default();
        config.mesh.nzones_y = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidDimensions)));
    }

    #[test]
    fn test_rejects_subdomain_out_of_range() {
        let config = HydroConfig {
            subdomain_id: 2,
            num_subdomains: 2,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidSubdomain { id: 2, count: 2 })
        ));
    }

    #[test]
    fn test_subregion_contains_is_strict_with_tolerance() {
        let sub = Subregion {
            xmin: 0.0,
            xmax: 0.5,
            ymin: 0.0,
            ymax: 0.5,
            density_init_sub: 2.0,
            energy_init_sub: 3.0,
        };
        assert!(sub.contains(0.25, 0.25));
        assert!(sub.contains(0.5, 0.5));
        assert!(sub.contains(0.5 + 5e-13, 0.25));
        assert!(!sub.contains(0.5 + 1e-9, 0.25));
        assert!(!sub.contains(0.75, 0.25));
    }

    #[test]
    fn test_optional_sections_default() {
        let json = r#"{
            "mesh": { "nzones_x": 4, "nzones_y": 2, "len_x": 1.0, "len_y": 0.5 },
            "cfl": 0.5,
            "cflv": 0.2,
            "density_init": 1.0,
            "energy_init": 2.0
        }"#;
        let config: HydroConfig = serde_json::from_str(json).unwrap();
        assert!(config.subregion.is_none());
        assert!(config.bcx.is_empty());
        assert_eq!(config.num_subdomains, 1);
        assert_eq!(config.mesh.chunk_size, 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hydro.json");
        let config = HydroConfig {
            energy_init: 0.25,
            ..Default::default()
        };
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(serde_json::to_string_pretty(&config).unwrap().as_bytes())
            .unwrap();

        let loaded = HydroConfig::from_json_file(&path).unwrap();
        assert_eq!(loaded.energy_init, 0.25);
        assert_eq!(loaded.bcx, vec![0.0, 1.0]);
    }

    #[test]
    fn test_from_json_file_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            HydroConfig::from_json_file(&path),
            Err(ConfigError::Parse(_))
        ));
    }
}
