//! Coordinate reference system tagging.
//!
//! The analysis operates entirely in one equal-area planar CRS with
//! meters as the unit; every input dataset must already be projected
//! into it. This module only identifies and compares reference systems
//! — it never reprojects. A mismatch at ingest is fatal.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// PROJ definition of USGS CONUS Albers, the projection the NHD-derived
/// datasets are delivered in.
const CONUS_ALBERS_PROJ: &str =
    "+proj=aea +lat_1=29.5 +lat_2=45.5 +lat_0=37.5 +lon_0=-96 +x_0=0 +y_0=0 \
     +datum=NAD83 +units=m +no_defs";

/// Identifies the coordinate reference system of a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Crs {
    /// EPSG code, e.g. 5070
    Epsg(u32),
    /// PROJ string, for systems without a usable EPSG registration
    Proj(String),
}

impl Crs {
    /// USGS CONUS Albers equal-area, the default analysis projection.
    pub fn conus_albers() -> Self {
        Crs::Proj(CONUS_ALBERS_PROJ.to_string())
    }

    /// A short identifier for display and error messages.
    pub fn identifier(&self) -> String {
        match self {
            Crs::Epsg(code) => format!("EPSG:{}", code),
            Crs::Proj(proj) => proj.clone(),
        }
    }

    /// Check whether two CRS refer to the same system.
    ///
    /// Comparison is literal: equal EPSG codes or equal PROJ strings.
    /// Distinct spellings of the same projection are treated as
    /// different, which errs on the side of refusing mixed inputs.
    pub fn is_equivalent(&self, other: &Crs) -> bool {
        self == other
    }

    /// Error with `CrsMismatch` unless `other` is equivalent to `self`.
    pub fn ensure_matches(&self, other: &Crs) -> Result<()> {
        if self.is_equivalent(other) {
            Ok(())
        } else {
            Err(Error::CrsMismatch(self.identifier(), other.identifier()))
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}
