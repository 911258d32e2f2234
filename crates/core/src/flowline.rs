//! Flowline segments and stream size classes.

use geo::{Coord, LineString};
use std::fmt;

use crate::error::{Error, Result};
use crate::geometry::{line_length, sinuosity, MIN_LENGTH};
use crate::index::Bbox;

/// Ordinal stream size class.
///
/// Classes follow the cutoffs used by the southeastern aquatic barrier
/// inventories, binned on total upstream drainage area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SizeClass {
    Headwater,
    SmallCreek,
    Creek,
    SmallRiver,
    River,
    LargeRiver,
    GreatRiver,
}

impl SizeClass {
    /// All classes in ascending order.
    pub const ALL: [SizeClass; 7] = [
        SizeClass::Headwater,
        SizeClass::SmallCreek,
        SizeClass::Creek,
        SizeClass::SmallRiver,
        SizeClass::River,
        SizeClass::LargeRiver,
        SizeClass::GreatRiver,
    ];

    /// Classify from total upstream drainage area in square kilometers.
    pub fn from_drainage_area(sq_km: f64) -> Self {
        if sq_km < 10.0 {
            SizeClass::Headwater
        } else if sq_km < 100.0 {
            SizeClass::SmallCreek
        } else if sq_km < 518.0 {
            SizeClass::Creek
        } else if sq_km < 2_590.0 {
            SizeClass::SmallRiver
        } else if sq_km < 10_000.0 {
            SizeClass::River
        } else if sq_km < 25_000.0 {
            SizeClass::LargeRiver
        } else {
            SizeClass::GreatRiver
        }
    }

    /// Compact inventory code, e.g. "1a" for headwaters.
    pub fn code(&self) -> &'static str {
        match self {
            SizeClass::Headwater => "1a",
            SizeClass::SmallCreek => "1b",
            SizeClass::Creek => "2",
            SizeClass::SmallRiver => "3a",
            SizeClass::River => "3b",
            SizeClass::LargeRiver => "4",
            SizeClass::GreatRiver => "5",
        }
    }

    /// Zero-based ordinal, stable across releases; used by the table codec.
    pub fn ordinal(&self) -> u8 {
        Self::ALL.iter().position(|c| c == self).unwrap_or(0) as u8
    }

    pub fn from_ordinal(ordinal: u8) -> Option<Self> {
        Self::ALL.get(ordinal as usize).copied()
    }
}

impl fmt::Display for SizeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A directed stream segment.
///
/// The geometry runs downstream: first coordinate = upstream end, last
/// coordinate = downstream end. `length` and `sinuosity` are derived at
/// construction and stay consistent with the geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct Flowline {
    /// Globally unique segment id. Original vendor NHDPlusID for
    /// unmodified flowlines, freshly minted for cut products.
    pub id: u64,
    /// Vendor id of the catchment this segment drains; cut products keep
    /// their parent's, so external per-catchment tables keep joining.
    pub catchment_id: u64,
    pub geometry: LineString<f64>,
    /// Meters.
    pub length: f64,
    pub sinuosity: f64,
    pub size_class: SizeClass,
    /// Basin (4-digit hydrologic unit) this segment was extracted from.
    pub huc4: String,
    pub gnis_name: Option<String>,
    /// Participates in a braided or divergent flow feature.
    pub loop_flag: bool,
    /// Intermittent or ephemeral flow regime.
    pub intermittent: bool,
}

impl Flowline {
    /// Create a flowline, validating the geometry and deriving `length`
    /// and `sinuosity`.
    ///
    /// Errors with `EmptyGeometry` when the line has fewer than two
    /// coordinates or is shorter than [`MIN_LENGTH`].
    pub fn new(
        id: u64,
        geometry: LineString<f64>,
        huc4: impl Into<String>,
        size_class: SizeClass,
    ) -> Result<Self> {
        if geometry.0.len() < 2 {
            return Err(Error::EmptyGeometry(id));
        }
        let length = line_length(&geometry);
        if length < MIN_LENGTH {
            return Err(Error::EmptyGeometry(id));
        }
        let sinuosity = sinuosity(&geometry);
        Ok(Self {
            id,
            catchment_id: id,
            geometry,
            length,
            sinuosity,
            size_class,
            huc4: huc4.into(),
            gnis_name: None,
            loop_flag: false,
            intermittent: false,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.gnis_name = Some(name.into());
        self
    }

    pub fn with_catchment(mut self, catchment_id: u64) -> Self {
        self.catchment_id = catchment_id;
        self
    }

    pub fn with_loop(mut self, loop_flag: bool) -> Self {
        self.loop_flag = loop_flag;
        self
    }

    pub fn with_intermittent(mut self, intermittent: bool) -> Self {
        self.intermittent = intermittent;
        self
    }

    /// Derive a cut product: new id and geometry, every other attribute
    /// inherited, `length` and `sinuosity` recomputed.
    pub fn child(&self, id: u64, geometry: LineString<f64>) -> Result<Flowline> {
        let mut child = Flowline::new(id, geometry, self.huc4.clone(), self.size_class)?;
        child.catchment_id = self.catchment_id;
        child.gnis_name = self.gnis_name.clone();
        child.loop_flag = self.loop_flag;
        child.intermittent = self.intermittent;
        Ok(child)
    }

    /// Upstream end of the segment.
    pub fn start_point(&self) -> Coord<f64> {
        self.geometry.0[0]
    }

    /// Downstream end of the segment.
    pub fn end_point(&self) -> Coord<f64> {
        self.geometry.0[self.geometry.0.len() - 1]
    }

    pub fn bbox(&self) -> Bbox {
        Bbox::of_line(&self.geometry)
    }
}
