//! On-disk serialization for flowline stores and join tables.
//!
//! Stores round-trip through the columnar [`Table`] format with geometry
//! as WKB. A reloaded store rebuilds its spatial index, so it answers
//! queries exactly like the one that was written.

pub mod table;
pub mod wkb;

pub use table::{Column, ColumnType, Table};

use std::collections::BTreeMap;
use std::path::Path;

use crate::crs::Crs;
use crate::error::{Error, Result};
use crate::flowline::{Flowline, SizeClass};
use crate::joins::JoinTable;
use crate::store::FlowlineStore;

/// Convert a store to a table. `network_ids`, when given, adds a
/// `network_id` column (0 for unassigned flowlines).
///
/// Missing GNIS names are stored as empty strings; real stream names are
/// never empty.
pub fn store_to_table(
    store: &FlowlineStore,
    crs: &Crs,
    network_ids: Option<&BTreeMap<u64, u64>>,
) -> Result<Table> {
    let n = store.len();
    let mut id = Vec::with_capacity(n);
    let mut catchment = Vec::with_capacity(n);
    let mut huc4 = Vec::with_capacity(n);
    let mut gnis_name = Vec::with_capacity(n);
    let mut size_class = Vec::with_capacity(n);
    let mut loop_flag = Vec::with_capacity(n);
    let mut intermittent = Vec::with_capacity(n);
    let mut length = Vec::with_capacity(n);
    let mut sinuosity = Vec::with_capacity(n);
    let mut geometry = Vec::with_capacity(n);
    let mut network = Vec::with_capacity(n);

    for flowline in store.iter() {
        id.push(flowline.id);
        catchment.push(flowline.catchment_id);
        huc4.push(flowline.huc4.clone());
        gnis_name.push(flowline.gnis_name.clone().unwrap_or_default());
        size_class.push(flowline.size_class.ordinal());
        loop_flag.push(flowline.loop_flag);
        intermittent.push(flowline.intermittent);
        length.push(flowline.length);
        sinuosity.push(flowline.sinuosity);
        geometry.push(wkb::encode_linestring(&flowline.geometry));
        if let Some(assignment) = network_ids {
            network.push(assignment.get(&flowline.id).copied().unwrap_or(0));
        }
    }

    let mut table = Table::with_crs(crs.clone());
    table.push_column("id", Column::U64(id))?;
    table.push_column("catchment_id", Column::U64(catchment))?;
    table.push_column("huc4", Column::Str(huc4))?;
    table.push_column("gnis_name", Column::Str(gnis_name))?;
    table.push_column("size_class", Column::U8(size_class))?;
    table.push_column("loop", Column::Bool(loop_flag))?;
    table.push_column("intermittent", Column::Bool(intermittent))?;
    table.push_column("length", Column::F64(length))?;
    table.push_column("sinuosity", Column::F64(sinuosity))?;
    table.push_column("geometry", Column::Bin(geometry))?;
    if network_ids.is_some() {
        table.push_column("network_id", Column::U64(network))?;
    }
    Ok(table)
}

/// Rebuild a store from a table produced by [`store_to_table`].
///
/// When `expected_crs` is given, a differing table CRS is a fatal
/// `CrsMismatch`.
pub fn store_from_table(table: &Table, expected_crs: Option<&Crs>) -> Result<FlowlineStore> {
    if let (Some(expected), Some(actual)) = (expected_crs, table.crs()) {
        expected.ensure_matches(actual)?;
    }

    let id = required_u64(table, "id")?;
    let catchment = required_u64(table, "catchment_id")?;
    let huc4 = required_str(table, "huc4")?;
    let gnis_name = required_str(table, "gnis_name")?;
    let size_class = required_column(table, "size_class")?
        .as_u8()
        .ok_or_else(|| type_mismatch("size_class"))?;
    let loop_flag = required_bool(table, "loop")?;
    let intermittent = required_bool(table, "intermittent")?;
    let geometry = required_column(table, "geometry")?
        .as_bin()
        .ok_or_else(|| type_mismatch("geometry"))?;

    let mut flowlines = Vec::with_capacity(table.n_rows());
    for row in 0..table.n_rows() {
        let class = SizeClass::from_ordinal(size_class[row])
            .ok_or_else(|| Error::Table(format!("invalid size class {}", size_class[row])))?;
        let line = wkb::decode_linestring(&geometry[row])?;
        let mut flowline = Flowline::new(id[row], line, huc4[row].clone(), class)?;
        flowline.catchment_id = catchment[row];
        if !gnis_name[row].is_empty() {
            flowline.gnis_name = Some(gnis_name[row].clone());
        }
        flowline.loop_flag = loop_flag[row];
        flowline.intermittent = intermittent[row];
        flowlines.push(flowline);
    }
    FlowlineStore::from_flowlines(flowlines)
}

/// Convert a join table to a two-column table.
pub fn joins_to_table(joins: &JoinTable) -> Result<Table> {
    let mut upstream = Vec::with_capacity(joins.len());
    let mut downstream = Vec::with_capacity(joins.len());
    for (u, d) in joins.iter() {
        upstream.push(u);
        downstream.push(d);
    }
    let mut table = Table::new();
    table.push_column("upstream_id", Column::U64(upstream))?;
    table.push_column("downstream_id", Column::U64(downstream))?;
    Ok(table)
}

/// Rebuild a join table from a table produced by [`joins_to_table`].
pub fn joins_from_table(table: &Table) -> Result<JoinTable> {
    let upstream = required_u64(table, "upstream_id")?;
    let downstream = required_u64(table, "downstream_id")?;
    Ok(JoinTable::from_edges(
        upstream.iter().copied().zip(downstream.iter().copied()),
    ))
}

/// Write a store to `path` as a columnar table.
pub fn write_flowlines(
    store: &FlowlineStore,
    crs: &Crs,
    network_ids: Option<&BTreeMap<u64, u64>>,
    path: &Path,
) -> Result<()> {
    store_to_table(store, crs, network_ids)?.write(path)
}

/// Load a store written by [`write_flowlines`].
pub fn read_flowlines(path: &Path, expected_crs: Option<&Crs>) -> Result<FlowlineStore> {
    store_from_table(&Table::read(path)?, expected_crs)
}

/// Write a join table to `path`.
pub fn write_joins(joins: &JoinTable, path: &Path) -> Result<()> {
    joins_to_table(joins)?.write(path)
}

/// Load a join table written by [`write_joins`].
pub fn read_joins(path: &Path) -> Result<JoinTable> {
    joins_from_table(&Table::read(path)?)
}

fn required_column<'t>(table: &'t Table, name: &str) -> Result<&'t Column> {
    table
        .column(name)
        .ok_or_else(|| Error::Table(format!("missing column \"{}\"", name)))
}

fn required_u64<'t>(table: &'t Table, name: &str) -> Result<&'t [u64]> {
    required_column(table, name)?
        .as_u64()
        .ok_or_else(|| type_mismatch(name))
}

fn required_str<'t>(table: &'t Table, name: &str) -> Result<&'t [String]> {
    required_column(table, name)?
        .as_str()
        .ok_or_else(|| type_mismatch(name))
}

fn required_bool<'t>(table: &'t Table, name: &str) -> Result<&'t [bool]> {
    required_column(table, name)?
        .as_bool()
        .ok_or_else(|| type_mismatch(name))
}

fn type_mismatch(name: &str) -> Error {
    Error::Table(format!("column \"{}\" has the wrong type", name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{LineString, Point};

    fn sample_store() -> FlowlineStore {
        let a = Flowline::new(
            1,
            LineString::from(vec![(0.0, 0.0), (50.0, 0.0), (100.0, 10.0)]),
            "0601",
            SizeClass::Creek,
        )
        .unwrap()
        .with_name("Clinch River");
        let b = Flowline::new(
            2,
            LineString::from(vec![(100.0, 10.0), (200.0, 10.0)]),
            "0601",
            SizeClass::SmallRiver,
        )
        .unwrap()
        .with_loop(true)
        .with_catchment(55000900017412);
        FlowlineStore::from_flowlines([a, b]).unwrap()
    }

    #[test]
    fn test_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flowlines.snt");
        let store = sample_store();
        let crs = Crs::conus_albers();

        write_flowlines(&store, &crs, None, &path).unwrap();
        let loaded = read_flowlines(&path, Some(&crs)).unwrap();

        assert_eq!(loaded.len(), store.len());
        for original in store.iter() {
            let copy = loaded.get(original.id).unwrap();
            assert_eq!(copy, original);
        }
    }

    #[test]
    fn test_roundtrip_preserves_index_behavior() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flowlines.snt");
        let store = sample_store();
        write_flowlines(&store, &Crs::Epsg(5070), None, &path).unwrap();
        let loaded = read_flowlines(&path, None).unwrap();

        let query = Point::new(60.0, 3.0);
        assert_eq!(
            store.nearest(query, 500.0, usize::MAX).unwrap(),
            loaded.nearest(query, 500.0, usize::MAX).unwrap()
        );
    }

    #[test]
    fn test_crs_mismatch_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flowlines.snt");
        write_flowlines(&sample_store(), &Crs::Epsg(4326), None, &path).unwrap();
        assert!(matches!(
            read_flowlines(&path, Some(&Crs::Epsg(5070))),
            Err(Error::CrsMismatch(_, _))
        ));
    }

    #[test]
    fn test_network_id_column() {
        let store = sample_store();
        let mut assignment = BTreeMap::new();
        assignment.insert(1u64, 7u64);
        let table = store_to_table(&store, &Crs::Epsg(5070), Some(&assignment)).unwrap();
        let ids = table.column("network_id").unwrap().as_u64().unwrap();
        assert_eq!(ids, &[7, 0]); // flowline 2 unassigned
    }

    #[test]
    fn test_joins_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("joins.snt");
        let joins = JoinTable::from_edges([(0, 1), (1, 2), (2, 0)]);
        write_joins(&joins, &path).unwrap();
        assert_eq!(read_joins(&path).unwrap(), joins);
    }
}
